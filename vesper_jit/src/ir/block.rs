//! Basic blocks.
//!
//! A block is a half-open `[begin, end)` range over the graph's node
//! sequence, plus the successor links and the per-operand abstract value
//! frames the forward flow analysis maintains at its boundaries.

use smallvec::SmallVec;

use super::arena::Id;
use crate::cfa::AbstractValue;

/// A block reference.
pub type BlockId = Id<BasicBlock>;

/// A basic block.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Index of the first node in the block.
    pub begin: u32,
    /// One past the index of the last node in the block.
    pub end: u32,
    /// Successor blocks.
    pub successors: SmallVec<[BlockId; 2]>,
    /// Whether the flow analysis must (re)visit this block.
    pub cfa_should_revisit: bool,
    /// Whether the flow analysis has ever visited this block.
    pub cfa_has_visited: bool,
    /// Abstract operand frame at block entry.
    pub values_at_head: Vec<AbstractValue>,
    /// Abstract operand frame at block exit.
    pub values_at_tail: Vec<AbstractValue>,
}

impl BasicBlock {
    /// Create a block over `[begin, end)` with `num_operands` frame slots.
    pub fn new(begin: u32, end: u32, num_operands: usize) -> Self {
        BasicBlock {
            begin,
            end,
            successors: SmallVec::new(),
            cfa_should_revisit: false,
            cfa_has_visited: false,
            values_at_head: vec![AbstractValue::default(); num_operands],
            values_at_tail: vec![AbstractValue::default(); num_operands],
        }
    }

    /// Number of nodes in the block.
    #[inline]
    pub fn len(&self) -> usize {
        (self.end - self.begin) as usize
    }

    /// Check if the block is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_range() {
        let block = BasicBlock::new(3, 7, 2);
        assert_eq!(block.len(), 4);
        assert!(!block.is_empty());
        assert_eq!(block.values_at_head.len(), 2);
        assert!(!block.cfa_should_revisit);
    }
}
