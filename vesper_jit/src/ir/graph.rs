//! The data-flow graph.
//!
//! The graph owns the node sequence, the block partition, and the side
//! tables: the shared var-arg child table, the variable-access groups,
//! the storage-access metadata, and the global-variable predictions.
//! Node indices are dense; children always refer backwards within a
//! block (dominance via linear order) or to live-in `GetLocal`/`Phi`
//! nodes.
//!
//! Reference counts drive generation: a node is generated iff its count
//! is non-zero, and must-generate opcodes hold one artificial reference
//! on themselves.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt::Write as _;
use std::ops::{Index, IndexMut};
use vesper_core::IdentifierNumber;

use super::arena::Arena;
use super::block::{BasicBlock, BlockId};
use super::node::{Children, Node, NodeId, Payload};
use super::prediction::Prediction;
use super::variables::VariableSet;
use crate::code_block::{CodeBlock, CodeOrigin};

/// Storage-access metadata shared by `GetByOffset`/`PutByOffset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageAccessData {
    /// The property this offset access reads or writes.
    pub identifier_number: IdentifierNumber,
    /// Offset within the property storage.
    pub offset: u32,
}

// =============================================================================
// Graph
// =============================================================================

/// A block-partitioned data-flow graph.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Arena<Node>,
    /// The block partition, in program order.
    pub blocks: Arena<BasicBlock>,
    /// Shared child table for var-arg nodes.
    pub var_arg_children: Vec<NodeId>,
    /// Variable-access groups.
    pub variables: VariableSet,
    /// Storage-access metadata table.
    pub storage_accesses: Vec<StorageAccessData>,
    global_var_predictions: FxHashMap<u32, Prediction>,
    current_code_origin: CodeOrigin,
    /// Number of argument operands.
    pub num_arguments: u32,
    /// Number of local operands.
    pub num_locals: u32,
    /// Stack slots reserved for outgoing call arguments.
    pub parameter_slots: u32,
    /// Local slots the allocator must not reuse for temporaries.
    pub preserved_vars: u32,
}

impl Graph {
    /// Create an empty graph for a frame with the given operand counts.
    pub fn new(num_arguments: u32, num_locals: u32) -> Self {
        Graph {
            nodes: Arena::with_capacity(64),
            blocks: Arena::new(),
            var_arg_children: Vec::new(),
            variables: VariableSet::new(),
            storage_accesses: Vec::new(),
            global_var_predictions: FxHashMap::default(),
            current_code_origin: CodeOrigin(0),
            num_arguments,
            num_locals,
            parameter_slots: 0,
            preserved_vars: num_locals,
        }
    }

    // =========================================================================
    // Node access
    // =========================================================================

    /// Get a node.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Get a mutable node.
    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Number of nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all node IDs in program order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        self.nodes.ids()
    }

    /// Total operand slots (arguments then locals).
    #[inline]
    pub fn num_operands(&self) -> usize {
        (self.num_arguments + self.num_locals) as usize
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Set the code origin stamped onto subsequently added nodes.
    pub fn set_code_origin(&mut self, origin: CodeOrigin) {
        self.current_code_origin = origin;
    }

    /// Append a node.
    ///
    /// Children gain a reference each; must-generate opcodes additionally
    /// reference themselves.
    pub fn add_node(&mut self, op: super::opcode::Opcode, children: Children, payload: Payload) -> NodeId {
        let node = Node::new(op, children, payload, self.current_code_origin);
        let id = self.nodes.alloc(node);
        match children {
            Children::Fixed(fixed) => {
                for child in fixed {
                    if child.is_valid() {
                        self.nodes[child].add_ref();
                    }
                }
            }
            Children::Variadic { first, count } => {
                for i in first..first + count {
                    let child = self.var_arg_children[i as usize];
                    self.nodes[child].add_ref();
                }
            }
        }
        if op.must_generate() {
            self.nodes[id].add_ref();
        }
        id
    }

    /// Append a child to the shared var-arg table, returning its index.
    pub fn add_var_arg_child(&mut self, child: NodeId) -> u32 {
        let index = self.var_arg_children.len() as u32;
        self.var_arg_children.push(child);
        index
    }

    /// Append a block covering `[begin, end)`.
    pub fn add_block(&mut self, begin: u32, end: u32) -> BlockId {
        let block = BasicBlock::new(begin, end, self.num_operands());
        self.blocks.alloc(block)
    }

    /// Append storage-access metadata, returning its index.
    pub fn add_storage_access(&mut self, data: StorageAccessData) -> u32 {
        let index = self.storage_accesses.len() as u32;
        self.storage_accesses.push(data);
        index
    }

    /// Copy of a var-arg node's child list.
    pub fn var_args_of(&self, id: NodeId) -> SmallVec<[NodeId; 8]> {
        let (first, count) = self.nodes[id].var_arg_range();
        self.var_arg_children[first as usize..(first + count) as usize]
            .iter()
            .copied()
            .collect()
    }

    // =========================================================================
    // Reference counting
    // =========================================================================

    /// Add a reference to a node, referencing its children if it became
    /// live.
    pub fn ref_node(&mut self, id: NodeId) {
        if self.nodes[id].add_ref() {
            self.ref_children(id);
        }
    }

    /// Drop a reference to a node, dereferencing its children if it died.
    pub fn deref_node(&mut self, id: NodeId) {
        if self.nodes[id].deref() {
            self.deref_children(id);
        }
    }

    fn ref_children(&mut self, id: NodeId) {
        for child in self.collect_children(id) {
            self.ref_node(child);
        }
    }

    fn deref_children(&mut self, id: NodeId) {
        for child in self.collect_children(id) {
            self.deref_node(child);
        }
    }

    fn collect_children(&self, id: NodeId) -> SmallVec<[NodeId; 8]> {
        let node = &self.nodes[id];
        if node.has_var_args() {
            self.var_args_of(id)
        } else {
            node.fixed_children()
                .iter()
                .copied()
                .filter(|c| c.is_valid())
                .collect()
        }
    }

    /// Clear a fixed child slot, dropping its reference.
    pub fn clear_and_deref_child(&mut self, id: NodeId, slot: usize) {
        let child = self.nodes[id].fixed_children()[slot];
        if !child.is_valid() {
            return;
        }
        self.nodes[id].fixed_children_mut()[slot] = NodeId::INVALID;
        self.deref_node(child);
    }

    // =========================================================================
    // Constants
    // =========================================================================

    /// Whether a node is a numeric constant.
    pub fn is_number_constant(&self, code_block: &CodeBlock, id: NodeId) -> bool {
        let node = &self.nodes[id];
        node.has_constant() && code_block.constant(node.constant_index()).is_number()
    }

    /// Numeric value of a constant node. Only meaningful when
    /// `is_number_constant` holds.
    pub fn value_of_number_constant(&self, code_block: &CodeBlock, id: NodeId) -> f64 {
        let node = &self.nodes[id];
        code_block
            .constant(node.constant_index())
            .as_number()
            .unwrap_or(f64::NAN)
    }

    // =========================================================================
    // Speculation oracles
    // =========================================================================

    /// Whether an add-like node (`ValueAdd`/`ArithAdd`/`ArithSub`) should
    /// speculate on int32 operands.
    pub fn add_should_speculate_integer(&self, node: &Node, code_block: &CodeBlock) -> bool {
        let left = &self.nodes[node.child1()];
        let right = &self.nodes[node.child2()];

        if left.has_constant() {
            return self.add_immediate_should_speculate_integer(code_block, node, right, left);
        }
        if right.has_constant() {
            return self.add_immediate_should_speculate_integer(code_block, node, left, right);
        }

        left.should_speculate_integer()
            && right.should_speculate_integer()
            && node.can_speculate_integer()
    }

    fn add_immediate_should_speculate_integer(
        &self,
        code_block: &CodeBlock,
        add: &Node,
        variable: &Node,
        immediate: &Node,
    ) -> bool {
        debug_assert!(immediate.has_constant());

        let value = code_block.constant(immediate.constant_index());
        if !value.is_number() {
            return false;
        }
        if !variable.should_speculate_integer() {
            return false;
        }
        if value.is_int32() {
            return add.can_speculate_integer();
        }

        // A large double immediate pushes the sum out of the range where
        // int32 wrap-around still matches truncation of the true result.
        let Some(double_immediate) = value.as_number() else {
            return false;
        };
        const TWO_TO_THE_48: f64 = 281_474_976_710_656.0;
        if !(-TWO_TO_THE_48..=TWO_TO_THE_48).contains(&double_immediate) {
            return false;
        }
        add.arith_flags().can_truncate_integer()
    }

    // =========================================================================
    // Global variables
    // =========================================================================

    /// Accumulated prediction for a global variable.
    pub fn global_var_prediction(&self, var_number: u32) -> Prediction {
        self.global_var_predictions
            .get(&var_number)
            .copied()
            .unwrap_or_default()
    }

    /// Join a prediction into a global variable; returns whether it grew.
    pub fn predict_global_var(&mut self, var_number: u32, prediction: Prediction) -> bool {
        self.global_var_predictions
            .entry(var_number)
            .or_default()
            .merge(prediction)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Render the graph for trace output.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (block_id, block) in self.blocks.iter() {
            let _ = writeln!(out, "block {} [{}, {}):", block_id, block.begin, block.end);
            for i in block.begin..block.end {
                let id = NodeId::new(i);
                let node = &self.nodes[id];
                let _ = write!(out, "  {}: {:?}(", id, node.op);
                match node.children {
                    Children::Fixed(children) => {
                        let mut first = true;
                        for child in children.into_iter().filter(|c| c.is_valid()) {
                            if !first {
                                let _ = write!(out, ", ");
                            }
                            let _ = write!(out, "{}", child);
                            first = false;
                        }
                    }
                    Children::Variadic { .. } => {
                        let mut first = true;
                        for child in self.var_args_of(id) {
                            if !first {
                                let _ = write!(out, ", ");
                            }
                            let _ = write!(out, "{}", child);
                            first = false;
                        }
                    }
                }
                let _ = writeln!(
                    out,
                    ") rc={} pred={:?}",
                    node.ref_count(),
                    node.prediction()
                );
            }
        }
        out
    }

    /// Check structural invariants (debug builds only).
    #[cfg(debug_assertions)]
    pub fn verify(&self) -> Result<(), String> {
        let len = self.nodes.len() as u32;
        for id in self.ids() {
            for child in self.collect_children(id) {
                if child.index() >= len {
                    return Err(format!("node {} has out-of-range child {}", id, child));
                }
            }
        }
        let mut previous_end = 0;
        for (block_id, block) in self.blocks.iter() {
            if block.begin != previous_end {
                return Err(format!("block {} does not start at {}", block_id, previous_end));
            }
            if block.end < block.begin || block.end > len {
                return Err(format!("block {} has a bad range", block_id));
            }
            previous_end = block.end;
        }
        Ok(())
    }

    /// Check structural invariants (debug builds only).
    #[cfg(not(debug_assertions))]
    pub fn verify(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Index<NodeId> for Graph {
    type Output = Node;

    #[inline]
    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }
}

impl IndexMut<NodeId> for Graph {
    #[inline]
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }
}

// =============================================================================
// Tests
// =============================================================================
