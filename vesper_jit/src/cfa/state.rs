//! Abstract values and the shipped transfer function.
//!
//! `TypeFlowState` is the default `AbstractState`: it abstracts every
//! value by its prediction, carries the operand frame across local
//! accesses, and proves unreachability past an unconditional bailout.
//! Richer states (constant folding, structure tracking) plug in through
//! the same trait.

use super::{AbstractState, MergeMode};
use crate::ir::arena::SecondaryMap;
use crate::ir::block::BlockId;
use crate::ir::graph::Graph;
use crate::ir::node::{Node, NodeId};
use crate::ir::opcode::Opcode;
use crate::ir::prediction::Prediction;

// =============================================================================
// Abstract Value
// =============================================================================

/// What the flow analysis knows about one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbstractValue {
    prediction: Prediction,
}

impl AbstractValue {
    /// The bottom element: nothing known, nothing proven to flow here.
    #[inline]
    pub fn bottom() -> Self {
        Self::default()
    }

    /// An abstract value from a prediction.
    #[inline]
    pub fn from_prediction(prediction: Prediction) -> Self {
        AbstractValue { prediction }
    }

    /// The prediction this value is abstracted by.
    #[inline]
    pub fn prediction(&self) -> Prediction {
        self.prediction
    }

    /// Whether anything has flowed into this value.
    #[inline]
    pub fn is_bottom(&self) -> bool {
        self.prediction.is_empty()
    }

    /// Join another value in; returns whether this value grew.
    #[inline]
    pub fn merge(&mut self, other: &AbstractValue) -> bool {
        self.prediction.merge(other.prediction)
    }
}

// =============================================================================
// Type Flow State
// =============================================================================

/// Prediction-granularity abstract interpreter state.
#[derive(Debug)]
pub struct TypeFlowState {
    operands: Vec<AbstractValue>,
    node_values: SecondaryMap<Node, AbstractValue>,
    is_valid: bool,
}

impl TypeFlowState {
    /// Create a state sized for the graph's operand frame.
    pub fn new(graph: &Graph) -> Self {
        TypeFlowState {
            operands: vec![AbstractValue::bottom(); graph.num_operands()],
            node_values: SecondaryMap::with_len(graph.len()),
            is_valid: true,
        }
    }

    fn value_of(&self, graph: &Graph, id: NodeId) -> AbstractValue {
        let known = self.node_values[id];
        if known.is_bottom() {
            AbstractValue::from_prediction(graph[id].prediction())
        } else {
            known
        }
    }
}

impl AbstractState for TypeFlowState {
    fn initialize(&mut self, graph: &mut Graph) {
        if let Some(entry) = graph.blocks.ids().next() {
            graph.blocks[entry].cfa_should_revisit = true;
        }
    }

    fn begin_basic_block(&mut self, graph: &mut Graph, block: BlockId) {
        let block = &mut graph.blocks[block];
        self.operands.clone_from(&block.values_at_head);
        self.is_valid = true;
        block.cfa_should_revisit = false;
        block.cfa_has_visited = true;
    }

    fn execute(&mut self, graph: &Graph, id: NodeId) -> bool {
        let node = &graph[id];
        match node.op {
            Opcode::GetLocal => {
                let slot = graph.variables.operand_of(node.variable()) as usize;
                let value = if self.operands[slot].is_bottom() {
                    AbstractValue::from_prediction(node.prediction())
                } else {
                    self.operands[slot]
                };
                self.node_values.set(id, value);
            }
            Opcode::SetLocal => {
                let slot = graph.variables.operand_of(node.variable()) as usize;
                self.operands[slot] = self.value_of(graph, node.child1());
            }
            Opcode::ForceOSRExit => {
                // Nothing past an unconditional bailout executes.
                self.is_valid = false;
            }
            _ => {
                if node.has_result() {
                    self.node_values
                        .set(id, AbstractValue::from_prediction(node.prediction()));
                }
            }
        }
        self.is_valid
    }

    fn end_basic_block(&mut self, graph: &mut Graph, block: BlockId, mode: MergeMode) -> bool {
        graph.blocks[block].values_at_tail.clone_from(&self.operands);
        if mode == MergeMode::MergeToTail {
            return false;
        }

        let successors = graph.blocks[block].successors.clone();
        let mut changed = false;
        for succ in successors {
            let mut grew = false;
            for (slot, value) in self.operands.iter().enumerate() {
                grew |= graph.blocks[succ].values_at_head[slot].merge(value);
            }
            // A successor that has never run must run at least once even
            // if its head frame is still bottom.
            if grew || !graph.blocks[succ].cfa_has_visited {
                graph.blocks[succ].cfa_should_revisit = true;
                changed = true;
            }
        }
        changed
    }
}

// =============================================================================
// Tests
// =============================================================================
