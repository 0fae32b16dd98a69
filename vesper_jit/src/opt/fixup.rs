//! The fixup rewrite.
//!
//! One forward pass that commits to what prediction propagation
//! discovered: generic operations whose operands are now known to be
//! specializable are rewritten in place to their typed variants. The
//! opcodes introduced here (`GetArrayLength` and friends) are recognized
//! by CSE, allocation, and the flow analysis; no earlier phase may emit
//! them.

use super::Phase;
use crate::code_block::CodeBlock;
use crate::ir::graph::Graph;
use crate::ir::node::{NodeId, Payload};
use crate::ir::opcode::Opcode;
use crate::ir::prediction::Prediction;

/// The fixup phase.
#[derive(Debug, Default)]
pub struct Fixup {
    changed: bool,
}

impl Fixup {
    /// Create the phase.
    pub fn new() -> Self {
        Self::default()
    }

    fn fixup_node(&mut self, graph: &mut Graph, code_block: &CodeBlock, id: NodeId) {
        if !graph[id].should_generate() {
            return;
        }

        match graph[id].op {
            Opcode::GetById => {
                if !graph[id].prediction().is_int32() {
                    return;
                }
                if code_block.identifier(graph[id].identifier_number()) != "length" {
                    return;
                }
                let base = graph[graph[id].child1()].prediction();
                let new_op = if base.is_array() {
                    Opcode::GetArrayLength
                } else if base.is_string() {
                    Opcode::GetStringLength
                } else if base.is_byte_array() {
                    Opcode::GetByteArrayLength
                } else if base.is_int8_array() {
                    Opcode::GetInt8ArrayLength
                } else if base.is_int16_array() {
                    Opcode::GetInt16ArrayLength
                } else if base.is_int32_array() {
                    Opcode::GetInt32ArrayLength
                } else if base.is_uint8_array() {
                    Opcode::GetUint8ArrayLength
                } else if base.is_uint8_clamped_array() {
                    Opcode::GetUint8ClampedArrayLength
                } else if base.is_uint16_array() {
                    Opcode::GetUint16ArrayLength
                } else if base.is_uint32_array() {
                    Opcode::GetUint32ArrayLength
                } else if base.is_float32_array() {
                    Opcode::GetFloat32ArrayLength
                } else if base.is_float64_array() {
                    Opcode::GetFloat64ArrayLength
                } else {
                    return;
                };

                log::trace!("{}: GetById(length) -> {:?}", id, new_op);
                graph[id].op = new_op;
                graph[id].payload = Payload::None;
                // The replacement is pure; drop the must-generate ref.
                graph.deref_node(id);
                self.changed = true;
            }

            Opcode::GetIndexedPropertyStorage => {
                let index_prediction = graph[graph[id].child2()].prediction();
                if !index_prediction.intersects(Prediction::INT32) && index_prediction.is_set() {
                    // The index is known non-integer: the storage pointer
                    // will never be consulted.
                    log::trace!("{}: GetIndexedPropertyStorage -> Nop", id);
                    graph[id].op = Opcode::Nop;
                    graph.clear_and_deref_child(id, 0);
                    graph.clear_and_deref_child(id, 1);
                    graph.clear_and_deref_child(id, 2);
                    graph[id].set_ref_count(0);
                    self.changed = true;
                }
            }

            Opcode::GetByVal | Opcode::StringCharAt | Opcode::StringCharCodeAt => {
                // A storage child that fixup neutralized is stale; the
                // back-end must not see it.
                let child3 = graph[id].child3();
                if child3.is_valid() && graph[child3].op == Opcode::Nop {
                    graph[id].fixed_children_mut()[2] = NodeId::INVALID;
                    self.changed = true;
                }
            }

            _ => {}
        }
    }
}

impl Phase for Fixup {
    fn name(&self) -> &'static str {
        "fixup"
    }

    fn run(&mut self, graph: &mut Graph, code_block: &mut CodeBlock) -> bool {
        self.changed = false;
        for i in 0..graph.len() as u32 {
            self.fixup_node(graph, code_block, NodeId::new(i));
        }
        self.changed
    }
}

// =============================================================================
// Tests
// =============================================================================
