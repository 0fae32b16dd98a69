//! Virtual-register allocation.
//!
//! One forward walk over the node sequence. For each generating node we
//! first consume the uses of its children (so a slot freed by a last use
//! can be reused for this node's own result), then allocate the result
//! slot. `GetLocal` nodes are phi-like references into predecessors'
//! outputs and neither consume nor precede their children.

mod scoreboard;

pub use scoreboard::ScoreBoard;

use crate::code_block::CodeBlock;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::opcode::Opcode;
use crate::opt::Phase;

/// The allocation phase.
#[derive(Debug, Default)]
pub struct VirtualRegisterAllocation {
    /// Callee registers required after allocation.
    pub callee_registers: u32,
}

impl VirtualRegisterAllocation {
    /// Create the phase.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Phase for VirtualRegisterAllocation {
    fn name(&self) -> &'static str {
        "virtual-registers"
    }

    fn run(&mut self, graph: &mut Graph, code_block: &mut CodeBlock) -> bool {
        let mut score_board = ScoreBoard::new(graph.preserved_vars);

        // Phi nodes live past the last block and are not allocated.
        let size_excluding_phis = graph
            .blocks
            .iter()
            .last()
            .map(|(_, block)| block.end)
            .unwrap_or(0);

        for i in 0..size_excluding_phis {
            let id = NodeId::new(i);
            if !graph[id].should_generate() {
                continue;
            }

            if graph[id].op != Opcode::GetLocal {
                if graph[id].has_var_args() {
                    for child in graph.var_args_of(id) {
                        score_board.use_node(graph, child);
                    }
                } else {
                    let [child1, child2, child3] = *graph[id].fixed_children();
                    score_board.use_node(graph, child1);
                    score_board.use_node(graph, child2);
                    score_board.use_node(graph, child3);
                }
            }

            if !graph[id].has_result() {
                continue;
            }

            let register = score_board.allocate();
            graph[id].set_virtual_register(register);
            // Must-generate nodes hold an artificial use on themselves;
            // consume it now.
            if graph[id].must_generate() {
                score_board.use_node(graph, id);
            }
        }

        // The baseline tier reserved some number of locals and
        // temporaries; a different temporary allocation may need more.
        let callee_registers = score_board.high_watermark() + graph.parameter_slots;
        if code_block.num_callee_registers < callee_registers {
            code_block.num_callee_registers = callee_registers;
        }
        self.callee_registers = callee_registers;
        log::debug!("callee registers: {}", callee_registers);
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
