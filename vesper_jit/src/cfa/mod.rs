//! Global forward control-flow analysis.
//!
//! A pseudo-worklist forward pass: blocks are visited in program order
//! (which is nearly topological), and instead of a worklist each block
//! carries a `cfa_should_revisit` flag set when a merge changed its head
//! frame. Straight-line code converges in one sweep; only loops cause
//! revisits, in proportion to loop depth.
//!
//! The transfer function is pluggable through [`AbstractState`]; the
//! shipped implementation is [`TypeFlowState`].

mod state;

pub use state::{AbstractValue, TypeFlowState};

use crate::ir::block::BlockId;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;

/// What `end_basic_block` should do with the final frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Record the tail frame only.
    MergeToTail,
    /// Record the tail frame and join it into every successor's head.
    MergeToSuccessors,
}

/// The transfer function contract.
pub trait AbstractState {
    /// Prime the graph for analysis (arm the entry block).
    fn initialize(&mut self, graph: &mut Graph);

    /// Load the state from a block's head frame and clear its revisit
    /// flag.
    fn begin_basic_block(&mut self, graph: &mut Graph, block: BlockId);

    /// Advance the state over one node. Returns false when execution
    /// provably cannot continue past the node.
    fn execute(&mut self, graph: &Graph, id: NodeId) -> bool;

    /// Store the state to the block's tail and, per `mode`, join it into
    /// successor heads. Returns whether any successor head changed.
    fn end_basic_block(&mut self, graph: &mut Graph, block: BlockId, mode: MergeMode) -> bool;
}

/// Run the analysis to fixpoint. Returns the number of sweeps.
pub fn global_cfa<S: AbstractState>(graph: &mut Graph, state: &mut S) -> u32 {
    state.initialize(graph);

    let blocks: Vec<BlockId> = graph.blocks.ids().collect();
    let mut sweeps = 0;
    loop {
        sweeps += 1;
        let mut changed = false;
        for &block in &blocks {
            changed |= perform_block_cfa(graph, state, block);
        }
        if !changed {
            break;
        }
    }
    log::trace!("cfa converged after {} sweeps", sweeps);
    sweeps
}

fn perform_block_cfa<S: AbstractState>(graph: &mut Graph, state: &mut S, block: BlockId) -> bool {
    if !graph.blocks[block].cfa_should_revisit {
        return false;
    }

    state.begin_basic_block(graph, block);
    let (begin, end) = {
        let block = &graph.blocks[block];
        (block.begin, block.end)
    };
    for i in begin..end {
        let id = NodeId::new(i);
        if !graph[id].should_generate() {
            continue;
        }
        if !state.execute(graph, id) {
            break;
        }
    }
    state.end_basic_block(graph, block, MergeMode::MergeToSuccessors)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::{Children, Payload};
    use crate::ir::opcode::Opcode;
    use crate::ir::prediction::Prediction;

    // One block per statement; SetLocal in the first block, GetLocal in
    // the second, so the frame has to flow across the edge.
    fn two_block_graph() -> Graph {
        let mut graph = Graph::new(0, 1);
        let var = graph.variables.add(0);

        let c = graph.add_node(Opcode::JSConstant, Children::none(), Payload::Constant(0));
        graph[c].predict(Prediction::INT32);
        let set = graph.add_node(Opcode::SetLocal, Children::one(c), Payload::Variable(var));
        graph.add_node(Opcode::Jump, Children::none(), Payload::None);

        let get = graph.add_node(Opcode::GetLocal, Children::none(), Payload::Variable(var));
        graph[get].predict(Prediction::INT32);
        let ret = graph.add_node(Opcode::Return, Children::one(get), Payload::None);

        let _ = (set, ret);
        let b0 = graph.add_block(0, 3);
        let b1 = graph.add_block(3, 5);
        graph.blocks[b0].successors.push(b1);
        graph
    }

    #[test]
    fn test_straight_line_converges_in_two_sweeps() {
        let mut graph = two_block_graph();
        let mut state = TypeFlowState::new(&graph);
        // Sweep one visits both blocks; sweep two observes quiescence.
        let sweeps = global_cfa(&mut graph, &mut state);
        assert!(sweeps <= 2);

        let blocks: Vec<_> = graph.blocks.ids().collect();
        assert!(graph.blocks[blocks[0]].cfa_has_visited);
        assert!(graph.blocks[blocks[1]].cfa_has_visited);
        assert!(!graph.blocks[blocks[1]].cfa_should_revisit);
        assert_eq!(
            graph.blocks[blocks[1]].values_at_head[0].prediction(),
            Prediction::INT32
        );
    }

    #[test]
    fn test_unvisited_block_stays_bottom() {
        let mut graph = two_block_graph();
        // Detach the edge: the second block is unreachable.
        let blocks: Vec<_> = graph.blocks.ids().collect();
        graph.blocks[blocks[0]].successors.clear();

        let mut state = TypeFlowState::new(&graph);
        global_cfa(&mut graph, &mut state);
        assert!(!graph.blocks[blocks[1]].cfa_has_visited);
        assert!(graph.blocks[blocks[1]].values_at_head[0].is_bottom());
    }

    #[test]
    fn test_loop_revisits_until_head_saturates() {
        // b0 -> b1 -> b1 (self loop) with a SetLocal widening the local.
        let mut graph = Graph::new(0, 1);
        let var = graph.variables.add(0);

        let c = graph.add_node(Opcode::JSConstant, Children::none(), Payload::Constant(0));
        graph[c].predict(Prediction::INT32);
        let _set = graph.add_node(Opcode::SetLocal, Children::one(c), Payload::Variable(var));
        graph.add_node(Opcode::Jump, Children::none(), Payload::None);

        let get = graph.add_node(Opcode::GetLocal, Children::none(), Payload::Variable(var));
        graph[get].predict(Prediction::NUMBER);
        let d = graph.add_node(Opcode::JSConstant, Children::none(), Payload::Constant(1));
        graph[d].predict(Prediction::DOUBLE);
        let _set2 = graph.add_node(Opcode::SetLocal, Children::one(d), Payload::Variable(var));
        graph.add_node(Opcode::Branch, Children::one(get), Payload::None);

        let b0 = graph.add_block(0, 3);
        let b1 = graph.add_block(3, 7);
        graph.blocks[b0].successors.push(b1);
        graph.blocks[b1].successors.push(b1);

        let mut state = TypeFlowState::new(&graph);
        let sweeps = global_cfa(&mut graph, &mut state);
        assert!(sweeps >= 2);
        // The loop head saw both the int from outside and the double
        // carried around the back edge.
        assert_eq!(
            graph.blocks[b1].values_at_head[0].prediction(),
            Prediction::NUMBER
        );
    }
}
