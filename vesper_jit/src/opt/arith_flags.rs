//! Arithmetic-usage flag propagation.
//!
//! Usage flows against def-use edges: a node's flags describe what its
//! consumers demand, and each visit recomputes what the node therefore
//! demands of its children. The driver alternates backward and forward
//! sweeps until a full sweep merges nothing new; backward first, because
//! demand travels toward definitions.

use super::{Direction, Phase};
use crate::code_block::CodeBlock;
use crate::ir::flags::ArithFlags;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::opcode::Opcode;

/// The flag-propagation phase.
#[derive(Debug, Default)]
pub struct ArithFlagPropagation {
    changed: bool,
}

impl ArithFlagPropagation {
    /// Create the phase.
    pub fn new() -> Self {
        Self::default()
    }

    fn is_not_neg_zero(&self, graph: &Graph, code_block: &CodeBlock, id: NodeId) -> bool {
        if !graph.is_number_constant(code_block, id) {
            return false;
        }
        let value = graph.value_of_number_constant(code_block, id);
        !(value == 0.0 && value.is_sign_negative())
    }

    fn is_not_zero(&self, graph: &Graph, code_block: &CodeBlock, id: NodeId) -> bool {
        if !graph.is_number_constant(code_block, id) {
            return false;
        }
        graph.value_of_number_constant(code_block, id) != 0.0
    }

    fn visit(&mut self, graph: &mut Graph, code_block: &CodeBlock, id: NodeId) {
        if !graph[id].should_generate() {
            return;
        }

        let op = graph[id].op;
        // Only the demand bits travel; feedback bits stay on the node.
        let mut flags = graph[id].arith_flags() & ArithFlags::USED_AS_MASK;
        let mut changed = false;

        match op {
            // These operations are satisfied with truncated integers, so
            // nothing is demanded of their children.
            Opcode::ValueToInt32
            | Opcode::BitAnd
            | Opcode::BitOr
            | Opcode::BitXor
            | Opcode::BitLShift
            | Opcode::BitRShift
            | Opcode::BitURShift => {}

            Opcode::UInt32ToNumber => {
                let child = graph[id].child1();
                changed |= graph[child].merge_arith_flags(flags);
            }

            Opcode::ArithAdd | Opcode::ValueAdd => {
                let child1 = graph[id].child1();
                let child2 = graph[id].child2();
                // Adding a constant that is not -0 can never produce -0.
                if self.is_not_neg_zero(graph, code_block, child1)
                    || self.is_not_neg_zero(graph, code_block, child2)
                {
                    flags.remove(ArithFlags::NEEDS_NEG_ZERO);
                }
                changed |= graph[child1].merge_arith_flags(flags);
                changed |= graph[child2].merge_arith_flags(flags);
            }

            Opcode::ArithSub => {
                let child1 = graph[id].child1();
                let child2 = graph[id].child2();
                // Subtracting involving a non-zero constant can never
                // produce -0.
                if self.is_not_zero(graph, code_block, child1)
                    || self.is_not_zero(graph, code_block, child2)
                {
                    flags.remove(ArithFlags::NEEDS_NEG_ZERO);
                }
                changed |= graph[child1].merge_arith_flags(flags);
                changed |= graph[child2].merge_arith_flags(flags);
            }

            Opcode::ArithMul | Opcode::ArithDiv => {
                // A multiply can land in the part of the double domain
                // where the truncation point changes the outcome, so it
                // always demands exact inputs.
                flags.insert(ArithFlags::USED_AS_NUMBER | ArithFlags::NEEDS_NEG_ZERO);
                let child1 = graph[id].child1();
                let child2 = graph[id].child2();
                changed |= graph[child1].merge_arith_flags(flags);
                changed |= graph[child2].merge_arith_flags(flags);
            }

            Opcode::ArithMin | Opcode::ArithMax => {
                flags.insert(ArithFlags::USED_AS_NUMBER);
                let child1 = graph[id].child1();
                let child2 = graph[id].child2();
                changed |= graph[child1].merge_arith_flags(flags);
                changed |= graph[child2].merge_arith_flags(flags);
            }

            Opcode::ArithAbs => {
                flags.remove(ArithFlags::NEEDS_NEG_ZERO);
                let child = graph[id].child1();
                changed |= graph[child].merge_arith_flags(flags);
            }

            Opcode::PutByVal => {
                let child1 = graph[id].child1();
                let child2 = graph[id].child2();
                let child3 = graph[id].child3();
                changed |= graph[child1]
                    .merge_arith_flags(flags | ArithFlags::USED_AS_NUMBER | ArithFlags::NEEDS_NEG_ZERO);
                changed |= graph[child2].merge_arith_flags(flags | ArithFlags::USED_AS_NUMBER);
                changed |= graph[child3]
                    .merge_arith_flags(flags | ArithFlags::USED_AS_NUMBER | ArithFlags::NEEDS_NEG_ZERO);
            }

            Opcode::GetByVal => {
                let child1 = graph[id].child1();
                let child2 = graph[id].child2();
                changed |= graph[child1]
                    .merge_arith_flags(flags | ArithFlags::USED_AS_NUMBER | ArithFlags::NEEDS_NEG_ZERO);
                changed |= graph[child2].merge_arith_flags(flags | ArithFlags::USED_AS_NUMBER);
            }

            _ => {
                flags.insert(ArithFlags::USED_AS_NUMBER | ArithFlags::NEEDS_NEG_ZERO);
                if graph[id].has_var_args() {
                    for child in graph.var_args_of(id) {
                        changed |= graph[child].merge_arith_flags(flags);
                    }
                } else {
                    'children: {
                        let [child1, child2, child3] = *graph[id].fixed_children();
                        if !child1.is_valid() {
                            break 'children;
                        }
                        changed |= graph[child1].merge_arith_flags(flags);
                        if !child2.is_valid() {
                            break 'children;
                        }
                        changed |= graph[child2].merge_arith_flags(flags);
                        if !child3.is_valid() {
                            break 'children;
                        }
                        changed |= graph[child3].merge_arith_flags(flags);
                    }
                }
            }
        }

        self.changed |= changed;
    }

    fn pass(&mut self, graph: &mut Graph, code_block: &CodeBlock, direction: Direction) {
        log::trace!("arith flag pass ({:?})", direction);
        let len = graph.len() as u32;
        match direction {
            Direction::Forward => {
                for i in 0..len {
                    self.visit(graph, code_block, NodeId::new(i));
                }
            }
            Direction::Backward => {
                for i in (0..len).rev() {
                    self.visit(graph, code_block, NodeId::new(i));
                }
            }
        }
    }
}

impl Phase for ArithFlagPropagation {
    fn name(&self) -> &'static str {
        "arith-flags"
    }

    fn run(&mut self, graph: &mut Graph, code_block: &mut CodeBlock) -> bool {
        let mut any = false;
        loop {
            self.changed = false;
            self.pass(graph, code_block, Direction::Backward);
            any |= self.changed;
            if !self.changed {
                break;
            }
            self.changed = false;
            self.pass(graph, code_block, Direction::Forward);
            any |= self.changed;
            if !self.changed {
                break;
            }
        }
        any
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::{Children, Payload};
    use vesper_core::ConstantValue;

    fn constant(graph: &mut Graph, code_block: &mut CodeBlock, value: ConstantValue) -> NodeId {
        let index = code_block.add_constant(value);
        graph.add_node(Opcode::JSConstant, Children::none(), Payload::Constant(index))
    }

    #[test]
    fn test_add_of_constants_clears_neg_zero_demand() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let a = constant(&mut graph, &mut code_block, ConstantValue::Int32(3));
        let b = constant(&mut graph, &mut code_block, ConstantValue::Int32(4));
        let add = graph.add_node(Opcode::ArithAdd, Children::two(a, b), Payload::None);
        graph.add_node(Opcode::Return, Children::one(add), Payload::None);

        let mut phase = ArithFlagPropagation::new();
        phase.run(&mut graph, &mut code_block);

        // Return demands everything of the add.
        assert_eq!(graph[add].arith_flags(), ArithFlags::USED_AS_MASK);
        // The add forwards the demand but drops -0 because neither
        // constant is -0.
        assert_eq!(graph[a].arith_flags(), ArithFlags::USED_AS_NUMBER);
        assert_eq!(graph[b].arith_flags(), ArithFlags::USED_AS_NUMBER);
    }

    #[test]
    fn test_neg_zero_constant_keeps_demand() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let a = constant(&mut graph, &mut code_block, ConstantValue::Double(-0.0));
        let b = constant(&mut graph, &mut code_block, ConstantValue::Double(-0.0));
        let add = graph.add_node(Opcode::ArithAdd, Children::two(a, b), Payload::None);
        graph.add_node(Opcode::Return, Children::one(add), Payload::None);

        let mut phase = ArithFlagPropagation::new();
        phase.run(&mut graph, &mut code_block);

        assert_eq!(graph[a].arith_flags(), ArithFlags::USED_AS_MASK);
        assert_eq!(graph[b].arith_flags(), ArithFlags::USED_AS_MASK);
    }

    #[test]
    fn test_bitwise_consumers_drop_all_demand() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let a = constant(&mut graph, &mut code_block, ConstantValue::Int32(1));
        let b = constant(&mut graph, &mut code_block, ConstantValue::Int32(2));
        let and = graph.add_node(Opcode::BitAnd, Children::two(a, b), Payload::None);
        graph.add_node(Opcode::Return, Children::one(and), Payload::None);

        let mut phase = ArithFlagPropagation::new();
        phase.run(&mut graph, &mut code_block);

        assert_eq!(graph[a].arith_flags(), ArithFlags::empty());
        assert_eq!(graph[b].arith_flags(), ArithFlags::empty());
    }

    #[test]
    fn test_mul_forces_full_demand_on_children() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let a = constant(&mut graph, &mut code_block, ConstantValue::Int32(7));
        let b = constant(&mut graph, &mut code_block, ConstantValue::Int32(9));
        let add = graph.add_node(Opcode::ArithAdd, Children::two(a, b), Payload::None);
        let c = constant(&mut graph, &mut code_block, ConstantValue::Int32(2));
        let mul = graph.add_node(Opcode::ArithMul, Children::two(add, c), Payload::None);
        graph.add_node(Opcode::Return, Children::one(mul), Payload::None);

        let mut phase = ArithFlagPropagation::new();
        phase.run(&mut graph, &mut code_block);

        // The multiply forces exactness on the nested add regardless of
        // what the return demanded.
        assert!(graph[add]
            .arith_flags()
            .contains(ArithFlags::USED_AS_MASK));
    }

    #[test]
    fn test_sub_of_nonzero_constant_clears_neg_zero() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let a = constant(&mut graph, &mut code_block, ConstantValue::Int32(5));
        let b = constant(&mut graph, &mut code_block, ConstantValue::Int32(1));
        let sub = graph.add_node(Opcode::ArithSub, Children::two(a, b), Payload::None);
        graph.add_node(Opcode::Return, Children::one(sub), Payload::None);

        let mut phase = ArithFlagPropagation::new();
        phase.run(&mut graph, &mut code_block);

        assert_eq!(graph[a].arith_flags(), ArithFlags::USED_AS_NUMBER);
        assert_eq!(graph[b].arith_flags(), ArithFlags::USED_AS_NUMBER);
    }

    #[test]
    fn test_dead_nodes_are_ignored() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let a = constant(&mut graph, &mut code_block, ConstantValue::Int32(5));
        // The multiply is never referenced, so it must not demand
        // anything of its child.
        graph.add_node(Opcode::ArithMul, Children::two(a, a), Payload::None);

        let mut phase = ArithFlagPropagation::new();
        phase.run(&mut graph, &mut code_block);
        assert_eq!(graph[a].arith_flags(), ArithFlags::empty());
    }
}
