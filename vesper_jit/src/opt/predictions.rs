//! Type-prediction propagation and double voting.
//!
//! Each node's prediction is recomputed from its children's predictions
//! (and from value-profile seeds) by a per-opcode rule. The fixpoint runs
//! forward then backward: forward is near-optimal for topologically
//! ordered code, backward short-circuits loops and mutual constraints.
//!
//! Once predictions are quiescent, a second fixpoint interleaves voting
//! on the representation of each local. Arithmetic that will produce
//! doubles votes its operand locals toward double format; a flipped
//! decision re-arms prediction propagation so the new representation can
//! flow through.

use super::{Direction, Phase};
use crate::code_block::CodeBlock;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::opcode::Opcode;
use crate::ir::prediction::Prediction;
use crate::ir::variables::Ballot;

/// The prediction phase.
#[derive(Debug, Default)]
pub struct PredictionPropagation {
    changed: bool,
}

/// Install a prediction we cannot change our mind about. Semantically the
/// same as a merge, but checks that the previous value was bottom or
/// identical.
fn set_prediction(graph: &mut Graph, id: NodeId, prediction: Prediction) -> bool {
    debug_assert!(graph[id].has_result());
    debug_assert!(
        graph[id].prediction().is_empty() || graph[id].prediction() == prediction,
        "{:?} flip-flopped from {:?} to {:?}",
        graph[id].op,
        graph[id].prediction(),
        prediction
    );
    graph[id].predict(prediction)
}

fn merge_prediction(graph: &mut Graph, id: NodeId, prediction: Prediction) -> bool {
    debug_assert!(graph[id].has_result());
    graph[id].predict(prediction)
}

impl PredictionPropagation {
    /// Create the phase.
    pub fn new() -> Self {
        Self::default()
    }

    fn visit(&mut self, graph: &mut Graph, code_block: &CodeBlock, id: NodeId) {
        if !graph[id].should_generate() {
            return;
        }

        let op = graph[id].op;
        let mut changed = false;

        match op {
            Opcode::JSConstant | Opcode::WeakJSConstant => {
                let value = code_block.constant(graph[id].constant_index());
                changed |= set_prediction(graph, id, Prediction::from_value(value));
            }

            Opcode::GetLocal => {
                let variable = graph[id].variable();
                let prediction = graph.variables.prediction(variable);
                if prediction.is_set() {
                    changed |= merge_prediction(graph, id, prediction);
                }
            }

            Opcode::SetLocal => {
                let variable = graph[id].variable();
                let source = graph[graph[id].child1()].prediction();
                changed |= graph.variables.predict(variable, source);
            }

            Opcode::BitAnd
            | Opcode::BitOr
            | Opcode::BitXor
            | Opcode::BitRShift
            | Opcode::BitLShift
            | Opcode::BitURShift
            | Opcode::ValueToInt32 => {
                changed |= set_prediction(graph, id, Prediction::INT32);
            }

            Opcode::ArrayPop | Opcode::ArrayPush => {
                let heap = graph[id].heap_prediction;
                if heap.is_set() {
                    changed |= merge_prediction(graph, id, heap);
                }
            }

            Opcode::StringCharCodeAt => {
                changed |= merge_prediction(graph, id, Prediction::INT32);
            }

            Opcode::ArithMod => {
                let left = graph[graph[id].child1()].prediction();
                let right = graph[graph[id].child2()].prediction();
                if left.is_set() && right.is_set() {
                    if (left | right).is_int32() && graph[id].can_speculate_integer() {
                        changed |= merge_prediction(graph, id, Prediction::INT32);
                    } else {
                        changed |= merge_prediction(graph, id, Prediction::DOUBLE);
                    }
                }
            }

            Opcode::UInt32ToNumber => {
                if graph[id].can_speculate_integer() {
                    changed |= set_prediction(graph, id, Prediction::INT32);
                } else {
                    changed |= set_prediction(graph, id, Prediction::NUMBER);
                }
            }

            Opcode::ValueAdd => {
                let left = graph[graph[id].child1()].prediction();
                let right = graph[graph[id].child2()].prediction();
                if left.is_set() && right.is_set() {
                    if left.is_number() && right.is_number() {
                        if graph.add_should_speculate_integer(&graph[id], code_block) {
                            changed |= merge_prediction(graph, id, Prediction::INT32);
                        } else {
                            changed |= merge_prediction(graph, id, Prediction::DOUBLE);
                        }
                    } else if !left.intersects(Prediction::NUMBER)
                        || !right.intersects(Prediction::NUMBER)
                    {
                        // One side is definitely not a number: the add
                        // concatenates.
                        changed |= merge_prediction(graph, id, Prediction::STRING);
                    } else {
                        changed |= merge_prediction(
                            graph,
                            id,
                            Prediction::STRING | Prediction::INT32 | Prediction::DOUBLE,
                        );
                    }
                }
            }

            Opcode::ArithAdd | Opcode::ArithSub => {
                let left = graph[graph[id].child1()].prediction();
                let right = graph[graph[id].child2()].prediction();
                if left.is_set() && right.is_set() {
                    if graph.add_should_speculate_integer(&graph[id], code_block) {
                        changed |= merge_prediction(graph, id, Prediction::INT32);
                    } else {
                        changed |= merge_prediction(graph, id, Prediction::DOUBLE);
                    }
                }
            }

            Opcode::ArithMul | Opcode::ArithMin | Opcode::ArithMax | Opcode::ArithDiv => {
                let left = graph[graph[id].child1()].prediction();
                let right = graph[graph[id].child2()].prediction();
                if left.is_set() && right.is_set() {
                    if (left | right).is_int32() && graph[id].can_speculate_integer() {
                        changed |= merge_prediction(graph, id, Prediction::INT32);
                    } else {
                        changed |= merge_prediction(graph, id, Prediction::DOUBLE);
                    }
                }
            }

            Opcode::ArithSqrt => {
                changed |= set_prediction(graph, id, Prediction::DOUBLE);
            }

            Opcode::ArithAbs => {
                let child = graph[graph[id].child1()].prediction();
                if child.is_set() {
                    if graph[id].can_speculate_integer() {
                        changed |= merge_prediction(graph, id, child);
                    } else {
                        changed |= set_prediction(graph, id, Prediction::DOUBLE);
                    }
                }
            }

            Opcode::LogicalNot
            | Opcode::CompareLess
            | Opcode::CompareLessEq
            | Opcode::CompareGreater
            | Opcode::CompareGreaterEq
            | Opcode::CompareEq
            | Opcode::CompareStrictEq
            | Opcode::InstanceOf => {
                changed |= set_prediction(graph, id, Prediction::BOOLEAN);
            }

            Opcode::GetById => {
                let heap = graph[id].heap_prediction;
                if heap.is_set() {
                    changed |= merge_prediction(graph, id, heap);
                } else if code_block.identifier(graph[id].identifier_number()) == "length" {
                    // No profile seed; we may still be able to infer the
                    // type ourselves.
                    let base = graph[graph[id].child1()].prediction();
                    if base.is_actionable_array() {
                        changed |= merge_prediction(graph, id, Prediction::INT32);
                    }
                }
            }

            Opcode::GetByIdFlush => {
                let heap = graph[id].heap_prediction;
                if heap.is_set() {
                    changed |= merge_prediction(graph, id, heap);
                }
            }

            Opcode::GetByVal => {
                let base = graph[graph[id].child1()].prediction();
                let heap = graph[id].heap_prediction;
                if base.is_uint32_array() || base.is_float32_array() || base.is_float64_array() {
                    changed |= merge_prediction(graph, id, Prediction::DOUBLE);
                } else if heap.is_set() {
                    changed |= merge_prediction(graph, id, heap);
                }
            }

            Opcode::GetPropertyStorage | Opcode::GetIndexedPropertyStorage => {
                changed |= set_prediction(graph, id, Prediction::OTHER);
            }

            Opcode::GetByOffset => {
                let heap = graph[id].heap_prediction;
                if heap.is_set() {
                    changed |= merge_prediction(graph, id, heap);
                }
            }

            Opcode::Call | Opcode::Construct => {
                let heap = graph[id].heap_prediction;
                if heap.is_set() {
                    changed |= merge_prediction(graph, id, heap);
                }
            }

            Opcode::ConvertThis => {
                let mut prediction = graph[graph[id].child1()].prediction();
                if prediction.is_set() {
                    if !(prediction & !Prediction::OBJECT).is_empty() {
                        prediction &= Prediction::OBJECT;
                        prediction |= Prediction::OBJECT_OTHER;
                    }
                    changed |= merge_prediction(graph, id, prediction);
                }
            }

            Opcode::GetGlobalVar => {
                let prediction = graph.global_var_prediction(graph[id].var_number());
                if prediction.is_set() {
                    changed |= merge_prediction(graph, id, prediction);
                }
            }

            Opcode::PutGlobalVar => {
                let var_number = graph[id].var_number();
                let source = graph[graph[id].child1()].prediction();
                changed |= graph.predict_global_var(var_number, source);
            }

            Opcode::GetScopedVar
            | Opcode::Resolve
            | Opcode::ResolveBase
            | Opcode::ResolveBaseStrictPut
            | Opcode::ResolveGlobal => {
                let heap = graph[id].heap_prediction;
                if heap.is_set() {
                    changed |= merge_prediction(graph, id, heap);
                }
            }

            Opcode::GetScopeChain => {
                changed |= set_prediction(graph, id, Prediction::CELL_OTHER);
            }

            Opcode::GetCallee => {
                changed |= set_prediction(graph, id, Prediction::FUNCTION);
            }

            Opcode::CreateThis | Opcode::NewObject => {
                changed |= set_prediction(graph, id, Prediction::FINAL_OBJECT);
            }

            Opcode::NewArray | Opcode::NewArrayBuffer => {
                changed |= set_prediction(graph, id, Prediction::ARRAY);
            }

            Opcode::NewRegexp => {
                changed |= set_prediction(graph, id, Prediction::OBJECT_OTHER);
            }

            Opcode::StringCharAt | Opcode::StrCat => {
                changed |= set_prediction(graph, id, Prediction::STRING);
            }

            Opcode::ToPrimitive => {
                let child = graph[graph[id].child1()].prediction();
                if child.is_set() {
                    if child.is_object() {
                        // A pure object coerces to a string; stripping
                        // the object bits here would leave bottom, which
                        // reads as "no information".
                        changed |= merge_prediction(graph, id, Prediction::STRING);
                    } else if child.intersects(Prediction::OBJECT) {
                        // Objects get turned into strings, so hints of
                        // objectness become hints of stringiness.
                        changed |= merge_prediction(
                            graph,
                            id,
                            (child & !Prediction::OBJECT) | Prediction::STRING,
                        );
                    } else {
                        changed |= merge_prediction(graph, id, child);
                    }
                }
            }

            Opcode::GetArrayLength
            | Opcode::GetStringLength
            | Opcode::GetByteArrayLength
            | Opcode::GetInt8ArrayLength
            | Opcode::GetInt16ArrayLength
            | Opcode::GetInt32ArrayLength
            | Opcode::GetUint8ArrayLength
            | Opcode::GetUint8ClampedArrayLength
            | Opcode::GetUint16ArrayLength
            | Opcode::GetUint32ArrayLength
            | Opcode::GetFloat32ArrayLength
            | Opcode::GetFloat64ArrayLength => {
                // These only exist after the fixup rewrite, which runs
                // after this phase.
                debug_assert!(false, "{:?} visible before fixup", op);
            }

            // No result to predict.
            Opcode::SetArgument
            | Opcode::Phi
            | Opcode::Flush
            | Opcode::PutScopedVar
            | Opcode::Jump
            | Opcode::Branch
            | Opcode::Breakpoint
            | Opcode::Return
            | Opcode::CheckHasInstance
            | Opcode::Throw
            | Opcode::ThrowReferenceError
            | Opcode::ForceOSRExit
            | Opcode::PutByVal
            | Opcode::PutByValAlias
            | Opcode::PutById
            | Opcode::PutByIdDirect
            | Opcode::CheckStructure
            | Opcode::CheckFunction
            | Opcode::PutStructure
            | Opcode::PutByOffset => {}

            // Nothing to do.
            Opcode::Phantom | Opcode::InlineStart | Opcode::Nop => {}
        }

        self.changed |= changed;
    }

    fn pass(&mut self, graph: &mut Graph, code_block: &CodeBlock, direction: Direction) {
        log::trace!("prediction pass ({:?})", direction);
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

    // =========================================================================
    // Double voting
    // =========================================================================

    /// Cast a ballot on the local underlying a child, looking through
    /// int conversions.
    fn vote_child(&mut self, graph: &mut Graph, child: NodeId, ballot: Ballot) {
        let mut target = child;
        if matches!(
            graph[target].op,
            Opcode::ValueToInt32 | Opcode::UInt32ToNumber
        ) {
            target = graph[target].child1();
        }
        if graph[target].op == Opcode::GetLocal {
            let variable = graph[target].variable();
            graph.variables.vote(variable, ballot);
        }
    }

    /// Cast a ballot on every child of a node.
    fn vote_children(&mut self, graph: &mut Graph, id: NodeId, ballot: Ballot) {
        if graph[id].has_var_args() {
            for child in graph.var_args_of(id) {
                self.vote_child(graph, child, ballot);
            }
            return;
        }
        let [child1, child2, child3] = *graph[id].fixed_children();
        if !child1.is_valid() {
            return;
        }
        self.vote_child(graph, child1, ballot);
        if !child2.is_valid() {
            return;
        }
        self.vote_child(graph, child2, ballot);
        if !child3.is_valid() {
            return;
        }
        self.vote_child(graph, child3, ballot);
    }

    fn double_voting_round(&mut self, graph: &mut Graph, code_block: &CodeBlock) {
        log::trace!("double voting round");
        graph.variables.clear_votes();

        let len = graph.len() as u32;
        for i in 0..len {
            let id = NodeId::new(i);
            if !graph[id].should_generate() {
                continue;
            }
            match graph[id].op {
                Opcode::ValueAdd | Opcode::ArithAdd | Opcode::ArithSub => {
                    let child1 = graph[id].child1();
                    let child2 = graph[id].child2();
                    let left = graph[child1].prediction();
                    let right = graph[child2].prediction();

                    let ballot = if left.is_number()
                        && right.is_number()
                        && !graph.add_should_speculate_integer(&graph[id], code_block)
                    {
                        Ballot::Double
                    } else {
                        Ballot::Value
                    };

                    self.vote_child(graph, child1, ballot);
                    self.vote_child(graph, child2, ballot);
                }

                Opcode::ArithMul
                | Opcode::ArithMin
                | Opcode::ArithMax
                | Opcode::ArithMod
                | Opcode::ArithDiv => {
                    let child1 = graph[id].child1();
                    let child2 = graph[id].child2();
                    let left = graph[child1].prediction();
                    let right = graph[child2].prediction();

                    let ballot = if left.is_number()
                        && right.is_number()
                        && !(graph[child1].should_speculate_integer()
                            && graph[child2].should_speculate_integer()
                            && graph[id].can_speculate_integer())
                    {
                        Ballot::Double
                    } else {
                        Ballot::Value
                    };

                    self.vote_child(graph, child1, ballot);
                    self.vote_child(graph, child2, ballot);
                }

                Opcode::ArithAbs => {
                    let child1 = graph[id].child1();
                    let ballot = if !(graph[child1].should_speculate_integer()
                        && graph[id].can_speculate_integer())
                    {
                        Ballot::Double
                    } else {
                        Ballot::Value
                    };
                    self.vote_child(graph, child1, ballot);
                }

                Opcode::ArithSqrt => {
                    let child1 = graph[id].child1();
                    self.vote_child(graph, child1, Ballot::Double);
                }

                Opcode::SetLocal => {
                    let prediction = graph[graph[id].child1()].prediction();
                    let variable = graph[id].variable();
                    if prediction.is_double() {
                        graph.variables.vote(variable, Ballot::Double);
                    } else if !prediction.is_number() || prediction.is_int32() {
                        graph.variables.vote(variable, Ballot::Value);
                    }
                }

                _ => {
                    self.vote_children(graph, id, Ballot::Value);
                }
            }
        }

        self.changed |= graph.variables.tally_votes();
    }
}

impl Phase for PredictionPropagation {
    fn name(&self) -> &'static str {
        "predictions"
    }

    fn run(&mut self, graph: &mut Graph, code_block: &mut CodeBlock) -> bool {
        let mut any = false;

        // Stage one: plain propagation to quiescence.
        loop {
            self.changed = false;
            self.pass(graph, code_block, Direction::Forward);
            any |= self.changed;
            if !self.changed {
                break;
            }
            self.changed = false;
            self.pass(graph, code_block, Direction::Backward);
            any |= self.changed;
            if !self.changed {
                break;
            }
        }

        // Stage two: voting interleaved with propagation, until neither
        // flips a format decision nor grows a prediction.
        loop {
            self.changed = false;
            self.double_voting_round(graph, code_block);
            self.pass(graph, code_block, Direction::Forward);
            any |= self.changed;
            if !self.changed {
                break;
            }
            self.changed = false;
            self.double_voting_round(graph, code_block);
            self.pass(graph, code_block, Direction::Backward);
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
    use crate::opt::arith_flags::ArithFlagPropagation;
    use vesper_core::ConstantValue;

    fn constant(graph: &mut Graph, code_block: &mut CodeBlock, value: ConstantValue) -> NodeId {
        let index = code_block.add_constant(value);
        graph.add_node(Opcode::JSConstant, Children::none(), Payload::Constant(index))
    }

    fn run_flags_then_predictions(graph: &mut Graph, code_block: &mut CodeBlock) {
        ArithFlagPropagation::new().run(graph, code_block);
        PredictionPropagation::new().run(graph, code_block);
    }

    #[test]
    fn test_constant_add_predicts_int32() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let a = constant(&mut graph, &mut code_block, ConstantValue::Int32(3));
        let b = constant(&mut graph, &mut code_block, ConstantValue::Int32(4));
        let add = graph.add_node(Opcode::ArithAdd, Children::two(a, b), Payload::None);
        graph.add_node(Opcode::Return, Children::one(add), Payload::None);

        run_flags_then_predictions(&mut graph, &mut code_block);

        assert_eq!(graph[a].prediction(), Prediction::INT32);
        assert_eq!(graph[add].prediction(), Prediction::INT32);
    }

    #[test]
    fn test_add_with_double_operand_predicts_double() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let a = constant(&mut graph, &mut code_block, ConstantValue::Int32(3));
        let b = constant(&mut graph, &mut code_block, ConstantValue::Double(0.5));
        let add = graph.add_node(Opcode::ArithAdd, Children::two(a, b), Payload::None);
        graph.add_node(Opcode::Return, Children::one(add), Payload::None);

        run_flags_then_predictions(&mut graph, &mut code_block);
        assert_eq!(graph[add].prediction(), Prediction::DOUBLE);
    }

    #[test]
    fn test_value_add_with_string_operand_predicts_string() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let a = constant(&mut graph, &mut code_block, ConstantValue::Int32(3));
        let b = constant(&mut graph, &mut code_block, ConstantValue::string("x"));
        let add = graph.add_node(Opcode::ValueAdd, Children::two(a, b), Payload::None);
        graph.add_node(Opcode::Return, Children::one(add), Payload::None);

        run_flags_then_predictions(&mut graph, &mut code_block);
        assert_eq!(graph[add].prediction(), Prediction::STRING);
    }

    #[test]
    fn test_overflow_feedback_demotes_add_to_double() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let a = constant(&mut graph, &mut code_block, ConstantValue::Int32(3));
        let b = constant(&mut graph, &mut code_block, ConstantValue::Int32(4));
        let add = graph.add_node(Opcode::ArithAdd, Children::two(a, b), Payload::None);
        graph[add].merge_arith_flags(crate::ir::flags::ArithFlags::MAY_OVERFLOW);
        graph.add_node(Opcode::Return, Children::one(add), Payload::None);

        run_flags_then_predictions(&mut graph, &mut code_block);
        assert_eq!(graph[add].prediction(), Prediction::DOUBLE);
    }

    #[test]
    fn test_comparisons_predict_boolean() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let a = constant(&mut graph, &mut code_block, ConstantValue::Int32(1));
        let b = constant(&mut graph, &mut code_block, ConstantValue::Int32(2));
        let less = graph.add_node(Opcode::CompareLess, Children::two(a, b), Payload::None);
        let not = graph.add_node(Opcode::LogicalNot, Children::one(less), Payload::None);
        graph.add_node(Opcode::Return, Children::one(not), Payload::None);

        run_flags_then_predictions(&mut graph, &mut code_block);
        assert_eq!(graph[less].prediction(), Prediction::BOOLEAN);
        assert_eq!(graph[not].prediction(), Prediction::BOOLEAN);
    }

    #[test]
    fn test_get_by_id_length_on_array_infers_int32() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let length = code_block.intern_identifier("length");

        let array = graph.add_node(Opcode::NewArray, Children::var_args(0, 0), Payload::None);
        let get = graph.add_node(
            Opcode::GetById,
            Children::one(array),
            Payload::Identifier(length),
        );
        graph.add_node(Opcode::Return, Children::one(get), Payload::None);

        run_flags_then_predictions(&mut graph, &mut code_block);
        assert_eq!(graph[get].prediction(), Prediction::INT32);
    }

    #[test]
    fn test_heap_prediction_seeds_get_by_id() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let name = code_block.intern_identifier("f");

        let object = graph.add_node(Opcode::NewObject, Children::none(), Payload::None);
        let get = graph.add_node(
            Opcode::GetById,
            Children::one(object),
            Payload::Identifier(name),
        );
        graph[get].heap_prediction = Prediction::FUNCTION;
        graph.add_node(Opcode::Return, Children::one(get), Payload::None);

        run_flags_then_predictions(&mut graph, &mut code_block);
        assert_eq!(graph[get].prediction(), Prediction::FUNCTION);
    }

    #[test]
    fn test_to_primitive_strips_object_bits() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);

        let object = graph.add_node(Opcode::NewObject, Children::none(), Payload::None);
        let prim = graph.add_node(Opcode::ToPrimitive, Children::one(object), Payload::None);
        graph.add_node(Opcode::Return, Children::one(prim), Payload::None);

        run_flags_then_predictions(&mut graph, &mut code_block);
        assert_eq!(graph[prim].prediction(), Prediction::STRING);
    }

    #[test]
    fn test_locals_carry_predictions_through_variables() {
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let var = graph.variables.add(0);

        let c = constant(&mut graph, &mut code_block, ConstantValue::Int32(1));
        graph.add_node(Opcode::SetLocal, Children::one(c), Payload::Variable(var));
        let get = graph.add_node(Opcode::GetLocal, Children::none(), Payload::Variable(var));
        graph.add_node(Opcode::Return, Children::one(get), Payload::None);

        run_flags_then_predictions(&mut graph, &mut code_block);
        assert_eq!(graph.variables.prediction(var), Prediction::INT32);
        assert_eq!(graph[get].prediction(), Prediction::INT32);
    }

    #[test]
    fn test_sqrt_votes_flip_local_to_double() {
        // localX sees integer writes, but its only arithmetic uses are
        // double-producing: the tally must flip it and the follow-up
        // propagation must widen everything derived from it.
        let mut graph = Graph::new(0, 1);
        let mut code_block = CodeBlock::new(0);
        let var = graph.variables.add(0);

        let c = constant(&mut graph, &mut code_block, ConstantValue::Int32(9));
        graph.add_node(Opcode::SetLocal, Children::one(c), Payload::Variable(var));

        let get1 = graph.add_node(Opcode::GetLocal, Children::none(), Payload::Variable(var));
        let sqrt = graph.add_node(Opcode::ArithSqrt, Children::one(get1), Payload::None);

        let get2 = graph.add_node(Opcode::GetLocal, Children::none(), Payload::Variable(var));
        let half = constant(&mut graph, &mut code_block, ConstantValue::Double(2.0));
        let mul = graph.add_node(Opcode::ArithMul, Children::two(get2, half), Payload::None);

        let sum = graph.add_node(Opcode::ArithAdd, Children::two(sqrt, mul), Payload::None);
        graph.add_node(Opcode::Return, Children::one(sum), Payload::None);

        run_flags_then_predictions(&mut graph, &mut code_block);

        assert!(graph.variables.should_use_double_format(var));
        assert!(graph
            .variables
            .prediction(var)
            .contains(Prediction::DOUBLE));
        assert!(graph[get1].prediction().contains(Prediction::DOUBLE));
    }
}
