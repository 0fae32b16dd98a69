//! Local common-subexpression elimination.
//!
//! CSE runs independently over each block. A replacement table records
//! which node supplants which; a last-seen table bounds the pure scan to
//! the most recent occurrence of the same opcode; and a lookback cap
//! keeps the whole pass linear in block length.
//!
//! Heap loads are eliminated by specialized backward scans that know
//! which stores can interfere, under the clobbers-world discipline: any
//! opcode that may run arbitrary code invalidates every hypothesis.

use super::Phase;
use crate::code_block::CodeBlock;
use crate::ir::arena::SecondaryMap;
use crate::ir::graph::Graph;
use crate::ir::node::{Node, NodeId};
use crate::ir::opcode::Opcode;
use crate::ir::prediction::Prediction;
use crate::ir::structure::StructureSet;

/// Default lookback cap, in nodes.
pub const DEFAULT_LOOKBACK_LIMIT: u32 = 300;

/// The local CSE phase.
pub struct LocalCse {
    replacements: SecondaryMap<Node, NodeId>,
    last_seen: [NodeId; Opcode::COUNT],
    lookback_limit: u32,
    block_start: u32,
    changed: bool,
}

// =============================================================================
// Conditional purity
// =============================================================================

fn is_predicted_numerical(graph: &Graph, node: &Node) -> bool {
    let left = graph[node.child1()].prediction();
    let right = graph[node.child2()].prediction();
    left.is_number() && right.is_number()
}

fn logical_not_is_pure(graph: &Graph, node: &Node) -> bool {
    let prediction = graph[node.child1()].prediction();
    prediction.is_boolean() || !prediction.is_set()
}

fn by_val_is_pure(graph: &Graph, node: &Node) -> bool {
    if !graph[node.child2()].should_speculate_integer() {
        return false;
    }
    let base = graph[node.child1()].prediction();
    if matches!(node.op, Opcode::PutByVal | Opcode::PutByValAlias) {
        base.is_actionable_mutable_array()
    } else {
        base.is_actionable_array()
    }
}

impl LocalCse {
    /// Create the phase with the given lookback cap.
    pub fn new(lookback_limit: u32) -> Self {
        LocalCse {
            replacements: SecondaryMap::new(),
            last_seen: [NodeId::INVALID; Opcode::COUNT],
            lookback_limit,
            block_start: 0,
            changed: false,
        }
    }

    /// The replacement table: for each phantomized node, the node that
    /// supplants it. Downstream consumers of child references must
    /// consult this.
    pub fn replacements(&self) -> &SecondaryMap<Node, NodeId> {
        &self.replacements
    }

    // =========================================================================
    // Keys and windows
    // =========================================================================

    /// Canonical producer of a child: a `ValueToInt32` wrapper compares
    /// equal to what it wraps.
    fn canonicalize(&self, graph: &Graph, id: NodeId) -> NodeId {
        if !id.is_valid() {
            return id;
        }
        if graph[id].op == Opcode::ValueToInt32 {
            return graph[id].child1();
        }
        id
    }

    /// Where a backward scan stops: the block start, capped by the
    /// lookback limit, raised past the candidate's own children (nothing
    /// before a child can match on it).
    fn start_index_for_children(
        &self,
        graph: &Graph,
        current: u32,
        children: [NodeId; 3],
    ) -> u32 {
        let mut start = self.block_start;
        if current - start > self.lookback_limit {
            start = current - self.lookback_limit;
        }
        debug_assert!(start >= self.block_start);

        for child in children {
            let child = self.canonicalize(graph, child);
            if !child.is_valid() {
                return start;
            }
            if start < child.index() {
                start = child.index();
            }
        }
        start
    }

    fn start_index(&self, graph: &Graph, current: u32) -> u32 {
        let node = &graph[NodeId::new(current)];
        self.start_index_for_children(graph, current, *node.fixed_children())
    }

    /// Upper bound of the pure scan: one past the most recent node with
    /// the same opcode identity.
    fn end_index_for_pure_cse(&self, current: u32, op: Opcode) -> u32 {
        let last = self.last_seen[op.id()];
        let end = if last.is_valid() { last.index() + 1 } else { 0 };
        debug_assert!(end <= current);
        end
    }

    // =========================================================================
    // Pure and impure scans
    // =========================================================================

    fn pure_cse(&self, graph: &Graph, current: u32) -> NodeId {
        let node = &graph[NodeId::new(current)];
        let child1 = self.canonicalize(graph, node.child1());
        let child2 = self.canonicalize(graph, node.child2());
        let child3 = self.canonicalize(graph, node.child3());

        let start = self.start_index(graph, current);
        let end = self.end_index_for_pure_cse(current, node.op);
        for index in (start..end).rev() {
            let other_id = NodeId::new(index);
            let other = &graph[other_id];
            if node.op != other.op {
                continue;
            }
            if node.arith_flags_for_compare() != other.arith_flags_for_compare() {
                continue;
            }

            let other_child = self.canonicalize(graph, other.child1());
            if !other_child.is_valid() {
                return other_id;
            }
            if other_child != child1 {
                continue;
            }

            let other_child = self.canonicalize(graph, other.child2());
            if !other_child.is_valid() {
                return other_id;
            }
            if other_child != child2 {
                continue;
            }

            let other_child = self.canonicalize(graph, other.child3());
            if !other_child.is_valid() {
                return other_id;
            }
            if other_child != child3 {
                continue;
            }

            return other_id;
        }
        NodeId::INVALID
    }

    fn impure_cse(&self, graph: &Graph, current: u32) -> NodeId {
        let node = &graph[NodeId::new(current)];
        let child1 = self.canonicalize(graph, node.child1());
        let child2 = self.canonicalize(graph, node.child2());
        let child3 = self.canonicalize(graph, node.child3());

        let start = self.start_index(graph, current);
        for index in (start..current).rev() {
            let other_id = NodeId::new(index);
            let other = &graph[other_id];
            if node.op == other.op
                && node.arith_flags_for_compare() == other.arith_flags_for_compare()
            {
                let other_child = self.canonicalize(graph, other.child1());
                if !other_child.is_valid() {
                    return other_id;
                }
                if other_child == child1 {
                    let other_child = self.canonicalize(graph, other.child2());
                    if !other_child.is_valid() {
                        return other_id;
                    }
                    if other_child == child2 {
                        let other_child = self.canonicalize(graph, other.child3());
                        if !other_child.is_valid() {
                            return other_id;
                        }
                        if other_child == child3 {
                            return other_id;
                        }
                    }
                }
            }
            if self.clobbers_world(graph, other_id) {
                break;
            }
        }
        NodeId::INVALID
    }

    fn clobbers_world(&self, graph: &Graph, id: NodeId) -> bool {
        let node = &graph[id];
        if node.op.always_clobbers_world() {
            return true;
        }
        if !node.op.might_clobber() {
            return false;
        }
        match node.op {
            Opcode::ValueAdd
            | Opcode::CompareLess
            | Opcode::CompareLessEq
            | Opcode::CompareGreater
            | Opcode::CompareGreaterEq
            | Opcode::CompareEq => !is_predicted_numerical(graph, node),
            Opcode::LogicalNot => !logical_not_is_pure(graph, node),
            Opcode::GetByVal => !by_val_is_pure(graph, node),
            _ => {
                debug_assert!(false, "unhandled might-clobber opcode {:?}", node.op);
                // Safer for CSE to assume the worst.
                true
            }
        }
    }

    // =========================================================================
    // Load elimination
    // =========================================================================

    fn global_var_load_elimination(
        &self,
        graph: &Graph,
        code_block: &CodeBlock,
        current: u32,
        var_number: u32,
        global: crate::code_block::GlobalObjectId,
    ) -> NodeId {
        let start = self.start_index_for_children(graph, current, [NodeId::INVALID; 3]);
        for index in (start..current).rev() {
            let id = NodeId::new(index);
            let node = &graph[id];
            match node.op {
                Opcode::GetGlobalVar => {
                    if node.var_number() == var_number
                        && code_block.global_object_for(node.code_origin) == global
                    {
                        return id;
                    }
                }
                Opcode::PutGlobalVar => {
                    if node.var_number() == var_number
                        && code_block.global_object_for(node.code_origin) == global
                    {
                        return node.child1();
                    }
                }
                _ => {}
            }
            if self.clobbers_world(graph, id) {
                break;
            }
        }
        NodeId::INVALID
    }

    fn get_by_val_load_elimination(
        &self,
        graph: &Graph,
        current: u32,
        child1: NodeId,
        child2: NodeId,
    ) -> NodeId {
        let start =
            self.start_index_for_children(graph, current, [child1, child2, NodeId::INVALID]);
        for index in (start..current).rev() {
            let id = NodeId::new(index);
            let node = &graph[id];
            match node.op {
                Opcode::GetByVal => {
                    if !by_val_is_pure(graph, node) {
                        return NodeId::INVALID;
                    }
                    if node.child1() == child1
                        && self.canonicalize(graph, node.child2())
                            == self.canonicalize(graph, child2)
                    {
                        return id;
                    }
                }
                Opcode::PutByVal | Opcode::PutByValAlias => {
                    if !by_val_is_pure(graph, node) {
                        return NodeId::INVALID;
                    }
                    if node.child1() == child1
                        && self.canonicalize(graph, node.child2())
                            == self.canonicalize(graph, child2)
                    {
                        return node.child3();
                    }
                    // A store to the same base with another index must be
                    // assumed to clobber the location we read from.
                    return NodeId::INVALID;
                }
                // Integer-speculated indexed access cannot be affected by
                // a structure change or a put to named property storage.
                Opcode::PutStructure | Opcode::PutByOffset => {}
                // A push cannot affect elements that already exist.
                Opcode::ArrayPush => {}
                _ => {
                    if self.clobbers_world(graph, id) {
                        return NodeId::INVALID;
                    }
                }
            }
        }
        NodeId::INVALID
    }

    fn check_function_elimination(
        &self,
        graph: &Graph,
        current: u32,
        function: crate::code_block::FunctionId,
        child1: NodeId,
    ) -> bool {
        let start =
            self.start_index_for_children(graph, current, [child1, NodeId::INVALID, NodeId::INVALID]);
        let end = self.end_index_for_pure_cse(current, Opcode::CheckFunction);
        for index in (start..end).rev() {
            let node = &graph[NodeId::new(index)];
            if node.op == Opcode::CheckFunction
                && node.child1() == child1
                && node.function() == function
            {
                return true;
            }
        }
        false
    }

    fn check_structure_load_elimination(
        &self,
        graph: &Graph,
        current: u32,
        structure_set: &StructureSet,
        child1: NodeId,
    ) -> bool {
        let start =
            self.start_index_for_children(graph, current, [child1, NodeId::INVALID, NodeId::INVALID]);
        for index in (start..current).rev() {
            let id = NodeId::new(index);
            let node = &graph[id];
            match node.op {
                Opcode::CheckStructure => {
                    // An earlier check against a subset already proved
                    // membership in our set.
                    if node.child1() == child1 && structure_set.is_superset_of(node.structure_set())
                    {
                        return true;
                    }
                }
                Opcode::PutStructure => {
                    let transition = node.structure_transition();
                    if node.child1() == child1 && structure_set.contains(transition.new) {
                        return true;
                    }
                    if structure_set.contains(transition.previous) {
                        return false;
                    }
                }
                // Setting a property cannot change the structure.
                Opcode::PutByOffset => {}
                Opcode::PutByVal | Opcode::PutByValAlias => {
                    if !by_val_is_pure(graph, node) {
                        return false;
                    }
                }
                _ => {
                    if self.clobbers_world(graph, id) {
                        return false;
                    }
                }
            }
        }
        false
    }

    fn get_by_offset_load_elimination(
        &self,
        graph: &Graph,
        current: u32,
        identifier_number: u32,
        child1: NodeId,
    ) -> NodeId {
        let start =
            self.start_index_for_children(graph, current, [child1, NodeId::INVALID, NodeId::INVALID]);
        for index in (start..current).rev() {
            let id = NodeId::new(index);
            let node = &graph[id];
            match node.op {
                Opcode::GetByOffset => {
                    if node.child1() == child1
                        && graph.storage_accesses[node.storage_access_index() as usize]
                            .identifier_number
                            == identifier_number
                    {
                        return id;
                    }
                }
                Opcode::PutByOffset => {
                    if graph.storage_accesses[node.storage_access_index() as usize]
                        .identifier_number
                        == identifier_number
                    {
                        if node.child2() == child1 {
                            return node.child3();
                        }
                        return NodeId::INVALID;
                    }
                }
                // Changing the structure cannot change the outcome of a
                // property get.
                Opcode::PutStructure => {}
                Opcode::PutByVal | Opcode::PutByValAlias => {
                    if !by_val_is_pure(graph, node) {
                        return NodeId::INVALID;
                    }
                }
                _ => {
                    if self.clobbers_world(graph, id) {
                        return NodeId::INVALID;
                    }
                }
            }
        }
        NodeId::INVALID
    }

    fn get_property_storage_load_elimination(
        &self,
        graph: &Graph,
        current: u32,
        child1: NodeId,
    ) -> NodeId {
        let start =
            self.start_index_for_children(graph, current, [child1, NodeId::INVALID, NodeId::INVALID]);
        for index in (start..current).rev() {
            let id = NodeId::new(index);
            let node = &graph[id];
            match node.op {
                Opcode::GetPropertyStorage => {
                    if node.child1() == child1 {
                        return id;
                    }
                }
                // Neither a structure change nor a put to the storage can
                // move the storage pointer.
                Opcode::PutByOffset | Opcode::PutStructure => {}
                Opcode::PutByVal | Opcode::PutByValAlias => {
                    if !by_val_is_pure(graph, node) {
                        return NodeId::INVALID;
                    }
                }
                _ => {
                    if self.clobbers_world(graph, id) {
                        return NodeId::INVALID;
                    }
                }
            }
        }
        NodeId::INVALID
    }

    fn get_indexed_property_storage_load_elimination(
        &self,
        graph: &Graph,
        current: u32,
        child1: NodeId,
        has_integer_index_prediction: bool,
    ) -> NodeId {
        let start =
            self.start_index_for_children(graph, current, [child1, NodeId::INVALID, NodeId::INVALID]);
        for index in (start..current).rev() {
            let id = NodeId::new(index);
            let node = &graph[id];
            match node.op {
                Opcode::GetIndexedPropertyStorage => {
                    let index_prediction = graph[node.child2()].prediction();
                    let node_has_integer_index_prediction =
                        !(!index_prediction.intersects(Prediction::INT32)
                            && index_prediction.is_set());
                    if node.child1() == child1
                        && has_integer_index_prediction == node_has_integer_index_prediction
                    {
                        return id;
                    }
                }
                Opcode::PutByOffset | Opcode::PutStructure => {}
                // An aliased store cannot move the indexed storage.
                Opcode::PutByValAlias => {}
                Opcode::PutByVal => {
                    let base = graph[node.child1()].prediction();
                    if base.is_fixed_indexed_storage_object() && by_val_is_pure(graph, node) {
                        continue;
                    }
                    return NodeId::INVALID;
                }
                _ => {
                    if self.clobbers_world(graph, id) {
                        return NodeId::INVALID;
                    }
                }
            }
        }
        NodeId::INVALID
    }

    fn get_scope_chain_load_elimination(&self, graph: &Graph, current: u32, depth: u32) -> NodeId {
        let start = self.start_index_for_children(graph, current, [NodeId::INVALID; 3]);
        let end = self.end_index_for_pure_cse(current, Opcode::GetScopeChain);
        for index in (start..end).rev() {
            let id = NodeId::new(index);
            let node = &graph[id];
            if node.op == Opcode::GetScopeChain && node.scope_chain_depth() == depth {
                return id;
            }
        }
        NodeId::INVALID
    }

    // =========================================================================
    // Replacement
    // =========================================================================

    fn substitute(&self, graph: &mut Graph, child: NodeId, add_ref: bool) -> NodeId {
        if !child.is_valid() {
            return child;
        }
        let replacement = self.replacements[child];
        if !replacement.is_valid() {
            return child;
        }
        // Replacement chains are one level deep: a replacement is never
        // itself replaced.
        debug_assert!(!self.replacements[replacement].is_valid());
        if add_ref {
            graph[replacement].add_ref();
        }
        replacement
    }

    fn set_replacement(&mut self, graph: &mut Graph, current: u32, replacement: NodeId) {
        if !replacement.is_valid() {
            return;
        }

        let id = NodeId::new(current);
        // Don't perform replacements if the predictions don't agree; the
        // back-end speculates on them.
        if graph[id].prediction() != graph[replacement].prediction() {
            return;
        }

        log::trace!("cse: {} -> {}", id, replacement);
        graph[id].op = Opcode::Phantom;
        graph[id].set_ref_count(1);
        self.replacements.set(id, replacement);
        self.changed = true;
    }

    fn eliminate(&mut self, graph: &mut Graph, current: u32) {
        let id = NodeId::new(current);
        debug_assert!(graph[id].ref_count() == 1);
        debug_assert!(graph[id].must_generate());
        log::trace!("cse: eliminating {}", id);
        graph[id].op = Opcode::Phantom;
        self.changed = true;
    }

    // =========================================================================
    // Per-node driver
    // =========================================================================

    fn perform_node_cse(&mut self, graph: &mut Graph, code_block: &CodeBlock, current: u32) {
        let id = NodeId::new(current);
        let should_generate = graph[id].should_generate();

        // Route this node's own children through the replacement table
        // before using them as CSE keys.
        if graph[id].has_var_args() {
            let (first, count) = graph[id].var_arg_range();
            for i in first..first + count {
                let child = graph.var_arg_children[i as usize];
                let substituted = self.substitute(graph, child, should_generate);
                graph.var_arg_children[i as usize] = substituted;
            }
        } else {
            for slot in 0..3 {
                let child = graph[id].fixed_children()[slot];
                let substituted = self.substitute(graph, child, should_generate);
                if substituted != child {
                    graph[id].fixed_children_mut()[slot] = substituted;
                }
            }
        }

        if !should_generate {
            return;
        }

        // Some nodes are deliberately not considered even though they
        // could be (StrCat, ToPrimitive): there is no evidence that
        // CSE on them wins anything.
        match graph[id].op {
            // Pure nodes: no side effects, keyed on opcode, flags, and
            // canonicalized children.
            Opcode::BitAnd
            | Opcode::BitOr
            | Opcode::BitXor
            | Opcode::BitRShift
            | Opcode::BitLShift
            | Opcode::BitURShift
            | Opcode::ArithAdd
            | Opcode::ArithSub
            | Opcode::ArithMul
            | Opcode::ArithMod
            | Opcode::ArithDiv
            | Opcode::ArithAbs
            | Opcode::ArithMin
            | Opcode::ArithMax
            | Opcode::ArithSqrt
            | Opcode::GetByteArrayLength
            | Opcode::GetInt8ArrayLength
            | Opcode::GetInt16ArrayLength
            | Opcode::GetInt32ArrayLength
            | Opcode::GetUint8ArrayLength
            | Opcode::GetUint8ClampedArrayLength
            | Opcode::GetUint16ArrayLength
            | Opcode::GetUint32ArrayLength
            | Opcode::GetFloat32ArrayLength
            | Opcode::GetFloat64ArrayLength
            | Opcode::GetCallee
            | Opcode::GetStringLength
            | Opcode::StringCharAt
            | Opcode::StringCharCodeAt => {
                let replacement = self.pure_cse(graph, current);
                self.set_replacement(graph, current, replacement);
            }

            // Array length is mutable state: the scan must not cross a
            // world clobber.
            Opcode::GetArrayLength => {
                let replacement = self.impure_cse(graph, current);
                self.set_replacement(graph, current, replacement);
            }

            Opcode::GetScopeChain => {
                let depth = graph[id].scope_chain_depth();
                let replacement = self.get_scope_chain_load_elimination(graph, current, depth);
                self.set_replacement(graph, current, replacement);
            }

            // Conditionally pure: only when the predictions make the
            // generic path unreachable.
            Opcode::ValueAdd
            | Opcode::CompareLess
            | Opcode::CompareLessEq
            | Opcode::CompareGreater
            | Opcode::CompareGreaterEq
            | Opcode::CompareEq => {
                if is_predicted_numerical(graph, &graph[id]) {
                    let replacement = self.pure_cse(graph, current);
                    if replacement.is_valid()
                        && is_predicted_numerical(graph, &graph[replacement])
                    {
                        self.set_replacement(graph, current, replacement);
                    }
                }
            }

            Opcode::LogicalNot => {
                if logical_not_is_pure(graph, &graph[id]) {
                    let replacement = self.pure_cse(graph, current);
                    if replacement.is_valid() && logical_not_is_pure(graph, &graph[replacement]) {
                        self.set_replacement(graph, current, replacement);
                    }
                }
            }

            // Heap accesses: not pure, but eliminable under the scans'
            // interference rules.
            Opcode::GetGlobalVar => {
                let var_number = graph[id].var_number();
                let global = code_block.global_object_for(graph[id].code_origin);
                let replacement =
                    self.global_var_load_elimination(graph, code_block, current, var_number, global);
                self.set_replacement(graph, current, replacement);
            }

            Opcode::GetByVal => {
                if by_val_is_pure(graph, &graph[id]) {
                    let child1 = graph[id].child1();
                    let child2 = graph[id].child2();
                    let replacement =
                        self.get_by_val_load_elimination(graph, current, child1, child2);
                    self.set_replacement(graph, current, replacement);
                }
            }

            Opcode::PutByVal => {
                if by_val_is_pure(graph, &graph[id]) {
                    let child1 = graph[id].child1();
                    let child2 = graph[id].child2();
                    if self
                        .get_by_val_load_elimination(graph, current, child1, child2)
                        .is_valid()
                    {
                        // The location provably exists; the barrier form
                        // is not needed.
                        log::trace!("cse: {} PutByVal -> PutByValAlias", id);
                        graph[id].op = Opcode::PutByValAlias;
                        self.changed = true;
                    }
                }
            }

            Opcode::CheckStructure => {
                let child1 = graph[id].child1();
                let redundant = {
                    let set = graph[id].structure_set();
                    self.check_structure_load_elimination(graph, current, set, child1)
                };
                if redundant {
                    self.eliminate(graph, current);
                }
            }

            Opcode::CheckFunction => {
                let child1 = graph[id].child1();
                let function = graph[id].function();
                if self.check_function_elimination(graph, current, function, child1) {
                    self.eliminate(graph, current);
                }
            }

            Opcode::GetIndexedPropertyStorage => {
                let child1 = graph[id].child1();
                let index_prediction = graph[graph[id].child2()].prediction();
                let has_integer_index_prediction =
                    !(!index_prediction.intersects(Prediction::INT32) && index_prediction.is_set());
                let replacement = self.get_indexed_property_storage_load_elimination(
                    graph,
                    current,
                    child1,
                    has_integer_index_prediction,
                );
                self.set_replacement(graph, current, replacement);
            }

            Opcode::GetPropertyStorage => {
                let child1 = graph[id].child1();
                let replacement = self.get_property_storage_load_elimination(graph, current, child1);
                self.set_replacement(graph, current, replacement);
            }

            Opcode::GetByOffset => {
                let child1 = graph[id].child1();
                let identifier_number = graph.storage_accesses
                    [graph[id].storage_access_index() as usize]
                    .identifier_number;
                let replacement =
                    self.get_by_offset_load_elimination(graph, current, identifier_number, child1);
                self.set_replacement(graph, current, replacement);
            }

            _ => {}
        }

        // Note the post-rewrite opcode: a phantomized node no longer
        // participates in its original opcode's pure window.
        self.last_seen[graph[id].op.id()] = id;
    }

    fn perform_block_cse(&mut self, graph: &mut Graph, code_block: &CodeBlock, begin: u32, end: u32) {
        self.block_start = begin;
        for current in begin..end {
            self.perform_node_cse(graph, code_block, current);
        }
    }
}

impl Phase for LocalCse {
    fn name(&self) -> &'static str {
        "local-cse"
    }

    fn run(&mut self, graph: &mut Graph, code_block: &mut CodeBlock) -> bool {
        self.changed = false;
        self.replacements = SecondaryMap::with_len(graph.len());
        let ranges: Vec<(u32, u32)> = graph
            .blocks
            .iter()
            .map(|(_, block)| (block.begin, block.end))
            .collect();
        for (begin, end) in ranges {
            self.perform_block_cse(graph, code_block, begin, end);
        }
        self.changed
    }
}

// =============================================================================
// Tests
// =============================================================================
