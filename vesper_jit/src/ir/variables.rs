//! Variable-access groups.
//!
//! After inlining, several `GetLocal`/`SetLocal` nodes may describe the
//! same logical local. A union-find groups them; the group root carries
//! the accumulated prediction, the double-format vote counters, and the
//! format decision itself. Callers must resolve through `find` before
//! reading or voting; the tree is compressed lazily on lookup.

use super::arena::{Arena, Id};
use super::prediction::Prediction;

/// A variable-access group reference.
pub type VariableId = Id<VariableAccessData>;

/// A vote on how a local should be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ballot {
    /// Keep the local in the generic boxed format.
    Value = 0,
    /// Keep the local in double format.
    Double = 1,
}

/// Per-group metadata for one logical local.
#[derive(Debug, Clone)]
pub struct VariableAccessData {
    parent: VariableId,
    rank: u32,
    operand: u32,
    prediction: Prediction,
    votes: [u32; 2],
    double_format: bool,
}

/// The union-find over variable-access groups.
#[derive(Debug, Clone, Default)]
pub struct VariableSet {
    data: Arena<VariableAccessData>,
}

impl VariableSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fresh singleton group for the given operand slot.
    pub fn add(&mut self, operand: u32) -> VariableId {
        let id = VariableId::new(self.data.len() as u32);
        self.data.alloc(VariableAccessData {
            parent: id,
            rank: 0,
            operand,
            prediction: Prediction::empty(),
            votes: [0, 0],
            double_format: false,
        });
        id
    }

    /// Number of groups (including non-roots).
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All group IDs.
    pub fn ids(&self) -> impl Iterator<Item = VariableId> {
        self.data.ids()
    }

    /// Resolve a group to its root, compressing the path walked.
    pub fn find(&mut self, id: VariableId) -> VariableId {
        let parent = self.data[id].parent;
        if parent == id {
            return id;
        }
        let root = self.find(parent);
        self.data[id].parent = root;
        root
    }

    /// Merge two groups, joining their predictions. Returns the new root.
    pub fn union(&mut self, a: VariableId, b: VariableId) -> VariableId {
        let a = self.find(a);
        let b = self.find(b);
        if a == b {
            return a;
        }
        let (root, child) = if self.data[a].rank >= self.data[b].rank {
            (a, b)
        } else {
            (b, a)
        };
        if self.data[a].rank == self.data[b].rank {
            self.data[root].rank += 1;
        }
        self.data[child].parent = root;
        let child_prediction = self.data[child].prediction;
        let child_double = self.data[child].double_format;
        self.data[root].prediction.merge(child_prediction);
        self.data[root].double_format |= child_double;
        root
    }

    /// The operand slot a group describes.
    pub fn operand(&mut self, id: VariableId) -> u32 {
        let root = self.find(id);
        self.data[root].operand
    }

    /// Read-only root resolution for contexts that hold a shared borrow.
    /// Walks without compressing.
    pub fn operand_of(&self, id: VariableId) -> u32 {
        let mut id = id;
        while self.data[id].parent != id {
            id = self.data[id].parent;
        }
        self.data[id].operand
    }

    /// The accumulated prediction of a group.
    pub fn prediction(&mut self, id: VariableId) -> Prediction {
        let root = self.find(id);
        self.data[root].prediction
    }

    /// Join a prediction into a group; returns whether it grew.
    pub fn predict(&mut self, id: VariableId, prediction: Prediction) -> bool {
        let root = self.find(id);
        self.data[root].prediction.merge(prediction)
    }

    /// The current format decision of a group.
    pub fn should_use_double_format(&mut self, id: VariableId) -> bool {
        let root = self.find(id);
        self.data[root].double_format
    }

    /// Cast a ballot on a group's format.
    pub fn vote(&mut self, id: VariableId, ballot: Ballot) {
        let root = self.find(id);
        self.data[root].votes[ballot as usize] += 1;
    }

    /// Reset every group's ballot box.
    pub fn clear_votes(&mut self) {
        for id in 0..self.data.len() as u32 {
            self.data[VariableId::new(id)].votes = [0, 0];
        }
    }

    /// Tally the votes of every root group.
    ///
    /// A group flips to double format when double votes outnumber value
    /// votes. Flipping to double joins `DOUBLE` into the group's
    /// prediction so the next propagation round can observe the new
    /// representation. Returns whether any decision changed.
    pub fn tally_votes(&mut self) -> bool {
        let mut changed = false;
        for i in 0..self.data.len() as u32 {
            let id = VariableId::new(i);
            if self.data[id].parent != id {
                continue;
            }
            let data = &mut self.data[id];
            let double = data.votes[Ballot::Double as usize] > data.votes[Ballot::Value as usize];
            if double == data.double_format {
                continue;
            }
            data.double_format = double;
            if double {
                data.prediction.merge(Prediction::DOUBLE);
            }
            changed = true;
        }
        changed
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_is_identity_for_singletons() {
        let mut set = VariableSet::new();
        let a = set.add(0);
        let b = set.add(1);
        assert_eq!(set.find(a), a);
        assert_eq!(set.find(b), b);
    }

    #[test]
    fn test_union_joins_predictions() {
        let mut set = VariableSet::new();
        let a = set.add(0);
        let b = set.add(1);
        set.predict(a, Prediction::INT32);
        set.predict(b, Prediction::DOUBLE);
        let root = set.union(a, b);
        assert_eq!(set.find(a), root);
        assert_eq!(set.find(b), root);
        assert_eq!(set.prediction(a), Prediction::NUMBER);
    }

    #[test]
    fn test_votes_reach_the_root() {
        let mut set = VariableSet::new();
        let a = set.add(0);
        let b = set.add(0);
        set.union(a, b);
        set.vote(a, Ballot::Double);
        set.vote(b, Ballot::Double);
        set.vote(a, Ballot::Value);
        assert!(set.tally_votes());
        assert!(set.should_use_double_format(a));
        assert!(set.should_use_double_format(b));
    }

    #[test]
    fn test_tally_reports_flips_only() {
        let mut set = VariableSet::new();
        let a = set.add(0);
        set.vote(a, Ballot::Double);
        assert!(set.tally_votes());
        // Same outcome again: no change to report.
        set.clear_votes();
        set.vote(a, Ballot::Double);
        assert!(!set.tally_votes());
    }

    #[test]
    fn test_double_flip_promotes_prediction() {
        let mut set = VariableSet::new();
        let a = set.add(0);
        set.predict(a, Prediction::INT32);
        set.vote(a, Ballot::Double);
        set.tally_votes();
        assert_eq!(set.prediction(a), Prediction::NUMBER);
    }
}
