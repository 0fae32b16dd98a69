//! The speculative intermediate representation.
//!
//! The IR is a flat sequence of [`node::Node`] records partitioned into
//! [`block::BasicBlock`]s, with all cross-references expressed as dense
//! indices. Annotations (predictions, arithmetic flags, virtual
//! registers) live on the nodes; grouping and metadata live in side
//! tables on the [`graph::Graph`].

pub mod arena;
pub mod block;
pub mod flags;
pub mod graph;
pub mod node;
pub mod opcode;
pub mod prediction;
pub mod structure;
pub mod variables;

pub use arena::{Arena, Id, SecondaryMap};
pub use block::{BasicBlock, BlockId};
pub use flags::ArithFlags;
pub use graph::{Graph, StorageAccessData};
pub use node::{Children, Node, NodeId, Payload, VirtualRegister};
pub use opcode::{OpFlags, Opcode};
pub use prediction::Prediction;
pub use structure::{StructureId, StructureSet, StructureTransition};
pub use variables::{Ballot, VariableAccessData, VariableId, VariableSet};
