//! Speculative tier-2 JIT middle-end for the Vesper VM.
//!
//! The crate consumes the data-flow graph the bytecode translator
//! produces, infers type predictions from value-profile seeds, rewrites
//! generic operations into speculated variants, eliminates redundant
//! work, and assigns virtual registers. A back-end consumes the
//! annotated graph to emit machine code.
//!
//! - IR data structures live in [`ir`]
//! - The optimization phases live in [`opt`]
//! - Virtual-register allocation lives in [`regalloc`]
//! - The forward flow analysis lives in [`cfa`]

pub mod cfa;
pub mod code_block;
pub mod ir;
pub mod opt;
pub mod regalloc;

pub use code_block::CodeBlock;
pub use opt::{optimize, optimize_with_config, OptimizeStats, OptimizerConfig};
