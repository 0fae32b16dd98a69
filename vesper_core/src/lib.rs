//! Shared substrate for the Vesper VM.
//!
//! This crate carries the pieces every tier agrees on:
//! - **Constant values**: the compile-time representation of literals
//! - **Identifier interning**: stable numbering for property names

pub mod intern;
pub mod value;

pub use intern::{IdentifierTable, IdentifierNumber};
pub use value::ConstantValue;
