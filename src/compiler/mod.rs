//! Ahead-of-time compilation of a container
//!
//! [`Container::compile`](crate::Container::compile) validates the whole
//! definition set up front and lowers it into a [`CompiledGraph`]: one entry
//! per identifier with its dependencies already resolved to direct accessor
//! calls. A [`CompiledContainer`] then serves values from the graph without
//! consulting descriptors again.

mod compile;
mod compiled;
pub mod emit;
pub mod ir;

pub(crate) use compile::Compiler;
pub use compiled::CompiledContainer;
pub use emit::render;
pub use ir::{CompiledEntry, CompiledGraph, Expr, Stmt};
