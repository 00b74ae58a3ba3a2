//! Abstract syntax tree for stencil templates.
//!
//! The tree is plain data. Rendering a node with `Display` produces template
//! source that parses back to the same tree.

mod display;
mod types;
mod walk;

pub use types::*;
pub use walk::free_identifiers;
