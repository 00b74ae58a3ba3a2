//! The template renderer.
//!
//! # Architecture
//!
//! - **Scopes**: an arena of variable frames, some carrying block maps
//! - **Resolution**: field, index and slice access on values
//! - **Operators**: arithmetic and comparison across the numeric kinds
//! - **Runtime**: walks the AST, writing output and threading [`Flow`]
//!
//! A [`Runtime`] borrows a pooled [`RuntimeState`] from the owning
//! [`Set`](crate::Set) for the length of one render.

mod call;
mod ops;
mod ranger;
mod resolve;
mod runtime;
mod scope;

pub use call::Arguments;
pub use ranger::{ranger_for, IntsRanger, ListRanger, MapRanger, Ranger};
pub use resolve::{lookup, resolve_index};
pub use runtime::{error_value, Flow, Runtime, RuntimeState};
pub use scope::{BlockMap, ScopeId, Scopes};
