//! stencil-kernel: the stencil template language.
//!
//! This crate provides:
//!
//! - **Lexer**: tokenizes template source with configurable delimiters
//! - **Parser**: recursive descent with a three-token pushback buffer
//! - **AST**: plain data nodes that print back to source
//! - **Values**: the dynamic value model, host records and callables
//! - **Interpreter**: the tree-walking renderer
//! - **Set**: loading, caching, linking and executing templates
//!
//! # Example
//!
//! ```
//! use stencil_kernel::{InMemLoader, Set, Value, VarMap};
//!
//! let loader = InMemLoader::new();
//! loader.set("/hello.jet", "Hello, {{ .Name }}!").unwrap();
//! let set = Set::builder(loader).build().unwrap();
//!
//! let context = Value::map([("Name", "<world>")]);
//! let out = set.render("hello", &VarMap::new(), context).unwrap();
//! assert_eq!(out, "Hello, &lt;world&gt;!");
//! ```

pub mod ast;
pub mod builtins;
pub mod cache;
pub mod env;
pub mod error;
pub mod escape;
pub mod interpreter;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod set;
pub mod template;
pub mod value;

pub use cache::{Cache, InMemCache};
pub use env::Environment;
pub use error::{Error, ParseError, ParseReason, Result, RuntimeError, RuntimeReason};
pub use escape::SafeWriter;
pub use interpreter::{Arguments, Flow, Ranger, Runtime};
pub use lexer::Delims;
pub use loader::{InMemLoader, Loader, OsFileSystemLoader};
pub use set::{Set, SetBuilder, VarMap};
pub use template::Template;
pub use value::{Func, Param, Record, RecordType, Signature, Value};
