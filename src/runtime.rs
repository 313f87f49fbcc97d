//! Shared runtime model: the polymorphic value, the tree-walker environment
//! and the typed error taxonomy both backends report through.

pub mod env;
pub mod error;
pub mod value;

pub use env::Env;
pub use error::RuntimeError;
pub use value::{Builtin, BuiltinFn, Closure, HashKey, State, Value};
