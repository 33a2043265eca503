//! Shared utilities for the Sepal compiler.
mod errors;
mod id;

pub use errors::{Error, SepalResult};
pub use id::{GetName, Id};
