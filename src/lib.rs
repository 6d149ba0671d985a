#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod common;
pub use common::*;

mod counter;
pub use counter::*;

mod decision;
pub use decision::*;

mod error;
pub use error::*;

mod middleware;
pub use middleware::*;

mod options;
pub use options::*;

mod redis_store;
pub use redis_store::*;

mod script;
pub use script::*;

mod store;
pub use store::*;

#[cfg(test)]
mod tests;
