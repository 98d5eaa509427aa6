//! Core traits.
mod policy;
pub use policy::{Configurable, Policy};
