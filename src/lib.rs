pub mod core;
pub mod pipeline;
pub mod sink;
pub mod source;

pub use crate::core::*;
pub use crate::pipeline::{LocalEngine, Pipeline};
