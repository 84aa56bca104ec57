//! The process and filesystem boundary: asset probing, container
//! rasterization with its content-addressed cache, and the engine command
//! emitter/executor. The compilation itself lives in `stylecast_core`.

pub mod cache;
pub mod command;
pub mod error;
pub mod probe;
pub mod rasterize;

pub use error::{RenderError, Result};
