//! Batched bounding-box primitives on tch tensors.

mod common;
pub mod iou;
pub mod transform;
mod utils;

pub use iou::*;
pub use transform::*;
