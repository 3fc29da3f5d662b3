//! Control plane: wires the store, worker pool and both dispatchers together.

pub mod control;

pub use control::{ControlConfig, ControlPlane};
