//! Kubernetes Resource Kinds
//!
//! Resource model descriptors consumed by the watch path builder, plus the
//! built-in kinds most commonly watched.

pub mod model;
pub mod well_known;

pub use model::ResourceModel;
pub use well_known::lookup;
