//! CLI command implementations.

pub mod clusters;
pub mod common;
pub mod plan;
pub mod submit;
