//! Handlers 模块

pub mod index;
pub mod metrics;

pub use index::*;
pub use metrics::*;
