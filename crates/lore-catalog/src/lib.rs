//! Capability-unit catalog: registry, trigger matcher, progressive loader,
//! gap analyzer, and curator.

pub mod config;
pub mod curator;
pub mod error;
pub mod gap;
pub mod index;
pub mod loader;
pub mod matcher;
pub mod model;
pub mod registry;
