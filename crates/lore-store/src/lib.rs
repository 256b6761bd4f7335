//! Storage adapters for the Lore catalog: snapshot persistence and lazy
//! body access, with filesystem and in-memory backends.

pub mod body;
pub mod error;
pub mod snapshot;
