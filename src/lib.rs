//! ITEMLIST - declarative list building with async, generation-tracked diffing
//!
//! Re-exports all modules for use by the binary target.

// Core engine (diff, differ, scheduling, controller)
pub mod core;

// Items and their property bags
pub mod entities;

pub mod cli;
pub mod config;
pub mod error;

// Re-export commonly used types from core
pub use core::adapter::ListAdapter;
pub use core::controller::{BuildController, BuildScope, TypedController};
pub use core::diff::{DiffResult, EditOp, ListUpdateCallback, RenderSink};
pub use core::differ::AsyncDiffer;

// Re-export entities
pub use config::ListConfig;
pub use entities::{Item, ItemView, PropValue, Props};
pub use error::{ListError, Result};
