//! Core engine modules - diffing, commit, scheduling, build control
//!
//! Independent of any rendering surface: results leave through `RenderSink`.

pub mod adapter;
pub mod commit;
pub mod controller;
pub mod defaults;
pub mod diff;
pub mod differ;
pub mod generation;
pub mod scheduler;
pub mod workers;

// Re-exports for convenience
pub use adapter::{ListAdapter, ListenerId, ResultListener};
pub use commit::{CommitQueue, Immediate};
pub use controller::{BuildController, BuildScope, Interceptor, ItemBuilder, TypedController};
pub use diff::{
    DiffResult, EditOp, ListUpdateCallback, RenderSink, Snapshot, check_duplicates, diff_items,
    longest_increasing,
};
pub use differ::AsyncDiffer;
pub use generation::GenerationTracker;
pub use scheduler::{Scheduler, TickScheduler};
pub use workers::Workers;
