//! Entities module - items, their property bags and the traits they need
//! from infrastructure.

pub mod delegate;
pub mod item;
pub mod props;
pub mod traits;

pub use delegate::{Prop, PropDef, PropHost};
pub use item::{Item, id_of};
pub use props::{PropType, PropValue, Property, Props};
pub use traits::{DelayedExecutor, Executor, Holder, ItemListener, ItemView, Job, PlainView, TaskId};
