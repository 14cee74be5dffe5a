//! Item - one renderable unit of a list.
//!
//! Identity is a non-zero 64-bit id, usually hashed from a caller key.
//! Equality (the "same content" check of the differ) is
//! `id + view_type + hashed properties`.
//!
//! # Lifecycle
//!
//! - `Item` (owned): free, every setter works
//! - [`Item::seal`] consumes it and returns `Arc<Item>`: pending property
//!   defaults are forced, the bag is frozen and the id can no longer change
//! - dropped once no snapshot and no render sink hold the `Arc` anymore

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use log::warn;

use crate::error::{ListError, Result};

use super::delegate::{PropDef, PropHost};
use super::props::{PropType, PropValue, Props};
use super::traits::{ItemView, PlainView};

/// Derive an item id from an arbitrary hashable key
pub fn id_of<K: Hash + ?Sized>(key: &K) -> i64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() as i64
}

pub struct Item {
    id: i64,
    view_type: i32,
    props: Props,
    view: Arc<dyn ItemView>,
    sealed: bool,
}

impl Item {
    /// Item rendered by `view`; the view type defaults to `view.layout()`.
    pub fn new(view: Arc<dyn ItemView>) -> Self {
        Self {
            id: 0,
            view_type: view.layout(),
            props: Props::new(),
            view,
            sealed: false,
        }
    }

    /// Item without binding logic, identified only by its view type
    pub fn plain(view_type: i32) -> Self {
        Self::new(Arc::new(PlainView { layout: view_type }))
    }

    /// Builder-style [`set_key`](Self::set_key); a sealed item is left as is.
    pub fn with_key<K: Hash + ?Sized>(self, key: &K) -> Self {
        self.with_id(id_of(key))
    }

    /// Builder-style [`set_id`](Self::set_id); a sealed item is left as is.
    pub fn with_id(mut self, id: i64) -> Self {
        if let Err(e) = self.set_id(id) {
            warn!("Item {}: with_id({}) ignored: {}", self.id, id, e);
        }
        self
    }

    pub fn with_view_type(mut self, view_type: i32) -> Self {
        self.view_type = view_type;
        self
    }

    /// Builder-style [`set_prop`](Self::set_prop); a sealed item is left as is.
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        if let Err(e) = self.props.set(key, value) {
            warn!("Item {}: with_prop ignored: {}", self.id, e);
        }
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn view_type(&self) -> i32 {
        self.view_type
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn props_mut(&mut self) -> &mut Props {
        &mut self.props
    }

    pub fn view(&self) -> &Arc<dyn ItemView> {
        &self.view
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn set_id(&mut self, id: i64) -> Result<()> {
        if self.sealed {
            return Err(ListError::Sealed { key: None });
        }
        self.id = id;
        Ok(())
    }

    pub fn set_key<K: Hash + ?Sized>(&mut self, key: &K) -> Result<()> {
        self.set_id(id_of(key))
    }

    /// Start a typed property definition on this item's bag
    pub fn define<T: PropType + 'static>(&mut self, key: impl Into<String>) -> PropDef<'_, T> {
        self.props.define(key)
    }

    /// Read a property that must be present
    pub fn prop<T: PropType>(&self, key: &str) -> Result<T> {
        self.props.require(key)
    }

    /// Read an optional property
    pub fn prop_opt<T: PropType>(&self, key: &str) -> Result<Option<T>> {
        self.props.get_as(key)
    }

    pub fn set_prop(&mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Result<()> {
        self.props.set(key, value)
    }

    /// Admit the item into a list: requires a non-zero id, forces all pending
    /// property defaults and freezes the item.
    pub fn seal(mut self) -> Result<Arc<Item>> {
        if !self.sealed {
            if self.id == 0 {
                return Err(ListError::IdNotSet);
            }
            self.props.seal()?;
            self.sealed = true;
        }
        Ok(Arc::new(self))
    }
}

impl PropHost for Item {
    fn props(&self) -> &Props {
        &self.props
    }

    fn props_mut(&mut self) -> &mut Props {
        &mut self.props
    }

    fn assign_id(&mut self, value: &PropValue) -> Result<()> {
        self.set_id(id_of(value))
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.view_type == other.view_type && self.props == other.props
    }
}

impl Eq for Item {}

impl Hash for Item {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.view_type.hash(state);
        self.props.hash(state);
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("id", &self.id)
            .field("view_type", &self.view_type)
            .field("props", &format_args!("{}", self.props))
            .field("sealed", &self.sealed)
            .finish()
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item(id={}, view_type={}, props={})", self.id, self.view_type, self.props)
    }
}
