//! Property bag backing every item.
//!
//! Insertion-ordered `key -> (value, hashed)` store. Mutable until sealed.
//! Hashing notes:
//! - only entries with `hashed == true` take part in `PartialEq`/`Hash`
//! - keys are hashed in sorted order, so equality and hash do not depend on
//!   the order in which properties were set or materialized
//! - `PropValue` hashes floats via `to_bits`
//!
//! Lazy defaults registered through [`Props::define`] are forced into real
//! entries exactly once: on first read, or at [`Props::seal`] for the ones
//! nobody read. After sealing the bag is frozen.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{ListError, Result};

use super::delegate::PropDef;

/// Generic property value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<PropValue>),
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        use PropValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            // bitwise so that Eq stays consistent with Hash (NaN == NaN)
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Str(a), Str(b)) => a == b,
            (List(a), List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PropValue {}

impl Hash for PropValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use PropValue::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Null => {}
            Bool(v) => v.hash(state),
            Int(v) => v.hash(state),
            Float(v) => v.to_bits().hash(state),
            Str(v) => v.hash(state),
            List(items) => items.hash(state),
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Null => write!(f, "null"),
            PropValue::Bool(v) => write!(f, "{}", v),
            PropValue::Int(v) => write!(f, "{}", v),
            PropValue::Float(v) => write!(f, "{}", v),
            PropValue::Str(v) => write!(f, "{:?}", v),
            PropValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Typed view over [`PropValue`]
pub trait PropType: Sized {
    fn into_value(self) -> PropValue;
    fn from_value(value: &PropValue) -> Option<Self>;
}

impl PropType for PropValue {
    fn into_value(self) -> PropValue {
        self
    }
    fn from_value(value: &PropValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl PropType for bool {
    fn into_value(self) -> PropValue {
        PropValue::Bool(self)
    }
    fn from_value(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl PropType for i64 {
    fn into_value(self) -> PropValue {
        PropValue::Int(self)
    }
    fn from_value(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl PropType for i32 {
    fn into_value(self) -> PropValue {
        PropValue::Int(self as i64)
    }
    fn from_value(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::Int(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl PropType for u32 {
    fn into_value(self) -> PropValue {
        PropValue::Int(self as i64)
    }
    fn from_value(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::Int(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl PropType for f64 {
    fn into_value(self) -> PropValue {
        PropValue::Float(self)
    }
    fn from_value(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::Float(v) => Some(*v),
            PropValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl PropType for String {
    fn into_value(self) -> PropValue {
        PropValue::Str(self)
    }
    fn from_value(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl<T: PropType> PropType for Vec<T> {
    fn into_value(self) -> PropValue {
        PropValue::List(self.into_iter().map(PropType::into_value).collect())
    }
    fn from_value(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::List(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

impl<T: PropType> PropType for Option<T> {
    fn into_value(self) -> PropValue {
        match self {
            Some(v) => v.into_value(),
            None => PropValue::Null,
        }
    }
    fn from_value(value: &PropValue) -> Option<Self> {
        match value {
            PropValue::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        PropValue::Int(v as i64)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Float(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Str(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Str(v)
    }
}

/// Single entry of a [`Props`] bag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub value: PropValue,
    pub hashed: bool,
}

/// Side effect fired when a value is written through a delegate
pub(crate) type Observer = Arc<dyn Fn(&PropValue) + Send + Sync>;

/// Default supplier. `None` means "no default": the property is required.
pub(crate) type DefaultFn = Box<dyn FnOnce() -> Option<PropValue> + Send + Sync>;

struct LazyEntry {
    hashed: bool,
    default: DefaultFn,
}

/// Property bag: string key -> [`Property`].
#[derive(Default)]
pub struct Props {
    entries: IndexMap<String, Property>,
    lazy: IndexMap<String, LazyEntry>,
    observers: HashMap<String, Observer>,
    sealed: bool,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a typed property definition, see [`PropDef`].
    pub fn define<T: PropType + 'static>(&mut self, key: impl Into<String>) -> PropDef<'_, T> {
        PropDef::new(self, key.into())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Stored value, without materializing lazy defaults
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.get(key).map(|p| &p.value)
    }

    pub fn entry(&self, key: &str) -> Option<&Property> {
        self.entries.get(key)
    }

    /// Typed read. `Ok(None)` when unset.
    pub fn get_as<T: PropType>(&self, key: &str) -> Result<Option<T>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(p) => T::from_value(&p.value).map(Some).ok_or_else(|| ListError::PropertyType {
                key: key.to_string(),
                expected: std::any::type_name::<T>(),
            }),
        }
    }

    /// Typed read of a property that must be present.
    pub fn require<T: PropType>(&self, key: &str) -> Result<T> {
        self.get_as(key)?.ok_or_else(|| ListError::MissingProperty { key: key.to_string() })
    }

    /// Set a hashed property
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Result<()> {
        self.set_property(key, Property { value: value.into(), hashed: true })
    }

    /// Set a property that does not take part in equality/hash
    pub fn set_unhashed(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropValue>,
    ) -> Result<()> {
        self.set_property(key, Property { value: value.into(), hashed: false })
    }

    pub fn set_property(&mut self, key: impl Into<String>, property: Property) -> Result<()> {
        let key = key.into();
        if self.sealed {
            return Err(ListError::Sealed { key: Some(key) });
        }
        self.lazy.shift_remove(&key);
        self.entries.insert(key, property);
        Ok(())
    }

    /// Write through a delegate: stores and fires the key's observer, if any.
    pub(crate) fn set_observed(&mut self, key: &str, value: PropValue, hashed: bool) -> Result<()> {
        self.set_property(key, Property { value, hashed })?;
        self.notify(key);
        Ok(())
    }

    pub(crate) fn register_lazy(
        &mut self,
        key: String,
        hashed: bool,
        default: DefaultFn,
        observer: Option<Observer>,
    ) -> Result<()> {
        if self.sealed {
            return Err(ListError::Sealed { key: Some(key) });
        }
        if let Some(observer) = observer {
            self.observers.insert(key.clone(), observer);
        }
        // An explicit value already wins over the default
        if !self.entries.contains_key(&key) {
            self.lazy.insert(key, LazyEntry { hashed, default });
        }
        Ok(())
    }

    /// Value for `key`, forcing a registered default into a real entry first.
    ///
    /// Returns `Ok(None)` only when the key is neither set nor registered.
    pub(crate) fn materialize(&mut self, key: &str) -> Result<Option<&PropValue>> {
        if !self.entries.contains_key(key) {
            let Some(lazy) = self.lazy.shift_remove(key) else {
                return Ok(None);
            };
            self.force(key.to_string(), lazy)?;
        }
        Ok(self.entries.get(key).map(|p| &p.value))
    }

    fn force(&mut self, key: String, lazy: LazyEntry) -> Result<()> {
        let hashed = lazy.hashed;
        let Some(value) = (lazy.default)() else {
            // still required until someone sets it
            let missing = LazyEntry { hashed, default: Box::new(|| None) };
            self.lazy.shift_insert(0, key.clone(), missing);
            return Err(ListError::MissingProperty { key });
        };
        self.entries.insert(key.clone(), Property { value, hashed });
        self.notify(&key);
        Ok(())
    }

    fn notify(&self, key: &str) {
        if let (Some(observer), Some(p)) = (self.observers.get(key), self.entries.get(key)) {
            observer(&p.value);
        }
    }

    /// Force every pending default, then freeze the bag.
    ///
    /// Fails with `MissingProperty` for a required property that was never set;
    /// the bag stays unsealed in that case.
    pub fn seal(&mut self) -> Result<()> {
        if self.sealed {
            return Ok(());
        }
        while let Some((key, lazy)) = self.lazy.shift_remove_index(0) {
            self.force(key, lazy)?;
        }
        self.observers.clear();
        self.sealed = true;
        Ok(())
    }

    /// Iterate over all set entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Property)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of registered defaults not yet materialized
    pub fn pending_defaults(&self) -> usize {
        self.lazy.len()
    }

    fn hashed_sorted(&self) -> Vec<(&String, &PropValue)> {
        let mut hashed: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, p)| p.hashed)
            .map(|(k, p)| (k, &p.value))
            .collect();
        hashed.sort_unstable_by(|a, b| a.0.cmp(b.0));
        hashed
    }
}

impl PartialEq for Props {
    fn eq(&self, other: &Self) -> bool {
        self.hashed_sorted() == other.hashed_sorted()
    }
}

impl Eq for Props {}

impl Hash for Props {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (key, value) in self.hashed_sorted() {
            key.hash(state);
            value.hash(state);
        }
    }
}

impl fmt::Display for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, p)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, p.value)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("entries", &self.entries)
            .field("pending", &self.lazy.keys().collect::<Vec<_>>())
            .field("sealed", &self.sealed)
            .finish()
    }
}
