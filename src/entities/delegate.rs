//! Typed accessors over a [`Props`] bag.
//!
//! A [`Prop<T>`] is a small handle (key + hashing flag) created once per
//! item through [`PropDef`]. Values live in the bag, so handles are cheap
//! to clone and can be kept by the item author next to the item.
//!
//! # Example
//! ```
//! use itemlist::entities::Props;
//!
//! let mut props = Props::new();
//! let title = props.define::<String>("title").default(|| "untitled".to_string()).unwrap();
//! assert_eq!(title.get(&mut props).unwrap(), "untitled");
//! title.set(&mut props, "hello".to_string()).unwrap();
//! assert_eq!(title.get(&mut props).unwrap(), "hello");
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{ListError, Result};

use super::props::{DefaultFn, Observer, PropType, PropValue, Props};

/// Anything that owns a property bag. Implemented by [`Props`] and `Item`.
pub trait PropHost {
    fn props(&self) -> &Props;
    fn props_mut(&mut self) -> &mut Props;

    /// Called before an id property is stored. Bags without identity ignore it.
    fn assign_id(&mut self, _value: &PropValue) -> Result<()> {
        Ok(())
    }
}

impl PropHost for Props {
    fn props(&self) -> &Props {
        self
    }
    fn props_mut(&mut self) -> &mut Props {
        self
    }
}

/// Builder returned by [`Props::define`]
pub struct PropDef<'a, T> {
    props: &'a mut Props,
    key: String,
    hashed: bool,
    observer: Option<Observer>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: PropType + 'static> PropDef<'a, T> {
    pub(crate) fn new(props: &'a mut Props, key: String) -> Self {
        Self {
            props,
            key,
            hashed: true,
            observer: None,
            _marker: PhantomData,
        }
    }

    /// Whether the property takes part in equality/hash (default: true)
    pub fn hashed(mut self, hashed: bool) -> Self {
        self.hashed = hashed;
        self
    }

    /// Callback fired synchronously whenever a value is stored through the handle,
    /// including when the default is materialized.
    pub fn on_set<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(move |value: &PropValue| {
            if let Some(typed) = T::from_value(value) {
                f(&typed);
            }
        }));
        self
    }

    /// Property with a lazily computed default
    pub fn default<F>(self, default: F) -> Result<Prop<T>>
    where
        F: FnOnce() -> T + Send + Sync + 'static,
    {
        self.register(Box::new(move || Some(default().into_value())), false)
    }

    /// Property that must be set before the item is sealed
    pub fn required(self) -> Result<Prop<T>> {
        self.register(Box::new(|| None), false)
    }

    /// Required property whose value also becomes the item id (hashed).
    pub fn id(self) -> Result<Prop<T>> {
        self.register(Box::new(|| None), true)
    }

    fn register(self, default: DefaultFn, is_id: bool) -> Result<Prop<T>> {
        let hashed = self.hashed || is_id;
        self.props.register_lazy(self.key.clone(), hashed, default, self.observer)?;
        Ok(Prop {
            key: self.key,
            hashed,
            is_id,
            _marker: PhantomData,
        })
    }
}

impl<'a, T: PropType + 'static> PropDef<'a, Option<T>> {
    /// Nullable property, defaults to `None`
    pub fn optional(self) -> Result<Prop<Option<T>>> {
        self.register(Box::new(|| Some(PropValue::Null)), false)
    }
}

/// Typed handle to one property of a bag
#[derive(Debug)]
pub struct Prop<T> {
    key: String,
    hashed: bool,
    is_id: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Prop<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            hashed: self.hashed,
            is_id: self.is_id,
            _marker: PhantomData,
        }
    }
}

impl<T: PropType> Prop<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_hashed(&self) -> bool {
        self.hashed
    }

    /// Read the value, materializing the default on first access.
    pub fn get<H: PropHost + ?Sized>(&self, host: &mut H) -> Result<T> {
        let value = host
            .props_mut()
            .materialize(&self.key)?
            .ok_or_else(|| ListError::MissingProperty { key: self.key.clone() })?;
        self.convert(value)
    }

    /// Read without materializing. Meant for sealed items, where every
    /// default has already been forced.
    pub fn read<H: PropHost + ?Sized>(&self, host: &H) -> Result<T> {
        host.props().require(&self.key)
    }

    /// Store `value` and fire the observer. Fails once the bag is sealed.
    pub fn set<H: PropHost + ?Sized>(&self, host: &mut H, value: T) -> Result<()> {
        let value = value.into_value();
        if host.props().is_sealed() {
            return Err(ListError::Sealed { key: Some(self.key.clone()) });
        }
        if self.is_id {
            host.assign_id(&value)?;
        }
        host.props_mut().set_observed(&self.key, value, self.hashed)
    }

    fn convert(&self, value: &PropValue) -> Result<T> {
        T::from_value(value).ok_or_else(|| ListError::PropertyType {
            key: self.key.clone(),
            expected: std::any::type_name::<T>(),
        })
    }
}
