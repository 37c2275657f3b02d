use std::{any::type_name, fmt::Debug, sync::Arc};

use crate::{
    errors::RequireError,
    types::{Injectable, Instance},
};

/// The values produced by one activation, in initialization order
///
/// Cheap to clone, all clones share the same values.
pub struct Resources<S = ()> {
    inner: Arc<ResourcesInner<S>>,
}
struct ResourcesInner<S> {
    values: Vec<(String, Instance)>,
    settings: Arc<S>,
}
impl<S> Clone for Resources<S> {
    fn clone(&self) -> Self {
        Resources {
            inner: self.inner.clone(),
        }
    }
}
impl<S> Debug for Resources<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, instance) in &self.inner.values {
            map.entry(name, &instance.info.type_name);
        }
        map.finish()
    }
}

impl<S> Resources<S> {
    pub(crate) fn new(values: Vec<(String, Instance)>, settings: Arc<S>) -> Self {
        Resources {
            inner: Arc::new(ResourcesInner { values, settings }),
        }
    }

    /// The settings the container was created with
    pub fn settings(&self) -> &S {
        &self.inner.settings
    }

    pub fn shared_settings(&self) -> Arc<S> {
        self.inner.settings.clone()
    }

    /// Attempts to get the value produced for `name`
    pub fn require<T: Injectable>(&self, name: &str) -> Result<Arc<T>, RequireError> {
        let instance = self
            .get_instance(name)
            .ok_or_else(|| RequireError::Missing(name.to_string()))?;

        instance
            .downcast::<T>()
            .map_err(|actual_type| RequireError::DowncastFailed {
                name: name.to_string(),
                required_type: type_name::<T>(),
                actual_type,
            })
    }

    pub fn get_instance(&self, name: &str) -> Option<&Instance> {
        self.inner
            .values
            .iter()
            .find(|(produced, _)| produced == name)
            .map(|(_, instance)| instance)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_instance(name).is_some()
    }

    /// Names in initialization order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.inner.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values.is_empty()
    }

    /// Populates a typed view of the resources
    pub fn extract<O: FromResources<S>>(&self) -> Result<O, RequireError> {
        O::from_resources(self)
    }
}

/// A type which can be populated from the resources of an activation
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use exitstack_di::{FromResources, RequireError, Resources};
///
/// struct Handles {
///     pool: Arc<String>,
///     workers: Arc<usize>,
/// }
///
/// impl FromResources for Handles {
///     fn from_resources(resources: &Resources) -> Result<Self, RequireError> {
///         Ok(Handles {
///             pool: resources.require("pool")?,
///             workers: resources.require("workers")?,
///         })
///     }
/// }
/// ```
pub trait FromResources<S = ()>: Sized {
    fn from_resources(resources: &Resources<S>) -> Result<Self, RequireError>;
}

impl<S> FromResources<S> for Resources<S> {
    fn from_resources(resources: &Resources<S>) -> Result<Self, RequireError> {
        Ok(resources.clone())
    }
}
