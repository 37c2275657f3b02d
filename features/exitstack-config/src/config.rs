use std::{any::type_name, ops::Deref, sync::Arc};

use exitstack_di::{Arguments, FromResources, Injectable, RequireError, Resources};

use crate::provider::ConfigProvider;

/// A wrapper type for configs handed to factories or read from resources
///
/// # Example
/// ```rust
/// use exitstack_config::{config::Config, provider::ConfigProvider};
/// use exitstack_di::{Arguments, Blueprint, Dependency, DynError};
///
/// #[derive(Clone)]
/// pub struct PoolConfig {
///     size: usize,
/// }
///
/// struct Pool {
///     size: usize,
/// }
///
/// let mut config_provider = ConfigProvider::new();
/// config_provider.add_config(PoolConfig { size: 4 }).unwrap();
///
/// let blueprint = Blueprint::builder()
///     .register(
///         Dependency::from_fn("pool", |args: Arguments| {
///             let config = Config::<PoolConfig>::from_arguments(&args, "config")?;
///             Ok::<_, DynError>(Pool { size: config.size })
///         })
///         .argument("config", config_provider.argument::<PoolConfig>().unwrap()),
///     )
///     .build();
/// # let _ = blueprint;
/// ```
pub struct Config<T> {
    inner: Arc<T>,
}
impl<T> Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Config {
            inner: self.inner.clone(),
        }
    }
}
impl<T> Config<T> {
    pub fn inner(&self) -> Arc<T> {
        self.inner.clone()
    }

    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T: Injectable> Config<T> {
    /// Reads the config passed to a factory as the argument `param`
    pub fn from_arguments(args: &Arguments, param: &str) -> Result<Self, RequireError> {
        Ok(Config {
            inner: args.get::<T>(param)?,
        })
    }
}

impl<T: Injectable> FromResources<ConfigProvider> for Config<T> {
    fn from_resources(resources: &Resources<ConfigProvider>) -> Result<Self, RequireError> {
        let inner = resources
            .settings()
            .get_config::<T>()
            .ok_or_else(|| RequireError::Missing(type_name::<T>().to_string()))?;

        Ok(Config { inner })
    }
}
