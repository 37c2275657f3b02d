use std::{any::type_name, fmt::Debug, marker::PhantomData, sync::Arc};

use crate::{
    errors::RequireError,
    factories::{
        DynFactory, DynTeardown, FnFactory, FnTeardown, InstanceFactory, Teardown, TypedTeardown,
    },
    types::{DynError, Injectable, Instance, TypeInfo},
};

/// A declared argument of a factory
#[derive(Clone, Debug)]
pub enum Argument {
    /// Passed to the factory unchanged on every activation
    Literal(Instance),
    /// Replaced by the value produced for the named dependency
    Reference(String),
}

impl Argument {
    pub fn literal<T: Injectable>(value: T) -> Self {
        Argument::Literal(Instance::new(value))
    }

    /// A literal sharing an existing value
    pub fn shared<T: Injectable>(value: Arc<T>) -> Self {
        Argument::Literal(Instance::from_arc(value))
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Argument::Reference(name.into())
    }

    /// Returns the referenced dependency name, if this is a reference
    pub fn as_reference(&self) -> Option<&str> {
        match self {
            Argument::Reference(name) => Some(name),
            Argument::Literal(_) => None,
        }
    }
}

/// Typed declaration of a dependency
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use exitstack_di::{Arguments, Dependency, DynError};
///
/// struct Pool { url: String }
/// struct Repository { pool: Arc<Pool> }
///
/// let pool = Dependency::new("pool", |args: Arguments| async move {
///     let url = args.get::<String>("url")?;
///     Ok::<_, DynError>(Pool { url: url.to_string() })
/// })
/// .arg("url", "postgres://localhost".to_string())
/// .on_exit_sync(|_pool: Arc<Pool>| Ok::<_, DynError>(()));
///
/// let repository = Dependency::from_fn("repository", |args: Arguments| {
///     Ok::<_, DynError>(Repository { pool: args.get("pool")? })
/// })
/// .reference("pool", "pool");
/// # let _ = (pool, repository);
/// ```
pub struct Dependency<T> {
    name: String,
    arguments: Vec<(String, Argument)>,
    factory: Arc<dyn DynFactory>,
    teardown: Option<Arc<dyn DynTeardown>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Injectable> Dependency<T> {
    /// Declares a dependency built by an async factory
    pub fn new<Factory>(name: impl Into<String>, factory: Factory) -> Self
    where
        Factory: InstanceFactory<Provides = T>,
    {
        Dependency {
            name: name.into(),
            arguments: Vec::new(),
            factory: Arc::new(factory),
            teardown: None,
            _marker: PhantomData,
        }
    }

    /// Declares a dependency built by a synchronous factory
    pub fn from_fn<Fun, E>(name: impl Into<String>, factory: Fun) -> Self
    where
        Fun: Fn(Arguments) -> Result<T, E> + Send + Sync + 'static,
        E: Into<DynError> + Send + 'static,
    {
        Self::new(name, FnFactory(factory))
    }

    /// Adds a literal argument
    pub fn arg<V: Injectable>(self, param: impl Into<String>, value: V) -> Self {
        self.argument(param, Argument::literal(value))
    }

    /// Adds an argument referencing the value produced for `target`
    pub fn reference(self, param: impl Into<String>, target: impl Into<String>) -> Self {
        self.argument(param, Argument::reference(target))
    }

    /// Adds an argument, replacing an earlier one with the same parameter name
    pub fn argument(mut self, param: impl Into<String>, argument: Argument) -> Self {
        let param = param.into();
        match self.arguments.iter_mut().find(|(name, _)| *name == param) {
            Some((_, existing)) => *existing = argument,
            None => self.arguments.push((param, argument)),
        }
        self
    }

    /// Attaches an async teardown, called with the produced value
    pub fn on_exit<Specific: Teardown<T>>(mut self, teardown: Specific) -> Self {
        self.teardown = Some(Arc::new(TypedTeardown::new(teardown)));
        self
    }

    /// Attaches a synchronous teardown, called with the produced value
    pub fn on_exit_sync<Fun, E>(self, teardown: Fun) -> Self
    where
        Fun: Fn(Arc<T>) -> Result<(), E> + Send + Sync + 'static,
        E: Into<DynError> + Send + 'static,
    {
        self.on_exit(FnTeardown(teardown))
    }

    pub fn into_descriptor(self) -> Descriptor {
        Descriptor {
            name: self.name,
            supplies: self.factory.supplies(),
            arguments: self.arguments,
            factory: self.factory,
            teardown: self.teardown,
        }
    }
}

impl<T: Injectable> From<Dependency<T>> for Descriptor {
    fn from(dependency: Dependency<T>) -> Self {
        dependency.into_descriptor()
    }
}

/// Immutable, type erased declaration of a dependency
#[derive(Clone)]
pub struct Descriptor {
    name: String,
    supplies: TypeInfo,
    arguments: Vec<(String, Argument)>,
    factory: Arc<dyn DynFactory>,
    teardown: Option<Arc<dyn DynTeardown>>,
}
impl Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("supplies", &self.supplies.type_name)
            .field("arguments", &self.arguments)
            .field("has_teardown", &self.teardown.is_some())
            .finish()
    }
}

impl Descriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn supplies(&self) -> TypeInfo {
        self.supplies
    }

    /// Declared arguments in declaration order
    pub fn arguments(&self) -> &[(String, Argument)] {
        &self.arguments
    }

    /// Names of the referenced dependencies in declaration order
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.arguments
            .iter()
            .filter_map(|(_, argument)| argument.as_reference())
    }

    pub fn has_teardown(&self) -> bool {
        self.teardown.is_some()
    }

    pub(crate) fn factory(&self) -> &dyn DynFactory {
        &*self.factory
    }

    pub(crate) fn teardown(&self) -> Option<&Arc<dyn DynTeardown>> {
        self.teardown.as_ref()
    }
}

/// Resolved arguments handed to a factory
#[derive(Clone, Debug, Default)]
pub struct Arguments {
    values: Vec<(String, Instance)>,
}

impl Arguments {
    pub(crate) fn from_pairs(values: Vec<(String, Instance)>) -> Self {
        Arguments { values }
    }

    /// Returns the argument passed for `param`
    pub fn get<T: Injectable>(&self, param: &str) -> Result<Arc<T>, RequireError> {
        let instance = self
            .get_instance(param)
            .ok_or_else(|| RequireError::MissingArgument(param.to_string()))?;

        instance
            .downcast::<T>()
            .map_err(|actual_type| RequireError::DowncastFailed {
                name: param.to_string(),
                required_type: type_name::<T>(),
                actual_type,
            })
    }

    pub fn get_instance(&self, param: &str) -> Option<&Instance> {
        self.values
            .iter()
            .find(|(name, _)| name == param)
            .map(|(_, instance)| instance)
    }

    pub fn contains(&self, param: &str) -> bool {
        self.get_instance(param).is_some()
    }

    /// Parameter names in declaration order
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
