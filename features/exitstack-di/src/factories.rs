use std::{any::Any, future::Future, marker::PhantomData, panic::AssertUnwindSafe, sync::Arc};

use futures::{
    future::{self, BoxFuture},
    FutureExt,
};

use crate::{
    dependency::Arguments,
    errors::RequireError,
    types::{DynError, Injectable, Instance, TypeInfo},
};

/// A Factory providing the value of one declared dependency
///
/// Implemented for any `Fn(Arguments) -> impl Future<Output = Result<T, E>>`.
/// Wrap synchronous functions in [FnFactory].
pub trait InstanceFactory: Send + Sync + 'static {
    type Provides: Injectable;

    /// Returns the typeinfo about the factory's provided type
    fn supplies() -> TypeInfo {
        TypeInfo::of::<Self::Provides>()
    }

    /// Constructs the value from the resolved arguments
    ///
    /// Returns the constructed value, or an error if the construction failed
    fn construct(
        &self,
        args: Arguments,
    ) -> impl Future<Output = Result<Self::Provides, impl Into<DynError>>> + Send + '_;
}

impl<T, E, Fun, FunFuture> InstanceFactory for Fun
where
    T: Injectable,
    E: Into<DynError>,
    Fun: Fn(Arguments) -> FunFuture + Send + Sync + 'static,
    FunFuture: Future<Output = Result<T, E>> + Send + 'static,
{
    type Provides = T;

    #[allow(refining_impl_trait)]
    fn construct(&self, args: Arguments) -> FunFuture {
        self(args)
    }
}

/// Adapts a synchronous `Fn(Arguments) -> Result<T, E>` into an [InstanceFactory]
pub struct FnFactory<Fun>(pub Fun);

impl<T, E, Fun> InstanceFactory for FnFactory<Fun>
where
    T: Injectable,
    E: Into<DynError> + Send + 'static,
    Fun: Fn(Arguments) -> Result<T, E> + Send + Sync + 'static,
{
    type Provides = T;

    #[allow(refining_impl_trait)]
    fn construct(&self, args: Arguments) -> future::Ready<Result<T, E>> {
        future::ready((self.0)(args))
    }
}

/// Wrapper Trait for factories, providing values as [Instance]
pub(crate) trait DynFactory: Send + Sync {
    fn supplies(&self) -> TypeInfo;

    /// Constructs the value, catching panics as construction errors
    fn construct(&self, args: Arguments) -> BoxFuture<'_, Result<Instance, DynError>>;
}
// Impl DynFactory for any InstanceFactory
impl<SpecificFactory: InstanceFactory> DynFactory for SpecificFactory {
    fn supplies(&self) -> TypeInfo {
        <SpecificFactory as InstanceFactory>::supplies()
    }

    fn construct(&self, args: Arguments) -> BoxFuture<'_, Result<Instance, DynError>> {
        // Forward the call to the specific implementation
        let construction = async move {
            let result: Result<Instance, DynError> = InstanceFactory::construct(self, args)
                .await
                .map(Instance::new)
                .map_err(|e| e.into());
            result
        };

        catch_panics("factory", construction).boxed()
    }
}

/// Disposes of a value produced by a factory
///
/// Implemented for any `Fn(Arc<T>) -> impl Future<Output = Result<(), E>>`.
/// Wrap synchronous functions in [FnTeardown].
pub trait Teardown<T: Injectable>: Send + Sync + 'static {
    fn teardown(
        &self,
        value: Arc<T>,
    ) -> impl Future<Output = Result<(), impl Into<DynError>>> + Send + '_;
}

impl<T, E, Fun, FunFuture> Teardown<T> for Fun
where
    T: Injectable,
    E: Into<DynError>,
    Fun: Fn(Arc<T>) -> FunFuture + Send + Sync + 'static,
    FunFuture: Future<Output = Result<(), E>> + Send + 'static,
{
    #[allow(refining_impl_trait)]
    fn teardown(&self, value: Arc<T>) -> FunFuture {
        self(value)
    }
}

/// Adapts a synchronous `Fn(Arc<T>) -> Result<(), E>` into a [Teardown]
pub struct FnTeardown<Fun>(pub Fun);

impl<T, E, Fun> Teardown<T> for FnTeardown<Fun>
where
    T: Injectable,
    E: Into<DynError> + Send + 'static,
    Fun: Fn(Arc<T>) -> Result<(), E> + Send + Sync + 'static,
{
    #[allow(refining_impl_trait)]
    fn teardown(&self, value: Arc<T>) -> future::Ready<Result<(), E>> {
        future::ready((self.0)(value))
    }
}

/// Wrapper Trait for teardowns, accepting values as [Instance]
pub(crate) trait DynTeardown: Send + Sync {
    /// Tears the value down, catching panics as teardown errors
    fn teardown(&self, instance: Instance) -> BoxFuture<'_, Result<(), DynError>>;
}

/// Binds a [Teardown] to the type it disposes of
pub(crate) struct TypedTeardown<T, Specific> {
    teardown: Specific,
    _marker: PhantomData<fn(Arc<T>)>,
}
impl<T: Injectable, Specific: Teardown<T>> TypedTeardown<T, Specific> {
    pub(crate) fn new(teardown: Specific) -> Self {
        TypedTeardown {
            teardown,
            _marker: PhantomData,
        }
    }
}
impl<T: Injectable, Specific: Teardown<T>> DynTeardown for TypedTeardown<T, Specific> {
    fn teardown(&self, instance: Instance) -> BoxFuture<'_, Result<(), DynError>> {
        let value = match instance.downcast::<T>() {
            Ok(value) => value,
            Err(actual_type) => {
                let error = RequireError::DowncastFailed {
                    name: instance.info.type_name.to_string(),
                    required_type: std::any::type_name::<T>(),
                    actual_type,
                };
                return future::ready(Err(error.into())).boxed();
            }
        };

        let teardown = async move {
            let result: Result<(), DynError> = Teardown::<T>::teardown(&self.teardown, value)
                .await
                .map_err(|e| e.into());
            result
        };

        catch_panics("teardown", teardown).boxed()
    }
}

/// Turns a panic inside `fut` into an error of the invocation
fn catch_panics<'a, T: 'a>(
    what: &'static str,
    fut: impl Future<Output = Result<T, DynError>> + Send + 'a,
) -> impl Future<Output = Result<T, DynError>> + Send + 'a {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .map(move |caught| match caught {
            Ok(result) => result,
            Err(payload) => Err(format!("{what} panicked: {}", panic_message(&*payload)).into()),
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
