use std::{
    any::{Any, TypeId},
    fmt::Debug,
    sync::Arc,
};

/// Error produced by factories and teardowns
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Factories may run on a multithreaded async runtime and produced values are
/// handed to every dependent, so anything produced or passed as a literal
/// needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// A produced value or literal argument with its type erased
#[derive(Clone)]
pub struct Instance {
    pub info: TypeInfo,
    pub instance: Arc<dyn Any + Send + Sync + 'static>,
}
impl Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Instance").field(&self.info.type_name).finish()
    }
}

impl Instance {
    pub fn new<Value: Injectable>(value: Value) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an already shared value without copying it
    pub fn from_arc<Value: Injectable>(value: Arc<Value>) -> Self {
        Instance {
            info: TypeInfo::of::<Value>(),
            instance: value,
        }
    }

    /// Returns the shared value, or the actual type name if `T` does not match
    pub fn downcast<T: Injectable>(&self) -> Result<Arc<T>, &'static str> {
        match Arc::downcast::<T>(self.instance.clone()) {
            Ok(downcasted) => Ok(downcasted),
            Err(_) => Err(self.info.type_name),
        }
    }

    pub fn is<T: Injectable>(&self) -> bool {
        self.info.type_id == TypeId::of::<T>()
    }
}

/// Type Name and Type Id
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }
}
