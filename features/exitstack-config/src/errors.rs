use exitstack_di::TypeInfo;

/// Errors when registering or acquiring a config
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The required Config is not known
    #[error("The required Config type '{0}' is not known")]
    Missing(TypeInfo),
    /// A Config of this type was registered before
    #[error("The Config type '{0}' is already registered")]
    AlreadyRegistered(TypeInfo),
}
