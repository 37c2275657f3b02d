use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::{container::ActivationState, types::DynError};

/// Problems with the declared dependencies, detected before any factory runs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("A dependency has been declared twice: '{0}'")]
    Duplicate(String),
    #[error("'{name}' references '{missing}' but it is not declared")]
    UnresolvedReference { name: String, missing: String },
    #[error("circular dependency detected: {}", path.join(" -> "))]
    CircularDependency {
        /// Names forming the cycle, ending with the name it started at
        path: Vec<String>,
    },
}

/// Errors when trying to require a produced value or argument
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequireError {
    /// No resource with this name was produced
    #[error("'{0}' is not a resolved resource")]
    Missing(String),
    /// The factory was not given an argument with this parameter name
    #[error("argument '{0}' was not declared")]
    MissingArgument(String),
    #[error("Failed to downcast '{name}', required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        name: String,
        required_type: &'static str,
        actual_type: &'static str,
    },
}

/// A single teardown which failed while unwinding
#[derive(Error, Debug, Clone)]
#[error("teardown for '{name}' failed - error: {error}")]
pub struct TeardownFailure {
    pub name: String,
    pub error: Arc<DynError>,
}

/// All teardowns which failed during one unwind, in the order they ran
#[derive(Error, Debug, Clone)]
pub struct TeardownError {
    pub failures: Vec<TeardownFailure>,
}
impl std::fmt::Display for TeardownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("One or more teardowns failed:".to_string());
        for failure in &self.failures {
            display.push(format!("- {}", failure));
        }
        f.write_str(&display.join("\n"))
    }
}

/// Errors while initiating the declared dependencies
///
/// Every variant is raised after the resources produced so far were torn down.
/// Teardowns which failed during that unwind are kept in `suppressed`.
#[derive(Error, Debug, Clone)]
pub enum InitError {
    /// A Factory failed to build
    #[error("Factory for '{product}' failed - error: {error}")]
    FactoryFailed {
        product: String,
        error: Arc<DynError>,
        suppressed: Vec<TeardownFailure>,
    },
    /// The caller cancelled the activation while `product` was being built
    #[error("Initiation was cancelled while building '{product}'")]
    Cancelled {
        product: String,
        suppressed: Vec<TeardownFailure>,
    },
    /// Initiation timed out
    #[error("Initiation timed out after {timeout:?} while building '{product}'")]
    Timeout {
        product: String,
        timeout: Duration,
        suppressed: Vec<TeardownFailure>,
    },
}

impl InitError {
    /// Name of the dependency whose construction did not complete
    pub fn product(&self) -> &str {
        match self {
            InitError::FactoryFailed { product, .. }
            | InitError::Cancelled { product, .. }
            | InitError::Timeout { product, .. } => product,
        }
    }

    /// Teardown failures collected while unwinding after this error
    pub fn suppressed(&self) -> &[TeardownFailure] {
        match self {
            InitError::FactoryFailed { suppressed, .. }
            | InitError::Cancelled { suppressed, .. }
            | InitError::Timeout { suppressed, .. } => suppressed,
        }
    }

    /// The original factory error, if a factory failed
    pub fn factory_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            InitError::FactoryFailed { error, .. } => Some(&***error),
            _ => None,
        }
    }
}

/// Errors surfaced by activating, deactivating or scoping a container
#[derive(Error, Debug, Clone)]
pub enum ActivationError {
    /// The container was activated again before it was deactivated
    #[error("Container is already active - deactivate it before activating again")]
    AlreadyActive,
    /// Another activation or deactivation of the container is still running
    #[error("Container is busy ({0:?}) - wait for it to finish")]
    Busy(ActivationState),
    #[error(transparent)]
    DependencyGraph(#[from] GraphError),
    #[error(transparent)]
    Init(#[from] InitError),
    /// Teardown failed after a fully successful activation
    #[error(transparent)]
    Teardown(#[from] TeardownError),
    /// The body of a scope failed; teardowns which failed afterwards are kept in `suppressed`
    #[error("Scope failed - error: {error}")]
    Scope {
        error: Arc<DynError>,
        suppressed: Vec<TeardownFailure>,
    },
    /// The body of a scope was cancelled before it completed
    #[error("Scope was cancelled")]
    ScopeCancelled { suppressed: Vec<TeardownFailure> },
}
