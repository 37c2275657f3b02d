//! Exitstack DI builds a set of named, interdependent async resources in
//! dependency order and tears them down again in reverse.
//!
//! Exitstack DI is split into three parts:
//! 1. Blueprint: the immutable declarations, each a name, a factory, its
//!    arguments and an optional teardown
//! 2. Container: activates a blueprint, keeping the teardowns of everything it
//!    built on a stack
//! 3. Resources: the values built by one activation, looked up by name
//!
//! If any factory fails, everything built before it is torn down, most recent
//! first, and the factory's error is returned.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use exitstack_di::{Arguments, Blueprint, Container, Dependency, DynError};
//!
//! struct Pool {
//!     url: String,
//! }
//!
//! struct Repository {
//!     pool: Arc<Pool>,
//! }
//!
//! let blueprint = Blueprint::builder()
//!     .register(
//!         Dependency::from_fn("repository", |args: Arguments| {
//!             Ok::<_, DynError>(Repository { pool: args.get("pool")? })
//!         })
//!         .reference("pool", "pool"),
//!     )
//!     .register(
//!         Dependency::new("pool", |args: Arguments| async move {
//!             let url = args.get::<String>("url")?;
//!             Ok::<_, DynError>(Pool { url: url.to_string() })
//!         })
//!         .arg("url", "postgres://localhost".to_string())
//!         .on_exit_sync(|pool: Arc<Pool>| {
//!             println!("closing {}", pool.url);
//!             Ok::<_, DynError>(())
//!         }),
//!     )
//!     .build();
//!
//! let container = Container::new(blueprint, ());
//! futures::executor::block_on(async {
//!     let resources = container.activate().await.unwrap();
//!     let repository = resources.require::<Repository>("repository").unwrap();
//!     assert_eq!(repository.pool.url, "postgres://localhost");
//!
//!     container.deactivate().await.unwrap();
//! });
//! ```

pub mod builder;
pub mod container;
pub mod dependency;
pub mod dependency_graph;
pub mod errors;
pub mod factories;
mod initiator;
pub mod resources;
pub mod scheduler;
pub mod teardown;
pub mod types;

pub use builder::{Blueprint, BlueprintBuilder};
pub use container::{ActivationState, Container};
pub use dependency::{Argument, Arguments, Dependency, Descriptor};
pub use errors::{
    ActivationError, GraphError, InitError, RequireError, TeardownError, TeardownFailure,
};
pub use factories::{FnFactory, FnTeardown, InstanceFactory, Teardown};
pub use resources::{FromResources, Resources};
pub use types::{DynError, Injectable, Instance, TypeInfo};
