//! Exitstack Config provides a registry of configs which is handed to a
//! container as its settings.
//!
//! Exitstack Config is split into two major parts:
//! 1. ConfigProvider: Used to create the registry of all configs
//! 2. Config<T>: A wrapper type to retrieve configs from factory arguments or
//!    from the resources of an activation
//!
//! # Examples
//!
//! ```rust
//! use exitstack_config::provider::ConfigProvider;
//!
//! #[derive(Clone)]
//! struct AppConfig {
//!     host: String,
//!     port: u16,
//!     app_name: String,
//! }
//!
//! let app_config = AppConfig {
//!     host: "localhost".to_string(),
//!     port: 8080_u16,
//!     app_name: "My Awesome App".to_string(),
//! };
//!
//! let mut config_provider = ConfigProvider::default();
//! if let Err(e) = config_provider.add_config(app_config.clone()) {
//!     eprintln!("{e}");
//!     return;
//! }
//!
//! let retrieved_config = match config_provider.get_config::<AppConfig>() {
//!     Some(c) => c,
//!     None => {
//!         eprintln!("Could not find config type");
//!         return;
//!     }
//! };
//!
//! assert_eq!(app_config.host, retrieved_config.host);
//! assert_eq!(app_config.port, retrieved_config.port);
//! assert_eq!(app_config.app_name, retrieved_config.app_name);
//! ```
//!
//! Exitstack Config consists of the following components:
//!
//! 1. Config - for handing configs to factories and reading them from resources
//! 2. Provider - for creating a registry of configs, adding and retrieving configs
//! 3. Errors - for config errors

pub mod config;
pub mod errors;
pub mod provider;
