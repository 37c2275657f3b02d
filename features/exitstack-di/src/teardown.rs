use std::{fmt::Debug, sync::Arc};

use crate::{errors::TeardownFailure, factories::DynTeardown, types::Instance};

/// A teardown bound to the value it disposes of
pub struct TeardownEntry {
    name: String,
    instance: Instance,
    teardown: Arc<dyn DynTeardown>,
}
impl Debug for TeardownEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownEntry")
            .field("name", &self.name)
            .field("instance", &self.instance)
            .finish()
    }
}

impl TeardownEntry {
    pub(crate) fn new(name: &str, instance: Instance, teardown: Arc<dyn DynTeardown>) -> Self {
        TeardownEntry {
            name: name.to_string(),
            instance,
            teardown,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the teardown, consuming the entry so it can only run once
    pub async fn run(self) -> Result<(), TeardownFailure> {
        let TeardownEntry {
            name,
            instance,
            teardown,
        } = self;

        tracing::debug!("Tearing down '{name}'");
        match teardown.teardown(instance).await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::warn!(dependency = %name, %error, "Teardown failed - continuing unwind");
                Err(TeardownFailure {
                    name,
                    error: Arc::new(error),
                })
            }
        }
    }
}

/// Teardowns of the successfully produced values, latest on top
#[derive(Debug, Default)]
pub struct TeardownStack {
    entries: Vec<TeardownEntry>,
}

impl TeardownStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TeardownEntry) {
        self.entries.push(entry);
    }

    /// Takes the most recently pushed entry
    pub fn pop(&mut self) -> Option<TeardownEntry> {
        self.entries.pop()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in push order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(TeardownEntry::name)
    }
}
