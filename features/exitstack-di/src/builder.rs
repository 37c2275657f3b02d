use std::sync::{Arc, OnceLock};

use crate::{
    dependency::{Dependency, Descriptor},
    dependency_graph::DependencyGraph,
    errors::GraphError,
    scheduler::Plan,
    types::Injectable,
};

/// Collects the dependency declarations of a [Blueprint]
///
/// Declaration order is registration order. It decides which declaration is
/// reported first on errors and breaks ties when ordering initialization.
pub struct BlueprintBuilder {
    descriptors: Vec<Descriptor>,
}
impl Default for BlueprintBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlueprintBuilder {
    pub fn new() -> Self {
        BlueprintBuilder {
            descriptors: Vec::new(),
        }
    }
}
impl BlueprintBuilder {
    pub fn register<T: Injectable>(mut self, dependency: Dependency<T>) -> Self {
        self.descriptors.push(dependency.into_descriptor());
        self
    }

    pub fn register_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Freezes the declarations
    ///
    /// The declarations are not validated here, see [Blueprint::validate].
    pub fn build(self) -> Arc<Blueprint> {
        Arc::new(Blueprint {
            descriptors: self.descriptors,
            plan: OnceLock::new(),
        })
    }
}

/// Immutable set of dependency declarations shared by every container built from it
#[derive(Debug)]
pub struct Blueprint {
    descriptors: Vec<Descriptor>,
    plan: OnceLock<Result<Plan, GraphError>>,
}

impl Blueprint {
    pub fn builder() -> BlueprintBuilder {
        BlueprintBuilder::new()
    }

    /// Declarations in declaration order
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Validates the declarations and computes the initialization plan
    ///
    /// Done once per blueprint, later calls return the cached result.
    pub fn validate(&self) -> Result<&Plan, GraphError> {
        self.plan
            .get_or_init(|| {
                let graph = DependencyGraph::new(&self.descriptors)?;
                graph.check()?;
                let plan = Plan::new(&graph);

                tracing::debug!(
                    "Resolution order: [{}]",
                    plan.order()
                        .iter()
                        .map(|&i| graph.name(i))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                Ok(plan)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Dependency names in the order they are initialized
    pub fn resolution_order(&self) -> Result<Vec<&str>, GraphError> {
        let plan = self.validate()?;
        Ok(plan
            .order()
            .iter()
            .map(|&i| self.descriptors[i].name())
            .collect())
    }
}
