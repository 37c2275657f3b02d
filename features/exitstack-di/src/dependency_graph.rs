use std::collections::HashMap;

use crate::{dependency::Descriptor, errors::GraphError};

/// Reference graph over the declared dependencies
///
/// Nodes are identified by their declaration index, edges point from a
/// dependency to the dependencies it references.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    references: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Builds the graph, resolving every reference to a declared dependency
    ///
    /// Fails on the first duplicate name, then on the first unresolved reference,
    /// both in declaration order.
    pub fn new(descriptors: &[Descriptor]) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (i, descriptor) in descriptors.iter().enumerate() {
            if index.insert(descriptor.name(), i).is_some() {
                return Err(GraphError::Duplicate(descriptor.name().to_string()));
            }
        }

        let mut references = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let mut edges = Vec::new();
            for target in descriptor.references() {
                let Some(&dependency) = index.get(target) else {
                    return Err(GraphError::UnresolvedReference {
                        name: descriptor.name().to_string(),
                        missing: target.to_string(),
                    });
                };

                // The same dependency can be passed as several arguments
                if !edges.contains(&dependency) {
                    edges.push(dependency);
                }
            }
            references.push(edges);
        }

        Ok(DependencyGraph {
            names: descriptors.iter().map(|d| d.name().to_string()).collect(),
            references,
        })
    }

    /// Validate the graph is acyclic
    ///
    /// Walks the graph depth first in declaration order and returns the first
    /// cycle found, a self reference being a cycle of one.
    pub fn check(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnPath,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.len()];
        // (node, index of the next reference to follow) - the nodes form the current path
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for start in 0..self.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            marks[start] = Mark::OnPath;
            stack.push((start, 0));

            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                frame.1 += 1;

                let Some(&dependency) = self.references[node].get(next) else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                };

                match marks[dependency] {
                    Mark::OnPath => return Err(self.cycle_error(&stack, dependency)),
                    Mark::Unvisited => {
                        marks[dependency] = Mark::OnPath;
                        stack.push((dependency, 0));
                    }
                    Mark::Done => {}
                }
            }
        }

        Ok(())
    }

    fn cycle_error(&self, stack: &[(usize, usize)], revisited: usize) -> GraphError {
        let begin = stack
            .iter()
            .position(|&(node, _)| node == revisited)
            .unwrap_or(0);

        let mut path: Vec<String> = stack[begin..]
            .iter()
            .map(|&(node, _)| self.names[node].clone())
            .collect();
        // Close the cycle
        path.push(self.names[revisited].clone());

        GraphError::CircularDependency { path }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of the dependency declared at `index`
    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// Declaration indices referenced by the dependency declared at `index`
    pub fn references(&self, index: usize) -> &[usize] {
        &self.references[index]
    }
}
