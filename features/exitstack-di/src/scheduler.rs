use std::{cmp::Reverse, collections::BinaryHeap};

use crate::dependency_graph::DependencyGraph;

/// Initialization order of a validated [DependencyGraph]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    order: Vec<usize>,
}

impl Plan {
    /// Topologically sorts a graph which passed [DependencyGraph::check]
    ///
    /// Every dependency comes after the dependencies it references. Among the
    /// dependencies ready at the same time the earliest declared goes first.
    pub fn new(graph: &DependencyGraph) -> Plan {
        let mut pending = vec![0usize; graph.len()];
        let mut dependents = vec![Vec::new(); graph.len()];
        for node in 0..graph.len() {
            pending[node] = graph.references(node).len();
            for &dependency in graph.references(node) {
                dependents[dependency].push(node);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = pending
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count == 0)
            .map(|(node, _)| Reverse(node))
            .collect();

        let mut order = Vec::with_capacity(graph.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &dependent in &dependents[node] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        debug_assert_eq!(order.len(), graph.len(), "graph must be acyclic");
        Plan { order }
    }

    /// Declaration indices in initialization order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        dependency::{Dependency, Descriptor},
        types::DynError,
        Arguments,
    };

    fn dep(name: &str, refs: &[String]) -> Descriptor {
        refs.iter()
            .enumerate()
            .fold(
                Dependency::from_fn(name, |_: Arguments| Ok::<_, DynError>(())),
                |dep, (i, target)| dep.reference(format!("arg{i}"), target.clone()),
            )
            .into_descriptor()
    }

    fn order_of(descriptors: &[Descriptor]) -> Vec<String> {
        let graph = DependencyGraph::new(descriptors).unwrap();
        graph.check().unwrap();
        Plan::new(&graph)
            .order()
            .iter()
            .map(|&i| graph.name(i).to_string())
            .collect()
    }

    fn refs(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn chain_is_ordered_by_references() {
        let order = order_of(&[
            dep("c", &refs(&["b"])),
            dep("b", &refs(&["a"])),
            dep("a", &[]),
        ]);
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn ties_follow_declaration_order() {
        let order = order_of(&[
            dep("zeta", &[]),
            dep("alpha", &[]),
            dep("app", &refs(&["alpha", "zeta"])),
            dep("mid", &[]),
        ]);
        assert_eq!(order, ["zeta", "alpha", "app", "mid"]);
    }

    #[test]
    fn earlier_declared_dependent_runs_as_soon_as_ready() {
        let order = order_of(&[
            dep("late", &refs(&["base"])),
            dep("base", &[]),
            dep("other", &[]),
        ]);
        assert_eq!(order, ["base", "late", "other"]);
    }

    #[test]
    fn empty_plan() {
        assert!(order_of(&[]).is_empty());
    }

    /// Random acyclic graphs: dependency `i` may only reference dependencies declared before it,
    /// then the declaration order is shuffled by `rotation`.
    fn acyclic_declarations() -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
        (1usize..12)
            .prop_flat_map(|size| {
                (
                    proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..4), size),
                    0..size,
                )
            })
            .prop_map(|(edges, rotation)| {
                let mut declarations: Vec<(String, Vec<String>)> = edges
                    .iter()
                    .enumerate()
                    .map(|(i, targets)| {
                        let mut refs: Vec<String> = if i == 0 {
                            Vec::new()
                        } else {
                            targets.iter().map(|t| format!("n{}", t.index(i))).collect()
                        };
                        refs.dedup();
                        (format!("n{i}"), refs)
                    })
                    .collect();
                declarations.rotate_left(rotation);
                declarations
            })
    }

    proptest! {
        #[test]
        fn prop_order_respects_every_reference(declarations in acyclic_declarations()) {
            let descriptors: Vec<_> = declarations
                .iter()
                .map(|(name, refs)| dep(name, refs))
                .collect();
            let order = order_of(&descriptors);

            prop_assert_eq!(order.len(), descriptors.len());
            let position = |name: &str| order.iter().position(|n| n == name).unwrap();
            for (name, refs) in &declarations {
                for target in refs {
                    prop_assert!(position(target) < position(name));
                }
            }
        }

        #[test]
        fn prop_order_is_deterministic(declarations in acyclic_declarations()) {
            let descriptors: Vec<_> = declarations
                .iter()
                .map(|(name, refs)| dep(name, refs))
                .collect();
            prop_assert_eq!(order_of(&descriptors), order_of(&descriptors));
        }
    }
}
