//! Package dependency graph
//!
//! Builds the graph of packages from their declared dependencies, computes
//! build order and detects dependency cycles.

use std::collections::{btree_set, BTreeMap, BTreeSet, HashMap};

use crate::core::package::Package;
use crate::error::GraphError;

/// A package with its edges in both directions
#[derive(Debug, Clone)]
struct Node {
    package: Package,
    /// Packages this one depends on
    dependencies: BTreeSet<String>,
    /// Packages depending on this one
    dependents: BTreeSet<String>,
}

/// Depth-first visit state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Dependency graph for packages
///
/// Edges only reference packages present in the graph. Nodes are kept in
/// name order, which makes every traversal deterministic.
#[derive(Debug, Clone, Default)]
pub struct PackageGraph {
    nodes: BTreeMap<String, Node>,
}

impl PackageGraph {
    /// Build the graph from a set of packages
    ///
    /// # Errors
    ///
    /// - `DuplicatePackage` if two packages share a name
    /// - `SelfDependency` if a package depends on itself
    /// - `UnknownDependency` if an edge points outside the set
    pub fn build<I>(packages: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = Package>,
    {
        let mut nodes = BTreeMap::new();
        for package in packages {
            let name = package.name.clone();
            let dependencies = package
                .all_dependencies()
                .into_iter()
                .map(str::to_string)
                .collect();
            let node = Node {
                package,
                dependencies,
                dependents: BTreeSet::new(),
            };
            if nodes.insert(name.clone(), node).is_some() {
                return Err(GraphError::DuplicatePackage { package: name });
            }
        }

        let mut inbound: Vec<(String, String)> = Vec::new();
        for (name, node) in &nodes {
            for dep in &node.dependencies {
                if dep == name {
                    return Err(GraphError::SelfDependency {
                        package: name.clone(),
                    });
                }
                if !nodes.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        package: name.clone(),
                        dependency: dep.clone(),
                    });
                }
                inbound.push((dep.clone(), name.clone()));
            }
        }
        for (dep, dependent) in inbound {
            if let Some(node) = nodes.get_mut(&dep) {
                node.dependents.insert(dependent);
            }
        }

        Ok(Self { nodes })
    }

    /// Number of packages
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no packages
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a package is in the graph
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Look up a package
    pub fn get(&self, name: &str) -> Option<&Package> {
        self.nodes.get(name).map(|n| &n.package)
    }

    /// All packages in name order
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.nodes.values().map(|n| &n.package)
    }

    /// Direct dependencies of a package
    pub fn dependencies(&self, name: &str) -> impl Iterator<Item = &str> {
        self.nodes
            .get(name)
            .into_iter()
            .flat_map(|n| n.dependencies.iter().map(String::as_str))
    }

    /// Direct dependents of a package
    pub fn dependents(&self, name: &str) -> impl Iterator<Item = &str> {
        self.nodes
            .get(name)
            .into_iter()
            .flat_map(|n| n.dependents.iter().map(String::as_str))
    }

    /// Everything a package depends on, directly or not
    pub fn transitive_dependencies(&self, name: &str) -> BTreeSet<String> {
        self.walk(name, |node| &node.dependencies)
    }

    /// Everything that depends on a package, directly or not
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        self.walk(name, |node| &node.dependents)
    }

    fn walk<'a, F>(&'a self, start: &str, next: F) -> BTreeSet<String>
    where
        F: Fn(&'a Node) -> &'a BTreeSet<String>,
    {
        let mut seen = BTreeSet::new();
        let mut todo: Vec<&str> = vec![start];
        while let Some(current) = todo.pop() {
            if let Some(node) = self.nodes.get(current) {
                for neighbour in next(node) {
                    if seen.insert(neighbour.clone()) {
                        todo.push(neighbour);
                    }
                }
            }
        }
        seen.remove(start);
        seen
    }

    /// Compute topological order (build order)
    ///
    /// Returns packages in order such that dependencies come before
    /// dependents. Unrelated packages are visited in name order, so the
    /// result is the same on every call.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` with every member of the first cycle found.
    pub fn topological_order(&self) -> Result<Vec<&Package>, GraphError> {
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.nodes.len());
        let mut result = Vec::with_capacity(self.nodes.len());

        for name in self.nodes.keys() {
            self.visit(name, &mut marks, &mut result)?;
        }

        Ok(result)
    }

    /// Depth-first visit from `root` with an explicit stack
    ///
    /// The stack holds the current path, so a dependency found in progress
    /// closes a cycle made of the stack entries above it.
    fn visit<'a>(
        &'a self,
        root: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        result: &mut Vec<&'a Package>,
    ) -> Result<(), GraphError> {
        if marks.contains_key(root) {
            return Ok(());
        }
        let Some(node) = self.nodes.get(root) else {
            return Ok(());
        };

        marks.insert(root, Mark::InProgress);
        let mut stack: Vec<(&'a str, &'a Node, btree_set::Iter<'a, String>)> =
            vec![(root, node, node.dependencies.iter())];

        while let Some(top) = stack.last_mut() {
            let (name, node) = (top.0, top.1);
            let Some(dep) = top.2.next() else {
                marks.insert(name, Mark::Done);
                result.push(&node.package);
                stack.pop();
                continue;
            };

            match marks.get(dep.as_str()) {
                Some(Mark::Done) => {}
                Some(Mark::InProgress) => {
                    let start = stack
                        .iter()
                        .position(|(n, ..)| *n == dep.as_str())
                        .unwrap_or(0);
                    return Err(GraphError::CycleDetected {
                        cycle: stack[start..].iter().map(|(n, ..)| (*n).to_string()).collect(),
                    });
                }
                None => {
                    if let Some(dep_node) = self.nodes.get(dep.as_str()) {
                        marks.insert(dep.as_str(), Mark::InProgress);
                        stack.push((dep.as_str(), dep_node, dep_node.dependencies.iter()));
                    }
                }
            }
        }

        Ok(())
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        self.topological_order().is_err()
    }

    /// Restrict the graph to the seeds plus everything they depend on
    ///
    /// # Errors
    ///
    /// Returns `UnknownPackage` if a seed is not in the graph.
    pub fn subgraph_reachable_from<I, S>(&self, seeds: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keep = BTreeSet::new();
        for seed in seeds {
            let seed = seed.as_ref();
            if !self.contains(seed) {
                return Err(GraphError::UnknownPackage {
                    package: seed.to_string(),
                });
            }
            keep.insert(seed.to_string());
            keep.extend(self.transitive_dependencies(seed));
        }

        let nodes = self
            .nodes
            .iter()
            .filter(|(name, _)| keep.contains(*name))
            .map(|(name, node)| {
                let mut node = node.clone();
                // Dependencies of kept nodes are always kept; dependents may not be
                node.dependents.retain(|d| keep.contains(d));
                (name.clone(), node)
            })
            .collect();

        Ok(Self { nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::version::VersionRecord;
    use crate::test_utils::generators;
    use proptest::prelude::*;

    fn pkg(name: &str, deps: &[&str]) -> Package {
        Package::new(name, VersionRecord::new(0, "1.0", 1)).with_depends(deps.iter().copied())
    }

    fn names(order: &[&Package]) -> Vec<String> {
        order.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn test_simple_dependency_order() {
        let graph = PackageGraph::build(vec![pkg("app", &["lib"]), pkg("lib", &[])]).unwrap();

        let order = names(&graph.topological_order().unwrap());
        assert_eq!(order, vec!["lib", "app"]);
    }

    #[test]
    fn test_ties_broken_by_name() {
        let graph = PackageGraph::build(vec![
            pkg("c", &["a"]),
            pkg("b", &["a"]),
            pkg("a", &[]),
            pkg("d", &[]),
        ])
        .unwrap();

        let order = names(&graph.topological_order().unwrap());
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_long_chain_does_not_exhaust_stack() {
        let count = 50_000;
        let packages: Vec<Package> = (0..count)
            .map(|i| {
                let deps: Vec<String> = if i == 0 {
                    Vec::new()
                } else {
                    vec![format!("p{:05}", i - 1)]
                };
                Package::new(format!("p{i:05}"), VersionRecord::new(0, "1", 1)).with_depends(deps)
            })
            .collect();
        let graph = PackageGraph::build(packages).unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(order.len(), count);
        assert_eq!(order[0].name, "p00000");
        assert_eq!(order[count - 1].name, format!("p{:05}", count - 1));
    }

    #[test]
    fn test_makedepends_are_edges() {
        let graph = PackageGraph::build(vec![
            Package::new("app", VersionRecord::new(0, "1", 1)).with_makedepends(["cmake"]),
            pkg("cmake", &[]),
        ])
        .unwrap();

        assert_eq!(graph.dependencies("app").collect::<Vec<_>>(), vec!["cmake"]);
        assert_eq!(graph.dependents("cmake").collect::<Vec<_>>(), vec!["app"]);
    }

    #[test]
    fn test_circular_dependency_detection() {
        let graph = PackageGraph::build(vec![
            pkg("a", &["b"]),
            pkg("b", &["c"]),
            pkg("c", &["a"]),
            pkg("d", &["a"]),
        ])
        .unwrap();

        assert!(graph.has_cycle());
        match graph.topological_order() {
            Err(GraphError::CycleDetected { cycle }) => {
                assert_eq!(cycle, vec!["a", "b", "c"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let result = PackageGraph::build(vec![pkg("app", &["missing"])]);
        assert_eq!(
            result.unwrap_err(),
            GraphError::UnknownDependency {
                package: "app".to_string(),
                dependency: "missing".to_string(),
            }
        );
    }

    #[test]
    fn test_self_dependency_rejected() {
        let result = PackageGraph::build(vec![pkg("app", &["app"])]);
        assert!(matches!(result, Err(GraphError::SelfDependency { .. })));
    }

    #[test]
    fn test_duplicate_package_rejected() {
        let result = PackageGraph::build(vec![pkg("app", &[]), pkg("app", &[])]);
        assert!(matches!(result, Err(GraphError::DuplicatePackage { .. })));
    }

    #[test]
    fn test_subgraph_includes_dependencies_only() {
        let graph = PackageGraph::build(vec![
            pkg("base", &[]),
            pkg("lib", &["base"]),
            pkg("app", &["lib"]),
            pkg("other", &["base"]),
        ])
        .unwrap();

        let sub = graph.subgraph_reachable_from(["app"]).unwrap();
        let kept: Vec<&str> = sub.packages().map(|p| p.name.as_str()).collect();
        assert_eq!(kept, vec!["app", "base", "lib"]);
        assert_eq!(sub.dependents("base").collect::<Vec<_>>(), vec!["lib"]);
    }

    #[test]
    fn test_subgraph_unknown_seed() {
        let graph = PackageGraph::build(vec![pkg("base", &[])]).unwrap();
        assert!(matches!(
            graph.subgraph_reachable_from(["nope"]),
            Err(GraphError::UnknownPackage { .. })
        ));
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = PackageGraph::build(vec![
            pkg("a", &[]),
            pkg("b", &["a"]),
            pkg("c", &["b"]),
            pkg("d", &[]),
        ])
        .unwrap();

        let dependents: Vec<String> = graph.transitive_dependents("a").into_iter().collect();
        assert_eq!(dependents, vec!["b", "c"]);
        assert!(graph.transitive_dependents("d").is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_dependencies_precede_dependents(packages in generators::acyclic_packages()) {
            let graph = PackageGraph::build(packages).unwrap();
            let order = graph.topological_order().unwrap();
            prop_assert_eq!(order.len(), graph.len());

            let position: HashMap<&str, usize> = order
                .iter()
                .enumerate()
                .map(|(i, p)| (p.name.as_str(), i))
                .collect();
            for package in graph.packages() {
                for dep in graph.dependencies(&package.name) {
                    prop_assert!(position[dep] < position[package.name.as_str()]);
                }
            }
        }

        #[test]
        fn prop_order_is_deterministic(packages in generators::acyclic_packages()) {
            let mut reversed = packages.clone();
            reversed.reverse();
            let first = PackageGraph::build(packages).unwrap();
            let second = PackageGraph::build(reversed).unwrap();
            prop_assert_eq!(
                names(&first.topological_order().unwrap()),
                names(&second.topological_order().unwrap())
            );
            prop_assert_eq!(
                names(&first.topological_order().unwrap()),
                names(&first.topological_order().unwrap())
            );
        }

        #[test]
        fn prop_ring_cycle_names_every_member(size in 2usize..8) {
            let packages: Vec<Package> = (0..size)
                .map(|i| {
                    let next = format!("n{}", (i + 1) % size);
                    Package::new(format!("n{i}"), VersionRecord::new(0, "1", 1))
                        .with_depends([next])
                })
                .collect();
            let graph = PackageGraph::build(packages).unwrap();
            match graph.topological_order() {
                Err(GraphError::CycleDetected { cycle }) => {
                    let members: BTreeSet<String> = cycle.into_iter().collect();
                    let expected: BTreeSet<String> = (0..size).map(|i| format!("n{i}")).collect();
                    prop_assert_eq!(members, expected);
                }
                other => prop_assert!(false, "expected cycle, got {:?}", other),
            }
        }
    }
}
