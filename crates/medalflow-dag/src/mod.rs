//! Directed acyclic graph of node dependencies.
//!
//! Used by the planner to model read-after-write dependencies between
//! operations, but deliberately generic: nodes are strings, edges point
//! from a node to what it depends on. Insertion order is preserved so
//! stage layering is deterministic in discovery order.

use std::collections::{BTreeSet, HashMap, VecDeque};

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use medalflow_error::{FlowResult, circular_dependency};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDag {
    /// Maps each node to its list of direct dependencies.
    adjacency_list: IndexMap<String, Vec<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl DependencyDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with no dependencies. No-op when it already exists.
    pub fn add_node(&mut self, node: impl Into<String>) {
        self.adjacency_list.entry(node.into()).or_default();
    }

    /// Add an edge: `from_node` depends on `to_node`. The target is also
    /// registered as a node so every edge target appears as a key.
    pub fn add_edge(&mut self, from_node: impl Into<String>, to_node: impl Into<String>) {
        let to_node = to_node.into();
        let deps = self.adjacency_list.entry(from_node.into()).or_default();
        if !deps.contains(&to_node) {
            deps.push(to_node.clone());
        }
        self.adjacency_list.entry(to_node).or_default();
    }

    pub fn add_edges<I, S>(&mut self, from_node: impl Into<String>, to_nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let from_node = from_node.into();
        for to_node in to_nodes {
            self.add_edge(from_node.clone(), to_node);
        }
    }

    pub fn contains(&self, node: &str) -> bool {
        self.adjacency_list.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.adjacency_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency_list.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.adjacency_list.keys().map(String::as_str)
    }

    /// Direct dependencies of a node.
    pub fn dependencies(&self, node: &str) -> &[String] {
        self.adjacency_list
            .get(node)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Nodes that directly depend on `node`.
    pub fn dependents(&self, node: &str) -> Vec<&str> {
        self.adjacency_list
            .iter()
            .filter(|(_, deps)| deps.iter().any(|d| d == node))
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Direct and transitive dependencies of a node.
    pub fn all_dependencies(&self, node: &str) -> BTreeSet<String> {
        self.closure(node, |dag, n| {
            dag.dependencies(n).iter().map(String::clone).collect()
        })
    }

    /// Direct and transitive dependents of a node.
    pub fn all_dependents(&self, node: &str) -> BTreeSet<String> {
        self.closure(node, |dag, n| {
            dag.dependents(n).into_iter().map(String::from).collect()
        })
    }

    fn closure(
        &self,
        node: &str,
        neighbors: impl Fn(&Self, &str) -> Vec<String>,
    ) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<String> = neighbors(self, node).into();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next.clone()) {
                queue.extend(neighbors(self, &next));
            }
        }
        seen
    }

    pub fn is_reachable(&self, from_node: &str, to_node: &str) -> bool {
        self.all_dependencies(from_node).contains(to_node)
    }

    /// Reverse adjacency: each node to the nodes that depend on it.
    pub fn reverse_graph(&self) -> IndexMap<String, Vec<String>> {
        let mut reverse: IndexMap<String, Vec<String>> = IndexMap::new();
        for (node, deps) in &self.adjacency_list {
            for dep in deps {
                reverse.entry(dep.clone()).or_default().push(node.clone());
            }
        }
        reverse
    }

    /// In-degree of every node, counting its dependency edges.
    pub fn in_degrees(&self) -> HashMap<String, usize> {
        self.adjacency_list
            .iter()
            .map(|(node, deps)| (node.clone(), deps.len()))
            .collect()
    }

    /// Tri-color DFS cycle detection. A gray-node revisit is a back edge.
    pub fn has_cycles(&self) -> bool {
        let mut color: HashMap<&str, Color> = self
            .adjacency_list
            .keys()
            .map(|n| (n.as_str(), Color::White))
            .collect();

        for node in self.adjacency_list.keys() {
            if color[node.as_str()] == Color::White && self.cycle_from(node, &mut color) {
                return true;
            }
        }
        false
    }

    fn cycle_from<'a>(&'a self, node: &'a str, color: &mut HashMap<&'a str, Color>) -> bool {
        match color.get(node) {
            Some(Color::Gray) => return true,
            Some(Color::Black) => return false,
            _ => {}
        }
        color.insert(node, Color::Gray);
        for neighbor in self.dependencies(node) {
            if self.cycle_from(neighbor, color) {
                return true;
            }
        }
        color.insert(node, Color::Black);
        false
    }

    /// Kahn's algorithm. Fails on cyclic graphs.
    pub fn topological_sort(&self) -> FlowResult<Vec<String>> {
        if self.has_cycles() {
            return Err(circular_dependency(
                "cannot perform topological sort on a graph with cycles",
            ));
        }

        let reverse = self.reverse_graph();
        let mut in_degree = self.in_degrees();
        let mut queue: VecDeque<String> = self
            .adjacency_list
            .keys()
            .filter(|n| in_degree[n.as_str()] == 0)
            .cloned()
            .collect();

        let mut result = Vec::with_capacity(self.len());
        while let Some(node) = queue.pop_front() {
            for dependent in reverse.get(&node).map(Vec::as_slice).unwrap_or_default() {
                let remaining = in_degree
                    .get_mut(dependent.as_str())
                    .expect("dependent is a known node");
                *remaining -= 1;
                if *remaining == 0 {
                    queue.push_back(dependent.clone());
                }
            }
            result.push(node);
        }
        Ok(result)
    }

    /// Layered topological partition: each returned stage holds the nodes
    /// whose remaining in-degree reached zero, i.e. nodes that may execute
    /// in parallel once every earlier stage finished.
    pub fn execution_stages(&self) -> FlowResult<Vec<Vec<String>>> {
        if self.has_cycles() {
            return Err(circular_dependency(
                "cannot create execution stages for a graph with cycles",
            ));
        }

        let reverse = self.reverse_graph();
        let mut in_degree = self.in_degrees();
        let mut processed: BTreeSet<&str> = BTreeSet::new();
        let mut stages = Vec::new();

        while processed.len() < self.len() {
            let current_stage: Vec<String> = self
                .adjacency_list
                .keys()
                .filter(|n| in_degree[n.as_str()] == 0 && !processed.contains(n.as_str()))
                .cloned()
                .collect();

            if current_stage.is_empty() {
                // Unreachable after the cycle check above; kept as a guard
                // against graph mutation mid-layering.
                return Err(circular_dependency(
                    "could not create execution stages - possible hidden cycle",
                ));
            }

            for node in &current_stage {
                processed.insert(self.key(node));
                for dependent in reverse.get(node).map(Vec::as_slice).unwrap_or_default() {
                    *in_degree
                        .get_mut(dependent.as_str())
                        .expect("dependent is a known node") -= 1;
                }
            }
            stages.push(current_stage);
        }
        Ok(stages)
    }

    fn key(&self, node: &str) -> &str {
        self.adjacency_list
            .get_key_value(node)
            .map(|(k, _)| k.as_str())
            .expect("node is a known key")
    }

    /// Subgraph induced by `nodes`; edges leaving the set are dropped.
    pub fn subgraph(&self, nodes: &BTreeSet<String>) -> DependencyDag {
        let mut sub = DependencyDag::new();
        for node in nodes {
            if let Some(deps) = self.adjacency_list.get(node) {
                let kept = deps.iter().filter(|d| nodes.contains(*d)).collect_vec();
                if kept.is_empty() {
                    sub.add_node(node.clone());
                } else {
                    sub.add_edges(node.clone(), kept.into_iter().cloned());
                }
            }
        }
        sub
    }

    pub fn remove_node(&mut self, node: &str) {
        self.adjacency_list.shift_remove(node);
        for deps in self.adjacency_list.values_mut() {
            deps.retain(|d| d != node);
        }
    }

    pub fn remove_edge(&mut self, from_node: &str, to_node: &str) {
        if let Some(deps) = self.adjacency_list.get_mut(from_node) {
            deps.retain(|d| d != to_node);
        }
    }

    /// A copy of the adjacency list for plan emission.
    pub fn adjacency_list(&self) -> IndexMap<String, Vec<String>> {
        self.adjacency_list.clone()
    }
}
