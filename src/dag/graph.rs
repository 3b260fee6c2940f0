// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::engine::TaskName;
use crate::errors::{FiledagError, Result};
use crate::rules::Registry;

/// Internal node structure: stores immediate deps, dependents and rank.
#[derive(Debug, Clone)]
struct DagNode {
    /// Direct dependencies: tasks that must finish before this one starts.
    deps: Vec<TaskName>,
    /// Direct dependents: tasks that follow this one.
    dependents: Vec<TaskName>,
    /// 0 for tasks without dependencies, else 1 + the highest dependency rank.
    rank: usize,
}

/// In-memory DAG keyed by task name. An edge A -> B means B follows A.
///
/// Construction rejects unknown `follows` references and cycles, so every
/// `DagGraph` in hand is acyclic and closed.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: BTreeMap<TaskName, DagNode>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl DagGraph {
    /// Build the graph for every declaration in a registry.
    pub fn build(registry: &Registry) -> Result<Self> {
        Self::from_follows(
            registry
                .iter()
                .map(|decl| (decl.name.clone(), decl.follows.clone())),
        )
    }

    /// Build from `(task, follows)` pairs.
    pub fn from_follows<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (TaskName, Vec<TaskName>)>,
    {
        let mut nodes: BTreeMap<TaskName, DagNode> = BTreeMap::new();
        for (name, deps) in entries {
            nodes.insert(
                name,
                DagNode {
                    deps,
                    dependents: Vec::new(),
                    rank: 0,
                },
            );
        }

        // Second pass: reject unknown references and populate dependents.
        let names: Vec<TaskName> = nodes.keys().cloned().collect();
        for name in &names {
            let deps = nodes.get(name).map(|n| n.deps.clone()).unwrap_or_default();
            for dep in deps {
                match nodes.get_mut(&dep) {
                    Some(dep_node) => dep_node.dependents.push(name.clone()),
                    None => {
                        return Err(FiledagError::ConfigError(format!(
                            "task '{name}' follows unknown task '{dep}'"
                        )));
                    }
                }
            }
        }

        let mut graph = Self { nodes };
        graph.check_acyclic()?;
        graph.assign_ranks();
        Ok(graph)
    }

    /// Depth-first search with white/gray/black marking; a gray node reached
    /// again closes a cycle, reported from its first member in path order.
    fn check_acyclic(&self) -> Result<()> {
        let mut colors: HashMap<&str, Color> = self
            .nodes
            .keys()
            .map(|n| (n.as_str(), Color::White))
            .collect();
        let mut path: Vec<&str> = Vec::new();

        for start in self.nodes.keys() {
            if colors.get(start.as_str()) == Some(&Color::White) {
                self.visit(start, &mut colors, &mut path)?;
            }
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        colors: &mut HashMap<&'a str, Color>,
        path: &mut Vec<&'a str>,
    ) -> Result<()> {
        colors.insert(name, Color::Gray);
        path.push(name);

        for dep in self.dependencies_of(name) {
            match colors.get(dep.as_str()).copied().unwrap_or(Color::Black) {
                Color::White => self.visit(dep, colors, path)?,
                Color::Gray => {
                    let start = path.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                    // Path runs against the edges; report in follows order.
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|n| n.to_string()).collect();
                    cycle.reverse();
                    cycle.rotate_right(1);
                    return Err(FiledagError::DagCycle(cycle));
                }
                Color::Black => {}
            }
        }

        path.pop();
        colors.insert(name, Color::Black);
        Ok(())
    }

    fn assign_ranks(&mut self) {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for (name, node) in &self.nodes {
            graph.add_node(name.as_str());
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        // Acyclicity was checked above, so the sort cannot fail.
        let order: Vec<TaskName> = match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(str::to_string).collect(),
            Err(_) => return,
        };

        let mut ranks: HashMap<TaskName, usize> = HashMap::new();
        for name in order {
            let rank = self
                .dependencies_of(&name)
                .iter()
                .filter_map(|d| ranks.get(d))
                .map(|r| r + 1)
                .max()
                .unwrap_or(0);
            ranks.insert(name, rank);
        }
        for (name, node) in self.nodes.iter_mut() {
            node.rank = ranks.get(name).copied().unwrap_or(0);
        }
    }

    /// All task names, sorted.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate dependencies of a task (its `follows`).
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task (tasks that follow it).
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn rank(&self, name: &str) -> Option<usize> {
        self.nodes.get(name).map(|n| n.rank)
    }

    /// Tasks ordered by (rank, name); every task comes after its dependencies.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut order: Vec<(usize, &str)> = self
            .nodes
            .iter()
            .map(|(name, node)| (node.rank, name.as_str()))
            .collect();
        order.sort();
        order.into_iter().map(|(_, name)| name).collect()
    }

    /// The given tasks plus everything they transitively follow.
    pub fn with_dependencies(&self, roots: &[TaskName]) -> Result<BTreeSet<TaskName>> {
        let mut selected = BTreeSet::new();
        let mut stack: Vec<TaskName> = Vec::new();
        for root in roots {
            if !self.contains(root) {
                return Err(FiledagError::TaskNotFound(root.clone()));
            }
            stack.push(root.clone());
        }
        while let Some(name) = stack.pop() {
            if selected.insert(name.clone()) {
                stack.extend(self.dependencies_of(&name).iter().cloned());
            }
        }
        Ok(selected)
    }
}
