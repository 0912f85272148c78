use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::descriptor::EntityDescriptor;
use crate::error::SchemaError;
use crate::types::TypeTag;

/// Summary of dependency graph structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Report for entity dependency ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphReport {
    pub summary: GraphSummary,
    pub order: Option<Vec<String>>,
    pub cycle: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Directed graph with an edge `target -> source` for every cross-type relation.
///
/// Nodes keep their registration order, which also breaks ties in the
/// topological order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    tags: Vec<TypeTag>,
    names: Vec<String>,
    index: HashMap<TypeTag, usize>,
    edges: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph over every entity and the relations they declare.
    pub fn from_entities(entities: &[EntityDescriptor]) -> Self {
        let mut graph = Self::new();
        for entity in entities {
            graph.add_node(entity.tag(), entity.name());
        }
        for entity in entities {
            for relation in entity.relations() {
                graph.add_dependency(relation.target(), relation.source());
            }
        }
        graph
    }

    pub fn add_node(&mut self, tag: TypeTag, name: impl Into<String>) {
        if self.index.contains_key(&tag) {
            return;
        }
        self.index.insert(tag, self.tags.len());
        self.tags.push(tag);
        self.names.push(name.into());
        self.edges.push(BTreeSet::new());
    }

    /// Record that `target` must exist before `source`.
    ///
    /// Self edges and edges touching unknown nodes are ignored.
    pub fn add_dependency(&mut self, target: TypeTag, source: TypeTag) {
        if target == source {
            return;
        }
        let (Some(&from), Some(&to)) = (self.index.get(&target), self.index.get(&source)) else {
            return;
        };
        self.edges[from].insert(to);
    }

    pub fn node_count(&self) -> usize {
        self.tags.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(BTreeSet::len).sum()
    }

    /// First cycle found by depth-first search, as the path of type names from
    /// the back-edge target to the node that closes it.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.tags.len()];
        let mut path = Vec::new();

        for node in 0..self.tags.len() {
            if marks[node] == Mark::Unvisited
                && let Some(cycle) = self.visit(node, &mut marks, &mut path)
            {
                return Some(cycle.into_iter().map(|idx| self.names[idx].clone()).collect());
            }
        }
        None
    }

    fn visit(&self, node: usize, marks: &mut [Mark], path: &mut Vec<usize>) -> Option<Vec<usize>> {
        marks[node] = Mark::InProgress;
        path.push(node);

        for &next in &self.edges[node] {
            match marks[next] {
                Mark::InProgress => {
                    let start = path.iter().position(|idx| *idx == next).unwrap_or(0);
                    return Some(path[start..].to_vec());
                }
                Mark::Unvisited => {
                    if let Some(cycle) = self.visit(next, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        path.pop();
        marks[node] = Mark::Done;
        None
    }

    /// Kahn's algorithm; on failure returns the names still holding in-degree.
    fn toposort(&self) -> Result<Vec<usize>, Vec<String>> {
        let mut indegree = vec![0_usize; self.tags.len()];
        for targets in &self.edges {
            for &target in targets {
                indegree[target] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = indegree
            .iter()
            .enumerate()
            .filter_map(|(node, count)| if *count == 0 { Some(node) } else { None })
            .collect();

        let mut order = Vec::with_capacity(self.tags.len());
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &target in &self.edges[node] {
                let count = &mut indegree[target];
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.insert(target);
                }
            }
        }

        if order.len() == self.tags.len() {
            Ok(order)
        } else {
            Err(indegree
                .iter()
                .enumerate()
                .filter_map(|(node, count)| (*count > 0).then(|| self.names[node].clone()))
                .collect())
        }
    }

    /// Linear generation order placing every target before its sources.
    pub fn generation_order(&self) -> Result<Vec<TypeTag>, SchemaError> {
        if let Some(cycle) = self.find_cycle() {
            return Err(SchemaError::Cycle(cycle));
        }
        let order = self.toposort().map_err(SchemaError::Cycle)?;
        Ok(order.into_iter().map(|idx| self.tags[idx]).collect())
    }

    pub fn report(&self) -> GraphReport {
        let summary = GraphSummary {
            nodes: self.node_count(),
            edges: self.edge_count(),
        };

        if let Some(cycle) = self.find_cycle() {
            return GraphReport {
                summary,
                order: None,
                cycle: Some(cycle),
            };
        }

        match self.toposort() {
            Ok(order) => GraphReport {
                summary,
                order: Some(order.into_iter().map(|idx| self.names[idx].clone()).collect()),
                cycle: None,
            },
            Err(cycle) => GraphReport {
                summary,
                order: None,
                cycle: Some(cycle),
            },
        }
    }
}
