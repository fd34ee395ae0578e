//! Dependency ordering across entity types.
//!
//! Edges mean "producer must sync before consumer". The order is a topological sort computed with
//! Kahn's algorithm; among nodes that are ready at the same time, the one declared first wins.
//! A cycle is reported as a configuration error rather than returned as a partial order.

use super::types::{EntityType, SyncError};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

/// Declared dependency graph over nodes of type `N`
#[derive(Debug, Clone)]
pub struct DependencyAnalyzer<N = EntityType> {
    /// Nodes in declaration (priority) order
    nodes: Vec<N>,
    edges: HashMap<N, Vec<N>>,
}

impl<N: Copy + Eq + Hash + Debug> DependencyAnalyzer<N> {
    pub fn new(nodes: impl IntoIterator<Item = N>) -> Self {
        let mut unique = Vec::new();
        for node in nodes {
            if !unique.contains(&node) {
                unique.push(node);
            }
        }
        Self {
            nodes: unique,
            edges: HashMap::new(),
        }
    }

    /// Declare that `producer` must sync before each of `consumers`
    pub fn declare(&mut self, producer: N, consumers: impl IntoIterator<Item = N>) -> &mut Self {
        let targets = self.edges.entry(producer).or_default();
        for consumer in consumers {
            if !targets.contains(&consumer) {
                targets.push(consumer);
            }
        }
        self
    }

    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// Consumers declared for a producer
    pub fn dependents(&self, producer: N) -> &[N] {
        self.edges
            .get(&producer)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Producers a consumer waits for
    pub fn dependencies(&self, consumer: N) -> Vec<N> {
        self.nodes
            .iter()
            .copied()
            .filter(|producer| self.dependents(*producer).contains(&consumer))
            .collect()
    }

    /// Compute a safe sync order.
    ///
    /// # Errors
    /// `SyncError::Configuration` when an edge names an undeclared node or the graph is cyclic.
    pub fn sync_order(&self) -> Result<Vec<N>, SyncError> {
        let priority: HashMap<N, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (*node, index))
            .collect();

        let mut in_degree = vec![0usize; self.nodes.len()];
        for (producer, consumers) in &self.edges {
            if !priority.contains_key(producer) {
                return Err(SyncError::Configuration(format!(
                    "Dependency declared for unknown entity type {:?}",
                    producer
                )));
            }
            for consumer in consumers {
                let index = priority.get(consumer).ok_or_else(|| {
                    SyncError::Configuration(format!(
                        "Dependency declared on unknown entity type {:?}",
                        consumer
                    ))
                })?;
                in_degree[*index] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(index, _)| Reverse(index))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(Reverse(index)) = ready.pop() {
            let node = self.nodes[index];
            order.push(node);
            for consumer in self.dependents(node) {
                let consumer_index = priority[consumer];
                in_degree[consumer_index] -= 1;
                if in_degree[consumer_index] == 0 {
                    ready.push(Reverse(consumer_index));
                }
            }
        }

        if order.len() < self.nodes.len() {
            let remaining: Vec<N> = self
                .nodes
                .iter()
                .copied()
                .filter(|node| !order.contains(node))
                .collect();
            return Err(SyncError::Configuration(format!(
                "Cyclic dependency between entity types: {:?}",
                remaining
            )));
        }

        Ok(order)
    }
}

/// The dependency graph of the built-in entity types
pub fn entity_dependencies() -> DependencyAnalyzer<EntityType> {
    use EntityType::*;

    let mut analyzer = DependencyAnalyzer::new(EntityType::ALL);
    analyzer
        .declare(ShowTypes, [ShowTemplates, Shows])
        .declare(Seasons, [Shows])
        .declare(ShowTemplates, [Shows])
        .declare(Shows, [Segments])
        .declare(
            Wrestlers,
            [Factions, Teams, Titles, Injuries, Rivalries, Segments],
        )
        .declare(Factions, [Teams]);
    analyzer
}
