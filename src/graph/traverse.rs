//! Bounded BFS traversal over the knowledge graph.
//!
//! Cycle-safe breadth-first expansion from a seed node with per-edge-type
//! filters, a hop limit, a result cap and a soft wall-clock budget after
//! which a partial result is returned.

use crate::error::Result;
use crate::graph::{EdgeFilter, EdgeType, GraphEdge, NodeKey};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Configuration for a traversal.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// Maximum hop depth from the seed.
    pub max_hops: u32,
    /// Edge filter applied to every expansion.
    pub edge_filter: EdgeFilter,
    /// Maximum number of reached nodes to collect.
    pub max_results: usize,
    /// Soft wall-clock budget.
    pub budget: Duration,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_hops: 2,
            edge_filter: EdgeFilter::default(),
            max_results: 50,
            budget: Duration::from_secs(2),
        }
    }
}

/// A reached node with the relationship chain that led to it.
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalPath {
    /// The reached node.
    pub target: NodeKey,
    /// Hops from the seed.
    pub hops: u32,
    /// Relationship types along the path, seed-first.
    pub relationships: Vec<EdgeType>,
}

/// Result of a traversal.
#[derive(Debug, Clone, Default)]
pub struct TraversalResult {
    /// Paths to reached nodes, shallowest first.
    pub paths: Vec<TraversalPath>,
    /// Edges crossed during the traversal.
    pub edges: Vec<GraphEdge>,
    /// Whether the budget or result cap cut the traversal short.
    pub truncated: bool,
}

/// Performs a BFS from `seed`, expanding via `neighbors`.
///
/// `neighbors` returns the edges touching a node in both directions;
/// traversal follows them undirected, as cross-references are meaningful
/// both ways at query time.
pub fn bfs<F>(seed: &NodeKey, config: &TraversalConfig, mut neighbors: F) -> Result<TraversalResult>
where
    F: FnMut(&NodeKey) -> Result<Vec<GraphEdge>>,
{
    let started = Instant::now();
    let mut result = TraversalResult::default();
    let mut visited: HashSet<NodeKey> = HashSet::new();
    let mut chains: HashMap<NodeKey, Vec<EdgeType>> = HashMap::new();
    let mut queue: VecDeque<(NodeKey, u32)> = VecDeque::new();

    visited.insert(seed.clone());
    chains.insert(seed.clone(), Vec::new());
    queue.push_back((seed.clone(), 0));

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= config.max_hops {
            continue;
        }
        if started.elapsed() > config.budget || result.paths.len() >= config.max_results {
            result.truncated = true;
            break;
        }

        let chain = chains.get(&node).cloned().unwrap_or_default();
        for edge in neighbors(&node)? {
            if !config.edge_filter.matches(&edge) {
                continue;
            }
            let other = if edge.src == node {
                edge.dst.clone()
            } else {
                edge.src.clone()
            };
            if !visited.insert(other.clone()) {
                continue;
            }

            let mut next_chain = chain.clone();
            next_chain.push(edge.edge_type);
            chains.insert(other.clone(), next_chain.clone());
            result.edges.push(edge);
            result.paths.push(TraversalPath {
                target: other.clone(),
                hops: depth + 1,
                relationships: next_chain,
            });
            if result.paths.len() >= config.max_results {
                result.truncated = true;
                break;
            }
            queue.push_back((other, depth + 1));
        }
    }

    Ok(result)
}
