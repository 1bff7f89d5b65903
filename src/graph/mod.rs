//! Knowledge graph store: typed nodes, weighted edges, bounded traversal.
//!
//! Nodes are addressed by `(label, key)`; edges are owned jointly by their
//! endpoints. Learned edges carry `learned = true` and a mutable weight
//! updated only through the monotonic strengthening rule.

pub mod store;
pub mod traverse;

pub use store::SqliteGraphStore;
pub use traverse::{TraversalConfig, TraversalPath, TraversalResult};

use serde::{Deserialize, Serialize};

/// Weight increment factor for learned-edge strengthening.
pub const LEARNING_RATE: f64 = 0.1;

/// Node labels in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum NodeLabel {
    Document,
    Section,
    Standard,
    Specification,
    Requirement,
}

impl NodeLabel {
    /// Label name as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Document => "Document",
            Self::Section => "Section",
            Self::Standard => "Standard",
            Self::Specification => "Specification",
            Self::Requirement => "Requirement",
        }
    }

    /// Parses a stored label name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Document" => Some(Self::Document),
            "Section" => Some(Self::Section),
            "Standard" => Some(Self::Standard),
            "Specification" => Some(Self::Specification),
            "Requirement" => Some(Self::Requirement),
            _ => None,
        }
    }
}

/// Relationship types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum EdgeType {
    Contains,
    RefersTo,
    Requires,
    Supersedes,
    Specifies,
    Complements,
    RelatedTo,
}

impl EdgeType {
    /// Edge type name as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "CONTAINS",
            Self::RefersTo => "REFERS_TO",
            Self::Requires => "REQUIRES",
            Self::Supersedes => "SUPERSEDES",
            Self::Specifies => "SPECIFIES",
            Self::Complements => "COMPLEMENTS",
            Self::RelatedTo => "RELATED_TO",
        }
    }

    /// Parses a stored edge type name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONTAINS" => Some(Self::Contains),
            "REFERS_TO" => Some(Self::RefersTo),
            "REQUIRES" => Some(Self::Requires),
            "SUPERSEDES" => Some(Self::Supersedes),
            "SPECIFIES" => Some(Self::Specifies),
            "COMPLEMENTS" => Some(Self::Complements),
            "RELATED_TO" => Some(Self::RelatedTo),
            _ => None,
        }
    }

    /// Edge types followed during query-time graph expansion.
    pub const QUERY_EXPANSION: [Self; 4] = [
        Self::RefersTo,
        Self::Complements,
        Self::Supersedes,
        Self::RelatedTo,
    ];
}

/// `(label, key)` address of a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    /// Node label.
    pub label: NodeLabel,
    /// Node key, unique within the label.
    pub key: String,
}

impl NodeKey {
    /// Convenience constructor.
    #[must_use]
    pub fn new(label: NodeLabel, key: impl Into<String>) -> Self {
        Self {
            label,
            key: key.into(),
        }
    }

    /// Document node address.
    #[must_use]
    pub fn document(name: &str) -> Self {
        Self::new(NodeLabel::Document, name)
    }

    /// Section node address; keys are scoped by document so that equal
    /// numbers in different documents stay distinct.
    #[must_use]
    pub fn section(document: &str, number: &str) -> Self {
        Self::new(NodeLabel::Section, format!("{document}::{number}"))
    }

    /// Standard node address by canonical key.
    #[must_use]
    pub fn standard(canonical: &str) -> Self {
        Self::new(NodeLabel::Standard, canonical)
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.label.as_str(), self.key)
    }
}

/// A node with its properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node address.
    pub key: NodeKey,
    /// Free-form JSON properties.
    pub props: serde_json::Value,
}

/// A directed edge with its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node.
    pub src: NodeKey,
    /// Destination node.
    pub dst: NodeKey,
    /// Relationship type.
    pub edge_type: EdgeType,
    /// Weight in [0, 1]. Extracted edges default to 1.0.
    pub weight: f64,
    /// Whether the edge was produced by feedback learning.
    pub learned: bool,
    /// Free-form context (the phrase that created the edge, etc.).
    pub context: Option<String>,
    /// Creation timestamp (Unix seconds).
    pub created_at: i64,
    /// Last update timestamp (Unix seconds).
    pub updated_at: i64,
}

/// Filter over edges for neighborhood and traversal queries.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    /// Restrict to these edge types (empty = all).
    pub types: Vec<EdgeType>,
    /// Minimum edge weight.
    pub min_weight: f64,
    /// Restrict to learned / extracted edges.
    pub learned: Option<bool>,
}

impl EdgeFilter {
    /// Filter allowing only the given types.
    #[must_use]
    pub fn types(types: &[EdgeType]) -> Self {
        Self {
            types: types.to_vec(),
            ..Self::default()
        }
    }

    /// Whether an edge passes the filter.
    #[must_use]
    pub fn matches(&self, edge: &GraphEdge) -> bool {
        if !self.types.is_empty() && !self.types.contains(&edge.edge_type) {
            return false;
        }
        if edge.weight < self.min_weight {
            return false;
        }
        if let Some(learned) = self.learned {
            if edge.learned != learned {
                return false;
            }
        }
        true
    }
}

/// Graph-wide statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphStats {
    /// Document node count.
    pub documents: usize,
    /// Section node count.
    pub sections: usize,
    /// Standard node count.
    pub standards: usize,
    /// Specification node count.
    pub specifications: usize,
    /// Requirement node count.
    pub requirements: usize,
    /// Total edge count.
    pub edges: usize,
    /// Learned edge count.
    pub learned_edges: usize,
}

/// Statistics over learned edges only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LearnedEdgeStats {
    /// Learned edge count.
    pub total: usize,
    /// Average weight.
    pub avg_weight: f64,
    /// Maximum weight.
    pub max_weight: f64,
    /// Minimum weight.
    pub min_weight: f64,
}
