/// Core flow type definitions
///
/// A flow is the graph of nodes and edges that drives one campaign. Flows are stored
/// as JSON and validated into a petgraph digraph before a campaign may run them.

use crate::error::{EngineError, EngineResult};
use chrono::Duration;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Edge label selecting the unconditional branch
pub const DEFAULT_BRANCH: &str = "";
/// Edge label selecting the satisfied-predicate branch of a condition node
pub const TRUE_BRANCH: &str = "true";

/// A complete flow definition belonging to exactly one campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Owning campaign
    pub campaign_id: String,
    /// Nodes in declaration order
    pub nodes: Vec<Node>,
    /// Directed edges between nodes
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A single step of a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier within the flow (e.g., "welcome", "wait-2d")
    pub id: String,
    /// Node behavior and its payload
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Available node types, serialized as `{"type": "...", "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum NodeKind {
    /// Send one templated email
    Email(EmailNode),
    /// Wait before the next node runs
    Delay(DelayNode),
    /// Branch on engagement with the last message
    Condition(ConditionNode),
    /// End of the flow for the current lead
    Goal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailNode {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayNode {
    pub amount: u32,
    /// "hours" or "days"; anything else is read as hours
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionNode {
    pub predicate: Predicate,
}

/// Engagement predicate evaluated by condition nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    Opened,
    Clicked,
    Replied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayUnit {
    Hours,
    Days,
}

/// Directed transition between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    /// Branch label: "" for the default branch, "true" for a satisfied condition
    #[serde(default)]
    pub condition: String,
}

impl Node {
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Email(_) => "email",
            NodeKind::Delay(_) => "delay",
            NodeKind::Condition(_) => "condition",
            NodeKind::Goal => "goal",
        }
    }
}

impl DelayNode {
    /// Parsed unit and whether the raw value was recognised
    pub fn parsed_unit(&self) -> (DelayUnit, bool) {
        match self.unit.as_str() {
            "hours" => (DelayUnit::Hours, true),
            "days" => (DelayUnit::Days, true),
            _ => (DelayUnit::Hours, false),
        }
    }

    pub fn duration(&self) -> Duration {
        let amount = i64::from(self.amount);
        match self.parsed_unit().0 {
            DelayUnit::Hours => Duration::hours(amount),
            DelayUnit::Days => Duration::days(amount),
        }
    }
}

impl Flow {
    /// Check structural invariants: at least one node, unique node ids, and
    /// every edge endpoint resolving to a node of this flow.
    ///
    /// Unknown delay units and unreachable nodes are tolerated but logged.
    pub fn validate(&self) -> EngineResult<()> {
        let graph = FlowGraph::build(self)?;

        for node in &self.nodes {
            if let NodeKind::Delay(delay) = &node.kind {
                if !delay.parsed_unit().1 {
                    tracing::warn!(
                        campaign_id = %self.campaign_id,
                        node_id = %node.id,
                        unit = %delay.unit,
                        "Delay unit not recognised, will be read as hours"
                    );
                }
            }
        }

        let unreachable = graph.unreachable_from_entry();
        if !unreachable.is_empty() {
            tracing::warn!(
                campaign_id = %self.campaign_id,
                nodes = ?unreachable,
                "Flow has nodes unreachable from its entry node"
            );
        }

        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// The designated first node: the first declared node without incoming
    /// edges, or the first declared node when every node has one.
    pub fn entry_node(&self) -> Option<&Node> {
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.target.as_str()).collect();
        self.nodes
            .iter()
            .find(|node| !targets.contains(node.id.as_str()))
            .or_else(|| self.nodes.first())
    }

    /// First-match edge selection: the first edge leaving `source` whose label
    /// equals `condition` or is empty.
    pub fn next_target(&self, source: &str, condition: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|edge| {
                edge.source == source
                    && (edge.condition == condition || edge.condition.is_empty())
            })
            .map(|edge| edge.target.as_str())
    }

    /// Target of the first edge leaving `source` carrying exactly `condition`
    pub fn labeled_target(&self, source: &str, condition: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|edge| edge.source == source && edge.condition == condition)
            .map(|edge| edge.target.as_str())
    }
}

/// Validated petgraph view of a flow
#[derive(Debug)]
struct FlowGraph<'a> {
    flow: &'a Flow,
    graph: DiGraph<&'a str, &'a str>,
    index_of: HashMap<&'a str, NodeIndex>,
}

impl<'a> FlowGraph<'a> {
    fn build(flow: &'a Flow) -> EngineResult<Self> {
        if flow.nodes.is_empty() {
            return Err(EngineError::InvalidFlow(format!(
                "flow for campaign {} has no nodes",
                flow.campaign_id
            )));
        }

        let mut graph = DiGraph::new();
        let mut index_of = HashMap::new();

        for node in &flow.nodes {
            if node.id.is_empty() {
                return Err(EngineError::InvalidFlow("node with empty id".into()));
            }
            let index = graph.add_node(node.id.as_str());
            if index_of.insert(node.id.as_str(), index).is_some() {
                return Err(EngineError::InvalidFlow(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
        }

        for edge in &flow.edges {
            let source = index_of.get(edge.source.as_str()).ok_or_else(|| {
                EngineError::InvalidFlow(format!("edge references unknown node: {}", edge.source))
            })?;
            let target = index_of.get(edge.target.as_str()).ok_or_else(|| {
                EngineError::InvalidFlow(format!("edge references unknown node: {}", edge.target))
            })?;
            graph.add_edge(*source, *target, edge.condition.as_str());
        }

        Ok(Self {
            flow,
            graph,
            index_of,
        })
    }

    fn unreachable_from_entry(&self) -> Vec<&'a str> {
        let entry = self
            .graph
            .node_indices()
            .find(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .or_else(|| self.flow.nodes.first().and_then(|n| self.index_of.get(n.id.as_str()).copied()));

        let Some(entry) = entry else {
            return Vec::new();
        };

        let mut reachable = HashSet::new();
        let mut dfs = Dfs::new(&self.graph, entry);
        while let Some(idx) = dfs.next(&self.graph) {
            reachable.insert(idx);
        }

        self.graph
            .node_indices()
            .filter(|idx| !reachable.contains(idx))
            .map(|idx| self.graph[idx])
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn email(id: &str, subject: &str, body: &str) -> Node {
        Node {
            id: id.to_string(),
            kind: NodeKind::Email(EmailNode {
                subject: subject.to_string(),
                body: body.to_string(),
            }),
        }
    }

    pub fn delay(id: &str, amount: u32, unit: &str) -> Node {
        Node {
            id: id.to_string(),
            kind: NodeKind::Delay(DelayNode {
                amount,
                unit: unit.to_string(),
            }),
        }
    }

    pub fn condition(id: &str, predicate: Predicate) -> Node {
        Node {
            id: id.to_string(),
            kind: NodeKind::Condition(ConditionNode { predicate }),
        }
    }

    pub fn goal(id: &str) -> Node {
        Node {
            id: id.to_string(),
            kind: NodeKind::Goal,
        }
    }

    pub fn edge(source: &str, target: &str, condition: &str) -> Edge {
        Edge {
            source: source.to_string(),
            target: target.to_string(),
            condition: condition.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn follow_up_flow() -> Flow {
        Flow {
            campaign_id: "c1".into(),
            nodes: vec![
                email("hello", "Hi {{name}}", "<p>Hello</p>"),
                delay("wait", 1, "days"),
                condition("opened?", Predicate::Opened),
                email("follow", "Follow-up", "<p>Again</p>"),
                goal("done"),
            ],
            edges: vec![
                edge("hello", "wait", ""),
                edge("wait", "opened?", ""),
                edge("opened?", "follow", "true"),
                edge("opened?", "done", ""),
                edge("follow", "done", ""),
            ],
        }
    }

    #[test]
    fn node_json_uses_type_and_data_tags() {
        let json = serde_json::json!({
            "campaign_id": "c1",
            "nodes": [
                {"id": "a", "type": "email", "data": {"subject": "s", "body": "b"}},
                {"id": "b", "type": "delay", "data": {"amount": 2, "unit": "days"}},
                {"id": "c", "type": "condition", "data": {"predicate": "clicked"}},
                {"id": "d", "type": "goal"}
            ],
            "edges": [{"source": "a", "target": "b"}]
        });
        let flow: Flow = serde_json::from_value(json).unwrap();
        assert_eq!(flow.nodes[3].kind, NodeKind::Goal);
        assert_eq!(flow.nodes[1].kind_name(), "delay");
        assert_eq!(
            flow.nodes[2].kind,
            NodeKind::Condition(ConditionNode {
                predicate: Predicate::Clicked
            })
        );
        assert_eq!(flow.edges[0].condition, DEFAULT_BRANCH);
    }

    #[test]
    fn validate_rejects_dangling_edges() {
        let mut flow = follow_up_flow();
        flow.edges.push(edge("follow", "ghost", ""));
        assert!(matches!(flow.validate(), Err(EngineError::InvalidFlow(_))));
    }

    #[test]
    fn validate_rejects_empty_and_duplicate_nodes() {
        let empty = Flow {
            campaign_id: "c1".into(),
            nodes: vec![],
            edges: vec![],
        };
        assert!(empty.validate().is_err());

        let mut dup = follow_up_flow();
        dup.nodes.push(goal("done"));
        assert!(dup.validate().is_err());

        assert!(follow_up_flow().validate().is_ok());
    }

    #[test]
    fn entry_node_is_first_without_incoming_edge() {
        let mut flow = follow_up_flow();
        flow.nodes.rotate_left(1);
        assert_eq!(flow.entry_node().map(|n| n.id.as_str()), Some("hello"));

        let cyclic = Flow {
            campaign_id: "c1".into(),
            nodes: vec![goal("x"), goal("y")],
            edges: vec![edge("x", "y", ""), edge("y", "x", "")],
        };
        assert_eq!(cyclic.entry_node().map(|n| n.id.as_str()), Some("x"));
    }

    #[test]
    fn edge_selection_is_first_match() {
        let flow = follow_up_flow();
        assert_eq!(flow.next_target("opened?", DEFAULT_BRANCH), Some("done"));
        // the "true" edge is declared first, so it wins for a "true" request
        assert_eq!(flow.next_target("opened?", TRUE_BRANCH), Some("follow"));
        assert_eq!(flow.labeled_target("opened?", TRUE_BRANCH), Some("follow"));
        assert_eq!(flow.labeled_target("wait", TRUE_BRANCH), None);

        let mut reordered = follow_up_flow();
        reordered.edges.swap(2, 3);
        assert_eq!(reordered.next_target("opened?", TRUE_BRANCH), Some("done"));
    }

    #[test]
    fn default_lookup_skips_labeled_edges() {
        let flow = Flow {
            campaign_id: "c1".into(),
            nodes: vec![condition("c", Predicate::Replied), goal("g1"), goal("g2")],
            edges: vec![edge("c", "g1", "true"), edge("c", "g2", "")],
        };
        assert_eq!(flow.next_target("c", DEFAULT_BRANCH), Some("g2"));
    }

    #[test]
    fn unknown_delay_unit_reads_as_hours() {
        let days = DelayNode { amount: 2, unit: "days".into() };
        assert_eq!(days.duration(), Duration::days(2));

        let weeks = DelayNode { amount: 3, unit: "weeks".into() };
        assert_eq!(weeks.parsed_unit(), (DelayUnit::Hours, false));
        assert_eq!(weeks.duration(), Duration::hours(3));
    }
}
