//! Diagram document model: lanes, columns, nodes, edges, layout knobs.
//!
//! This module defines the core document structures:
//! - `ChartPlan` - the full diagram document loaded from plan JSON
//! - `Node` - one logical item placed in a lane x column cell
//! - `Edge` - a connector between two node keys
//! - `Layout` - the immutable numeric layout configuration
//!
//! A plan is validated on ingestion: every invariant violation is collected
//! with the path of the offending field, and an invalid plan is rejected
//! before any remote call is made.

pub mod patch;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Document format versions this build understands.
pub const SUPPORTED_SCHEMA_VERSIONS: &[&str] = &["1.0"];

/// Upper bound on declared columns. Wider charts are unreadable and the
/// upstream planner is expected to stay well below this.
pub const MAX_COLUMNS: usize = 12;

/// How many lanes apart a decision branch target may land.
pub const MAX_DECISION_BRANCH_DISTANCE: usize = 2;

/// What a node renders as and which defaults it picks up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    End,
    #[default]
    Task,
    Decision,
    Chip,
    Text,
    LaneLabel,
    ColumnLabel,
}

impl NodeKind {
    /// Flow kinds are rendered by the node layer. Text-ish kinds are drawn
    /// by the text layer instead and carry no remote shape of their own.
    pub fn is_flow(self) -> bool {
        !matches!(
            self,
            NodeKind::Text | NodeKind::LaneLabel | NodeKind::ColumnLabel
        )
    }
}

/// Connector routing shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorShape {
    Straight,
    #[default]
    Elbowed,
    Curved,
}

/// Connector arrow-head style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndCap {
    None,
    #[default]
    Stealth,
}

/// One logical item placed in a lane x column cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique, stable, human-legible identifier referenced by edges.
    pub key: String,

    /// Display text.
    #[serde(default)]
    pub label: String,

    /// Lane name; must be declared in the plan's `lanes` list. Flow kinds
    /// require one, text-ish kinds may leave it empty.
    #[serde(default)]
    pub lane: String,

    /// Column index into the plan's `columns` list.
    pub column: usize,

    /// Shape family and default geometry.
    #[serde(default)]
    pub kind: NodeKind,

    /// Fine x offset from the cell center.
    #[serde(default)]
    pub dx: i64,

    /// Fine y offset from the cell center.
    #[serde(default)]
    pub dy: i64,

    /// Explicit width, overriding the kind default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,

    /// Explicit height, overriding the kind default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,

    /// Fill color (hex), overriding the kind default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,

    /// Border color (hex), overriding the kind default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,

    /// Border width, overriding the kind default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
}

impl Node {
    /// Create a flow node with defaults for everything optional.
    pub fn new(key: &str, label: &str, lane: &str, column: usize) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            lane: lane.to_string(),
            column,
            kind: NodeKind::default(),
            dx: 0,
            dy: 0,
            width: None,
            height: None,
            fill: None,
            stroke: None,
            stroke_width: None,
        }
    }

    /// Same as [`Node::new`] with an explicit kind.
    pub fn with_kind(key: &str, label: &str, lane: &str, column: usize, kind: NodeKind) -> Self {
        Self {
            kind,
            ..Self::new(key, label, lane, column)
        }
    }
}

/// A connector between two node keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Key of the node the connector starts at.
    pub source: String,

    /// Key of the node the connector ends at.
    pub destination: String,

    /// Caption rendered at the connector midpoint.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,

    /// Stroke color (hex); branch semantics are a palette convention, not a
    /// separate edge type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Dashed stroke, conventionally a backward/loop connection.
    #[serde(default)]
    pub dashed: bool,

    #[serde(default)]
    pub shape: ConnectorShape,

    #[serde(default)]
    pub end_cap: EndCap,
}

impl Edge {
    /// Create a plain forward edge.
    pub fn new(source: &str, destination: &str) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            label: String::new(),
            color: None,
            dashed: false,
            shape: ConnectorShape::default(),
            end_cap: EndCap::default(),
        }
    }
}

/// Immutable layout configuration consumed by the coordinate engine.
///
/// Never mutated mid-run; corrections between generation rounds go through
/// the patch engine and produce a new plan document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub origin_x: i64,
    pub origin_y: i64,

    pub left_label_width: i64,
    pub header_height: i64,
    pub lane_height: i64,
    pub lane_gap: i64,
    pub frame_padding: i64,

    pub col_width: i64,
    pub col_gap: i64,

    pub divider_thickness: i64,
    pub gridline_thickness: i64,

    pub task_w: i64,
    pub task_h: i64,
    pub decision_w: i64,
    pub decision_h: i64,
    pub chip_w: i64,
    pub chip_h: i64,

    pub title_y_offset: i64,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            origin_x: 0,
            origin_y: 0,
            left_label_width: 240,
            header_height: 80,
            lane_height: 220,
            lane_gap: 0,
            frame_padding: 200,
            col_width: 360,
            col_gap: 0,
            divider_thickness: 8,
            gridline_thickness: 8,
            task_w: 170,
            task_h: 80,
            decision_w: 90,
            decision_h: 90,
            chip_w: 90,
            chip_h: 26,
            title_y_offset: 260,
        }
    }
}

/// The full diagram document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPlan {
    /// Document format version tag.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Run identifier for traceability; generated when absent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_id: String,

    /// Chart title (frame title + title text item).
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subtitle: String,

    /// Ordered lane names; order is semantically meaningful.
    pub lanes: Vec<String>,

    /// Ordered column names.
    pub columns: Vec<String>,

    #[serde(default)]
    pub layout: Layout,

    pub nodes: Vec<Node>,

    pub edges: Vec<Edge>,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

impl ChartPlan {
    /// Load a plan from a JSON file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let plan: ChartPlan = serde_json::from_str(&text)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Build a plan from an in-memory JSON value and validate it. Used by
    /// the patch engine to re-check a patched document.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let plan: ChartPlan = serde_json::from_value(value)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check every document invariant, returning an error that lists all
    /// violations with their paths. No remote call happens before this.
    pub fn validate(&self) -> Result<()> {
        let errors = self.check();
        if errors.is_empty() {
            Ok(())
        } else {
            let listed: Vec<String> = errors.iter().map(|e| format!("  - {e}")).collect();
            Err(Error::InvalidPlan(listed.join("\n")))
        }
    }

    /// Collect every invariant violation instead of stopping at the first.
    pub fn check(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !SUPPORTED_SCHEMA_VERSIONS.contains(&self.schema_version.as_str()) {
            errors.push(format!(
                "schema_version: unsupported version '{}' (supported: {})",
                self.schema_version,
                SUPPORTED_SCHEMA_VERSIONS.join(", ")
            ));
        }

        if self.lanes.is_empty() {
            errors.push("lanes: must be a non-empty list".to_string());
        }
        if self.columns.is_empty() {
            errors.push("columns: must be a non-empty list".to_string());
        } else if self.columns.len() > MAX_COLUMNS {
            errors.push(format!(
                "columns: {} declared, max {}",
                self.columns.len(),
                MAX_COLUMNS
            ));
        }

        let mut seen_keys = std::collections::HashSet::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.key.is_empty() {
                errors.push(format!("nodes[{i}].key: must be non-empty"));
            } else if !seen_keys.insert(node.key.as_str()) {
                errors.push(format!("nodes[{i}].key: duplicate key '{}'", node.key));
            }

            if node.lane.is_empty() {
                if node.kind.is_flow() {
                    errors.push(format!(
                        "nodes[{i}].lane: flow node '{}' must name a lane",
                        node.key
                    ));
                }
            } else if !self.lanes.contains(&node.lane) {
                errors.push(format!(
                    "nodes[{i}].lane: '{}' is not a declared lane",
                    node.lane
                ));
            }

            if !self.columns.is_empty() && node.column >= self.columns.len() {
                errors.push(format!(
                    "nodes[{i}].column: {} out of range [0, {}]",
                    node.column,
                    self.columns.len() - 1
                ));
            }
        }

        for (i, edge) in self.edges.iter().enumerate() {
            if !seen_keys.contains(edge.source.as_str()) {
                errors.push(format!(
                    "edges[{i}].source: '{}' does not reference a declared node",
                    edge.source
                ));
            }
            if !seen_keys.contains(edge.destination.as_str()) {
                errors.push(format!(
                    "edges[{i}].destination: '{}' does not reference a declared node",
                    edge.destination
                ));
            }
        }

        // Planner guarantee, re-checked defensively: a decision branch may
        // not jump more than MAX_DECISION_BRANCH_DISTANCE lanes.
        for (i, edge) in self.edges.iter().enumerate() {
            let (Some(src), Some(dst)) = (self.node(&edge.source), self.node(&edge.destination))
            else {
                continue;
            };
            if src.kind != NodeKind::Decision {
                continue;
            }
            let (Some(a), Some(b)) = (self.lane_index(&src.lane), self.lane_index(&dst.lane))
            else {
                continue;
            };
            let distance = a.abs_diff(b);
            if distance > MAX_DECISION_BRANCH_DISTANCE {
                errors.push(format!(
                    "edges[{i}]: decision branch '{}' -> '{}' spans {} lanes (max {})",
                    edge.source, edge.destination, distance, MAX_DECISION_BRANCH_DISTANCE
                ));
            }
        }

        errors
    }

    /// Index of a lane name in the declared order.
    pub fn lane_index(&self, lane: &str) -> Option<usize> {
        self.lanes.iter().position(|l| l == lane)
    }

    /// Look up a node by key.
    pub fn node(&self, key: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.key == key)
    }

    /// Position of a node in the `nodes` array, for patch paths.
    pub fn node_index(&self, key: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.key == key)
    }
}
