//! Read-back validation: heuristic checks over a run's remote state.
//!
//! Given a run ledger, the read-back of the run's frame, and optionally the
//! original plan, produces a report of findings:
//! - `overlap` - two small shapes' bounding boxes intersect
//! - `label_truncation` - estimated text footprint exceeds the box
//! - `missing_connector` - an edge without a live, correctly-wired connector
//! - `frame_overflow` - an item sticks out of the run's frame
//! - `empty_lane` / `empty_column` / `crowded_lane` - density imbalance
//!
//! Findings carry a ready-to-apply patch where one is mechanically
//! determinable. The validator never mutates board state; it only reports.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Value, json};

use crate::ledger::RunLedger;
use crate::plan::patch::PatchEntry;
use crate::plan::{ChartPlan, Node};
use crate::remote::{BoardClient, Transport, items};
use crate::{Error, Result};

/// Approximate rendered width per character, scaled by fontSize/14.
const WIDE_CHAR_WIDTH_PX: f64 = 16.0;
const ASCII_CHAR_WIDTH_PX: f64 = 9.0;

/// Items wider or taller than this are background decoration, not nodes.
const BG_SIZE_THRESHOLD: f64 = 500.0;

/// Two boxes closer than this count as overlapping.
const OVERLAP_MARGIN: f64 = 5.0;

/// Internal padding a label needs inside its box.
const LABEL_PADDING: f64 = 20.0;

/// A lane is crowded when it holds more than this multiple of the mean.
const CROWDED_LANE_FACTOR: f64 = 3.0;
const CROWDED_LANE_MIN: usize = 4;

/// Finding severity, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Info,
    Minor,
    Major,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The fixed set of defect kinds the validator reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Overlap,
    LabelTruncation,
    MissingConnector,
    FrameOverflow,
    EmptyLane,
    EmptyColumn,
    CrowdedLane,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FindingKind::Overlap => "overlap",
            FindingKind::LabelTruncation => "label_truncation",
            FindingKind::MissingConnector => "missing_connector",
            FindingKind::FrameOverflow => "frame_overflow",
            FindingKind::EmptyLane => "empty_lane",
            FindingKind::EmptyColumn => "empty_column",
            FindingKind::CrowdedLane => "crowded_lane",
        };
        write!(f, "{name}")
    }
}

/// One reported defect.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub severity: Severity,
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub description: String,

    /// Ready-to-apply correction, when mechanically determinable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Vec<PatchEntry>>,

    /// Kind-specific context (item ids, overflow distances, ...).
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl Finding {
    fn new(severity: Severity, kind: FindingKind, description: String) -> Self {
        Self {
            severity,
            kind,
            description,
            patch: None,
            details: Value::Null,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    fn with_patch(mut self, patch: Option<Vec<PatchEntry>>) -> Self {
        self.patch = patch;
        self
    }
}

/// Overall verdict: pass unless anything Major or worse was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pass,
    NeedsFix,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Pass => write!(f, "pass"),
            ReportStatus::NeedsFix => write!(f, "needs_fix"),
        }
    }
}

/// Structured validator output.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub run_id: String,
    pub frame_id: String,
    pub item_count: usize,
    pub connector_count: usize,
    pub findings: Vec<Finding>,
    pub summary: BTreeMap<String, usize>,
    pub status: ReportStatus,
}

/// A run's remote state, already read back from the board.
#[derive(Debug, Clone, Default)]
pub struct ReadBack {
    pub frame_items: Vec<Value>,
    /// Board connectors filtered to the ones this run's ledger tracks.
    pub connectors: Vec<Value>,
    /// Frame (width, height) when its geometry could be read.
    pub frame_size: Option<(f64, f64)>,
}

impl ReadBack {
    /// Collect a run's remote state through the gateway.
    pub fn collect<T: Transport>(client: &BoardClient<T>, ledger: &RunLedger) -> Result<Self> {
        let frame_items = client.readback_frame_items(&ledger.frame_id)?;

        let tracked: HashSet<&str> = ledger
            .connectors
            .iter()
            .map(|c| c.remote_id.as_str())
            .collect();
        let connectors = client
            .readback_connectors()?
            .into_iter()
            .filter(|c| {
                c.get("id")
                    .and_then(Value::as_str)
                    .is_some_and(|id| tracked.contains(id))
            })
            .collect();

        let frame_size = match client.get_item(&ledger.frame_id) {
            Ok(frame) => {
                let w = frame
                    .get("geometry")
                    .and_then(|g| g.get("width"))
                    .and_then(Value::as_f64);
                let h = frame
                    .get("geometry")
                    .and_then(|g| g.get("height"))
                    .and_then(Value::as_f64);
                w.zip(h)
            }
            Err(e) => {
                eprintln!("Warning: could not read frame geometry: {e}");
                None
            }
        };

        Ok(Self {
            frame_items,
            connectors,
            frame_size,
        })
    }
}

/// Run every check and assemble the report.
pub fn evaluate(
    ledger: &RunLedger,
    readback: &ReadBack,
    plan: Option<&ChartPlan>,
) -> ValidationReport {
    let mut findings = Vec::new();
    findings.extend(check_overlaps(&readback.frame_items, ledger, plan));
    findings.extend(check_label_truncation(
        &readback.frame_items,
        ledger,
        plan,
    ));
    findings.extend(check_connectors(ledger, &readback.connectors, plan));
    if let Some((width, height)) = readback.frame_size {
        findings.extend(check_frame_overflow(
            &readback.frame_items,
            width,
            height,
        ));
    }
    if let Some(plan) = plan {
        findings.extend(check_density(plan));
    }

    let mut summary = BTreeMap::new();
    for finding in &findings {
        *summary.entry(finding.severity.to_string()).or_insert(0) += 1;
    }
    let status = if findings.iter().any(|f| f.severity >= Severity::Major) {
        ReportStatus::NeedsFix
    } else {
        ReportStatus::Pass
    };

    ValidationReport {
        run_id: ledger.run_id.clone(),
        frame_id: ledger.frame_id.clone(),
        item_count: readback.frame_items.len(),
        connector_count: readback.connectors.len(),
        findings,
        summary,
        status,
    }
}

/// Write the report atomically next to the ledger as validation_report.json.
pub fn write_report(report: &ValidationReport, ledger_path: &Path) -> Result<PathBuf> {
    let dir = ledger_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let path = dir.join("validation_report.json");
    let json = serde_json::to_string_pretty(report)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
    Ok(path)
}

/// Estimated rendered width of one line. Characters outside ASCII (CJK in
/// practice) render roughly 16 px at font size 14, ASCII roughly 9 px.
pub fn estimate_text_width(text: &str, font_size: f64) -> f64 {
    let scale = font_size / 14.0;
    text.chars()
        .map(|ch| {
            if (ch as u32) > 0x7F {
                WIDE_CHAR_WIDTH_PX * scale
            } else {
                ASCII_CHAR_WIDTH_PX * scale
            }
        })
        .sum()
}

type BBox = (f64, f64, f64, f64);

fn bbox(item: &Value) -> Option<BBox> {
    let pos = item.get("position")?;
    let geom = item.get("geometry")?;
    let x = pos.get("x")?.as_f64()?;
    let y = pos.get("y")?.as_f64()?;
    let w = geom.get("width")?.as_f64()?;
    let h = geom.get("height")?.as_f64()?;
    Some((x - w / 2.0, y - h / 2.0, x + w / 2.0, y + h / 2.0))
}

fn boxes_overlap(a: BBox, b: BBox, margin: f64) -> bool {
    !(a.2 + margin <= b.0 || b.2 + margin <= a.0 || a.3 + margin <= b.1 || b.3 + margin <= a.1)
}

fn item_str<'v>(item: &'v Value, key: &str) -> &'v str {
    item.get(key).and_then(Value::as_str).unwrap_or("")
}

fn item_content(item: &Value) -> &str {
    item.get("data")
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// Map a read-back item to its plan node: ledger record first, content
/// marker as fallback.
fn resolve_node<'p>(
    item: &Value,
    ledger: &RunLedger,
    plan: &'p ChartPlan,
) -> Option<(usize, &'p Node)> {
    let id = item.get("id").and_then(Value::as_str)?;
    let key = ledger
        .node_items()
        .find(|entry| entry.remote_id == id)
        .map(|entry| entry.key.clone())
        .or_else(|| items::parse_key(item_content(item)).map(str::to_string))?;
    let index = plan.node_index(&key)?;
    Some((index, &plan.nodes[index]))
}

fn check_overlaps(
    frame_items: &[Value],
    ledger: &RunLedger,
    plan: Option<&ChartPlan>,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    // Small shapes only; background rectangles always overlap everything.
    let shapes: Vec<(&Value, BBox)> = frame_items
        .iter()
        .filter(|item| item_str(item, "type") == "shape")
        .filter_map(|item| bbox(item).map(|b| (item, b)))
        .filter(|(_, b)| (b.2 - b.0) <= BG_SIZE_THRESHOLD && (b.3 - b.1) <= BG_SIZE_THRESHOLD)
        .collect();

    for i in 0..shapes.len() {
        for j in (i + 1)..shapes.len() {
            let (item_a, box_a) = shapes[i];
            let (item_b, box_b) = shapes[j];
            if !boxes_overlap(box_a, box_b, OVERLAP_MARGIN) {
                continue;
            }
            let patch = plan.and_then(|p| {
                overlap_patch(ledger, p, box_a, item_b, box_b)
                    .or_else(|| overlap_patch(ledger, p, box_b, item_a, box_a))
            });
            findings.push(
                Finding::new(
                    Severity::Major,
                    FindingKind::Overlap,
                    format!(
                        "Items overlap: {} and {}",
                        item_str(item_a, "id"),
                        item_str(item_b, "id")
                    ),
                )
                .with_details(json!({
                    "item_a_id": item_str(item_a, "id"),
                    "item_b_id": item_str(item_b, "id"),
                    "item_a_content": items::strip_key(item_content(item_a)),
                    "item_b_content": items::strip_key(item_content(item_b)),
                }))
                .with_patch(patch),
            );
        }
    }

    findings
}

/// Shift the moved item right until it clears the blocker plus margin.
/// `add` upserts, so it works whether the plan file spells out `dx` or not.
fn overlap_patch(
    ledger: &RunLedger,
    plan: &ChartPlan,
    blocker: BBox,
    moved_item: &Value,
    moved: BBox,
) -> Option<Vec<PatchEntry>> {
    let (index, node) = resolve_node(moved_item, ledger, plan)?;
    let shift = (blocker.2 + OVERLAP_MARGIN - moved.0).ceil() as i64;
    if shift <= 0 {
        return None;
    }
    Some(vec![PatchEntry::add(
        &format!("/nodes/{index}/dx"),
        json!(node.dx + shift),
    )])
}

fn check_label_truncation(
    frame_items: &[Value],
    ledger: &RunLedger,
    plan: Option<&ChartPlan>,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    for item in frame_items {
        if item_str(item, "type") != "shape" {
            continue;
        }
        let visible = items::strip_key(item_content(item));
        if visible.is_empty() {
            continue;
        }
        let Some(width) = item
            .get("geometry")
            .and_then(|g| g.get("width"))
            .and_then(Value::as_f64)
        else {
            continue;
        };
        if width > BG_SIZE_THRESHOLD {
            continue;
        }

        let font_size = item
            .get("style")
            .and_then(|s| s.get("fontSize"))
            .and_then(Value::as_f64)
            .unwrap_or(14.0);
        let available = width - LABEL_PADDING;

        // One finding per item, on the first line that does not fit.
        for line in visible.replace("<br>", "\n").lines() {
            let line = line.trim();
            let text_width = estimate_text_width(line, font_size);
            if text_width <= available {
                continue;
            }
            let patch = plan.and_then(|p| {
                let (index, _) = resolve_node(item, ledger, p)?;
                let needed = (text_width + LABEL_PADDING).ceil() as i64;
                Some(vec![PatchEntry::add(
                    &format!("/nodes/{index}/width"),
                    json!(needed),
                )])
            });
            findings.push(
                Finding::new(
                    Severity::Minor,
                    FindingKind::LabelTruncation,
                    format!(
                        "Label may be truncated: '{line}' (est. {text_width:.0}px > {available:.0}px available)"
                    ),
                )
                .with_details(json!({
                    "item_id": item_str(item, "id"),
                    "content": visible,
                    "estimated_width": text_width,
                    "available_width": available,
                }))
                .with_patch(patch),
            );
            break;
        }
    }

    findings
}

fn check_connectors(
    ledger: &RunLedger,
    connectors: &[Value],
    plan: Option<&ChartPlan>,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    let live: HashSet<&str> = connectors
        .iter()
        .filter_map(|c| c.get("id").and_then(Value::as_str))
        .collect();

    // Every ledger-recorded connector must still exist remotely.
    for record in &ledger.connectors {
        if !live.contains(record.remote_id.as_str()) {
            findings.push(
                Finding::new(
                    Severity::Critical,
                    FindingKind::MissingConnector,
                    format!(
                        "Connector missing: {} -> {} (remote_id: {})",
                        record.source, record.destination, record.remote_id
                    ),
                )
                .with_details(json!({"remote_id": record.remote_id})),
            );
        }
    }

    // With the plan in hand, every edge must have been created and wired
    // to the right endpoints; a skipped edge is a defect, not an oversight.
    let Some(plan) = plan else {
        return findings;
    };
    for edge in &plan.edges {
        let Some(record) = ledger.connector(&edge.source, &edge.destination) else {
            findings.push(
                Finding::new(
                    Severity::Critical,
                    FindingKind::MissingConnector,
                    format!(
                        "Edge never created: {} -> {} (no ledger record)",
                        edge.source, edge.destination
                    ),
                )
                .with_details(json!({
                    "source": edge.source,
                    "destination": edge.destination,
                })),
            );
            continue;
        };
        let Some(remote) = connectors
            .iter()
            .find(|c| item_str(c, "id") == record.remote_id)
        else {
            continue; // already reported as missing above
        };
        let start = remote
            .get("startItem")
            .and_then(|s| s.get("id"))
            .and_then(Value::as_str);
        let end = remote
            .get("endItem")
            .and_then(|s| s.get("id"))
            .and_then(Value::as_str);
        let expected_start = ledger.remote_id(&edge.source);
        let expected_end = ledger.remote_id(&edge.destination);
        if start != expected_start || end != expected_end {
            findings.push(
                Finding::new(
                    Severity::Critical,
                    FindingKind::MissingConnector,
                    format!(
                        "Connector endpoints mismatched: {} -> {} (remote_id: {})",
                        edge.source, edge.destination, record.remote_id
                    ),
                )
                .with_details(json!({
                    "remote_id": record.remote_id,
                    "start_item": start,
                    "end_item": end,
                })),
            );
        }
    }

    findings
}

/// Frame-relative coordinates: the frame spans (0, 0) to (width, height).
fn check_frame_overflow(frame_items: &[Value], width: f64, height: f64) -> Vec<Finding> {
    let mut findings = Vec::new();

    for item in frame_items {
        let Some((x1, y1, x2, y2)) = bbox(item) else {
            continue;
        };

        let mut sides = Vec::new();
        let mut details = serde_json::Map::new();
        if x2 > width {
            sides.push("right");
            details.insert("overflow_right_px".to_string(), json!(x2 - width));
        }
        if y2 > height {
            sides.push("bottom");
            details.insert("overflow_bottom_px".to_string(), json!(y2 - height));
        }
        if x1 < 0.0 {
            sides.push("left");
            details.insert("overflow_left_px".to_string(), json!(-x1));
        }
        if y1 < 0.0 {
            sides.push("top");
            details.insert("overflow_top_px".to_string(), json!(-y1));
        }
        if sides.is_empty() {
            continue;
        }

        details.insert("item_id".to_string(), json!(item_str(item, "id")));
        details.insert(
            "content".to_string(),
            json!(items::strip_key(item_content(item))),
        );
        findings.push(
            Finding::new(
                Severity::Major,
                FindingKind::FrameOverflow,
                format!(
                    "Item {} overflows frame ({})",
                    item_str(item, "id"),
                    sides.join(", ")
                ),
            )
            .with_details(Value::Object(details)),
        );
    }

    findings
}

fn check_density(plan: &ChartPlan) -> Vec<Finding> {
    let mut findings = Vec::new();

    let flow_nodes: Vec<&Node> = plan.nodes.iter().filter(|n| n.kind.is_flow()).collect();

    let mut lane_counts: Vec<usize> = vec![0; plan.lanes.len()];
    let mut column_counts: Vec<usize> = vec![0; plan.columns.len()];
    for node in &flow_nodes {
        if let Some(i) = plan.lane_index(&node.lane) {
            lane_counts[i] += 1;
        }
        if node.column < column_counts.len() {
            column_counts[node.column] += 1;
        }
    }

    for (lane, count) in plan.lanes.iter().zip(&lane_counts) {
        if *count == 0 {
            findings.push(
                Finding::new(
                    Severity::Info,
                    FindingKind::EmptyLane,
                    format!("Lane '{lane}' has no flow nodes"),
                )
                .with_details(json!({"lane": lane})),
            );
        }
    }
    for (column, count) in plan.columns.iter().zip(&column_counts) {
        if *count == 0 {
            findings.push(
                Finding::new(
                    Severity::Info,
                    FindingKind::EmptyColumn,
                    format!("Column '{column}' has no flow nodes"),
                )
                .with_details(json!({"column": column})),
            );
        }
    }

    let mean = flow_nodes.len() as f64 / plan.lanes.len().max(1) as f64;
    for (lane, count) in plan.lanes.iter().zip(&lane_counts) {
        if *count >= CROWDED_LANE_MIN && (*count as f64) > CROWDED_LANE_FACTOR * mean {
            findings.push(
                Finding::new(
                    Severity::Minor,
                    FindingKind::CrowdedLane,
                    format!("Lane '{lane}' holds {count} flow nodes ({mean:.1} mean)"),
                )
                .with_details(json!({"lane": lane, "count": count})),
            );
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ConnectorRecord, LedgerItem, RunStatus};
    use crate::plan::{Edge, Layout, NodeKind};

    fn test_ledger(items: Vec<(&str, &str)>, connectors: Vec<(&str, &str, &str)>) -> RunLedger {
        RunLedger {
            run_id: "run-1".to_string(),
            board_id: "b1".to_string(),
            frame_id: "f1".to_string(),
            created_at: chrono::Utc::now(),
            items: items
                .into_iter()
                .map(|(key, id)| LedgerItem {
                    key: key.to_string(),
                    remote_id: id.to_string(),
                    item_type: "shape".to_string(),
                    batch: 1,
                })
                .collect(),
            connectors: connectors
                .into_iter()
                .map(|(s, d, id)| ConnectorRecord {
                    source: s.to_string(),
                    destination: d.to_string(),
                    remote_id: id.to_string(),
                })
                .collect(),
            status: RunStatus::Completed,
        }
    }

    fn test_plan(nodes: Vec<Node>, edges: Vec<Edge>) -> ChartPlan {
        ChartPlan {
            schema_version: "1.0".to_string(),
            run_id: String::new(),
            title: "T".to_string(),
            subtitle: String::new(),
            lanes: vec!["a".to_string(), "b".to_string()],
            columns: vec!["c0".to_string(), "c1".to_string()],
            layout: Layout::default(),
            nodes,
            edges,
        }
    }

    fn shape(id: &str, content: &str, x: f64, y: f64, w: f64, h: f64) -> Value {
        json!({
            "id": id,
            "type": "shape",
            "data": {"shape": "rectangle", "content": content},
            "position": {"x": x, "y": y},
            "geometry": {"width": w, "height": h},
            "style": {},
        })
    }

    #[test]
    fn text_width_is_script_aware() {
        assert_eq!(estimate_text_width("abc", 14.0), 27.0);
        assert_eq!(estimate_text_width("日本語", 14.0), 48.0);
        assert_eq!(estimate_text_width("abc", 28.0), 54.0);
    }

    #[test]
    fn ten_pixel_overlap_yields_one_major_finding_with_dx_patch() {
        let plan = test_plan(
            vec![Node::new("t1", "A", "a", 0), Node::new("t2", "B", "a", 1)],
            vec![],
        );
        let ledger = test_ledger(vec![("t1", "1"), ("t2", "2")], vec![]);
        // boxes: (-85..85) and (75..245): 10 px of overlap
        let items = vec![
            shape("1", "A<!--bwk:t1-->", 0.0, 0.0, 170.0, 80.0),
            shape("2", "B<!--bwk:t2-->", 160.0, 0.0, 170.0, 80.0),
        ];
        let findings = check_overlaps(&items, &ledger, Some(&plan));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::Overlap);
        assert!(findings[0].severity >= Severity::Major);
        let patch = findings[0].patch.as_ref().unwrap();
        assert_eq!(patch.len(), 1);
        assert_eq!(patch[0].path, "/nodes/1/dx");
        // shift = 85 + 5 - 75
        assert_eq!(patch[0].value, Some(json!(15)));
    }

    #[test]
    fn background_rectangles_do_not_count_as_overlaps() {
        let ledger = test_ledger(vec![], vec![]);
        let items = vec![
            shape("bg", "", 0.0, 0.0, 1160.0, 520.0),
            shape("1", "A", 0.0, 0.0, 170.0, 80.0),
        ];
        assert!(check_overlaps(&items, &ledger, None).is_empty());
    }

    #[test]
    fn disjoint_shapes_do_not_overlap() {
        let ledger = test_ledger(vec![], vec![]);
        let items = vec![
            shape("1", "A", 0.0, 0.0, 170.0, 80.0),
            shape("2", "B", 360.0, 0.0, 170.0, 80.0),
        ];
        assert!(check_overlaps(&items, &ledger, None).is_empty());
    }

    #[test]
    fn truncated_label_gets_width_patch() {
        let plan = test_plan(vec![Node::new("t1", "aaaaaaaaaa", "a", 0)], vec![]);
        let ledger = test_ledger(vec![("t1", "1")], vec![]);
        // 10 ascii chars at 14pt = 90px, available = 100 - 20 = 80
        let items = vec![shape("1", "aaaaaaaaaa<!--bwk:t1-->", 0.0, 0.0, 100.0, 80.0)];
        let findings = check_label_truncation(&items, &ledger, Some(&plan));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Minor);
        let patch = findings[0].patch.as_ref().unwrap();
        assert_eq!(patch[0].path, "/nodes/0/width");
        assert_eq!(patch[0].value, Some(json!(110)));
    }

    #[test]
    fn marker_is_not_measured_and_one_finding_per_item() {
        let ledger = test_ledger(vec![], vec![]);
        // visible label fits; only the marker would push it over
        let fits = vec![shape("1", "ok<!--bwk:some-long-key-->", 0.0, 0.0, 100.0, 80.0)];
        assert!(check_label_truncation(&fits, &ledger, None).is_empty());

        // both lines overflow, still a single finding
        let long = vec![shape(
            "1",
            "aaaaaaaaaaaa<br>bbbbbbbbbbbb",
            0.0,
            0.0,
            100.0,
            80.0,
        )];
        assert_eq!(check_label_truncation(&long, &ledger, None).len(), 1);
    }

    #[test]
    fn missing_remote_connector_is_critical() {
        let ledger = test_ledger(vec![], vec![("s", "t", "c1"), ("t", "e", "c2")]);
        let live = vec![json!({"id": "c1"})];
        let findings = check_connectors(&ledger, &live, None);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert!(findings[0].description.contains("t -> e"));
    }

    #[test]
    fn edge_without_ledger_record_is_a_defect() {
        let plan = test_plan(
            vec![Node::new("s", "S", "a", 0), Node::new("t", "T", "a", 1)],
            vec![Edge::new("s", "t")],
        );
        let ledger = test_ledger(vec![("s", "1"), ("t", "2")], vec![]);
        let findings = check_connectors(&ledger, &[], Some(&plan));
        assert_eq!(findings.len(), 1);
        assert!(findings[0].description.contains("never created"));
    }

    #[test]
    fn mismatched_endpoints_are_reported() {
        let plan = test_plan(
            vec![Node::new("s", "S", "a", 0), Node::new("t", "T", "a", 1)],
            vec![Edge::new("s", "t")],
        );
        let ledger = test_ledger(vec![("s", "1"), ("t", "2")], vec![("s", "t", "c1")]);
        let live = vec![json!({
            "id": "c1",
            "startItem": {"id": "1"},
            "endItem": {"id": "999"},
        })];
        let findings = check_connectors(&ledger, &live, Some(&plan));
        assert_eq!(findings.len(), 1);
        assert!(findings[0].description.contains("endpoints mismatched"));
    }

    #[test]
    fn correctly_wired_run_has_no_connector_findings() {
        let plan = test_plan(
            vec![Node::new("s", "S", "a", 0), Node::new("t", "T", "a", 1)],
            vec![Edge::new("s", "t")],
        );
        let ledger = test_ledger(vec![("s", "1"), ("t", "2")], vec![("s", "t", "c1")]);
        let live = vec![json!({
            "id": "c1",
            "startItem": {"id": "1"},
            "endItem": {"id": "2"},
        })];
        assert!(check_connectors(&ledger, &live, Some(&plan)).is_empty());
    }

    #[test]
    fn overflowing_items_report_sides_and_distances() {
        let items = vec![
            shape("in", "ok", 500.0, 260.0, 170.0, 80.0),
            shape("out", "over", 1010.0, -10.0, 100.0, 100.0),
        ];
        let findings = check_frame_overflow(&items, 1000.0, 520.0);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::FrameOverflow);
        assert!(findings[0].description.contains("right"));
        assert!(findings[0].description.contains("top"));
        assert_eq!(findings[0].details["overflow_right_px"], json!(60.0));
        assert_eq!(findings[0].details["overflow_top_px"], json!(60.0));
    }

    #[test]
    fn density_checks_flag_empty_and_crowded() {
        let mut nodes = vec![Node::with_kind("note", "n", "a", 0, NodeKind::Text)];
        for i in 0..13 {
            nodes.push(Node::new(&format!("n{i}"), "x", "a", 0));
        }
        let mut plan = test_plan(nodes, vec![]);
        plan.lanes = vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
        ];
        plan.nodes.push(Node::new("nb", "x", "b", 1));
        plan.nodes.push(Node::new("nc", "x", "c", 1));
        plan.nodes.push(Node::new("nd", "x", "d", 1));

        let findings = check_density(&plan);
        let crowded: Vec<_> = findings
            .iter()
            .filter(|f| f.kind == FindingKind::CrowdedLane)
            .collect();
        assert_eq!(crowded.len(), 1);
        assert!(crowded[0].description.contains("'a'"));
        // text node does not count toward density
        assert!(
            findings
                .iter()
                .all(|f| f.kind != FindingKind::EmptyLane || !f.description.contains("'a'"))
        );
    }

    #[test]
    fn empty_lane_and_column_are_info() {
        let plan = test_plan(vec![Node::new("t", "x", "a", 0)], vec![]);
        let findings = check_density(&plan);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.severity == Severity::Info));
        assert!(findings.iter().any(|f| f.kind == FindingKind::EmptyLane));
        assert!(findings.iter().any(|f| f.kind == FindingKind::EmptyColumn));
    }

    #[test]
    fn report_status_follows_worst_severity() {
        let plan = test_plan(vec![Node::new("t", "x", "a", 0)], vec![]);
        let ledger = test_ledger(vec![("t", "1")], vec![]);
        let readback = ReadBack {
            frame_items: vec![shape("1", "x<!--bwk:t-->", 100.0, 100.0, 170.0, 80.0)],
            connectors: vec![],
            frame_size: Some((1000.0, 520.0)),
        };
        // only Info findings (empty lane/column): pass
        let report = evaluate(&ledger, &readback, Some(&plan));
        assert_eq!(report.status, ReportStatus::Pass);
        assert_eq!(report.item_count, 1);

        // an overlap pushes it to needs_fix
        let readback = ReadBack {
            frame_items: vec![
                shape("1", "x", 100.0, 100.0, 170.0, 80.0),
                shape("2", "y", 110.0, 100.0, 170.0, 80.0),
            ],
            connectors: vec![],
            frame_size: None,
        };
        let report = evaluate(&ledger, &readback, None);
        assert_eq!(report.status, ReportStatus::NeedsFix);
        assert_eq!(report.summary.get("Major"), Some(&1));
    }

    #[test]
    fn report_written_atomically_next_to_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger_path = dir.path().join("board_items.jsonl");
        let ledger = test_ledger(vec![], vec![]);
        let report = evaluate(&ledger, &ReadBack::default(), None);
        let path = write_report(&report, &ledger_path).unwrap();
        assert_eq!(path, dir.path().join("validation_report.json"));
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["status"], "pass");
        assert_eq!(parsed["run_id"], "run-1");
    }
}
