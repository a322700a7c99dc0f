//! Command implementations for the Boardwalk CLI.
//!
//! Each command returns a typed result implementing [`Output`]; `main.rs`
//! prints it as JSON (default) or human text (`-H`) and maps any error to
//! exit code 1. The `run_*` functions are generic over [`Transport`] so
//! tests drive them with a scripted board instead of HTTP.

use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::cleanup::{Cleaner, CleanupCounts};
use crate::config::BoardConfig;
use crate::layout::Grid;
use crate::ledger::{BACKGROUND_KEY, ItemRecord, LedgerWriter, RunLedger, RunStatus};
use crate::plan::patch::{self, PatchEntry};
use crate::plan::ChartPlan;
use crate::remote::{BULK_BATCH_SIZE, BoardClient, Transport, items};
use crate::validate::{self, ReadBack, ValidationReport};
use crate::{Error, Result};

/// Gap between existing board content and a new frame.
const FRAME_GAP: i64 = 500;
/// Headroom above the grid for title and subtitle.
const TITLE_EXTRA_HEIGHT: i64 = 200;
/// The grid origin sits below frame center so the title band fits above.
const ORIGIN_Y_TITLE_OFFSET: i64 = 50;
/// Margin between the background box and the frame edges.
const FRAME_SIDE_MARGIN: i64 = 50;

/// Ledger file name inside the run's output directory.
pub const LEDGER_FILE: &str = "board_items.jsonl";

/// Command results that print as JSON or human-readable text.
pub trait Output: Serialize {
    /// Serialize to JSON. Plain data structs; serialization cannot
    /// realistically fail, so fall back to an empty object.
    fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

#[derive(Debug, Serialize)]
pub struct GenerateResult {
    pub run_id: String,
    pub board_id: String,
    pub frame_id: String,
    pub frame_title: String,
    pub items_created: usize,
    pub connectors_created: usize,
    pub connectors_skipped: usize,
    pub ledger: PathBuf,
    pub board_url: String,
}

impl Output for GenerateResult {
    fn to_human(&self) -> String {
        let mut out = format!(
            "Run {} complete.\n  Frame: {} ({})\n  Items: {}, connectors: {}",
            self.run_id, self.frame_title, self.frame_id, self.items_created, self.connectors_created
        );
        if self.connectors_skipped > 0 {
            out.push_str(&format!(" ({} skipped)", self.connectors_skipped));
        }
        out.push_str(&format!(
            "\n  Ledger: {}\n  Board: {}",
            self.ledger.display(),
            self.board_url
        ));
        out
    }
}

/// Render a plan onto the board. Reads credentials from the environment.
pub fn generate(
    plan_path: &Path,
    run_id: Option<String>,
    output_dir: &Path,
) -> Result<GenerateResult> {
    let plan = ChartPlan::load(plan_path)?;
    let run_id = run_id
        .filter(|id| !id.is_empty())
        .or_else(|| (!plan.run_id.is_empty()).then(|| plan.run_id.clone()))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let config = BoardConfig::from_env()?;
    let client = BoardClient::new(config.transport(), &config.board_id);
    run_generation(&client, &plan, &run_id, output_dir)
}

/// The generation pipeline: frame, background, nodes, connectors, in that
/// order, with the ledger flushed after every successful step.
pub fn run_generation<T: Transport>(
    client: &BoardClient<T>,
    plan: &ChartPlan,
    run_id: &str,
    output_dir: &Path,
) -> Result<GenerateResult> {
    let sizing = Grid::new(plan.layout.clone(), plan.lanes.len(), plan.columns.len())?;
    let chart_w = sizing.total_width() + plan.layout.frame_padding + 2 * FRAME_SIDE_MARGIN;
    let chart_h = sizing.total_height() + TITLE_EXTRA_HEIGHT;

    // New frames go to the right of existing content, or the board origin
    // when the board is empty.
    let (rightmost_x, center_y) = client.find_rightmost_frame()?;
    let (frame_x, frame_y) = if rightmost_x > 0 {
        (rightmost_x + FRAME_GAP + chart_w / 2, center_y)
    } else {
        (0, 0)
    };

    let short_id: String = run_id.chars().take(8).collect();
    let frame_title = format!("[swimlane] {} ({short_id})", plan.title);
    let frame_id = client.create_frame(&frame_title, frame_x, frame_y, chart_w, chart_h)?;

    let ledger_path = output_dir.join(run_id).join(LEDGER_FILE);
    let mut ledger = LedgerWriter::create(&ledger_path, run_id, client.board_id(), &frame_id)?;

    match build_inside_frame(client, plan, &frame_id, chart_w, chart_h, &mut ledger) {
        Ok((items_created, connectors_created, connectors_skipped)) => {
            ledger.set_status(RunStatus::Completed)?;
            Ok(GenerateResult {
                run_id: run_id.to_string(),
                board_id: client.board_id().to_string(),
                frame_id,
                frame_title,
                items_created,
                connectors_created,
                connectors_skipped,
                ledger: ledger_path,
                board_url: format!("https://miro.com/app/board/{}/", client.board_id()),
            })
        }
        Err(e) => {
            // Best effort; the primary error matters more than the marker.
            let _ = ledger.set_status(RunStatus::Failed);
            Err(Error::RunFailed {
                run_id: run_id.to_string(),
                ledger_path: ledger_path.display().to_string(),
                source: Box::new(e),
            })
        }
    }
}

fn build_inside_frame<T: Transport>(
    client: &BoardClient<T>,
    plan: &ChartPlan,
    frame_id: &str,
    chart_w: i64,
    chart_h: i64,
    ledger: &mut LedgerWriter,
) -> Result<(usize, usize, usize)> {
    // Children of a frame are positioned relative to its top-left corner.
    let mut layout = plan.layout.clone();
    layout.origin_x = chart_w / 2;
    layout.origin_y = chart_h / 2 + ORIGIN_Y_TITLE_OFFSET;
    let grid = Grid::new(layout, plan.lanes.len(), plan.columns.len())?;

    let mut items_created = 0usize;

    // 1) Background grid and text layer, tracked under the background key.
    let mut decor = items::background_items(&grid);
    decor.extend(items::text_items(&grid, plan));
    for batch in decor.chunks(BULK_BATCH_SIZE) {
        let created = client.bulk_create(&items::inject_parent(batch, frame_id))?;
        let records = created
            .iter()
            .filter_map(|item| {
                remote_id(item).map(|id| ItemRecord::new(BACKGROUND_KEY, id, &items::item_type(item)))
            })
            .collect();
        items_created += created.len();
        ledger.append_batch(records)?;
    }

    // 2) Flow nodes, recovering key -> remote id from response order, with
    // the embedded content marker as fallback.
    let (keys, node_payloads) = items::node_items(&grid, plan);
    let mut key_to_id: HashMap<String, String> = HashMap::new();
    let mut offset = 0usize;
    for batch in node_payloads.chunks(BULK_BATCH_SIZE) {
        let created = client.bulk_create(&items::inject_parent(batch, frame_id))?;
        let mut records = Vec::new();
        for (i, item) in created.iter().enumerate() {
            let Some(id) = remote_id(item) else { continue };
            let key = keys.get(offset + i).cloned().or_else(|| marker_key(item));
            let Some(key) = key else { continue };
            records.push(ItemRecord::new(&key, id, &items::item_type(item)));
            key_to_id.insert(key, id.to_string());
        }
        offset += created.len();
        items_created += created.len();
        ledger.append_batch(records)?;
    }

    let unmapped: Vec<&str> = keys
        .iter()
        .map(String::as_str)
        .filter(|key| !key_to_id.contains_key(*key))
        .collect();
    if !unmapped.is_empty() {
        eprintln!(
            "Warning: could not map these keys to remote ids: {}",
            unmapped.join(", ")
        );
    }

    // 3) Connectors, one call each. An unmapped endpoint skips the edge;
    // the run keeps going.
    let mut connectors_created = 0usize;
    let mut connectors_skipped = 0usize;
    for edge in &plan.edges {
        let (Some(start), Some(end)) = (
            key_to_id.get(&edge.source),
            key_to_id.get(&edge.destination),
        ) else {
            eprintln!(
                "Warning: skipping connector {} -> {} (missing item id)",
                edge.source, edge.destination
            );
            connectors_skipped += 1;
            continue;
        };
        let connector_id = client.create_connector(items::connector_payload(edge, start, end))?;
        ledger.append_connector(&edge.source, &edge.destination, &connector_id)?;
        connectors_created += 1;
    }

    Ok((items_created, connectors_created, connectors_skipped))
}

fn remote_id(item: &Value) -> Option<&str> {
    item.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

fn marker_key(item: &Value) -> Option<String> {
    item.get("data")
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .and_then(items::parse_key)
        .map(str::to_string)
}

#[derive(Debug, Serialize)]
pub struct ValidateResult {
    #[serde(flatten)]
    pub report: ValidationReport,
    pub report_path: PathBuf,
}

impl Output for ValidateResult {
    fn to_human(&self) -> String {
        let r = &self.report;
        let mut out = format!(
            "Validation of run {}: {}\n  Items: {}, connectors: {}",
            r.run_id, r.status, r.item_count, r.connector_count
        );
        if r.findings.is_empty() {
            out.push_str("\n  No findings.");
        }
        for finding in &r.findings {
            out.push_str(&format!(
                "\n  [{}] {}: {}",
                finding.severity, finding.kind, finding.description
            ));
        }
        out.push_str(&format!("\n  Report: {}", self.report_path.display()));
        out
    }
}

/// Read a run back from the board and check it for layout defects.
pub fn validate_run(ledger_path: &Path, plan_path: Option<&Path>) -> Result<ValidateResult> {
    let ledger = RunLedger::read(ledger_path)?;
    let plan = match plan_path {
        Some(path) => Some(ChartPlan::load(path)?),
        None => None,
    };
    let config = BoardConfig::from_env()?;
    let client = BoardClient::new(config.transport(), &config.board_id);
    run_validation(&client, &ledger, plan.as_ref(), ledger_path)
}

pub fn run_validation<T: Transport>(
    client: &BoardClient<T>,
    ledger: &RunLedger,
    plan: Option<&ChartPlan>,
    ledger_path: &Path,
) -> Result<ValidateResult> {
    let readback = ReadBack::collect(client, ledger)?;
    let report = validate::evaluate(ledger, &readback, plan);
    let report_path = validate::write_report(&report, ledger_path)?;
    Ok(ValidateResult {
        report,
        report_path,
    })
}

#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub run_id: String,
    pub aborted: bool,
    #[serde(flatten)]
    pub counts: CleanupCounts,
}

impl Output for CleanupResult {
    fn to_human(&self) -> String {
        if self.aborted {
            return "Aborted.".to_string();
        }
        let c = &self.counts;
        let mut out = if c.is_empty() {
            "Nothing to delete - already clean.".to_string()
        } else {
            format!(
                "Deleted: {} connectors, {} items, {} frame(s)",
                c.connectors, c.items, c.frames
            )
        };
        if c.skipped > 0 {
            out.push_str(&format!("\nSkipped (delete failed): {}", c.skipped));
        }
        out
    }
}

/// Delete a run's remote output, verifying counts first unless forced.
pub fn cleanup_run(ledger_path: &Path, force: bool) -> Result<CleanupResult> {
    let ledger = RunLedger::read(ledger_path)?;
    let config = BoardConfig::from_env()?;
    let client = BoardClient::new(config.transport(), &config.board_id);
    run_cleanup(&client, &ledger, force, None)
}

pub fn run_cleanup<T: Transport>(
    client: &BoardClient<T>,
    ledger: &RunLedger,
    force: bool,
    pacing: Option<Duration>,
) -> Result<CleanupResult> {
    let mut cleaner = Cleaner::new(client);
    if let Some(pacing) = pacing {
        cleaner = cleaner.with_pacing(pacing);
    }

    if !force && client.item_exists(&ledger.frame_id)? {
        let live = cleaner.live_item_count(&ledger.frame_id)?;
        let tracked = ledger.items.len();
        if live != tracked && !confirm_mismatch(tracked, live)? {
            return Ok(CleanupResult {
                run_id: ledger.run_id.clone(),
                aborted: true,
                counts: CleanupCounts::default(),
            });
        }
    }

    let counts = cleaner.run(ledger)?;
    Ok(CleanupResult {
        run_id: ledger.run_id.clone(),
        aborted: false,
        counts,
    })
}

/// Count mismatch gate. Never reads stdin unless it is a terminal.
fn confirm_mismatch(tracked: usize, live: usize) -> Result<bool> {
    eprintln!("Warning: frame item count mismatch");
    eprintln!("  ledger: {tracked} items");
    eprintln!("  board:  {live} items in frame");
    if !std::io::stdin().is_terminal() {
        return Err(Error::Other(
            "count mismatch in non-interactive environment; use --force to skip verification"
                .to_string(),
        ));
    }
    eprint!("Continue with deletion? (y/N): ");
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

#[derive(Debug, Serialize)]
pub struct PlanCheckResult {
    pub valid: bool,
    pub title: String,
    pub lanes: usize,
    pub columns: usize,
    pub nodes: usize,
    pub edges: usize,
}

impl Output for PlanCheckResult {
    fn to_human(&self) -> String {
        format!(
            "Plan OK: '{}', {} lanes x {} columns, {} nodes, {} edges",
            self.title, self.lanes, self.columns, self.nodes, self.edges
        )
    }
}

/// Offline plan validation; exit 1 with the rule violations on failure.
pub fn plan_check(plan_path: &Path) -> Result<PlanCheckResult> {
    let plan = ChartPlan::load(plan_path)?;
    Ok(PlanCheckResult {
        valid: true,
        title: plan.title.clone(),
        lanes: plan.lanes.len(),
        columns: plan.columns.len(),
        nodes: plan.nodes.len(),
        edges: plan.edges.len(),
    })
}

#[derive(Debug, Serialize)]
pub struct PlanPatchResult {
    pub ops_applied: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written: Option<PathBuf>,
    /// The patched document, when not written to a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Value>,
}

impl Output for PlanPatchResult {
    fn to_human(&self) -> String {
        match (&self.written, &self.plan) {
            (Some(path), _) => format!(
                "Applied {} ops, wrote {}",
                self.ops_applied,
                path.display()
            ),
            (None, Some(plan)) => serde_json::to_string_pretty(plan)
                .unwrap_or_else(|_| "{}".to_string()),
            (None, None) => format!("Applied {} ops", self.ops_applied),
        }
    }
}

/// Apply a patch file to a plan. The patched plan must still be valid;
/// otherwise nothing is written.
pub fn plan_patch(
    plan_path: &Path,
    patch_path: &Path,
    in_place: bool,
    out: Option<&Path>,
) -> Result<PlanPatchResult> {
    let text = std::fs::read_to_string(plan_path)?;
    let document: Value = serde_json::from_str(&text)?;
    let ops: Vec<PatchEntry> = patch::load_patch_file(patch_path)?;
    let (_, patched) = patch::apply(&document, &ops)?;

    let destination = if in_place { Some(plan_path) } else { out };
    match destination {
        Some(path) => {
            write_json_atomic(&patched, path)?;
            Ok(PlanPatchResult {
                ops_applied: ops.len(),
                written: Some(path.to_path_buf()),
                plan: None,
            })
        }
        None => Ok(PlanPatchResult {
            ops_applied: ops.len(),
            written: None,
            plan: Some(patched),
        }),
    }
}

fn write_json_atomic(value: &Value, path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
