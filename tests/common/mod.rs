//! Common test utilities for boardwalk integration tests.
//!
//! `TestEnv` gives CLI tests an isolated working directory with the board
//! credentials stripped from the environment. `MockBoard` is an in-memory
//! transport that answers the client's calls with canned shapes and records
//! every request for inspection.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use boardwalk::ledger::{BACKGROUND_KEY, ItemRecord, LedgerWriter, RunStatus};
use boardwalk::remote::{ApiRequest, ApiResponse, Method, RemoteError, Transport};
use serde_json::{Value, json};
pub use tempfile::TempDir;

/// Isolated working directory for CLI tests.
pub struct TestEnv {
    pub work_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            work_dir: TempDir::new().unwrap(),
        }
    }

    /// Command for the bwk binary rooted in the test directory, with the
    /// board credentials removed for determinism.
    pub fn bwk(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_bwk"));
        cmd.current_dir(self.work_dir.path());
        cmd.env_remove("BWK_TOKEN");
        cmd.env_remove("BWK_BOARD_ID");
        cmd.env_remove("BWK_API_BASE");
        cmd
    }

    pub fn path(&self) -> &Path {
        self.work_dir.path()
    }

    /// Write a JSON fixture into the test directory.
    pub fn write_json(&self, name: &str, value: &Value) -> PathBuf {
        let path = self.work_dir.path().join(name);
        std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
        path
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// A plan with three lanes, two columns, three flow nodes and two edges.
pub fn checkout_plan() -> Value {
    json!({
        "schema_version": "1.0",
        "title": "Checkout",
        "subtitle": "Happy path",
        "lanes": ["Customer", "Payments", "Warehouse"],
        "columns": ["Browse", "Pay"],
        "nodes": [
            {"key": "start", "label": "", "lane": "Customer", "column": 0, "kind": "start"},
            {"key": "pay", "label": "Pay order", "lane": "Payments", "column": 1},
            {"key": "ship", "label": "Ship order", "lane": "Warehouse", "column": 1}
        ],
        "edges": [
            {"source": "start", "destination": "pay"},
            {"source": "pay", "destination": "ship", "label": "paid"}
        ]
    })
}

/// Ledger of a completed run on board-1/frame-1: two background items, the
/// three checkout nodes and both connectors.
pub fn completed_run_ledger(dir: &Path) -> PathBuf {
    let path = dir.join("board_items.jsonl");
    let mut writer = LedgerWriter::create(&path, "run-1", "board-1", "frame-1").unwrap();
    writer
        .append_batch(vec![
            ItemRecord::new(BACKGROUND_KEY, "bg-1", "shape"),
            ItemRecord::new(BACKGROUND_KEY, "bg-2", "text"),
        ])
        .unwrap();
    writer
        .append_batch(vec![
            ItemRecord::new("start", "item-1", "shape"),
            ItemRecord::new("pay", "item-2", "shape"),
            ItemRecord::new("ship", "item-3", "shape"),
        ])
        .unwrap();
    writer.append_connector("start", "pay", "conn-1").unwrap();
    writer.append_connector("pay", "ship", "conn-2").unwrap();
    writer.set_status(RunStatus::Completed).unwrap();
    path
}

/// In-memory board transport. Forced responses (FIFO) are served before any
/// routing; `fail_bulk(n)` makes the next n bulk calls answer 503.
pub struct MockBoard {
    calls: RefCell<Vec<ApiRequest>>,
    forced: RefCell<VecDeque<ApiResponse>>,
    bulk_failures: Cell<u32>,
    next_id: Cell<u64>,
}

impl MockBoard {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            forced: RefCell::new(VecDeque::new()),
            bulk_failures: Cell::new(0),
            next_id: Cell::new(0),
        }
    }

    /// Queue a response served ahead of routing.
    pub fn force(&self, status: u16, body: Value) {
        self.forced.borrow_mut().push_back(ApiResponse {
            status,
            retry_after: None,
            body,
        });
    }

    pub fn fail_bulk(&self, n: u32) {
        self.bulk_failures.set(n);
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.borrow().clone()
    }

    /// Recorded calls as "METHOD path" lines.
    pub fn call_lines(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|c| format!("{:?} {}", c.method, c.path))
            .collect()
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        format!("{prefix}-{n}")
    }

    fn route(&self, request: &ApiRequest) -> ApiResponse {
        let path = request.path.as_str();
        match request.method {
            Method::Post if path.ends_with("/items/bulk") => {
                if self.bulk_failures.get() > 0 {
                    self.bulk_failures.set(self.bulk_failures.get() - 1);
                    return ApiResponse {
                        status: 503,
                        retry_after: None,
                        body: json!({"message": "service unavailable"}),
                    };
                }
                let sent = request
                    .body
                    .as_ref()
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let created: Vec<Value> = sent
                    .iter()
                    .map(|item| {
                        json!({
                            "id": self.fresh_id("item"),
                            "type": item.get("type").cloned().unwrap_or_else(|| json!("shape")),
                            "data": item.get("data").cloned().unwrap_or_else(|| json!({})),
                            "position": item.get("position").cloned().unwrap_or_else(|| json!({})),
                            "geometry": item.get("geometry").cloned().unwrap_or_else(|| json!({})),
                        })
                    })
                    .collect();
                ok(json!({"data": created}))
            }
            Method::Post if path.ends_with("/frames") => {
                ok(json!({"id": self.fresh_id("frame")}))
            }
            Method::Post if path.ends_with("/connectors") => {
                ok(json!({"id": self.fresh_id("conn")}))
            }
            Method::Get if path.contains("/items/") => {
                let id = path.rsplit('/').next().unwrap_or("");
                ok(json!({"id": id, "type": "frame"}))
            }
            Method::Get => ok(json!({"data": []})),
            Method::Delete => ApiResponse {
                status: 204,
                retry_after: None,
                body: Value::Null,
            },
        }
    }
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockBoard {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, RemoteError> {
        self.calls.borrow_mut().push(request.clone());
        if let Some(forced) = self.forced.borrow_mut().pop_front() {
            return Ok(forced);
        }
        Ok(self.route(request))
    }
}

fn ok(body: Value) -> ApiResponse {
    ApiResponse {
        status: 200,
        retry_after: None,
        body,
    }
}
