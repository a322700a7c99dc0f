//! Run teardown: delete a run's remote output in dependency order.
//!
//! Connectors go first (they reference items), then items, then the frame.
//! Targets that are already gone count as deleted; any other per-target
//! failure is warned and skipped so one stuck item cannot wedge the run.

use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::Result;
use crate::ledger::RunLedger;
use crate::remote::{BoardClient, Transport};

/// Pause between deletes so teardown stays under the API rate limit.
const DELETE_PACING: Duration = Duration::from_millis(100);

/// What a teardown actually removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupCounts {
    pub connectors: usize,
    pub items: usize,
    pub frames: usize,
    pub skipped: usize,
}

impl CleanupCounts {
    pub fn is_empty(&self) -> bool {
        self.connectors == 0 && self.items == 0 && self.frames == 0 && self.skipped == 0
    }
}

pub struct Cleaner<'a, T: Transport> {
    client: &'a BoardClient<T>,
    pacing: Duration,
}

impl<'a, T: Transport> Cleaner<'a, T> {
    pub fn new(client: &'a BoardClient<T>) -> Self {
        Self {
            client,
            pacing: DELETE_PACING,
        }
    }

    /// Tests run with zero pacing.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// How many items the board currently holds inside the run's frame.
    /// Compared against the ledger before deleting anything.
    pub fn live_item_count(&self, frame_id: &str) -> Result<usize> {
        Ok(self.client.readback_frame_items(frame_id)?.len())
    }

    /// Delete everything the ledger tracks. A frame that is already gone
    /// short-circuits: the board deletes children with their frame.
    pub fn run(&self, ledger: &RunLedger) -> Result<CleanupCounts> {
        let mut counts = CleanupCounts::default();

        if !self.client.item_exists(&ledger.frame_id)? {
            eprintln!(
                "Frame {} not found - already cleaned up.",
                ledger.frame_id
            );
            return Ok(counts);
        }

        for record in &ledger.connectors {
            match self.client.delete_connector(&record.remote_id) {
                Ok(()) => {
                    counts.connectors += 1;
                    self.pace();
                }
                Err(e) => {
                    counts.skipped += 1;
                    eprintln!(
                        "Warning: failed to delete connector {}: {e}",
                        record.remote_id
                    );
                }
            }
        }

        for item in &ledger.items {
            match self.client.delete_item(&item.remote_id) {
                Ok(()) => {
                    counts.items += 1;
                    self.pace();
                }
                Err(e) => {
                    counts.skipped += 1;
                    eprintln!("Warning: failed to delete item {}: {e}", item.remote_id);
                }
            }
        }

        match self.client.delete_item(&ledger.frame_id) {
            Ok(()) => counts.frames += 1,
            Err(e) => {
                counts.skipped += 1;
                eprintln!("Warning: failed to delete frame {}: {e}", ledger.frame_id);
            }
        }

        Ok(counts)
    }

    fn pace(&self) {
        if !self.pacing.is_zero() {
            thread::sleep(self.pacing);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use serde_json::{Value, json};

    use super::*;
    use crate::ledger::{ConnectorRecord, LedgerItem, RunStatus};
    use crate::remote::{ApiRequest, ApiResponse, Method, RemoteError, RetryPolicy};

    struct ScriptedTransport {
        responses: RefCell<VecDeque<ApiResponse>>,
        calls: RefCell<Vec<(Method, String)>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<ApiResponse>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(Method, String)> {
            self.calls.borrow().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: &ApiRequest) -> Result<ApiResponse, RemoteError> {
            self.calls
                .borrow_mut()
                .push((request.method, request.path.clone()));
            self.responses
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| RemoteError::Transport("script exhausted".to_string()))
        }
    }

    fn ok(status: u16, body: Value) -> ApiResponse {
        ApiResponse {
            status,
            retry_after: None,
            body,
        }
    }

    fn test_ledger() -> RunLedger {
        RunLedger {
            run_id: "run-1".to_string(),
            board_id: "b1".to_string(),
            frame_id: "f1".to_string(),
            created_at: chrono::Utc::now(),
            items: vec![
                LedgerItem {
                    key: "_bg".to_string(),
                    remote_id: "i1".to_string(),
                    item_type: "shape".to_string(),
                    batch: 1,
                },
                LedgerItem {
                    key: "t1".to_string(),
                    remote_id: "i2".to_string(),
                    item_type: "shape".to_string(),
                    batch: 2,
                },
            ],
            connectors: vec![
                ConnectorRecord {
                    source: "t1".to_string(),
                    destination: "t2".to_string(),
                    remote_id: "c1".to_string(),
                },
                ConnectorRecord {
                    source: "t2".to_string(),
                    destination: "t3".to_string(),
                    remote_id: "c2".to_string(),
                },
            ],
            status: RunStatus::Completed,
        }
    }

    fn cleaner_client(responses: Vec<ApiResponse>) -> BoardClient<ScriptedTransport> {
        BoardClient::new(ScriptedTransport::new(responses), "b1")
            .with_retry(RetryPolicy::immediate())
    }

    #[test]
    fn deletes_connectors_then_items_then_frame() {
        let client = cleaner_client(vec![
            ok(200, json!({"id": "f1", "type": "frame"})),
            ok(204, Value::Null),
            ok(204, Value::Null),
            ok(204, Value::Null),
            ok(204, Value::Null),
            ok(204, Value::Null),
        ]);
        let counts = Cleaner::new(&client)
            .with_pacing(Duration::ZERO)
            .run(&test_ledger())
            .unwrap();

        assert_eq!(counts.connectors, 2);
        assert_eq!(counts.items, 2);
        assert_eq!(counts.frames, 1);
        assert_eq!(counts.skipped, 0);

        let calls = client.transport().calls();
        let paths: Vec<&str> = calls.iter().map(|(_, p)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/boards/b1/items/f1",
                "/boards/b1/connectors/c1",
                "/boards/b1/connectors/c2",
                "/boards/b1/items/i1",
                "/boards/b1/items/i2",
                "/boards/b1/items/f1",
            ]
        );
        assert_eq!(calls[0].0, Method::Get);
        assert!(calls[1..].iter().all(|(m, _)| *m == Method::Delete));
    }

    #[test]
    fn missing_frame_short_circuits_with_zero_counts() {
        let client = cleaner_client(vec![ok(404, json!({"message": "not found"}))]);
        let counts = Cleaner::new(&client)
            .with_pacing(Duration::ZERO)
            .run(&test_ledger())
            .unwrap();

        assert!(counts.is_empty());
        assert_eq!(client.transport().calls().len(), 1);
    }

    #[test]
    fn already_deleted_targets_count_as_deleted() {
        let client = cleaner_client(vec![
            ok(200, json!({"id": "f1"})),
            ok(404, Value::Null),
            ok(204, Value::Null),
            ok(404, Value::Null),
            ok(404, Value::Null),
            ok(204, Value::Null),
        ]);
        let counts = Cleaner::new(&client)
            .with_pacing(Duration::ZERO)
            .run(&test_ledger())
            .unwrap();

        assert_eq!(counts.connectors, 2);
        assert_eq!(counts.items, 2);
        assert_eq!(counts.frames, 1);
        assert_eq!(counts.skipped, 0);
    }

    #[test]
    fn failed_delete_is_skipped_and_teardown_continues() {
        let client = cleaner_client(vec![
            ok(200, json!({"id": "f1"})),
            ok(403, json!({"message": "forbidden"})),
            ok(204, Value::Null),
            ok(204, Value::Null),
            ok(204, Value::Null),
            ok(204, Value::Null),
        ]);
        let counts = Cleaner::new(&client)
            .with_pacing(Duration::ZERO)
            .run(&test_ledger())
            .unwrap();

        assert_eq!(counts.connectors, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.items, 2);
        assert_eq!(counts.frames, 1);
    }

    #[test]
    fn live_item_count_drains_pagination() {
        let client = cleaner_client(vec![
            ok(200, json!({"data": [{"id": "a"}, {"id": "b"}], "cursor": "next"})),
            ok(200, json!({"data": [{"id": "c"}]})),
        ]);
        let count = Cleaner::new(&client).live_item_count("f1").unwrap();
        assert_eq!(count, 3);
    }
}
