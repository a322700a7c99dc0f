//! Run ledger: the durable record of everything a run created remotely.
//!
//! A JSONL event log, one record per line, appended after every successful
//! batch, connector creation, or status change; never buffered for a final
//! flush. The contract is that the log reflects exactly what the remote
//! side has, never more: a crash after N of M batches leaves N batches'
//! worth of remote identifiers on disk, so cleanup and diagnostics always
//! operate on what was actually created.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Reserved ledger key for background/decoration items not tied to a node.
pub const BACKGROUND_KEY: &str = "_bg";

/// Run status recorded in the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    InProgress,
    Completed,
    Failed,
}

/// One created item: logical key to remote identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub key: String,
    pub remote_id: String,
    pub item_type: String,
}

impl ItemRecord {
    pub fn new(key: &str, remote_id: &str, item_type: &str) -> Self {
        Self {
            key: key.to_string(),
            remote_id: remote_id.to_string(),
            item_type: item_type.to_string(),
        }
    }
}

/// One created connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorRecord {
    pub source: String,
    pub destination: String,
    pub remote_id: String,
}

/// One ledger line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum LedgerRecord {
    Opened {
        run_id: String,
        board_id: String,
        frame_id: String,
        created_at: DateTime<Utc>,
    },
    Items {
        batch: u32,
        items: Vec<ItemRecord>,
    },
    Connector(ConnectorRecord),
    Status {
        status: RunStatus,
    },
}

/// Append-only writer for one run. Every append reaches the file before
/// the method returns.
pub struct LedgerWriter {
    file: File,
    path: PathBuf,
    batches: u32,
}

impl LedgerWriter {
    /// Create the ledger and immediately record the opened run.
    pub fn create(path: &Path, run_id: &str, board_id: &str, frame_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = Self {
            file,
            path: path.to_path_buf(),
            batches: 0,
        };
        writer.append(&LedgerRecord::Opened {
            run_id: run_id.to_string(),
            board_id: board_id.to_string(),
            frame_id: frame_id.to_string(),
            created_at: Utc::now(),
        })?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one fully-succeeded batch. Returns the 1-based batch number.
    pub fn append_batch(&mut self, items: Vec<ItemRecord>) -> Result<u32> {
        self.batches += 1;
        let batch = self.batches;
        self.append(&LedgerRecord::Items { batch, items })?;
        Ok(batch)
    }

    /// Record one created connector.
    pub fn append_connector(
        &mut self,
        source: &str,
        destination: &str,
        remote_id: &str,
    ) -> Result<()> {
        self.append(&LedgerRecord::Connector(ConnectorRecord {
            source: source.to_string(),
            destination: destination.to_string(),
            remote_id: remote_id.to_string(),
        }))
    }

    /// Record a status transition.
    pub fn set_status(&mut self, status: RunStatus) -> Result<()> {
        self.append(&LedgerRecord::Status { status })
    }

    fn append(&mut self, record: &LedgerRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        writeln!(self.file, "{json}")?;
        self.file.flush()?;
        Ok(())
    }
}

/// One item in the folded view, with the batch that created it.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerItem {
    pub key: String,
    pub remote_id: String,
    pub item_type: String,
    pub batch: u32,
}

/// Folded view of a ledger file.
#[derive(Debug, Clone, Serialize)]
pub struct RunLedger {
    pub run_id: String,
    pub board_id: String,
    pub frame_id: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<LedgerItem>,
    pub connectors: Vec<ConnectorRecord>,
    pub status: RunStatus,
}

impl RunLedger {
    /// Fold a ledger file in record order. A file with no status record
    /// reads as in-progress: the crash trail of an interrupted run.
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut opened = None;
        let mut items = Vec::new();
        let mut connectors = Vec::new();
        let mut status = RunStatus::InProgress;

        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: LedgerRecord = serde_json::from_str(&line)
                .map_err(|e| Error::Ledger(format!("{}:{}: {e}", path.display(), number + 1)))?;
            match record {
                LedgerRecord::Opened {
                    run_id,
                    board_id,
                    frame_id,
                    created_at,
                } => opened = Some((run_id, board_id, frame_id, created_at)),
                LedgerRecord::Items {
                    batch,
                    items: recorded,
                } => items.extend(recorded.into_iter().map(|r| LedgerItem {
                    key: r.key,
                    remote_id: r.remote_id,
                    item_type: r.item_type,
                    batch,
                })),
                LedgerRecord::Connector(c) => connectors.push(c),
                LedgerRecord::Status { status: s } => status = s,
            }
        }

        let Some((run_id, board_id, frame_id, created_at)) = opened else {
            return Err(Error::Ledger(format!(
                "{}: no opened record",
                path.display()
            )));
        };

        Ok(Self {
            run_id,
            board_id,
            frame_id,
            created_at,
            items,
            connectors,
            status,
        })
    }

    /// Remote id recorded for a logical key.
    pub fn remote_id(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|i| i.key == key)
            .map(|i| i.remote_id.as_str())
    }

    /// Items tied to plan nodes; background entries excluded.
    pub fn node_items(&self) -> impl Iterator<Item = &LedgerItem> {
        self.items.iter().filter(|i| i.key != BACKGROUND_KEY)
    }

    /// The connector recorded for an edge, if any.
    pub fn connector(&self, source: &str, destination: &str) -> Option<&ConnectorRecord> {
        self.connectors
            .iter()
            .find(|c| c.source == source && c.destination == destination)
    }
}
