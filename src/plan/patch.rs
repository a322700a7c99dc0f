//! Constrained JSON-Patch subset applied to plan documents.
//!
//! Supports `replace`, `add`, and `remove` addressed by paths like
//! `/nodes/1/dx`, `/layout/col_width`, or `/lanes` (whole-array replace).
//! A missing path is a hard error, never a silent no-op, and the patched
//! document is re-validated as a whole before it is accepted. Patches are
//! the sole contract between validator findings and the next generation
//! round, so every correction stays auditable.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::ChartPlan;
use crate::{Error, Result};

/// Supported patch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOp {
    Replace,
    Add,
    Remove,
}

/// One patch operation: op + path + value (absent for `remove`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchEntry {
    pub op: PatchOp,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchEntry {
    pub fn replace(path: &str, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.to_string(),
            value: Some(value),
        }
    }

    pub fn add(path: &str, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.to_string(),
            value: Some(value),
        }
    }

    pub fn remove(path: &str) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.to_string(),
            value: None,
        }
    }
}

/// Load a patch file: a JSON array of operations.
pub fn load_patch_file(path: &Path) -> Result<Vec<PatchEntry>> {
    let text = fs::read_to_string(path)?;
    let entries: Vec<PatchEntry> = serde_json::from_str(&text)?;
    Ok(entries)
}

/// Apply a batch of operations to a plan document.
///
/// All operations apply in order against a copy; the result is then
/// re-validated against every document invariant. If any operation fails or
/// the patched document is invalid, the whole patch is rejected and the
/// input is left untouched.
pub fn apply(document: &Value, ops: &[PatchEntry]) -> Result<(ChartPlan, Value)> {
    let mut patched = document.clone();
    for entry in ops {
        apply_one(&mut patched, entry)?;
    }
    let plan = ChartPlan::from_value(patched.clone())
        .map_err(|e| Error::Patch(format!("patched document is invalid: {e}")))?;
    Ok((plan, patched))
}

fn apply_one(root: &mut Value, entry: &PatchEntry) -> Result<()> {
    let segments: Vec<&str> = entry.path.split('/').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(Error::Patch(format!(
            "empty path in {:?} operation",
            entry.op
        )));
    };

    // Walk to the parent of the addressed element.
    let mut walked = String::new();
    let mut target = root;
    for seg in parents {
        walked.push('/');
        walked.push_str(seg);
        target = match target {
            Value::Array(arr) => {
                let idx = parse_index(seg, &walked)?;
                let len = arr.len();
                arr.get_mut(idx).ok_or_else(|| {
                    Error::Patch(format!("path {walked}: index {idx} out of range (len {len})"))
                })?
            }
            Value::Object(map) => map
                .get_mut(*seg)
                .ok_or_else(|| Error::Patch(format!("path {walked} does not exist")))?,
            _ => {
                return Err(Error::Patch(format!(
                    "path {walked} does not address a container"
                )));
            }
        };
    }

    let path = &entry.path;
    match entry.op {
        PatchOp::Replace => {
            let value = required_value(entry)?;
            match target {
                Value::Array(arr) => {
                    let idx = parse_index(last, path)?;
                    let len = arr.len();
                    let slot = arr.get_mut(idx).ok_or_else(|| {
                        Error::Patch(format!("path {path}: index {idx} out of range (len {len})"))
                    })?;
                    *slot = value;
                }
                Value::Object(map) => {
                    let slot = map
                        .get_mut(*last)
                        .ok_or_else(|| Error::Patch(format!("path {path} does not exist")))?;
                    *slot = value;
                }
                _ => {
                    return Err(Error::Patch(format!(
                        "path {path} does not address a container"
                    )));
                }
            }
        }
        PatchOp::Add => {
            let value = required_value(entry)?;
            match target {
                Value::Array(arr) => {
                    let idx = parse_index(last, path)?;
                    if idx > arr.len() {
                        return Err(Error::Patch(format!(
                            "path {path}: index {idx} out of range (len {})",
                            arr.len()
                        )));
                    }
                    arr.insert(idx, value);
                }
                Value::Object(map) => {
                    map.insert((*last).to_string(), value);
                }
                _ => {
                    return Err(Error::Patch(format!(
                        "path {path} does not address a container"
                    )));
                }
            }
        }
        PatchOp::Remove => {
            match target {
                Value::Array(arr) => {
                    let idx = parse_index(last, path)?;
                    if idx >= arr.len() {
                        return Err(Error::Patch(format!(
                            "path {path}: index {idx} out of range (len {})",
                            arr.len()
                        )));
                    }
                    arr.remove(idx);
                }
                Value::Object(map) => {
                    if map.remove(*last).is_none() {
                        return Err(Error::Patch(format!("path {path} does not exist")));
                    }
                }
                _ => {
                    return Err(Error::Patch(format!(
                        "path {path} does not address a container"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn required_value(entry: &PatchEntry) -> Result<Value> {
    entry.value.clone().ok_or_else(|| {
        Error::Patch(format!(
            "{:?} operation on {} requires a value",
            entry.op, entry.path
        ))
    })
}

fn parse_index(seg: &str, path: &str) -> Result<usize> {
    seg.parse::<usize>()
        .map_err(|_| Error::Patch(format!("path {path}: '{seg}' is not an array index")))
}
