//! Board API client: frames, bulk item creation, connectors, deletes,
//! paginated read-back, bounded retry with exponential backoff.

use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

use super::transport::{ApiRequest, ApiResponse, RemoteError, Transport};

/// Max items per bulk call; the service rejects larger arrays.
pub const BULK_BATCH_SIZE: usize = 20;

/// Page size for list endpoints.
const PAGE_LIMIT: u32 = 50;

/// Bounded retry with exponential backoff.
///
/// Rate-limit responses (429) honor an explicit Retry-After duration when
/// present, falling back to the schedule; 5xx and transport failures use
/// the schedule; any other 4xx is not transient and fails immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget with no sleeping, for tests.
    pub fn immediate() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before retrying after `attempt` (0-based): base, doubled
    /// each attempt.
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Delay before the next attempt; rate-limited responses may carry
    /// their own.
    fn delay_for(&self, retry_after: Option<u64>, attempt: u32) -> Duration {
        retry_after
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.backoff(attempt))
    }
}

/// Authenticated client for one board, generic over the transport.
pub struct BoardClient<T: Transport> {
    transport: T,
    board_id: String,
    retry: RetryPolicy,
}

impl<T: Transport> BoardClient<T> {
    pub fn new(transport: T, board_id: &str) -> Self {
        Self {
            transport,
            board_id: board_id.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    /// The underlying transport; test doubles inspect recorded calls here.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// One call through the retry budget. Returns only 2xx responses;
    /// non-retryable statuses surface immediately, transient ones after
    /// the budget is exhausted.
    fn call(&self, request: &ApiRequest) -> Result<ApiResponse, RemoteError> {
        let mut last: Option<RemoteError> = None;
        for attempt in 0..self.retry.max_attempts {
            let wait = match self.transport.send(request) {
                Ok(resp) if resp.is_success() => return Ok(resp),
                Ok(resp) if resp.status == 429 => {
                    let wait = self.retry.delay_for(resp.retry_after, attempt);
                    last = Some(status_error(resp));
                    wait
                }
                Ok(resp) if resp.status >= 500 => {
                    last = Some(status_error(resp));
                    self.retry.backoff(attempt)
                }
                Ok(resp) => return Err(status_error(resp)),
                Err(e @ RemoteError::Transport(_)) => {
                    last = Some(e);
                    self.retry.backoff(attempt)
                }
                Err(e) => return Err(e),
            };
            if attempt + 1 < self.retry.max_attempts {
                thread::sleep(wait);
            }
        }
        Err(RemoteError::RetriesExhausted {
            attempts: self.retry.max_attempts,
            last: Box::new(last.unwrap_or(RemoteError::Transport("no attempts made".to_string()))),
        })
    }

    /// Create the frame scoping one run. Returns the frame's remote id.
    pub fn create_frame(
        &self,
        title: &str,
        x: i64,
        y: i64,
        width: i64,
        height: i64,
    ) -> Result<String, RemoteError> {
        let body = json!({
            "data": {"title": title, "type": "freeform"},
            "position": {"x": x, "y": y},
            "geometry": {"width": width, "height": height},
            "style": {"fillColor": "#FFFFFF"},
        });
        let resp = self.call(&ApiRequest::post(
            format!("/boards/{}/frames", self.board_id),
            body,
        ))?;
        item_id(&resp.body)
    }

    /// Create up to [`BULK_BATCH_SIZE`] items in one transactional call.
    /// The response array is same-length and order-preserving; the n-th
    /// created item corresponds to the n-th descriptor.
    pub fn bulk_create(&self, items: &[Value]) -> Result<Vec<Value>, RemoteError> {
        let resp = self.call(&ApiRequest::post(
            format!("/boards/{}/items/bulk", self.board_id),
            Value::Array(items.to_vec()),
        ))?;
        let created = extract_items(&resp.body)?;
        if created.len() != items.len() {
            return Err(RemoteError::UnexpectedResponse(format!(
                "bulk create sent {} items, response has {}",
                items.len(),
                created.len()
            )));
        }
        Ok(created)
    }

    /// Create one connector. The protocol forbids connector batching.
    pub fn create_connector(&self, body: Value) -> Result<String, RemoteError> {
        let resp = self.call(&ApiRequest::post(
            format!("/boards/{}/connectors", self.board_id),
            body,
        ))?;
        item_id(&resp.body)
    }

    pub fn delete_item(&self, item_id: &str) -> Result<(), RemoteError> {
        self.delete(format!("/boards/{}/items/{}", self.board_id, item_id))
    }

    pub fn delete_connector(&self, connector_id: &str) -> Result<(), RemoteError> {
        self.delete(format!(
            "/boards/{}/connectors/{}",
            self.board_id, connector_id
        ))
    }

    // Not-found means the target is already gone; deletion stays idempotent
    // under retries and partial prior cleanups.
    fn delete(&self, path: String) -> Result<(), RemoteError> {
        match self.call(&ApiRequest::delete(path)) {
            Ok(_) => Ok(()),
            Err(RemoteError::Status { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn get_item(&self, item_id: &str) -> Result<Value, RemoteError> {
        let resp = self.call(&ApiRequest::get(format!(
            "/boards/{}/items/{}",
            self.board_id, item_id
        )))?;
        Ok(resp.body)
    }

    /// False when the item is gone (404), true when it still exists.
    pub fn item_exists(&self, item_id: &str) -> Result<bool, RemoteError> {
        match self.get_item(item_id) {
            Ok(_) => Ok(true),
            Err(RemoteError::Status { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn get_items(&self, cursor: Option<&str>, limit: u32) -> Result<Value, RemoteError> {
        let mut req =
            ApiRequest::get(format!("/boards/{}/items", self.board_id)).query("limit", limit);
        if let Some(cursor) = cursor {
            req = req.query("cursor", cursor);
        }
        Ok(self.call(&req)?.body)
    }

    pub fn get_frame_items(
        &self,
        frame_id: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Value, RemoteError> {
        let mut req = ApiRequest::get(format!("/boards/{}/items", self.board_id))
            .query("limit", limit)
            .query("parent_item_id", frame_id);
        if let Some(cursor) = cursor {
            req = req.query("cursor", cursor);
        }
        Ok(self.call(&req)?.body)
    }

    pub fn get_connectors(&self, cursor: Option<&str>, limit: u32) -> Result<Value, RemoteError> {
        let mut req =
            ApiRequest::get(format!("/boards/{}/connectors", self.board_id)).query("limit", limit);
        if let Some(cursor) = cursor {
            req = req.query("cursor", cursor);
        }
        Ok(self.call(&req)?.body)
    }

    /// All items inside a frame, draining pagination.
    pub fn readback_frame_items(&self, frame_id: &str) -> Result<Vec<Value>, RemoteError> {
        self.drain_pages(|cursor| self.get_frame_items(frame_id, cursor, PAGE_LIMIT))
    }

    /// All connectors on the board, draining pagination.
    pub fn readback_connectors(&self) -> Result<Vec<Value>, RemoteError> {
        self.drain_pages(|cursor| self.get_connectors(cursor, PAGE_LIMIT))
    }

    fn drain_pages<F>(&self, mut fetch: F) -> Result<Vec<Value>, RemoteError>
    where
        F: FnMut(Option<&str>) -> Result<Value, RemoteError>,
    {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = fetch(cursor.as_deref())?;
            let items = page
                .get("data")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let page_empty = items.is_empty();
            all.extend(items);
            match page.get("cursor").and_then(Value::as_str) {
                Some(next) if !next.is_empty() && !page_empty => cursor = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(all)
    }

    /// Scan the board for frames and return (right edge x, center y) of the
    /// rightmost one, or (0, 0) on a board without frames.
    pub fn find_rightmost_frame(&self) -> Result<(i64, i64), RemoteError> {
        let mut rightmost_x = 0i64;
        let mut center_y = 0i64;
        let mut cursor: Option<String> = None;
        loop {
            let page = self.get_items(cursor.as_deref(), PAGE_LIMIT)?;
            let items = page
                .get("data")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for item in &items {
                if item.get("type").and_then(Value::as_str) != Some("frame") {
                    continue;
                }
                let x = nested_f64(item, "position", "x") as i64;
                let width = nested_f64(item, "geometry", "width") as i64;
                let right_edge = x + width / 2;
                if right_edge > rightmost_x {
                    rightmost_x = right_edge;
                    center_y = nested_f64(item, "position", "y") as i64;
                }
            }
            let page_empty = items.is_empty();
            match page.get("cursor").and_then(Value::as_str) {
                Some(next) if !next.is_empty() && !page_empty => cursor = Some(next.to_string()),
                _ => break,
            }
        }
        Ok((rightmost_x, center_y))
    }
}

fn item_id(body: &Value) -> Result<String, RemoteError> {
    body.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::UnexpectedResponse(format!("missing item id in {body}")))
}

/// Created-item arrays come back as `{"data": [...]}`, `{"items": [...]}`,
/// or a bare array depending on the endpoint version.
fn extract_items(body: &Value) -> Result<Vec<Value>, RemoteError> {
    if let Some(arr) = body.get("data").and_then(Value::as_array) {
        return Ok(arr.clone());
    }
    if let Some(arr) = body.get("items").and_then(Value::as_array) {
        return Ok(arr.clone());
    }
    if let Some(arr) = body.as_array() {
        return Ok(arr.clone());
    }
    Err(RemoteError::UnexpectedResponse(format!(
        "expected item array, got {body}"
    )))
}

fn nested_f64(item: &Value, outer: &str, key: &str) -> f64 {
    item.get(outer)
        .and_then(|v| v.get(key))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

fn status_error(resp: ApiResponse) -> RemoteError {
    let body = match &resp.body {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    RemoteError::Status {
        status: resp.status,
        body,
    }
}
