//! REST and streaming client for the Firebase Realtime Database.
//!
//! Every node in the database is addressable as `{base}/{path}.json` and
//! supports plain GET/PUT/PATCH/DELETE. Conditional writes ride on ETags:
//! a GET with `X-Firebase-ETag: true` returns the node's current ETag, and
//! a PUT with `if-match` is rejected with 412 when the node has moved on.
//! Live updates come over a Server-Sent-Events stream of `put` and `patch`
//! deltas against the subscribed node.

use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, instrument};

use crate::error::RtdbError;

// ============================================================================
// Client
// ============================================================================

/// Client for one Realtime Database instance.
///
/// Cheap to clone; all clones share the underlying connection pool.
#[derive(Clone)]
pub struct RtdbClient {
    inner: Arc<RtdbClientInner>,
}

struct RtdbClientInner {
    client: reqwest::Client,
    base_url: String,
}

/// Result of a conditional [`RtdbClient::put_if_match`] write.
#[derive(Debug)]
pub enum CasOutcome {
    /// The write was accepted.
    Committed,
    /// Another writer got there first. Carries the node's value and ETag as
    /// they stand now, so the caller can rebase without an extra read.
    Conflict {
        /// Value of the node after the competing write
        current: Value,
        /// ETag matching `current`
        etag: String,
    },
}

/// One event from a database listen stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RtdbEvent {
    /// Replace the node at `path` (relative to the subscribed node) with
    /// `data`. A null `data` deletes the node. The first event of every
    /// stream is a `put` at `/` carrying the full current value.
    Put {
        /// Slash-separated path relative to the subscription root
        path: String,
        /// New value, `Value::Null` to delete
        data: Value,
    },
    /// Merge the children of `data` into the node at `path`.
    Patch {
        /// Slash-separated path relative to the subscription root
        path: String,
        /// Children to overlay; null children delete
        data: Value,
    },
    /// Periodic no-op keeping the connection alive.
    KeepAlive,
    /// The security rules no longer allow this read. Terminal.
    Cancel,
    /// The auth credential expired mid-stream. Reconnect with a fresh token.
    AuthRevoked,
}

impl RtdbClient {
    /// Creates a client for the database at `base_url`, such as
    /// `https://my-app-default-rtdb.firebaseio.com`.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: Arc::new(RtdbClientInner {
                client: reqwest::Client::new(),
                base_url: base_url.trim_end_matches('/').to_owned(),
            }),
        }
    }

    fn url(&self, path: &str, token: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}.json",
            self.inner.base_url,
            path.trim_matches('/')
        );
        if let Some(token) = token {
            url.push_str("?auth=");
            url.push_str(token);
        }
        url
    }

    /// Reads the value at `path`. Missing nodes read as `Value::Null`.
    #[instrument(skip(self, token), fields(path = %path))]
    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<Value, RtdbError> {
        let response = self.inner.client.get(self.url(path, token)).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Reads the value at `path` together with its ETag.
    #[instrument(skip(self, token), fields(path = %path))]
    pub async fn get_with_etag(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<(Value, String), RtdbError> {
        let response = self
            .inner
            .client
            .get(self.url(path, token))
            .header("X-Firebase-ETag", "true")
            .send()
            .await?;
        let response = check_status(response).await?;
        let etag = etag_header(&response).ok_or(RtdbError::MissingEtag)?;
        let value = response.json().await?;
        Ok((value, etag))
    }

    /// Overwrites the value at `path`.
    #[instrument(skip(self, value, token), fields(path = %path))]
    pub async fn put(&self, path: &str, value: &Value, token: Option<&str>) -> Result<(), RtdbError> {
        let response = self
            .inner
            .client
            .put(self.url(path, token))
            .json(value)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Overwrites the value at `path` only if its ETag still matches.
    #[instrument(skip(self, value, token), fields(path = %path))]
    pub async fn put_if_match(
        &self,
        path: &str,
        value: &Value,
        etag: &str,
        token: Option<&str>,
    ) -> Result<CasOutcome, RtdbError> {
        let response = self
            .inner
            .client
            .put(self.url(path, token))
            .header("if-match", etag)
            .json(value)
            .send()
            .await?;

        // A 412 rejection carries the node's current value and ETag.
        if response.status() == reqwest::StatusCode::PRECONDITION_FAILED {
            let etag = etag_header(&response).ok_or(RtdbError::MissingEtag)?;
            let current = response.json().await?;
            return Ok(CasOutcome::Conflict { current, etag });
        }

        check_status(response).await?;
        Ok(CasOutcome::Committed)
    }

    /// Merges the children of `value` into the node at `path`.
    #[instrument(skip(self, value, token), fields(path = %path))]
    pub async fn patch(
        &self,
        path: &str,
        value: &Value,
        token: Option<&str>,
    ) -> Result<(), RtdbError> {
        let response = self
            .inner
            .client
            .patch(self.url(path, token))
            .json(value)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Deletes the node at `path`. Deleting a missing node succeeds.
    #[instrument(skip(self, token), fields(path = %path))]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<(), RtdbError> {
        let response = self
            .inner
            .client
            .delete(self.url(path, token))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Opens a listen stream for the node at `path`.
    ///
    /// The server's first event is a `put` at `/` with the node's full
    /// current value. The stream runs until the connection drops, the
    /// credential is revoked, or the server cancels the read.
    #[instrument(skip(self, token), fields(path = %path))]
    pub async fn listen(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<impl Stream<Item = Result<RtdbEvent, RtdbError>>, RtdbError> {
        let response = self
            .inner
            .client
            .get(self.url(path, token))
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        // Check for error responses before streaming
        let response = check_status(response).await?;

        // Return a stream that parses SSE events
        Ok(stream! {
            use futures::StreamExt;

            let mut buffer = String::new();
            let mut byte_stream = std::pin::pin!(response.bytes_stream());

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        let text = match std::str::from_utf8(&chunk) {
                            Ok(t) => t,
                            Err(e) => {
                                yield Err(RtdbError::Stream(format!("Invalid UTF-8: {e}")));
                                continue;
                            }
                        };

                        buffer.push_str(text);

                        // Process complete SSE events
                        while let Some(event) = extract_sse_event(&mut buffer) {
                            if let Some(parsed) = parse_stream_event(&event) {
                                match parsed {
                                    Ok(rtdb_event) => yield Ok(rtdb_event),
                                    Err(e) => yield Err(e),
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(RtdbError::Stream(e.to_string()));
                    }
                }
            }
        })
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RtdbError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(RtdbError::PermissionDenied);
    }
    let body = response.text().await.unwrap_or_default();
    error!(
        status = %status,
        body = %body.chars().take(500).collect::<String>(),
        "Database returned an error"
    );
    Err(RtdbError::Status {
        status: status.as_u16(),
    })
}

fn etag_header(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get("ETag")
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
}

// ============================================================================
// SSE parsing
// ============================================================================

/// Extract a complete SSE event from the buffer.
///
/// Returns `Some(event)` if a complete event was found (and removes it from
/// the buffer), or `None` if no complete event is available yet.
fn extract_sse_event(buffer: &mut String) -> Option<String> {
    // SSE events are separated by double newlines
    buffer.find("\n\n").map(|idx| {
        let event = buffer[..idx].to_string();
        *buffer = buffer[idx + 2..].to_string();
        event
    })
}

/// Wire shape of `put` and `patch` event payloads.
#[derive(Deserialize)]
struct StreamPayload {
    path: String,
    data: Value,
}

/// Parse an SSE event string into an [`RtdbEvent`].
///
/// Database streams name their events, so both the `event:` and `data:`
/// lines matter here.
fn parse_stream_event(event: &str) -> Option<Result<RtdbEvent, RtdbError>> {
    if event.trim().is_empty() {
        return None;
    }

    let mut event_name = None;
    let mut data_line = None;

    for line in event.lines() {
        if let Some(stripped) = line.strip_prefix("event:") {
            event_name = Some(stripped.trim());
        } else if let Some(stripped) = line.strip_prefix("data:") {
            data_line = Some(stripped.trim());
        }
    }

    match event_name? {
        "keep-alive" => Some(Ok(RtdbEvent::KeepAlive)),
        "cancel" => Some(Ok(RtdbEvent::Cancel)),
        "auth_revoked" => Some(Ok(RtdbEvent::AuthRevoked)),
        name @ ("put" | "patch") => {
            let data = data_line?;
            match serde_json::from_str::<StreamPayload>(data) {
                Ok(payload) if name == "put" => Some(Ok(RtdbEvent::Put {
                    path: payload.path,
                    data: payload.data,
                })),
                Ok(payload) => Some(Ok(RtdbEvent::Patch {
                    path: payload.path,
                    data: payload.data,
                })),
                Err(e) => Some(Err(RtdbError::Stream(format!(
                    "Failed to parse {name} event: {e}"
                )))),
            }
        }
        other => {
            debug!(event = other, "Ignoring unknown stream event");
            None
        }
    }
}

// ============================================================================
// Document tree
// ============================================================================

/// Applies a `put` delta to a locally mirrored document tree.
///
/// Intermediate objects are created as needed; a null `data` deletes the
/// target node. Parents emptied by a delete are left as empty objects,
/// which readers treat the same as missing.
pub(crate) fn apply_put(root: &mut Value, path: &str, data: Value) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        *root = data;
        return;
    };
    let parent = ensure_object(node_at(root, parents));
    if data.is_null() {
        parent.remove(*last);
    } else {
        parent.insert((*last).to_string(), data);
    }
}

/// Applies a `patch` delta: overlay `data`'s children onto the target node.
pub(crate) fn apply_patch(root: &mut Value, path: &str, data: Value) {
    let Value::Object(updates) = data else {
        // The server only ever patches with an object payload.
        return;
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let target = ensure_object(node_at(root, &segments));
    for (key, value) in updates {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

fn node_at<'a>(root: &'a mut Value, segments: &[&str]) -> &'a mut Value {
    let mut node = root;
    for segment in segments {
        let map = ensure_object(node);
        node = map.entry((*segment).to_string()).or_insert(Value::Null);
    }
    node
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}
