//! HTTP implementation of the remote-store contract
//!
//! Speaks the row-store wire shape: one POST per request with the
//! operation name and payload in the body. Timeouts are the transport
//! defaults; retry policy belongs to the callers.

use super::{Operation, RemoteError, RemoteStore, RequestPayload};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct RequestBody<'a> {
    #[serde(rename = "Action")]
    action: &'static str,
    #[serde(rename = "Properties", skip_serializing_if = "Option::is_none")]
    properties: Option<RequestProperties<'a>>,
    #[serde(rename = "Rows", skip_serializing_if = "<[_]>::is_empty")]
    rows: &'a [Value],
}

#[derive(Serialize)]
struct RequestProperties<'a> {
    #[serde(rename = "Selector")]
    selector: &'a str,
}

/// Remote store client over HTTP
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn request(
        &self,
        entity: &str,
        operation: Operation,
        payload: RequestPayload,
    ) -> Result<Vec<Value>, RemoteError> {
        let url = format!("{}/{}", self.base_url, entity);
        let body = RequestBody {
            action: operation.as_str(),
            properties: payload
                .selector
                .as_deref()
                .map(|selector| RequestProperties { selector }),
            rows: &payload.rows,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Rejected(format!(
                "{} {} returned {status}",
                operation.as_str(),
                entity
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let value: Value =
            serde_json::from_str(&text).map_err(|e| RemoteError::Malformed(e.to_string()))?;

        // The store answers either a bare row array or an object wrapping
        // one under "Rows"; mutations may answer with no body at all.
        match value {
            Value::Array(rows) => Ok(rows),
            Value::Object(mut obj) => match obj.remove("Rows") {
                Some(Value::Array(rows)) => Ok(rows),
                Some(other) => Err(RemoteError::Malformed(format!(
                    "expected row array, got {other}"
                ))),
                None => Ok(Vec::new()),
            },
            Value::Null => Ok(Vec::new()),
            other => Err(RemoteError::Malformed(format!(
                "expected row array, got {other}"
            ))),
        }
    }
}
