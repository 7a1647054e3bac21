pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

pub use http::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Request payload. Binary variants hold `Bytes` so a replay re-sends the
/// same buffer without copying.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Bytes {
        content_type: String,
        data: Bytes,
    },
    /// Single-file multipart form.
    File {
        field: String,
        file_name: String,
        mime: String,
        data: Bytes,
    },
}

/// One logical request. Built once and never mutated by the client, so a
/// replay after renewal is the same request (same id, body and headers).
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub path: String,
    pub method: Method,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
    pub request_id: String,
    pub cancellation: Option<CancellationToken>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            body: None,
            headers: Vec::new(),
            request_id: Uuid::new_v4().to_string(),
            cancellation: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }
}

// The cancellation handle is not part of the request identity.
impl PartialEq for RequestDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.method == other.method
            && self.body == other.body
            && self.headers == other.headers
            && self.request_id == other.request_id
    }
}

/// What the transport hands back for any completed exchange, success or not.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub reason: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            reason: None,
            content_type: Some("application/json".to_string()),
            body: Bytes::from(body.to_string()),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false)
    }

    /// JSON body if the response declares one and it parses; `None` otherwise.
    pub fn json_safely(&self) -> Option<Value> {
        if !self.is_json() || self.body.is_empty() {
            return None;
        }
        match serde_json::from_slice(&self.body) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(status = self.status, error = %err, "discarding undecodable json body");
                None
            }
        }
    }

    pub fn into_error(self) -> ApiError {
        let details = self.json_safely();
        ApiError::from_status(self.status, self.reason.as_deref(), details)
    }

    pub fn into_body(self) -> ResponseBody {
        if self.status == 204 || self.body.is_empty() {
            return ResponseBody::Empty;
        }
        if self.is_json() {
            return self.json_safely().map(ResponseBody::Json).unwrap_or(ResponseBody::Empty);
        }
        ResponseBody::Binary {
            content_type: self.content_type,
            data: self.body,
        }
    }
}

/// Decoded success body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Binary {
        content_type: Option<String>,
        data: Bytes,
    },
}

impl ResponseBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }

    /// Typed view of a JSON body. Empty, binary and mismatched bodies
    /// all decode to `None`.
    pub fn decode<T: DeserializeOwned>(self) -> Option<T> {
        match self {
            ResponseBody::Json(value) => match serde_json::from_value(value) {
                Ok(v) => Some(v),
                Err(err) => {
                    debug!(error = %err, "json body does not match expected shape");
                    None
                }
            },
            _ => None,
        }
    }
}

/// Executes a single request. Implementations keep whatever credential
/// (cookie jar, bearer) the server hands out and attach it to later calls.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> ApiResult<RawResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn no_content_decodes_to_empty() {
        let resp = RawResponse {
            status: 204,
            content_type: Some("application/json".into()),
            ..Default::default()
        };
        assert_eq!(resp.into_body(), ResponseBody::Empty);
    }

    #[test]
    fn malformed_json_is_a_soft_failure() {
        let resp = RawResponse {
            status: 200,
            reason: None,
            content_type: Some("application/json; charset=utf-8".into()),
            body: Bytes::from_static(b"{not json"),
        };
        assert_eq!(resp.into_body(), ResponseBody::Empty);
    }

    #[test]
    fn non_json_body_is_binary() {
        let resp = RawResponse {
            status: 200,
            reason: None,
            content_type: Some("text/csv".into()),
            body: Bytes::from_static(b"key,value\n"),
        };
        match resp.into_body() {
            ResponseBody::Binary { content_type, data } => {
                assert_eq!(content_type.as_deref(), Some("text/csv"));
                assert_eq!(&data[..], b"key,value\n");
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn decode_maps_shape_mismatch_to_none() {
        #[derive(Deserialize)]
        struct Named {
            #[allow(dead_code)]
            name: String,
        }

        let body = RawResponse::json(200, &json!({"id": 1})).into_body();
        assert!(body.decode::<Named>().is_none());

        let body = RawResponse::json(200, &json!({"name": "prod"})).into_body();
        assert!(body.decode::<Named>().is_some());
    }

    #[test]
    fn error_keeps_details() {
        let err = RawResponse::json(409, &json!({"message": "Key exists", "key": "DB_URL"})).into_error();
        assert_eq!(err.status, 409);
        assert_eq!(err.message, "Key exists");
        assert_eq!(err.details.unwrap()["key"], "DB_URL");
    }

    #[test]
    fn descriptor_equality_ignores_cancellation() {
        let a = RequestDescriptor::post("/api/envs").json(json!({"name": "dev"}));
        let b = a.clone().cancellation(CancellationToken::new());
        assert_eq!(a, b);

        let c = RequestDescriptor::post("/api/envs").json(json!({"name": "dev"}));
        assert_ne!(a, c, "fresh descriptors get distinct request ids");
    }
}
