use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, trace};

use super::{Method, RawResponse, RequestBody, RequestDescriptor, Transport};
use crate::error::{ApiError, ApiResult};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// reqwest-backed transport. Holds a cookie jar, so the session cookies set
/// by login/refresh ride along on every later request from this instance.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::transport(format!("building http client: {e}")))?;
        Ok(Self::with_client(base_url, client))
    }

    /// Use a preconfigured client. It should have a cookie store enabled or
    /// session renewal will never take effect.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build(&self, request: &RequestDescriptor) -> ApiResult<reqwest::RequestBuilder> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &url)
            .header(REQUEST_ID_HEADER, &request.request_id);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.body {
            None => builder,
            Some(RequestBody::Json(value)) => {
                let body = serde_json::to_vec(value)
                    .map_err(|e| ApiError::transport(format!("serialize json body: {e}")))?;
                builder.header(CONTENT_TYPE, "application/json").body(body)
            }
            Some(RequestBody::Bytes { content_type, data }) => builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(data.clone()),
            Some(RequestBody::File {
                field,
                file_name,
                mime,
                data,
            }) => {
                let part = Part::bytes(data.to_vec())
                    .file_name(file_name.clone())
                    .mime_str(mime)
                    .map_err(|e| ApiError::transport(format!("invalid mime type {mime}: {e}")))?;
                builder.multipart(Form::new().part(field.clone(), part))
            }
        };

        Ok(builder)
    }

    async fn exchange(&self, request: &RequestDescriptor) -> ApiResult<RawResponse> {
        let builder = self.build(request)?;

        trace!(
            method = request.method.as_str(),
            path = %request.path,
            request_id = %request.request_id,
            "sending request"
        );

        let resp = builder
            .send()
            .await
            .map_err(|e| ApiError::transport(format!("{} {}: {e}", request.method.as_str(), request.path)))?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = resp
            .bytes()
            .await
            .map_err(|e| ApiError::transport(format!("reading response body: {e}")))?;

        debug!(
            method = request.method.as_str(),
            path = %request.path,
            status_code = status.as_u16(),
            body_len = body.len(),
            "received response"
        );

        Ok(RawResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().map(String::from),
            content_type,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> ApiResult<RawResponse> {
        match &request.cancellation {
            Some(token) if token.is_cancelled() => Err(ApiError::cancelled()),
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(path = %request.path, "request cancelled in flight");
                        Err(ApiError::cancelled())
                    }
                    result = self.exchange(request) => result,
                }
            }
            None => self.exchange(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn transport(url: String) -> HttpTransport {
        HttpTransport::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn json_body_is_sent_with_request_id() {
        let mut server = Server::new_async().await;
        let request = RequestDescriptor::post("/api/envs")
            .json(json!({"name": "staging"}))
            .header("x-trace", "abc");

        let mock = server
            .mock("POST", "/api/envs")
            .match_header("content-type", "application/json")
            .match_header("x-request-id", Matcher::Exact(request.request_id.clone()))
            .match_header("x-trace", "abc")
            .match_body(Matcher::Json(json!({"name": "staging"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"e1","name":"staging"}"#)
            .create_async()
            .await;

        let resp = transport(server.url()).send(&request).await.unwrap();
        assert_eq!(resp.status, 201);
        assert_eq!(resp.json_safely().unwrap()["id"], "e1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn cookies_persist_across_calls() {
        let mut server = Server::new_async().await;
        let login = server
            .mock("POST", "/api/auth/login")
            .with_status(200)
            .with_header("set-cookie", "access_token=abc123; Path=/")
            .with_header("content-type", "application/json")
            .with_body(r#"{"email":"a@b.c","role":"ADMIN"}"#)
            .create_async()
            .await;
        let me = server
            .mock("GET", "/api/auth/me")
            .match_header("cookie", Matcher::Regex("access_token=abc123".into()))
            .with_status(200)
            .create_async()
            .await;

        let transport = transport(server.url());
        transport
            .send(&RequestDescriptor::post("/api/auth/login"))
            .await
            .unwrap();
        let resp = transport.send(&RequestDescriptor::get("/api/auth/me")).await.unwrap();
        assert_eq!(resp.status, 200);

        login.assert_async().await;
        me.assert_async().await;
    }

    #[tokio::test]
    async fn file_body_goes_out_as_multipart() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/import")
            .match_header("content-type", Matcher::Regex("^multipart/form-data".into()))
            .match_body(Matcher::Regex(r#"name="file"; filename="creds.csv""#.into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("3")
            .create_async()
            .await;

        let request = RequestDescriptor::post("/import").body(RequestBody::File {
            field: "file".into(),
            file_name: "creds.csv".into(),
            mime: "text/csv".into(),
            data: bytes::Bytes::from_static(b"key,value\nDB_URL,x\n"),
        });
        let resp = transport(server.url()).send(&request).await.unwrap();
        assert_eq!(resp.json_safely(), Some(json!(3)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn cancelled_request_never_leaves() {
        let mut server = Server::new_async().await;
        let mock = server.mock("GET", "/api/envs").expect(0).create_async().await;

        let token = CancellationToken::new();
        token.cancel();
        let err = transport(server.url())
            .send(&RequestDescriptor::get("/api/envs").cancellation(token))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Cancelled);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        // Nothing listens on port 9 of localhost.
        let err = transport("http://127.0.0.1:9".into())
            .send(&RequestDescriptor::get("/api/envs"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transport);
        assert_eq!(err.status, 0);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let t = transport("http://localhost:8080/".into());
        assert_eq!(t.base_url(), "http://localhost:8080");
    }
}
