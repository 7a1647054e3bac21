//! Typed access to the DevPortal REST API.
//!
//! Every call goes through [`SessionedClient::authed_call`], so an expired
//! session is renewed and the call replayed transparently. List endpoints
//! treat an empty or undecodable body as an empty list.

pub mod models;
pub mod search;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ApiResult;
use crate::session::SessionedClient;
use crate::transport::{RequestBody, RequestDescriptor};
use models::{AuditLog, Credential, CredentialRequest, Environment, Project, User};

pub const DEFAULT_FANOUT_LIMIT: usize = 6;
pub const DEFAULT_MAX_SEARCH_HITS: usize = 50;

#[derive(Debug, Clone)]
pub struct DevPortalApi {
    client: SessionedClient,
    fanout_limit: usize,
    max_search_hits: usize,
    cancel: Option<CancellationToken>,
}

impl DevPortalApi {
    pub fn new(client: SessionedClient) -> Self {
        Self {
            client,
            fanout_limit: DEFAULT_FANOUT_LIMIT,
            max_search_hits: DEFAULT_MAX_SEARCH_HITS,
            cancel: None,
        }
    }

    pub fn with_fanout_limit(mut self, limit: usize) -> Self {
        self.fanout_limit = limit.max(1);
        self
    }

    pub fn with_max_search_hits(mut self, max: usize) -> Self {
        self.max_search_hits = max;
        self
    }

    /// Tie every request made through the returned handle to `token`.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: Some(token),
            ..self.clone()
        }
    }

    pub fn client(&self) -> &SessionedClient {
        &self.client
    }

    pub fn fanout_limit(&self) -> usize {
        self.fanout_limit
    }

    pub fn max_search_hits(&self) -> usize {
        self.max_search_hits
    }

    fn request(&self, descriptor: RequestDescriptor) -> RequestDescriptor {
        match &self.cancel {
            Some(token) => descriptor.cancellation(token.clone()),
            None => descriptor,
        }
    }

    async fn list<T: DeserializeOwned>(&self, descriptor: RequestDescriptor) -> ApiResult<Vec<T>> {
        let items: Option<Vec<T>> = self.client.authed_call(&descriptor).await?;
        Ok(items.unwrap_or_default())
    }

    pub async fn environments(&self) -> ApiResult<Vec<Environment>> {
        self.list(self.request(RequestDescriptor::get("/api/envs"))).await
    }

    pub async fn projects(&self, env_id: &str) -> ApiResult<Vec<Project>> {
        self.list(self.request(RequestDescriptor::get(format!("/api/envs/{env_id}/projects"))))
            .await
    }

    pub async fn credentials(&self, env_id: &str, project_id: &str) -> ApiResult<Vec<Credential>> {
        self.list(self.request(RequestDescriptor::get(credentials_path(env_id, project_id))))
            .await
    }

    /// Fetch a credential with its unmasked value.
    pub async fn reveal_credential(
        &self,
        env_id: &str,
        project_id: &str,
        credential_id: &str,
    ) -> ApiResult<Option<Credential>> {
        let path = format!("{}/{credential_id}/reveal", credentials_path(env_id, project_id));
        self.client
            .authed_call(&self.request(RequestDescriptor::get(path)))
            .await
    }

    pub async fn create_credential(
        &self,
        env_id: &str,
        project_id: &str,
        credential: &CredentialRequest,
    ) -> ApiResult<Option<Credential>> {
        let request = RequestDescriptor::post(credentials_path(env_id, project_id)).json(json!(credential));
        let created: Option<Credential> = self.client.authed_call(&self.request(request)).await?;
        info!(env_id, project_id, key = %credential.key, "credential created");
        Ok(created)
    }

    pub async fn update_credential(
        &self,
        env_id: &str,
        project_id: &str,
        credential_id: &str,
        credential: &CredentialRequest,
    ) -> ApiResult<Option<Credential>> {
        let path = format!("{}/{credential_id}", credentials_path(env_id, project_id));
        let request = RequestDescriptor::put(path).json(json!(credential));
        self.client.authed_call(&self.request(request)).await
    }

    pub async fn delete_credential(&self, env_id: &str, project_id: &str, credential_id: &str) -> ApiResult<()> {
        let path = format!("{}/{credential_id}", credentials_path(env_id, project_id));
        self.client
            .authed_raw(&self.request(RequestDescriptor::delete(path)))
            .await?;
        info!(env_id, project_id, credential_id, "credential deleted");
        Ok(())
    }

    /// Upload a CSV of `key,value` rows. Returns how many credentials the
    /// server imported.
    pub async fn import_credentials(
        &self,
        env_id: &str,
        project_id: &str,
        file_name: &str,
        csv: Bytes,
    ) -> ApiResult<u64> {
        let path = format!("{}/import", credentials_path(env_id, project_id));
        let request = RequestDescriptor::post(path).body(RequestBody::File {
            field: "file".to_string(),
            file_name: file_name.to_string(),
            mime: "text/csv".to_string(),
            data: csv,
        });
        let count: Option<u64> = self.client.authed_call(&self.request(request)).await?;
        debug!(env_id, project_id, imported = ?count, "credential import finished");
        Ok(count.unwrap_or(0))
    }

    pub async fn users(&self) -> ApiResult<Vec<User>> {
        self.list(self.request(RequestDescriptor::get("/api/admin/users"))).await
    }

    pub async fn audit_logs(&self) -> ApiResult<Vec<AuditLog>> {
        self.list(self.request(RequestDescriptor::get("/api/admin/audit-logs")))
            .await
    }
}

pub(crate) fn credentials_path(env_id: &str, project_id: &str) -> String {
    format!("/api/envs/{env_id}/projects/{project_id}/credentials")
}
