use tracing::debug;

use super::models::{Credential, EnvWithProjects, Project, ProjectRef, SearchHit};
use super::{credentials_path, DevPortalApi};
use crate::error::{ApiError, ApiResult};
use crate::fanout::map_bounded_cancellable;
use crate::transport::RequestDescriptor;

/// Queries shorter than this (after trimming) match nothing.
pub const MIN_QUERY_CHARS: usize = 2;

/// Flatten the dashboard into (environment, project) pairs, in order.
pub fn project_refs(dashboard: &[EnvWithProjects]) -> Vec<ProjectRef> {
    dashboard
        .iter()
        .flat_map(|entry| {
            entry.projects.iter().map(move |project| ProjectRef {
                env_id: entry.env.id.clone(),
                env_name: entry.env.name.clone(),
                project_id: project.id.clone(),
                project_name: project.name.clone(),
            })
        })
        .collect()
}

/// Case-insensitive substring match on the credential key. `needle` must
/// already be lowercase.
pub fn key_matches(credential: &Credential, needle: &str) -> bool {
    credential.key.to_lowercase().contains(needle)
}

fn normalize_query(query: &str) -> Option<String> {
    let needle = query.trim().to_lowercase();
    if needle.chars().count() < MIN_QUERY_CHARS {
        None
    } else {
        Some(needle)
    }
}

impl DevPortalApi {
    /// All environments with their projects. Project lists are fetched with
    /// bounded concurrency and keep the environment order.
    pub async fn load_dashboard(&self) -> ApiResult<Vec<EnvWithProjects>> {
        let envs = self.environments().await?;
        let cancel = self.cancel.clone().unwrap_or_default();

        map_bounded_cancellable(&envs, self.fanout_limit, &cancel, |env, token| async move {
            let request = RequestDescriptor::get(format!("/api/envs/{}/projects", env.id)).cancellation(token);
            let projects: Vec<Project> = self.client.authed_call(&request).await?.unwrap_or_default();
            Ok::<_, ApiError>(EnvWithProjects {
                env: env.clone(),
                projects,
            })
        })
        .await
    }

    /// Search credential keys across every project on the dashboard.
    pub async fn search_credentials(&self, query: &str) -> ApiResult<Vec<SearchHit>> {
        if normalize_query(query).is_none() {
            return Ok(Vec::new());
        }
        let dashboard = self.load_dashboard().await?;
        self.search_projects(&project_refs(&dashboard), query).await
    }

    /// Search credential keys within `projects`. Hits are ordered by project,
    /// then by the server's credential order, and capped after flattening.
    pub async fn search_projects(&self, projects: &[ProjectRef], query: &str) -> ApiResult<Vec<SearchHit>> {
        let needle = match normalize_query(query) {
            Some(needle) => needle,
            None => return Ok(Vec::new()),
        };
        let cancel = self.cancel.clone().unwrap_or_default();
        let needle = needle.as_str();

        let per_project = map_bounded_cancellable(projects, self.fanout_limit, &cancel, |project, token| async move {
            let request =
                RequestDescriptor::get(credentials_path(&project.env_id, &project.project_id)).cancellation(token);
            let credentials: Vec<Credential> = self.client.authed_call(&request).await?.unwrap_or_default();
            let hits: Vec<SearchHit> = credentials
                .into_iter()
                .filter(|c| key_matches(c, needle))
                .map(|credential| SearchHit {
                    env_id: project.env_id.clone(),
                    env_name: project.env_name.clone(),
                    project_id: project.project_id.clone(),
                    project_name: project.project_name.clone(),
                    credential,
                })
                .collect();
            Ok::<_, ApiError>(hits)
        })
        .await?;

        let total: usize = per_project.iter().map(Vec::len).sum();
        let hits: Vec<SearchHit> = per_project
            .into_iter()
            .flatten()
            .take(self.max_search_hits)
            .collect();

        debug!(
            projects = projects.len(),
            total_matches = total,
            returned = hits.len(),
            "credential search finished"
        );
        Ok(hits)
    }
}
