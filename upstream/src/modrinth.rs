use error::SyncError;
use http::{HttpClient, RequestOptions};
use model::MrPage;
use serde_json::Value;
use std::sync::Arc;

/// Typed wrapper around the Modrinth v2 API.
pub struct ModrinthAdapter {
    http: Arc<HttpClient>,
    base_url: String,
}

impl ModrinthAdapter {
    pub fn new(http: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
        ModrinthAdapter {
            http,
            base_url: base_url.into(),
        }
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Value, SyncError> {
        let url = format!("{}/v2/project/{project_id}", self.base_url);
        self.http.get_json(&url, RequestOptions::default()).await
    }

    pub async fn get_project_versions(&self, project_id: &str) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/v2/project/{project_id}/version", self.base_url);
        self.http.get_json(&url, RequestOptions::default()).await
    }

    pub async fn get_multi_projects(&self, project_ids: &[String]) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/v2/projects", self.base_url);
        let ids = serde_json::to_string(project_ids).map_err(|e| SyncError::Other(e.to_string()))?;
        let opts = RequestOptions::default().query("ids", ids);
        self.http.get_json(&url, opts).await
    }

    pub async fn get_multi_versions(&self, version_ids: &[String]) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/v2/versions", self.base_url);
        let ids = serde_json::to_string(version_ids).map_err(|e| SyncError::Other(e.to_string()))?;
        let opts = RequestOptions::default().query("ids", ids);
        self.http.get_json(&url, opts).await
    }

    pub async fn get_multi_hashes(&self, hashes: &[String], algorithm: &str) -> Result<Value, SyncError> {
        let url = format!("{}/v2/version_files", self.base_url);
        let payload = serde_json::json!({ "hashes": hashes, "algorithm": algorithm });
        self.http.post_json(&url, &payload, RequestOptions::default()).await
    }

    pub async fn get_categories(&self) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/v2/tag/category", self.base_url);
        self.http.get_json(&url, RequestOptions::default()).await
    }

    pub async fn get_loaders(&self) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/v2/tag/loader", self.base_url);
        self.http.get_json(&url, RequestOptions::default()).await
    }

    pub async fn get_game_versions(&self) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/v2/tag/game_version", self.base_url);
        self.http.get_json(&url, RequestOptions::default()).await
    }

    pub async fn search(
        &self,
        query: &str,
        offset: u32,
        limit: u32,
        index: &str,
    ) -> Result<(Vec<Value>, MrPage), SyncError> {
        let url = format!("{}/v2/search", self.base_url);
        let opts = RequestOptions::default()
            .query("query", query.to_string())
            .query("offset", offset.to_string())
            .query("limit", limit.to_string())
            .query("index", index.to_string());
        let body: Value = self.http.get_json(&url, opts).await?;
        let hits = match body.get("hits").cloned() {
            Some(Value::Array(items)) => items,
            _ => return Err(SyncError::Other("missing hits array in search response".into())),
        };
        let page = MrPage {
            offset: body.get("offset").and_then(Value::as_u64).unwrap_or(offset as u64) as u32,
            limit: body.get("limit").and_then(Value::as_u64).unwrap_or(limit as u64) as u32,
            hits: hits.len() as u32,
        };
        Ok((hits, page))
    }
}
