use error::SyncError;
use http::{HttpClient, RequestOptions};
use model::CfPage;
use serde_json::Value;
use std::sync::Arc;

const DEFAULT_GAME_ID: i64 = 432; // Minecraft

/// Typed wrapper around the CurseForge v1 API. Every method attaches the
/// `x-api-key` header and routes through the shared [`HttpClient`], which
/// applies the host's rate limit and retry policy.
pub struct CurseForgeAdapter {
    http: Arc<HttpClient>,
    base_url: String,
    api_key: String,
}

impl CurseForgeAdapter {
    pub fn new(http: Arc<HttpClient>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        CurseForgeAdapter {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn opts(&self) -> RequestOptions {
        RequestOptions::default().header("x-api-key", self.api_key.clone())
    }

    pub async fn get_mod(&self, mod_id: i64) -> Result<Value, SyncError> {
        let url = format!("{}/v1/mods/{mod_id}", self.base_url);
        let body: Value = self.http.get_json(&url, self.opts()).await?;
        extract_data(body)
    }

    pub async fn get_mod_files(
        &self,
        mod_id: i64,
        index: u32,
        page_size: u32,
    ) -> Result<(Vec<Value>, CfPage), SyncError> {
        let url = format!("{}/v1/mods/{mod_id}/files", self.base_url);
        let opts = self
            .opts()
            .query("index", index.to_string())
            .query("pageSize", page_size.to_string());
        let body: Value = self.http.get_json(&url, opts).await?;
        extract_paged(body)
    }

    pub async fn get_multi_mods(&self, mod_ids: &[i64]) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/v1/mods", self.base_url);
        let payload = serde_json::json!({ "modIds": mod_ids });
        let body: Value = self.http.post_json(&url, &payload, self.opts()).await?;
        extract_data_array(body)
    }

    pub async fn get_multi_files(&self, file_ids: &[i64]) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/v1/mods/files", self.base_url);
        let payload = serde_json::json!({ "fileIds": file_ids });
        let body: Value = self.http.post_json(&url, &payload, self.opts()).await?;
        extract_data_array(body)
    }

    pub async fn get_multi_fingerprints(&self, fingerprints: &[u64]) -> Result<Value, SyncError> {
        let url = format!("{}/v1/fingerprints/{DEFAULT_GAME_ID}", self.base_url);
        let payload = serde_json::json!({ "fingerprints": fingerprints });
        let body: Value = self.http.post_json(&url, &payload, self.opts()).await?;
        extract_data(body)
    }

    pub async fn get_categories(
        &self,
        game_id: i64,
        class_id: Option<i64>,
        class_only: Option<bool>,
    ) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/v1/categories", self.base_url);
        let mut opts = self.opts().query("gameId", game_id.to_string());
        if let Some(class_id) = class_id {
            opts = opts.query("classId", class_id.to_string());
        } else if let Some(class_only) = class_only {
            opts = opts.query("classOnly", class_only.to_string());
        }
        let body: Value = self.http.get_json(&url, opts).await?;
        extract_data_array(body)
    }

    pub async fn search(
        &self,
        game_id: i64,
        class_id: Option<i64>,
        sort_field: &str,
        sort_order: &str,
        index: u32,
        page_size: u32,
    ) -> Result<(Vec<Value>, CfPage), SyncError> {
        let url = format!("{}/v1/mods/search", self.base_url);
        let mut opts = self
            .opts()
            .query("gameId", game_id.to_string())
            .query("sortField", sort_field.to_string())
            .query("sortOrder", sort_order.to_string())
            .query("index", index.to_string())
            .query("pageSize", page_size.to_string());
        if let Some(class_id) = class_id {
            opts = opts.query("classId", class_id.to_string());
        }
        let body: Value = self.http.get_json(&url, opts).await?;
        extract_paged(body)
    }
}

fn extract_data(body: Value) -> Result<Value, SyncError> {
    Ok(body.get("data").cloned().unwrap_or(body))
}

fn extract_data_array(body: Value) -> Result<Vec<Value>, SyncError> {
    match body.get("data").cloned().unwrap_or(body) {
        Value::Array(items) => Ok(items),
        other => Err(SyncError::Other(format!("expected array, got {other}"))),
    }
}

fn extract_paged(body: Value) -> Result<(Vec<Value>, CfPage), SyncError> {
    let items = match body.get("data").cloned() {
        Some(Value::Array(items)) => items,
        _ => return Err(SyncError::Other("missing data array in paged response".into())),
    };
    let pagination = body.get("pagination").cloned().unwrap_or(Value::Null);
    let page = CfPage {
        index: pagination.get("index").and_then(Value::as_u64).unwrap_or(0) as u32,
        page_size: pagination.get("pageSize").and_then(Value::as_u64).unwrap_or(items.len() as u64) as u32,
        result_count: pagination.get("resultCount").and_then(Value::as_u64).unwrap_or(items.len() as u64) as u32,
        total_count: pagination.get("totalCount").and_then(Value::as_u64).unwrap_or(0) as u32,
    };
    Ok((items, page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_paged_reads_pagination_block() {
        let body = serde_json::json!({
            "data": [{"id": 1}, {"id": 2}],
            "pagination": {"index": 0, "pageSize": 50, "resultCount": 2, "totalCount": 120}
        });
        let (items, page) = extract_paged(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(page.total_count, 120);
    }

    #[test]
    fn extract_data_array_rejects_non_array() {
        let body = serde_json::json!({"data": {"id": 1}});
        assert!(extract_data_array(body).is_err());
    }
}
