use crate::project_sync::{CfSyncConfig, MrSyncConfig};
use error::SyncError;
use model::ProjectDetail;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use store::{EntityType, ObjectStore};
use tracing::{info, warn};
use upstream::{CurseForgeAdapter, ModrinthAdapter};
use workerpool::WorkerPool;

/// Tunables for walking a platform's "newest first" listing until a
/// previously-seen project reappears.
#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    pub page_size: u32,
    pub delay_between_pages: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            page_size: 50,
            delay_between_pages: Duration::from_millis(500),
        }
    }
}

/// CF search walk: `sortField=ReleasedDate`, descending. Pages forward
/// until either a returned mod is already stored, or the walk would push
/// `index + pageSize` past CF's hard 10000-row search cap, whichever comes
/// first. Returns the ids discovered before either stop condition, plus the
/// details of every one that synced successfully.
pub async fn discover_curseforge(
    store: Arc<dyn ObjectStore>,
    cf: Arc<CurseForgeAdapter>,
    pool: &WorkerPool,
    cfg: SearchConfig,
    sync_cfg: CfSyncConfig,
) -> Result<(Vec<i64>, Vec<ProjectDetail>), SyncError> {
    const SEARCH_ROW_CAP: u32 = 10_000;
    let mut discovered = Vec::new();
    let mut index = 0u32;

    loop {
        if index + cfg.page_size > SEARCH_ROW_CAP {
            info!(index, "curseforge search hit the 10000-row cap, stopping walk");
            break;
        }
        let (items, page) = cf
            .search(432, None, "ReleasedDate", "desc", index, cfg.page_size)
            .await?;
        if items.is_empty() {
            break;
        }

        let mut hit_known = false;
        for item in &items {
            let Some(id) = item.get("id").and_then(Value::as_i64) else { continue };
            let known = store
                .count(EntityType::Project(model::Platform::CurseForge), mongodb::bson::doc! { "id": id })
                .await?
                > 0;
            if known {
                hit_known = true;
                break;
            }
            discovered.push(id);
        }
        if hit_known {
            break;
        }

        index = page.index + page.page_size;
        tokio::time::sleep(cfg.delay_between_pages).await;
    }

    info!(count = discovered.len(), "curseforge search discovery complete");
    let mut synced = Vec::new();
    if !discovered.is_empty() {
        let store = store.clone();
        let cf = cf.clone();
        let results = pool
            .run_all(discovered.clone(), move |project_id| {
                let store = store.clone();
                let cf = cf.clone();
                let sync_cfg = sync_cfg;
                async move {
                    match crate::project_sync::sync_curseforge_project(store, &cf, project_id, &sync_cfg).await {
                        Ok(detail) => Some(detail),
                        Err(err) => {
                            warn!(project_id, error = %err, "search-discovered curseforge sync failed");
                            None
                        }
                    }
                }
            })
            .await;
        synced = results.into_iter().flatten().collect();
    }

    Ok((discovered, synced))
}

/// MR search walk: `index=newest`. Same early-stop rule as CF, without a
/// hard row cap since Modrinth's search endpoint doesn't impose one.
pub async fn discover_modrinth(
    store: Arc<dyn ObjectStore>,
    mr: Arc<ModrinthAdapter>,
    pool: &WorkerPool,
    cfg: SearchConfig,
    sync_cfg: MrSyncConfig,
) -> Result<(Vec<String>, Vec<ProjectDetail>), SyncError> {
    let mut discovered = Vec::new();
    let mut offset = 0u32;

    loop {
        let (items, page) = mr.search("", offset, cfg.page_size, "newest").await?;
        if items.is_empty() {
            break;
        }

        let mut hit_known = false;
        for item in &items {
            let Some(id) = item.get("project_id").and_then(Value::as_str) else { continue };
            let known = store
                .count(EntityType::Project(model::Platform::Modrinth), mongodb::bson::doc! { "id": id })
                .await?
                > 0;
            if known {
                hit_known = true;
                break;
            }
            discovered.push(id.to_string());
        }
        if hit_known {
            break;
        }

        offset = page.offset + page.limit;
        tokio::time::sleep(cfg.delay_between_pages).await;
    }

    info!(count = discovered.len(), "modrinth search discovery complete");
    let mut synced = Vec::new();
    if !discovered.is_empty() {
        let store = store.clone();
        let mr = mr.clone();
        let results = pool
            .run_all(discovered.clone(), move |project_id| {
                let store = store.clone();
                let mr = mr.clone();
                let sync_cfg = sync_cfg;
                async move {
                    match crate::project_sync::sync_modrinth_project(store, &mr, &project_id, &sync_cfg).await {
                        Ok(detail) => Some(detail),
                        Err(err) => {
                            warn!(project_id, error = %err, "search-discovered modrinth sync failed");
                            None
                        }
                    }
                }
            })
            .await;
        synced = results.into_iter().flatten().collect();
    }

    Ok((discovered, synced))
}
