use crate::checker::{filter_unknown_curseforge_ids, filter_unknown_modrinth_ids};
use crate::project_sync::{CfSyncConfig, MrSyncConfig};
use error::SyncError;
use model::{MissQueueName, ProjectDetail};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use store::ObjectStore;
use tracing::{info, warn};
use upstream::{CurseForgeAdapter, ModrinthAdapter};
use workerpool::WorkerPool;

/// Drains every CurseForge miss queue (mod ids, file ids, fingerprints),
/// resolves each to a mod id via the matching bulk-get adapter call, and
/// fans the not-yet-stored ids out to `ProjectSync`. Empty queues are
/// skipped silently; a queue is read then deleted regardless of whether
/// resolution succeeds, matching the read service's write-once contract.
/// Returns the total number of ids captured and the details of every
/// project that synced successfully.
pub async fn drain_curseforge_queues(
    store: Arc<dyn ObjectStore>,
    sets: &dyn store::SetStore,
    cf: Arc<CurseForgeAdapter>,
    pool: &WorkerPool,
    cfg: CfSyncConfig,
) -> Result<(usize, Vec<ProjectDetail>), SyncError> {
    let mut mod_ids: HashSet<i64> = HashSet::new();

    for name in [MissQueueName::CfModIds, MissQueueName::CfFileIds, MissQueueName::CfFingerprints] {
        if !sets.exists(name).await? {
            continue;
        }
        let members = sets.members(name).await?;
        sets.delete(name).await?;
        if members.is_empty() {
            continue;
        }
        info!(queue = name.key(), count = members.len(), "draining curseforge miss queue");

        match name {
            MissQueueName::CfModIds => {
                for raw in members {
                    if let Ok(id) = raw.parse::<i64>() {
                        mod_ids.insert(id);
                    }
                }
            }
            MissQueueName::CfFileIds => {
                let file_ids: Vec<i64> = members.iter().filter_map(|m| m.parse().ok()).collect();
                if file_ids.is_empty() {
                    continue;
                }
                match cf.get_multi_files(&file_ids).await {
                    Ok(files) => {
                        for file in files {
                            if let Some(id) = file.get("modId").and_then(Value::as_i64) {
                                mod_ids.insert(id);
                            }
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to resolve curseforge file id queue"),
                }
            }
            MissQueueName::CfFingerprints => {
                let fingerprints: Vec<u64> = members.iter().filter_map(|m| m.parse().ok()).collect();
                if fingerprints.is_empty() {
                    continue;
                }
                match cf.get_multi_fingerprints(&fingerprints).await {
                    Ok(body) => {
                        let matches = body
                            .get("exactMatches")
                            .and_then(Value::as_array)
                            .cloned()
                            .unwrap_or_default();
                        for m in matches {
                            if let Some(id) = m.get("file").and_then(|f| f.get("modId")).and_then(Value::as_i64) {
                                mod_ids.insert(id);
                            }
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to resolve curseforge fingerprint queue"),
                }
            }
            _ => unreachable!(),
        }
    }

    if mod_ids.is_empty() {
        return Ok((0, Vec::new()));
    }

    let candidates: Vec<i64> = mod_ids.into_iter().collect();
    let unknown = filter_unknown_curseforge_ids(&store, &candidates).await?;
    let total = unknown.len();
    if total == 0 {
        return Ok((0, Vec::new()));
    }

    let store = store.clone();
    let cf = cf.clone();
    let results = pool
        .run_all(unknown, move |project_id| {
            let store = store.clone();
            let cf = cf.clone();
            let cfg = cfg;
            async move {
                match crate::project_sync::sync_curseforge_project(store, &cf, project_id, &cfg).await {
                    Ok(detail) => Some(detail),
                    Err(err) => {
                        warn!(project_id, error = %err, "queue-driven curseforge sync failed");
                        None
                    }
                }
            }
        })
        .await;

    Ok((total, results.into_iter().flatten().collect()))
}

/// Drains every Modrinth miss queue (project ids, version ids, sha1/sha512
/// hashes), resolves each to a project id, and fans the not-yet-stored ids
/// out to `ProjectSync`.
pub async fn drain_modrinth_queues(
    store: Arc<dyn ObjectStore>,
    sets: &dyn store::SetStore,
    mr: Arc<ModrinthAdapter>,
    pool: &WorkerPool,
    cfg: MrSyncConfig,
) -> Result<(usize, Vec<ProjectDetail>), SyncError> {
    let mut project_ids: HashSet<String> = HashSet::new();

    for name in [
        MissQueueName::MrProjectIds,
        MissQueueName::MrVersionIds,
        MissQueueName::MrHashesSha1,
        MissQueueName::MrHashesSha512,
    ] {
        if !sets.exists(name).await? {
            continue;
        }
        let members = sets.members(name).await?;
        sets.delete(name).await?;
        if members.is_empty() {
            continue;
        }
        info!(queue = name.key(), count = members.len(), "draining modrinth miss queue");

        match name {
            MissQueueName::MrProjectIds => {
                project_ids.extend(members);
            }
            MissQueueName::MrVersionIds => match mr.get_multi_versions(&members).await {
                Ok(versions) => {
                    for version in versions {
                        if let Some(id) = version.get("project_id").and_then(Value::as_str) {
                            project_ids.insert(id.to_string());
                        }
                    }
                }
                Err(err) => warn!(error = %err, "failed to resolve modrinth version id queue"),
            },
            MissQueueName::MrHashesSha1 => {
                resolve_hash_queue(&mr, &members, "sha1", &mut project_ids).await;
            }
            MissQueueName::MrHashesSha512 => {
                resolve_hash_queue(&mr, &members, "sha512", &mut project_ids).await;
            }
            _ => unreachable!(),
        }
    }

    if project_ids.is_empty() {
        return Ok((0, Vec::new()));
    }

    let candidates: Vec<String> = project_ids.into_iter().collect();
    let unknown = filter_unknown_modrinth_ids(&store, &candidates).await?;
    let total = unknown.len();
    if total == 0 {
        return Ok((0, Vec::new()));
    }

    let store = store.clone();
    let mr = mr.clone();
    let results = pool
        .run_all(unknown, move |project_id| {
            let store = store.clone();
            let mr = mr.clone();
            let cfg = cfg;
            async move {
                match crate::project_sync::sync_modrinth_project(store, &mr, &project_id, &cfg).await {
                    Ok(detail) => Some(detail),
                    Err(err) => {
                        warn!(project_id, error = %err, "queue-driven modrinth sync failed");
                        None
                    }
                }
            }
        })
        .await;

    Ok((total, results.into_iter().flatten().collect()))
}

async fn resolve_hash_queue(mr: &ModrinthAdapter, hashes: &[String], algorithm: &str, project_ids: &mut HashSet<String>) {
    match mr.get_multi_hashes(hashes, algorithm).await {
        Ok(body) => {
            if let Value::Object(map) = body {
                for (_, file) in map {
                    if let Some(id) = file.get("project_id").and_then(Value::as_str) {
                        project_ids.insert(id.to_string());
                    }
                }
            }
        }
        Err(err) => warn!(error = %err, algorithm, "failed to resolve modrinth hash queue"),
    }
}
