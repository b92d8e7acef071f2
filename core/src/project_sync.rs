use crate::batch_writer::BatchWriter;
use chrono::{DateTime, Utc};
use error::SyncError;
use model::{Platform, Project, ProjectDetail, ProjectId, ReleaseType, VersionOrFile};
use mongodb::bson::doc;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use store::{Entity, EntityType, ObjectStore};
use tracing::warn;
use upstream::{CurseForgeAdapter, ModrinthAdapter};

/// Tunables for CF's `ProjectSync`. `page_size` drives the required paged
/// traversal (§4.F strategy a); the single-shot fields drive the optional
/// strategy (b), offered alongside it.
#[derive(Debug, Clone, Copy)]
pub struct CfSyncConfig {
    pub page_size: u32,
    pub single_shot_page_size: u32,
    pub max_single_shot_retries: u32,
}

impl Default for CfSyncConfig {
    fn default() -> Self {
        CfSyncConfig {
            page_size: 50,
            single_shot_page_size: 10_000,
            max_single_shot_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MrSyncConfig;

async fn fetch_stored_project(
    store: &Arc<dyn ObjectStore>,
    platform: Platform,
    id: &str,
) -> Result<Option<Project>, SyncError> {
    let found = store
        .find_by_ids(EntityType::Project(platform), &[id.to_string()])
        .await?;
    Ok(found.into_iter().find_map(|e| match e {
        Entity::Project(p) => Some(p),
        _ => None,
    }))
}

fn parse_datetime(value: &Value) -> Result<DateTime<Utc>, SyncError> {
    let text = value
        .as_str()
        .ok_or_else(|| SyncError::Other("expected a timestamp string".into()))?;
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::Other(format!("invalid timestamp {text}: {e}")))
}

/// Runs CF's `ProjectSync` (§4.F) using required paged traversal (strategy
/// a): fixed page size, `index += pageSize`, stop once `index >= totalCount
/// - 1`.
pub async fn sync_curseforge_project(
    store: Arc<dyn ObjectStore>,
    cf: &CurseForgeAdapter,
    project_id: i64,
    cfg: &CfSyncConfig,
) -> Result<ProjectDetail, SyncError> {
    let previous = fetch_stored_project(&store, Platform::CurseForge, &project_id.to_string()).await?;

    let mod_json = cf.get_mod(project_id).await?;
    let latest_files_snapshot = mod_json
        .get("latestFiles")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut files = Vec::new();
    let mut index = 0u32;
    loop {
        let (page_items, page) = cf.get_mod_files(project_id, index, cfg.page_size).await?;
        let exhausted = page.total_count == 0 || page.index + 1 >= page.total_count;
        files.extend(page_items);
        if exhausted {
            break;
        }
        index = page.index + page.page_size;
    }

    if files.is_empty() {
        if let Some(prev) = &previous {
            if !prev.version_ids.is_empty() {
                warn!(project_id, "curseforge mod returned zero files, treating as suspect");
                return Err(SyncError::EmptyVersionsSuspect {
                    project_id: project_id.to_string(),
                });
            }
        }
    }

    let mut file_writer = BatchWriter::new(store.clone(), EntityType::VersionOrFile(Platform::CurseForge));
    let mut fingerprint_writer = BatchWriter::new(store.clone(), EntityType::Fingerprint);
    let mut latest_ids = Vec::with_capacity(files.len());

    for file in &files {
        let file_id = file
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| SyncError::Other("curseforge file missing id".into()))?;
        let id = file_id.to_string();
        latest_ids.push(id.clone());

        file_writer
            .add(Entity::VersionOrFile(build_curseforge_file(project_id, file)?))
            .await?;

        if let Some(fingerprint) = file.get("fileFingerprint").and_then(Value::as_u64) {
            fingerprint_writer
                .add(Entity::Fingerprint(model::Fingerprint {
                    fingerprint,
                    file_id: id,
                    mod_id: project_id,
                    latest_files: latest_files_snapshot.clone(),
                    synced_at: Utc::now(),
                }))
                .await?;
        }
    }
    file_writer.close().await?;
    fingerprint_writer.close().await?;

    store
        .delete_many(
            EntityType::VersionOrFile(Platform::CurseForge),
            doc! { "projectId": project_id, "id": { "$nin": latest_ids.clone() } },
        )
        .await?;
    store
        .delete_many(
            EntityType::Fingerprint,
            doc! { "modId": project_id, "fileId": { "$nin": latest_ids.clone() } },
        )
        .await?;

    let project = build_curseforge_project(project_id, &mod_json, &latest_ids)?;
    let name = project.slug.clone();
    let version_count = latest_ids.len();
    store
        .upsert_many(EntityType::Project(Platform::CurseForge), vec![Entity::Project(project)])
        .await?;

    Ok(ProjectDetail {
        id: ProjectId::CurseForge(project_id),
        name,
        version_count,
    })
}

/// Strategy (b): single-shot retrieval with `pageSize = 10000`. Retries
/// with a shrinking page size when the response is internally inconsistent
/// (`resultCount` disagreeing with `totalCount` or the array length).
/// Offered alongside the required paged traversal, not instead of it.
pub async fn fetch_curseforge_files_single_shot(
    cf: &CurseForgeAdapter,
    project_id: i64,
    cfg: &CfSyncConfig,
) -> Result<Vec<Value>, SyncError> {
    let mut page_size = cfg.single_shot_page_size;
    for attempt in 0..cfg.max_single_shot_retries {
        let (items, page) = cf.get_mod_files(project_id, 0, page_size).await?;
        if page.result_count == page.total_count && items.len() as u32 == page.result_count {
            return Ok(items);
        }
        warn!(project_id, attempt, page_size, "single-shot file listing inconsistent, retrying");
        page_size = page_size.saturating_sub(1);
    }
    Err(SyncError::InconsistentUpstream {
        project_id: project_id.to_string(),
    })
}

fn build_curseforge_file(project_id: i64, file: &Value) -> Result<VersionOrFile, SyncError> {
    let id = file.get("id").and_then(Value::as_i64).unwrap_or_default().to_string();
    let mut hashes = HashMap::new();
    if let Some(list) = file.get("hashes").and_then(Value::as_array) {
        for h in list {
            if let (Some(value), Some(algo)) = (h.get("value").and_then(Value::as_str), h.get("algo").and_then(Value::as_i64)) {
                let algo_name = match algo {
                    1 => "sha1",
                    2 => "md5",
                    other => return Err(SyncError::Other(format!("unknown curseforge hash algo {other}"))),
                };
                hashes.insert(algo_name.to_string(), value.to_string());
            }
        }
    }
    let game_versions = file
        .get("gameVersions")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let published_at = file
        .get("fileDate")
        .map(parse_datetime)
        .transpose()?
        .unwrap_or_else(Utc::now);
    let release_type = match file.get("releaseType").and_then(Value::as_i64) {
        Some(1) => ReleaseType::Release,
        Some(2) => ReleaseType::Beta,
        _ => ReleaseType::Alpha,
    };

    Ok(VersionOrFile {
        id,
        project_id: ProjectId::CurseForge(project_id),
        file_hashes: hashes,
        published_at,
        file_name: file.get("fileName").and_then(Value::as_str).unwrap_or_default().to_string(),
        download_url: file.get("downloadUrl").and_then(Value::as_str).map(str::to_string),
        release_type,
        loaders: Vec::new(),
        game_versions,
        synced_at: Utc::now(),
    })
}

fn build_curseforge_project(project_id: i64, mod_json: &Value, version_ids: &[String]) -> Result<Project, SyncError> {
    let updated_at = mod_json
        .get("dateModified")
        .map(parse_datetime)
        .transpose()?
        .unwrap_or_else(Utc::now);
    let categories = mod_json
        .get("categories")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|c| c.get("id")).filter_map(Value::as_i64).collect())
        .unwrap_or_default();
    let authors = mod_json
        .get("authors")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|a| a.get("name")).filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let game_versions: BTreeSet<String> = mod_json
        .get("latestFilesIndexes")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|e| e.get("gameVersion")).filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    Ok(Project {
        id: ProjectId::CurseForge(project_id),
        slug: mod_json.get("slug").and_then(Value::as_str).unwrap_or_default().to_string(),
        updated_at,
        version_ids: version_ids.to_vec(),
        game_versions,
        project_type: "mod".to_string(),
        class_id: mod_json.get("classId").and_then(Value::as_i64),
        summary: mod_json.get("summary").and_then(Value::as_str).map(str::to_string),
        download_count: mod_json.get("downloadCount").and_then(Value::as_u64).unwrap_or_default(),
        categories,
        authors,
        logo_url: mod_json.get("logo").and_then(|l| l.get("url")).and_then(Value::as_str).map(str::to_string),
        date_created: mod_json.get("dateCreated").map(parse_datetime).transpose()?,
        synced_at: Utc::now(),
    })
}

/// Runs MR's `ProjectSync` (§4.F). MR has a single traversal strategy: the
/// version listing endpoint already returns every version in one call.
pub async fn sync_modrinth_project(
    store: Arc<dyn ObjectStore>,
    mr: &ModrinthAdapter,
    project_id: &str,
    _cfg: &MrSyncConfig,
) -> Result<ProjectDetail, SyncError> {
    let previous = fetch_stored_project(&store, Platform::Modrinth, project_id).await?;

    let project_json = mr.get_project(project_id).await?;
    let versions = mr.get_project_versions(project_id).await?;

    if versions.is_empty() {
        if let Some(prev) = &previous {
            if !prev.version_ids.is_empty() {
                warn!(project_id, "modrinth project returned zero versions, treating as suspect");
                return Err(SyncError::EmptyVersionsSuspect {
                    project_id: project_id.to_string(),
                });
            }
        }
    }

    let mut writer = BatchWriter::new(store.clone(), EntityType::VersionOrFile(Platform::Modrinth));
    let mut version_ids = Vec::with_capacity(versions.len());
    let mut game_versions = BTreeSet::new();

    for version in &versions {
        let id = version.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        version_ids.push(id.clone());
        if let Some(gvs) = version.get("game_versions").and_then(Value::as_array) {
            for gv in gvs.iter().filter_map(Value::as_str) {
                game_versions.insert(gv.to_string());
            }
        }
        writer.add(Entity::VersionOrFile(build_modrinth_version(project_id, version)?)).await?;
    }
    writer.close().await?;

    store
        .delete_many(
            EntityType::VersionOrFile(Platform::Modrinth),
            doc! { "projectId": project_id, "id": { "$nin": version_ids.clone() } },
        )
        .await?;

    let project = build_modrinth_project(project_id, &project_json, &version_ids, game_versions)?;
    let name = project.slug.clone();
    let version_count = version_ids.len();
    store
        .upsert_many(EntityType::Project(Platform::Modrinth), vec![Entity::Project(project)])
        .await?;

    Ok(ProjectDetail {
        id: ProjectId::Modrinth(project_id.to_string()),
        name,
        version_count,
    })
}

fn build_modrinth_version(project_id: &str, version: &Value) -> Result<VersionOrFile, SyncError> {
    let id = version.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    let published_at = version
        .get("date_published")
        .map(parse_datetime)
        .transpose()?
        .unwrap_or_else(Utc::now);
    let loaders = version
        .get("loaders")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let game_versions = version
        .get("game_versions")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let release_type = match version.get("version_type").and_then(Value::as_str) {
        Some("release") => ReleaseType::Release,
        Some("beta") => ReleaseType::Beta,
        _ => ReleaseType::Alpha,
    };
    let mut hashes = HashMap::new();
    let file_name = version
        .get("files")
        .and_then(Value::as_array)
        .and_then(|files| files.first())
        .map(|primary| {
            if let Some(h) = primary.get("hashes") {
                if let Some(sha1) = h.get("sha1").and_then(Value::as_str) {
                    hashes.insert("sha1".to_string(), sha1.to_string());
                }
                if let Some(sha512) = h.get("sha512").and_then(Value::as_str) {
                    hashes.insert("sha512".to_string(), sha512.to_string());
                }
            }
            primary.get("filename").and_then(Value::as_str).unwrap_or_default().to_string()
        })
        .unwrap_or_default();
    let download_url = version
        .get("files")
        .and_then(Value::as_array)
        .and_then(|files| files.first())
        .and_then(|primary| primary.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(VersionOrFile {
        id,
        project_id: ProjectId::Modrinth(project_id.to_string()),
        file_hashes: hashes,
        published_at,
        file_name,
        download_url,
        release_type,
        loaders,
        game_versions,
        synced_at: Utc::now(),
    })
}

fn build_modrinth_project(
    project_id: &str,
    project_json: &Value,
    version_ids: &[String],
    game_versions: BTreeSet<String>,
) -> Result<Project, SyncError> {
    let updated_at = project_json
        .get("updated")
        .map(parse_datetime)
        .transpose()?
        .unwrap_or_else(Utc::now);
    let categories = project_json
        .get("categories")
        .and_then(Value::as_array)
        .map(|_| Vec::new())
        .unwrap_or_default();

    Ok(Project {
        id: ProjectId::Modrinth(project_id.to_string()),
        slug: project_json.get("slug").and_then(Value::as_str).unwrap_or(project_id).to_string(),
        updated_at,
        version_ids: version_ids.to_vec(),
        game_versions,
        project_type: project_json.get("project_type").and_then(Value::as_str).unwrap_or("mod").to_string(),
        class_id: None,
        summary: project_json.get("description").and_then(Value::as_str).map(str::to_string),
        download_count: project_json.get("downloads").and_then(Value::as_u64).unwrap_or_default(),
        categories,
        authors: Vec::new(),
        logo_url: project_json.get("icon_url").and_then(Value::as_str).map(str::to_string),
        date_created: project_json.get("published").map(parse_datetime).transpose()?,
        synced_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_timestamp() {
        let value = Value::String("2024-05-01T12:00:00.000Z".to_string());
        let parsed = parse_datetime(&value).unwrap();
        assert_eq!(parsed.timestamp(), 1714564800);
    }

    #[test]
    fn rejects_non_string_timestamp() {
        assert!(parse_datetime(&Value::Null).is_err());
    }
}
