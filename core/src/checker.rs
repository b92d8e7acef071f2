use error::SyncError;
use model::{Platform, Project, ProjectId};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use store::{Entity, EntityType, ObjectStore};
use tracing::debug;
use upstream::{CurseForgeAdapter, ModrinthAdapter};
use util::seconds_equal;

/// CF mod ids below this are pre-release placeholder entries in the
/// reference catalog and are rejected at every entry point, including here.
const CF_MIN_VALID_ID: i64 = 30000;

/// Per-project outcome of a liveness/freshness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Still alive upstream and unchanged; metadata refreshed in place.
    Unchanged,
    /// Still alive upstream but changed; caller should run `ProjectSync`.
    Changed,
    /// No longer listed upstream; caller should delete the mirror record.
    Dead,
}

/// Checks one page of stored CurseForge projects against upstream via a bulk
/// `getMultiMods` call. Returns `(projectId, outcome)` pairs.
pub async fn check_curseforge_page(
    store: &Arc<dyn ObjectStore>,
    cf: &CurseForgeAdapter,
    page: &[Project],
) -> Result<Vec<(i64, CheckOutcome)>, SyncError> {
    let ids: Vec<i64> = page
        .iter()
        .filter_map(|p| match p.id {
            ProjectId::CurseForge(id) if id >= CF_MIN_VALID_ID => Some(id),
            _ => None,
        })
        .collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let fetched = cf.get_multi_mods(&ids).await?;
    let mut by_id = std::collections::HashMap::new();
    for mod_json in &fetched {
        if let Some(id) = mod_json.get("id").and_then(Value::as_i64) {
            by_id.insert(id, mod_json);
        }
    }
    let alive_ids: HashSet<i64> = by_id.keys().copied().collect();

    let mut outcomes = Vec::with_capacity(page.len());
    for project in page {
        let ProjectId::CurseForge(id) = project.id else { continue };
        if id < CF_MIN_VALID_ID {
            continue;
        }
        if !alive_ids.contains(&id) {
            debug!(project_id = id, "curseforge project no longer listed upstream");
            outcomes.push((id, CheckOutcome::Dead));
            continue;
        }
        let mod_json = by_id[&id];
        let upstream_updated = mod_json
            .get("dateModified")
            .and_then(Value::as_str)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));

        let unchanged = upstream_updated
            .map(|updated| seconds_equal(project.updated_at, updated))
            .unwrap_or(false);

        if unchanged {
            refresh_curseforge_metadata(store, project, mod_json).await?;
            outcomes.push((id, CheckOutcome::Unchanged));
        } else {
            outcomes.push((id, CheckOutcome::Changed));
        }
    }
    Ok(outcomes)
}

async fn refresh_curseforge_metadata(
    store: &Arc<dyn ObjectStore>,
    project: &Project,
    mod_json: &Value,
) -> Result<(), SyncError> {
    let mut refreshed = project.clone();
    if let Some(count) = mod_json.get("downloadCount").and_then(Value::as_u64) {
        refreshed.download_count = count;
    }
    refreshed.synced_at = chrono::Utc::now();
    store
        .upsert_many(EntityType::Project(Platform::CurseForge), vec![Entity::Project(refreshed)])
        .await
}

/// Checks one page of stored Modrinth projects against upstream via a bulk
/// `getMultiProjects` call. Change detection falls back to comparing the
/// version-id list and game-version set when the timestamp alone agrees,
/// matching the reference behavior of treating a silent version swap as a
/// change even when `updated` wasn't bumped.
pub async fn check_modrinth_page(
    store: &Arc<dyn ObjectStore>,
    mr: &ModrinthAdapter,
    page: &[Project],
) -> Result<Vec<(String, CheckOutcome)>, SyncError> {
    let ids: Vec<String> = page
        .iter()
        .filter_map(|p| match &p.id {
            ProjectId::Modrinth(id) => Some(id.clone()),
            _ => None,
        })
        .collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let fetched = mr.get_multi_projects(&ids).await?;
    let mut by_id = std::collections::HashMap::new();
    for project_json in &fetched {
        if let Some(id) = project_json.get("id").and_then(Value::as_str) {
            by_id.insert(id.to_string(), project_json);
        }
    }
    let alive_ids: HashSet<&String> = by_id.keys().collect();

    let mut outcomes = Vec::with_capacity(page.len());
    for project in page {
        let ProjectId::Modrinth(id) = &project.id else { continue };
        if !alive_ids.contains(id) {
            debug!(project_id = %id, "modrinth project no longer listed upstream");
            outcomes.push((id.clone(), CheckOutcome::Dead));
            continue;
        }
        let project_json = by_id[id];
        let upstream_updated = project_json
            .get("updated")
            .and_then(Value::as_str)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));

        let timestamp_unchanged = upstream_updated
            .map(|updated| seconds_equal(project.updated_at, updated))
            .unwrap_or(false);

        let versions_unchanged = timestamp_unchanged && game_versions_match(project_json, project);

        if timestamp_unchanged && versions_unchanged {
            refresh_modrinth_metadata(store, project, project_json).await?;
            outcomes.push((id.clone(), CheckOutcome::Unchanged));
        } else {
            outcomes.push((id.clone(), CheckOutcome::Changed));
        }
    }
    Ok(outcomes)
}

fn game_versions_match(project_json: &Value, project: &Project) -> bool {
    let upstream_versions: HashSet<String> = project_json
        .get("game_versions")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let stored_versions: HashSet<String> = project.game_versions.iter().cloned().collect();
    upstream_versions == stored_versions
}

async fn refresh_modrinth_metadata(
    store: &Arc<dyn ObjectStore>,
    project: &Project,
    project_json: &Value,
) -> Result<(), SyncError> {
    let mut refreshed = project.clone();
    if let Some(count) = project_json.get("downloads").and_then(Value::as_u64) {
        refreshed.download_count = count;
    }
    refreshed.synced_at = chrono::Utc::now();
    store
        .upsert_many(EntityType::Project(Platform::Modrinth), vec![Entity::Project(refreshed)])
        .await
}

/// Finds ids among `candidate_ids` not yet present in the store, used by
/// `QueueDrainer` and `SearchDiscovery` to avoid re-syncing known projects.
pub async fn filter_unknown_curseforge_ids(
    store: &Arc<dyn ObjectStore>,
    candidate_ids: &[i64],
) -> Result<Vec<i64>, SyncError> {
    let as_strings: Vec<String> = candidate_ids.iter().map(i64::to_string).collect();
    let found = store
        .find_by_ids(EntityType::Project(Platform::CurseForge), &as_strings)
        .await?;
    let known: HashSet<i64> = found
        .into_iter()
        .filter_map(|e| match e {
            Entity::Project(p) => match p.id {
                ProjectId::CurseForge(id) => Some(id),
                _ => None,
            },
            _ => None,
        })
        .collect();
    Ok(candidate_ids
        .iter()
        .copied()
        .filter(|id| *id >= CF_MIN_VALID_ID && !known.contains(id))
        .collect())
}

pub async fn filter_unknown_modrinth_ids(
    store: &Arc<dyn ObjectStore>,
    candidate_ids: &[String],
) -> Result<Vec<String>, SyncError> {
    let found = store
        .find_by_ids(EntityType::Project(Platform::Modrinth), candidate_ids)
        .await?;
    let known: HashSet<String> = found
        .into_iter()
        .filter_map(|e| match e {
            Entity::Project(p) => match p.id {
                ProjectId::Modrinth(id) => Some(id),
                _ => None,
            },
            _ => None,
        })
        .collect();
    Ok(candidate_ids
        .iter()
        .cloned()
        .filter(|id| !known.contains(id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_versions_match_ignores_order() {
        let project = Project {
            id: ProjectId::Modrinth("a".into()),
            slug: "a".into(),
            updated_at: chrono::Utc::now(),
            version_ids: vec![],
            game_versions: ["1.20", "1.21"].into_iter().map(String::from).collect(),
            project_type: "mod".into(),
            class_id: None,
            summary: None,
            download_count: 0,
            categories: vec![],
            authors: vec![],
            logo_url: None,
            date_created: None,
            synced_at: chrono::Utc::now(),
        };
        let json = serde_json::json!({"game_versions": ["1.21", "1.20"]});
        assert!(game_versions_match(&json, &project));
    }
}
