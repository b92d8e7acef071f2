//! Shared data model for the mirror-synchronization engine: the semantic
//! types every crate passes across its boundaries, independent of how any
//! one store happens to persist them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    CurseForge,
    Modrinth,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::CurseForge => "cf",
            Platform::Modrinth => "mr",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque per-platform identifier: CF uses positive integers, MR uses short
/// strings. Unique within a platform, not across platforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectId {
    CurseForge(i64),
    Modrinth(String),
}

impl ProjectId {
    pub fn platform(&self) -> Platform {
        match self {
            ProjectId::CurseForge(_) => Platform::CurseForge,
            ProjectId::Modrinth(_) => Platform::Modrinth,
        }
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectId::CurseForge(id) => write!(f, "{id}"),
            ProjectId::Modrinth(id) => write!(f, "{id}"),
        }
    }
}

/// Mirrored project record. Created on first discovery, mutated in place by
/// `ProjectSync`, destroyed by the deletion sweep once upstream no longer
/// lists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub slug: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "versionIds")]
    pub version_ids: Vec<String>,
    #[serde(rename = "gameVersions")]
    pub game_versions: BTreeSet<String>,
    #[serde(rename = "projectType")]
    pub project_type: String,
    #[serde(rename = "classId")]
    pub class_id: Option<i64>,
    pub summary: Option<String>,
    #[serde(rename = "downloadCount")]
    pub download_count: u64,
    pub categories: Vec<i64>,
    pub authors: Vec<String>,
    #[serde(rename = "logoUrl")]
    pub logo_url: Option<String>,
    #[serde(rename = "dateCreated")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(rename = "syncedAt")]
    pub synced_at: DateTime<Utc>,
}

/// A single version (MR) or file (CF), owned by exactly one `Project`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionOrFile {
    pub id: String,
    #[serde(rename = "projectId")]
    pub project_id: ProjectId,
    #[serde(rename = "fileHashes")]
    pub file_hashes: HashMap<String, String>,
    #[serde(rename = "publishedAt")]
    pub published_at: DateTime<Utc>,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: Option<String>,
    #[serde(rename = "releaseType")]
    pub release_type: ReleaseType,
    pub loaders: Vec<String>,
    #[serde(rename = "gameVersions")]
    pub game_versions: Vec<String>,
    #[serde(rename = "syncedAt")]
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    Release,
    Beta,
    Alpha,
}

/// CF-only fingerprint -> file auxiliary mapping, rebuilt on every file
/// upsert. `latest_files` mirrors the reference's duplicate-lookup snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    pub fingerprint: u64,
    #[serde(rename = "fileId")]
    pub file_id: String,
    /// The owning mod's id, carried so a project's fingerprints can be
    /// pruned without a cross-collection join.
    #[serde(rename = "modId")]
    pub mod_id: i64,
    #[serde(rename = "latestFiles")]
    pub latest_files: Vec<serde_json::Value>,
    #[serde(rename = "syncedAt")]
    pub synced_at: DateTime<Utc>,
}

/// Platform-scoped named miss-queue. Written externally by the read service,
/// drained (read then truncated) by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissQueueName {
    CfModIds,
    CfFileIds,
    CfFingerprints,
    MrProjectIds,
    MrVersionIds,
    MrHashesSha1,
    MrHashesSha512,
}

impl MissQueueName {
    pub fn key(&self) -> &'static str {
        match self {
            MissQueueName::CfModIds => "cf.modids",
            MissQueueName::CfFileIds => "cf.fileids",
            MissQueueName::CfFingerprints => "cf.fingerprints",
            MissQueueName::MrProjectIds => "mr.projectids",
            MissQueueName::MrVersionIds => "mr.versionids",
            MissQueueName::MrHashesSha1 => "mr.hashes.sha1",
            MissQueueName::MrHashesSha512 => "mr.hashes.sha512",
        }
    }

    pub fn all() -> [MissQueueName; 7] {
        [
            MissQueueName::CfModIds,
            MissQueueName::CfFileIds,
            MissQueueName::CfFingerprints,
            MissQueueName::MrProjectIds,
            MissQueueName::MrVersionIds,
            MissQueueName::MrHashesSha1,
            MissQueueName::MrHashesSha512,
        ]
    }
}

/// Full-replacement enumeration record: categories, loaders, game versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumerationRecord {
    pub platform: Platform,
    pub kind: EnumerationKind,
    pub raw: serde_json::Value,
    #[serde(rename = "refreshedAt")]
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnumerationKind {
    Category,
    Loader,
    GameVersion,
}

/// Outcome of a single `ProjectSync` run, as returned to the caller and to
/// `Scheduler`/`Notifier` for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDetail {
    pub id: ProjectId,
    pub name: String,
    #[serde(rename = "versionCount")]
    pub version_count: usize,
}

/// Opaque CF pagination descriptor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CfPage {
    pub index: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
    #[serde(rename = "resultCount")]
    pub result_count: u32,
    #[serde(rename = "totalCount")]
    pub total_count: u32,
}

/// Opaque MR pagination descriptor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MrPage {
    pub offset: u32,
    pub limit: u32,
    pub hits: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_display_roundtrips_platform() {
        assert_eq!(ProjectId::CurseForge(238222).platform(), Platform::CurseForge);
        assert_eq!(ProjectId::Modrinth("AANobbMI".into()).platform(), Platform::Modrinth);
        assert_eq!(ProjectId::CurseForge(5).to_string(), "5");
    }

    #[test]
    fn miss_queue_keys_match_spec_naming() {
        assert_eq!(MissQueueName::CfFingerprints.key(), "cf.fingerprints");
        assert_eq!(MissQueueName::MrHashesSha512.key(), "mr.hashes.sha512");
        assert_eq!(MissQueueName::all().len(), 7);
    }
}
