use async_trait::async_trait;
use error::SyncError;
use model::{EnumerationRecord, Fingerprint, MissQueueName, Platform, Project, VersionOrFile};
use mongodb::bson::Document;

/// Selects which mirrored collection an `ObjectStore` call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Project(Platform),
    VersionOrFile(Platform),
    Fingerprint,
    Enumeration(Platform),
}

impl EntityType {
    /// Collection name, matching the naming the reference implementation
    /// uses for its per-platform mongo collections.
    pub fn collection_name(&self) -> String {
        match self {
            EntityType::Project(p) => format!("{}_mods", p.as_str()),
            EntityType::VersionOrFile(p) => format!("{}_files", p.as_str()),
            EntityType::Fingerprint => "cf_fingerprints".to_string(),
            EntityType::Enumeration(p) => format!("{}_enumerations", p.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Entity {
    Project(Project),
    VersionOrFile(VersionOrFile),
    Fingerprint(Fingerprint),
    Enumeration(EnumerationRecord),
}

/// Abstract document store. `filter` is a raw mongo query document: the
/// engine is mongo-backed end to end, so there is no value in hiding that
/// behind a second query language.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn find_page(
        &self,
        ty: EntityType,
        filter: Document,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<Entity>, SyncError>;

    async fn find_by_ids(&self, ty: EntityType, ids: &[String]) -> Result<Vec<Entity>, SyncError>;

    async fn upsert_many(&self, ty: EntityType, entities: Vec<Entity>) -> Result<(), SyncError>;

    async fn delete_many(&self, ty: EntityType, filter: Document) -> Result<u64, SyncError>;

    async fn count(&self, ty: EntityType, filter: Document) -> Result<u64, SyncError>;
}

/// Abstract named-set store backing the miss queues. Written externally by
/// the read service, drained by this engine.
#[async_trait]
pub trait SetStore: Send + Sync {
    async fn exists(&self, name: MissQueueName) -> Result<bool, SyncError>;

    async fn members(&self, name: MissQueueName) -> Result<Vec<String>, SyncError>;

    async fn delete(&self, name: MissQueueName) -> Result<(), SyncError>;
}
