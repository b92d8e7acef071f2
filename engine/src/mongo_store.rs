use crate::traits::{Entity, EntityType, ObjectStore};
use async_trait::async_trait;
use error::SyncError;
use model::{EnumerationRecord, Fingerprint, Project, VersionOrFile};
use mongodb::bson::{doc, to_document, Document};
use mongodb::options::{ClientOptions, ServerApi, ServerApiVersion};
use mongodb::{Client, Database};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// Mongo-backed `ObjectStore`. One collection per `EntityType`, named after
/// the platform and kind (`cf_mods`, `mr_files`, `cf_fingerprints`, …).
#[derive(Clone)]
pub struct MongoObjectStore {
    db: Database,
}

impl MongoObjectStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, SyncError> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| SyncError::StoreUnavailable(e.to_string()))?;
        options.server_api = Some(ServerApi::builder().version(ServerApiVersion::V1).build());

        let client = Client::with_options(options)?;
        let db = client.database(database);

        timeout(Duration::from_secs(5), db.run_command(doc! { "ping": 1 }))
            .await
            .map_err(|_| SyncError::StoreUnavailable("mongodb ping timed out".into()))??;
        info!(database, "connected to mongodb");

        Ok(MongoObjectStore { db })
    }

    pub fn from_database(db: Database) -> Self {
        MongoObjectStore { db }
    }

    fn entity_to_document(entity: &Entity) -> Result<Document, SyncError> {
        let doc = match entity {
            Entity::Project(p) => to_document(p),
            Entity::VersionOrFile(v) => to_document(v),
            Entity::Fingerprint(f) => to_document(f),
            Entity::Enumeration(e) => to_document(e),
        };
        doc.map_err(|e| SyncError::Other(format!("bson encode failed: {e}")))
    }

    fn document_to_entity(ty: EntityType, doc: Document) -> Result<Entity, SyncError> {
        let decode = |e: mongodb::bson::de::Error| SyncError::Other(format!("bson decode failed: {e}"));
        Ok(match ty {
            EntityType::Project(_) => {
                Entity::Project(mongodb::bson::from_document::<Project>(doc).map_err(decode)?)
            }
            EntityType::VersionOrFile(_) => {
                Entity::VersionOrFile(mongodb::bson::from_document::<VersionOrFile>(doc).map_err(decode)?)
            }
            EntityType::Fingerprint => {
                Entity::Fingerprint(mongodb::bson::from_document::<Fingerprint>(doc).map_err(decode)?)
            }
            EntityType::Enumeration(_) => Entity::Enumeration(
                mongodb::bson::from_document::<EnumerationRecord>(doc).map_err(decode)?,
            ),
        })
    }

    fn id_field(ty: EntityType) -> &'static str {
        match ty {
            EntityType::Project(_) => "id",
            EntityType::VersionOrFile(_) => "id",
            EntityType::Fingerprint => "fingerprint",
            EntityType::Enumeration(_) => "kind",
        }
    }
}

#[async_trait]
impl ObjectStore for MongoObjectStore {
    async fn find_page(
        &self,
        ty: EntityType,
        filter: Document,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<Entity>, SyncError> {
        use futures_util::TryStreamExt;
        use mongodb::options::FindOptions;

        let collection = self.db.collection::<Document>(&ty.collection_name());
        let options = FindOptions::builder().skip(skip).limit(limit).build();
        let mut cursor = collection.find(filter).with_options(options).await?;

        let mut out = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            out.push(MongoObjectStore::document_to_entity(ty, doc)?);
        }
        Ok(out)
    }

    async fn find_by_ids(&self, ty: EntityType, ids: &[String]) -> Result<Vec<Entity>, SyncError> {
        use futures_util::TryStreamExt;
        use mongodb::bson::Bson;

        let collection = self.db.collection::<Document>(&ty.collection_name());
        // CF's project/file ids are stored as numbers, MR's as strings; accept
        // a caller-supplied string id either way by matching both forms.
        let values: Vec<Bson> = ids
            .iter()
            .flat_map(|id| match id.parse::<i64>() {
                Ok(n) => vec![Bson::Int64(n), Bson::String(id.clone())],
                Err(_) => vec![Bson::String(id.clone())],
            })
            .collect();
        let filter = doc! { Self::id_field(ty): { "$in": values } };
        let mut cursor = collection.find(filter).await?;

        let mut out = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            out.push(MongoObjectStore::document_to_entity(ty, doc)?);
        }
        Ok(out)
    }

    async fn upsert_many(&self, ty: EntityType, entities: Vec<Entity>) -> Result<(), SyncError> {
        if entities.is_empty() {
            return Ok(());
        }
        let collection = self.db.collection::<Document>(&ty.collection_name());
        let id_field = Self::id_field(ty);

        debug!(collection = %ty.collection_name(), count = entities.len(), "upserting batch");
        for entity in entities {
            let document = Self::entity_to_document(&entity)?;
            let id_value = document
                .get(id_field)
                .cloned()
                .ok_or_else(|| SyncError::Other(format!("entity missing {id_field}")))?;
            collection
                .replace_one(doc! { id_field: id_value }, document)
                .upsert(true)
                .await?;
        }
        Ok(())
    }

    async fn delete_many(&self, ty: EntityType, filter: Document) -> Result<u64, SyncError> {
        let collection = self.db.collection::<Document>(&ty.collection_name());
        let result = collection.delete_many(filter).await?;
        Ok(result.deleted_count)
    }

    async fn count(&self, ty: EntityType, filter: Document) -> Result<u64, SyncError> {
        let collection = self.db.collection::<Document>(&ty.collection_name());
        Ok(collection.count_documents(filter).await?)
    }
}
