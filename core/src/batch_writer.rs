use error::SyncError;
use std::sync::Arc;
use store::{Entity, EntityType, ObjectStore};
use tracing::{error, warn};

const DEFAULT_BATCH_SIZE: usize = 100;

/// Scoped write buffer. Reserves an in-memory buffer on creation; callers
/// `add` entities as they're produced. Flushes to the store every
/// `batch_size` entities, and callers must call `close` to flush (and
/// observe the result of) the final partial batch. `Drop` still makes a
/// best-effort flush of anything left behind so at-least-once delivery
/// holds even when a caller exits through an error path without reaching
/// `close` — writes are idempotent by primary key, so a duplicate flush is
/// harmless.
pub struct BatchWriter {
    store: Arc<dyn ObjectStore>,
    ty: EntityType,
    batch_size: usize,
    buffer: Vec<Entity>,
    closed: bool,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn ObjectStore>, ty: EntityType) -> Self {
        BatchWriter::with_batch_size(store, ty, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(store: Arc<dyn ObjectStore>, ty: EntityType, batch_size: usize) -> Self {
        BatchWriter {
            store,
            ty,
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            closed: false,
        }
    }

    pub async fn add(&mut self, entity: Entity) -> Result<(), SyncError> {
        self.buffer.push(entity);
        if self.buffer.len() >= self.batch_size {
            self.flush_batch().await?;
        }
        Ok(())
    }

    async fn flush_batch(&mut self) -> Result<(), SyncError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        self.store.upsert_many(self.ty, batch).await
    }

    /// Flushes any outstanding entities and marks the writer closed so
    /// `Drop` doesn't spawn a redundant background flush.
    pub async fn close(mut self) -> Result<(), SyncError> {
        let result = self.flush_batch().await;
        self.closed = true;
        result
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        if self.closed || self.buffer.is_empty() {
            return;
        }
        warn!(ty = ?self.ty, count = self.buffer.len(), "batch writer dropped without close(), flushing in background");
        let store = self.store.clone();
        let ty = self.ty;
        let batch = std::mem::take(&mut self.buffer);
        tokio::spawn(async move {
            if let Err(err) = store.upsert_many(ty, batch).await {
                error!(ty = ?ty, error = %err, "background flush on drop failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use model::{Platform, Project};
    use mongodb::bson::Document;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingStore {
        upserts: Mutex<Vec<Entity>>,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn find_page(&self, _: EntityType, _: Document, _: u64, _: i64) -> Result<Vec<Entity>, SyncError> {
            Ok(vec![])
        }
        async fn find_by_ids(&self, _: EntityType, _: &[String]) -> Result<Vec<Entity>, SyncError> {
            Ok(vec![])
        }
        async fn upsert_many(&self, _: EntityType, entities: Vec<Entity>) -> Result<(), SyncError> {
            self.upserts.lock().extend(entities);
            Ok(())
        }
        async fn delete_many(&self, _: EntityType, _: Document) -> Result<u64, SyncError> {
            Ok(0)
        }
        async fn count(&self, _: EntityType, _: Document) -> Result<u64, SyncError> {
            Ok(0)
        }
    }

    fn dummy_project(id: i64) -> Entity {
        Entity::Project(Project {
            id: model::ProjectId::CurseForge(id),
            slug: "x".into(),
            updated_at: chrono::Utc::now(),
            version_ids: vec![],
            game_versions: Default::default(),
            project_type: "mod".into(),
            class_id: Some(6),
            summary: None,
            download_count: 0,
            categories: vec![],
            authors: vec![],
            logo_url: None,
            date_created: None,
            synced_at: chrono::Utc::now(),
        })
    }

    #[tokio::test]
    async fn flushes_on_batch_size() {
        let store = Arc::new(RecordingStore::default());
        let mut writer = BatchWriter::with_batch_size(store.clone(), EntityType::Project(Platform::CurseForge), 2);
        writer.add(dummy_project(1)).await.unwrap();
        assert_eq!(store.upserts.lock().len(), 0);
        writer.add(dummy_project(2)).await.unwrap();
        assert_eq!(store.upserts.lock().len(), 2);
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_flushes_partial_batch() {
        let store = Arc::new(RecordingStore::default());
        let mut writer = BatchWriter::with_batch_size(store.clone(), EntityType::Project(Platform::CurseForge), 100);
        writer.add(dummy_project(1)).await.unwrap();
        writer.close().await.unwrap();
        assert_eq!(store.upserts.lock().len(), 1);
    }

    #[tokio::test]
    async fn drop_without_close_still_flushes_eventually() {
        let store = Arc::new(RecordingStore::default());
        {
            let mut writer = BatchWriter::with_batch_size(store.clone(), EntityType::Project(Platform::CurseForge), 100);
            writer.add(dummy_project(1)).await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.upserts.lock().len(), 1);
    }
}
