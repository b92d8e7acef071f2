use crate::traits::SetStore;
use async_trait::async_trait;
use error::SyncError;
use model::MissQueueName;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Redis-backed `SetStore`. Miss queues are plain redis sets, written
/// externally by the read service and drained here.
#[derive(Clone)]
pub struct RedisSetStore {
    conn: ConnectionManager,
}

impl RedisSetStore {
    pub async fn connect(url: &str) -> Result<Self, SyncError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(RedisSetStore { conn })
    }
}

#[async_trait]
impl SetStore for RedisSetStore {
    async fn exists(&self, name: MissQueueName) -> Result<bool, SyncError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(name.key()).await?;
        Ok(exists)
    }

    async fn members(&self, name: MissQueueName) -> Result<Vec<String>, SyncError> {
        let mut conn = self.conn.clone();
        if !self.exists(name).await? {
            return Ok(Vec::new());
        }
        let members: Vec<String> = conn.smembers(name.key()).await?;
        Ok(members)
    }

    async fn delete(&self, name: MissQueueName) -> Result<(), SyncError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(name.key()).await?;
        Ok(())
    }
}
