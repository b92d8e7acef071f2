use crate::config::Config;
use pipeline::{CfSyncConfig, MrSyncConfig, SearchConfig};
use error::SyncError;
use http::HttpClient;
use notify::{NullNotifier, Notifier, TelegramNotifier};
use ratelimit::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use store::{MongoObjectStore, ObjectStore, RedisSetStore, SetStore};
use tokio_util::sync::CancellationToken;
use upstream::{CurseForgeAdapter, ModrinthAdapter};
use workerpool::WorkerPool;

/// Everything a job body needs, wired once at startup and shared across
/// every scheduled job and worker task.
pub struct App {
    pub config: Config,
    pub store: Arc<dyn ObjectStore>,
    pub sets: Arc<dyn SetStore>,
    pub curseforge: Arc<CurseForgeAdapter>,
    pub modrinth: Arc<ModrinthAdapter>,
    pub notifier: Arc<dyn Notifier>,
    pub curseforge_pool: WorkerPool,
    pub modrinth_pool: WorkerPool,
    /// Cancelled on shutdown; threaded through the scheduler, both worker
    /// pools, and every rate limiter bucket's refill ticker so every
    /// long-running loop notices the same signal.
    pub shutdown: CancellationToken,
}

impl App {
    pub async fn connect(config: Config, shutdown: CancellationToken) -> Result<Self, SyncError> {
        let store = MongoObjectStore::connect(&config.mongodb.uri(), &config.mongodb.database).await?;
        let sets = RedisSetStore::connect(&config.redis.url()).await?;

        let rate_limiter = Arc::new(RateLimiter::with_shutdown(
            config.domain_rate_limits.clone(),
            shutdown.clone(),
        ));
        let http = Arc::new(HttpClient::new(rate_limiter));

        let curseforge = Arc::new(CurseForgeAdapter::new(
            http.clone(),
            config.curseforge_api.clone(),
            config.curseforge_api_key.clone(),
        ));
        let modrinth = Arc::new(ModrinthAdapter::new(http.clone(), config.modrinth_api.clone()));

        let notifier: Arc<dyn Notifier> = match &config.telegram_bot {
            Some(telegram) => Arc::new(TelegramNotifier::new(
                http.clone(),
                telegram.bot_api.clone(),
                telegram.bot_token.clone(),
                telegram.chat_id.clone(),
            )),
            None => Arc::new(NullNotifier),
        };

        let curseforge_pool = WorkerPool::new(config.max_workers, shutdown.clone());
        let modrinth_pool = WorkerPool::new(config.max_workers, shutdown.clone());

        Ok(App {
            config,
            store: Arc::new(store),
            sets: Arc::new(sets),
            curseforge,
            modrinth,
            notifier,
            curseforge_pool,
            modrinth_pool,
            shutdown,
        })
    }

    pub fn cf_sync_config(&self) -> CfSyncConfig {
        CfSyncConfig {
            page_size: 50,
            ..CfSyncConfig::default()
        }
    }

    pub fn mr_sync_config(&self) -> MrSyncConfig {
        MrSyncConfig
    }

    pub fn cf_search_config(&self) -> SearchConfig {
        SearchConfig {
            page_size: 50,
            delay_between_pages: Duration::from_millis(self.config.curseforge_delay_ms),
        }
    }

    pub fn mr_search_config(&self) -> SearchConfig {
        SearchConfig {
            page_size: 100,
            delay_between_pages: Duration::from_millis(self.config.modrinth_delay_ms),
        }
    }
}
