use crate::container::Container::{MongoDb, Redis};
use bollard::Docker;
use bollard::models::{ContainerCreateBody, ContainerSummaryStateEnum, HostConfig, PortBinding, PortMap};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, ListContainersOptionsBuilder,
    RemoveContainerOptionsBuilder, StartContainerOptions, StopContainerOptionsBuilder,
};
use futures_util::TryStreamExt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::info;

/// Spins up and tears down real Mongo/Redis containers for integration
/// tests. Gated behind `#[ignore]` at the call site so a plain `cargo test`
/// never needs Docker.
pub struct Manager {
    docker: Docker,
}

impl Manager {
    pub fn new() -> Result<Self, String> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| e.to_string())?;
        Ok(Manager { docker })
    }

    pub async fn init_and_reset_container(
        &self,
        name: &str,
        container: Container,
    ) -> Result<(), String> {
        if self.list_container_names().await?.contains(&name.to_string()) {
            self.remove_container(name).await?;
        }

        self.create_container(name, &container).await?;
        self.start_container(name).await?;
        self.wait_ready(name, &container).await;
        Ok(())
    }

    async fn list_container_names(&self) -> Result<Vec<String>, String> {
        let options = ListContainersOptionsBuilder::new().all(true).build();
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| e.to_string())?;
        Ok(containers
            .into_iter()
            .flat_map(|c| c.names.unwrap_or_default())
            .map(|n| n.trim_start_matches('/').to_string())
            .collect())
    }

    async fn pull_image_if_missing(&self, image: &str) -> Result<(), String> {
        let mut stream = self.docker.create_image(
            Some(CreateImageOptionsBuilder::new().from_image(image).build()),
            None,
            None,
        );
        while let Some(msg) = stream.try_next().await.map_err(|e| e.to_string())? {
            if let Some(status) = msg.status {
                info!("{status}");
            }
        }
        Ok(())
    }

    async fn create_container(&self, name: &str, container: &Container) -> Result<(), String> {
        self.pull_image_if_missing(container.image()).await?;

        let mut port_bindings = PortMap::new();
        port_bindings.insert(
            format!("{}/tcp", container.port()),
            Some(vec![PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: Some(container.port().to_string()),
            }]),
        );

        let options = Some(CreateContainerOptionsBuilder::new().name(name).build());
        let config = ContainerCreateBody {
            image: Some(container.image().to_string()),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.docker
            .create_container(options, config)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<(), String> {
        self.docker
            .start_container(name, None::<StartContainerOptions>)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn stop_container(&self, name: &str) -> Result<(), String> {
        self.docker
            .stop_container(name, Some(StopContainerOptionsBuilder::default().build()))
            .await
            .map_err(|e| e.to_string())?;
        self.remove_container(name).await
    }

    async fn remove_container(&self, name: &str) -> Result<(), String> {
        self.docker
            .remove_container(
                name,
                Some(RemoveContainerOptionsBuilder::default().force(true).v(true).build()),
            )
            .await
            .map_err(|e| e.to_string())
    }

    async fn wait_ready(&self, name: &str, container: &Container) {
        let now = Instant::now();
        while now.elapsed() < Duration::from_secs(60) {
            if let Ok(list) = self.docker.list_containers(None).await {
                let running = list.iter().any(|c| {
                    c.names
                        .as_ref()
                        .map(|names| names.iter().any(|n| n.trim_start_matches('/') == name))
                        .unwrap_or(false)
                        && matches!(c.state, Some(ContainerSummaryStateEnum::RUNNING))
                });
                if running {
                    break;
                }
            }
            sleep(Duration::from_millis(200)).await;
        }
        // give the in-container service a moment to finish its own startup
        sleep(container.settle_delay()).await;
    }
}

pub enum Container {
    MongoDb,
    Redis,
}

impl Container {
    pub fn mongo_db() -> Self {
        MongoDb
    }

    pub fn redis() -> Self {
        Redis
    }

    fn image(&self) -> &'static str {
        match self {
            MongoDb => "mongo:8.0.12-noble",
            Redis => "redis:7-alpine",
        }
    }

    fn port(&self) -> u16 {
        match self {
            MongoDb => 27017,
            Redis => 6379,
        }
    }

    fn settle_delay(&self) -> Duration {
        match self {
            MongoDb => Duration::from_secs(2),
            Redis => Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a local docker daemon"]
    async fn starts_and_stops_mongo() {
        let mgr = Manager::new().unwrap();
        mgr.init_and_reset_container("util-test-mongo", Container::mongo_db())
            .await
            .unwrap();
        mgr.stop_container("util-test-mongo").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a local docker daemon"]
    async fn starts_and_stops_redis() {
        let mgr = Manager::new().unwrap();
        mgr.init_and_reset_container("util-test-redis", Container::redis())
            .await
            .unwrap();
        mgr.stop_container("util-test-redis").await.unwrap();
    }
}
