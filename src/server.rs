//! Wires the component graph together into a runnable server.

use std::sync::Arc;

use tracing::info;

use crate::batch::BatchProcessor;
use crate::config::Config;
use crate::error::Error;
use crate::notify::NotificationBus;
use crate::resources::{CachedResourceHandler, ResourceRegistry};
use crate::upstream::{ObsidianRestClient, UpstreamClient};
use crate::vault::{
    VaultDailyHandler, VaultFolderHandler, VaultNoteHandler, VaultRecentHandler,
    VaultStatsHandler, VaultStructureHandler, VaultTagHandler, VaultTagsHandler,
};

/// The assembled server: a populated registry wrapped by a cached handler,
/// sharing a notification bus for invalidation.
pub struct McpServer {
    pub handler: Arc<CachedResourceHandler>,
    pub bus: NotificationBus,
}

impl McpServer {
    pub fn build(config: Config) -> Result<Self, Error> {
        let upstream: Arc<dyn UpstreamClient> = Arc::new(ObsidianRestClient::new(&config.upstream)?);
        let batch = Arc::new(BatchProcessor::new(config.batch.into())?);
        let registry = build_registry(upstream, batch);

        let bus = NotificationBus::new();
        let handler = CachedResourceHandler::new(registry, config.cache.clone(), &bus);

        info!("server assembled");
        Ok(Self { handler, bus })
    }

    pub async fn run(self) -> std::io::Result<()> {
        crate::transport::stdio::run(self.handler).await
    }
}

fn build_registry(
    upstream: Arc<dyn UpstreamClient>,
    batch: Arc<BatchProcessor>,
) -> ResourceRegistry {
    let mut registry = ResourceRegistry::new();
    registry.register_static("vault://tags", Arc::new(VaultTagsHandler::new(upstream.clone())));
    registry.register_static(
        "vault://stats",
        Arc::new(VaultStatsHandler::new(upstream.clone())),
    );
    registry.register_static(
        "vault://structure",
        Arc::new(VaultStructureHandler::new(upstream.clone())),
    );
    registry.register_static(
        "vault://recent",
        Arc::new(VaultRecentHandler::new(upstream.clone(), batch)),
    );
    registry.register_template(
        "vault://note/{path}",
        Arc::new(VaultNoteHandler::new(upstream.clone())),
    );
    registry.register_template(
        "vault://folder/{path}",
        Arc::new(VaultFolderHandler::new(upstream.clone())),
    );
    registry.register_template(
        "vault://tag/{tagname}",
        Arc::new(VaultTagHandler::new(upstream.clone())),
    );
    registry.register_template("vault://daily/{date}", Arc::new(VaultDailyHandler::new(upstream)));
    registry
}
