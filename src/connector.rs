use std::sync::Arc;

use crate::cache::UriCache;
use crate::config::{ConfigOverrides, ConnectionConfig};
use crate::error::Result;
use crate::plist::PlistRegistry;
use crate::transport::{HttpTransport, RequestContext, Response, Transport, check_status};

/// State shared by every domain and handle opened through one connector.
pub(crate) struct Shared {
    pub(crate) config: ConnectionConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) plists: PlistRegistry,
    pub(crate) cache: UriCache,
}

impl Shared {
    /// Performs one request and fails on any non-2xx status.
    pub(crate) fn execute(&self, request: &RequestContext) -> Result<Response> {
        let response = self.perform(request)?;
        if let Err(e) = check_status(response.status) {
            tracing::debug!(
                "{} {} failed: {}",
                request.method.as_str(),
                request.url,
                e
            );
            return Err(e);
        }
        Ok(response)
    }

    /// Performs one request and hands back whatever status the server answered with.
    pub(crate) fn perform(&self, request: &RequestContext) -> Result<Response> {
        tracing::debug!("{} {}", request.method.as_str(), request.url);
        self.transport.perform(request)
    }
}

/// Connector init/term. Every domain opened through a connector shares its transport,
/// property-list registry, and URI cache.
#[derive(Clone)]
pub struct Connector {
    pub(crate) shared: Arc<Shared>,
}

impl Connector {
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        tracing::info!("connector initialised for {}", config.endpoint);
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                plists: PlistRegistry::new(),
                cache: UriCache::new(),
            }),
        }
    }

    /// Uses the blocking HTTP transport and the usual configuration sources.
    pub fn from_env() -> Result<Self> {
        Self::with_overrides(ConfigOverrides::default())
    }

    pub fn with_overrides(overrides: ConfigOverrides) -> Result<Self> {
        let config = ConnectionConfig::load(overrides)?;
        let transport = HttpTransport::new()?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    pub fn plists(&self) -> &PlistRegistry {
        &self.shared.plists
    }

    pub fn cache(&self) -> &UriCache {
        &self.shared.cache
    }

    /// Drops whatever is still registered in the URI cache and returns how many entries
    /// that was. Anything left over means a handle was never closed.
    pub fn term(&self) -> usize {
        let leaked = self.shared.cache.clear();
        if leaked > 0 {
            tracing::warn!("connector terminated with {} object(s) still open", leaked);
        } else {
            tracing::info!("connector terminated");
        }
        leaked
    }
}
