//! # Core Service
//!
//! Wires the library sync engine from an [`EngineConfig`]: the SQLite mirror,
//! stored credentials, the Spotify library client and the sync orchestrator.
//!
//! ## Usage
//!
//! ```ignore
//! use core_service::{Engine, EngineConfig, SyncMode};
//!
//! let config = EngineConfig::builder()
//!     .database_path("/var/lib/crates/library.db")
//!     .client_credentials(client_id, client_secret)
//!     .build()?;
//! let engine = Engine::bootstrap(config).await?;
//!
//! engine.link_account(user, tokens).await?;
//! let library = engine.orchestrator().synchronize(user, SyncMode::FirstSync).await?;
//! ```
//!
//! ## Features
//!
//! - `desktop-shims` (default): [`Engine::bootstrap`] with the `reqwest`
//!   HTTP client. Without it, hosts pass their own client to
//!   [`Engine::with_http_client`].

use anyhow::Context;
use bridge_traits::http::HttpClient;
use bridge_traits::time::{Clock, SystemClock};
use core_auth::{CredentialManager, OAuthConfig, OAuthFlowManager, OAuthTokens, UserId};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::repositories::{
    CatalogService, SqliteCatalogService, SqliteLibraryItemRepository, SqliteLibraryRepository,
    SqlitePageStore, SqliteTokenRepository,
};
use core_library::LibraryService;
use core_sync::LibrarySyncOrchestrator;
use provider_spotify::{SpotifyConnector, SpotifyLibraryClient};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

pub use core_auth::AccessToken;
pub use core_library::{Library, LibraryItem, LibraryState};
pub use core_runtime::{init_logging, EngineConfig, LoggingConfig};
pub use core_sync::{SyncConfig, SyncError, SyncMode};

const IN_MEMORY_PATH: &str = ":memory:";

/// A fully wired sync engine.
pub struct Engine {
    pool: SqlitePool,
    credentials: Arc<CredentialManager>,
    catalog: Arc<dyn CatalogService>,
    library: LibraryService,
    orchestrator: Arc<LibrarySyncOrchestrator>,
}

impl Engine {
    /// Build the engine with the desktop `reqwest` client.
    #[cfg(feature = "desktop-shims")]
    pub async fn bootstrap(config: EngineConfig) -> anyhow::Result<Self> {
        let http = bridge_desktop::ReqwestHttpClient::with_timeout(config.http_timeout)
            .context("Failed to build HTTP client")?;
        Self::with_http_client(config, Arc::new(http)).await
    }

    /// Build the engine over a host-provided HTTP client.
    pub async fn with_http_client(
        config: EngineConfig,
        http: Arc<dyn HttpClient>,
    ) -> anyhow::Result<Self> {
        config.validate().context("Invalid engine configuration")?;

        let database = if config.database_path.as_os_str() == IN_MEMORY_PATH {
            DatabaseConfig::in_memory()
        } else {
            DatabaseConfig::new(&config.database_path)
        };
        let pool = create_pool(database)
            .await
            .context("Failed to open library database")?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let libraries = Arc::new(SqliteLibraryRepository::new(pool.clone()));
        let items = Arc::new(SqliteLibraryItemRepository::new(pool.clone()));
        let catalog: Arc<dyn CatalogService> =
            Arc::new(SqliteCatalogService::new(pool.clone(), Arc::clone(&clock)));
        let pages = Arc::new(SqlitePageStore::new(pool.clone(), Arc::clone(&clock)));
        let tokens = Arc::new(SqliteTokenRepository::new(pool.clone(), Arc::clone(&clock)));

        let oauth = OAuthFlowManager::new(
            OAuthConfig {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                token_url: config.token_url.clone(),
            },
            Arc::clone(&http),
            Arc::clone(&clock),
        );
        let credentials = Arc::new(CredentialManager::new(tokens, oauth));

        let connector = SpotifyConnector::with_base_url(http, config.api_base_url.clone())
            .with_timeout(config.http_timeout);
        let remote = Arc::new(SpotifyLibraryClient::new(connector, credentials.clone()));

        let orchestrator = Arc::new(LibrarySyncOrchestrator::new(
            libraries.clone(),
            items.clone(),
            pages,
            remote,
            clock,
            SyncConfig {
                removal_page_size: config.removal_page_size,
                addition_page_size: config.addition_page_size,
            },
        ));
        let library = LibraryService::new(libraries, items);

        info!(
            api_base_url = %config.api_base_url,
            removal_page_size = config.removal_page_size,
            addition_page_size = config.addition_page_size,
            "Library sync engine ready"
        );

        Ok(Self {
            pool,
            credentials,
            catalog,
            library,
            orchestrator,
        })
    }

    /// Store the tokens obtained when `user` connected their account.
    pub async fn link_account(&self, user: UserId, tokens: OAuthTokens) -> anyhow::Result<()> {
        self.credentials
            .link_account(user, tokens)
            .await
            .with_context(|| format!("Failed to link account for user {}", user))
    }

    pub fn orchestrator(&self) -> &Arc<LibrarySyncOrchestrator> {
        &self.orchestrator
    }

    pub fn library(&self) -> &LibraryService {
        &self.library
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogService> {
        &self.catalog
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database pool, waiting for checked-out connections.
    pub async fn shutdown(&self) {
        self.pool.close().await;
    }
}
