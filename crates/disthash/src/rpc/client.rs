//! tarpc client utilities.
//!
//! Connection functions with timeout and retry, and a pool that caches one
//! client per remote rank.

use crate::config::RpcConfig;
use crate::rpc::protocol::ShardServiceClient;
use crate::types::RankId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tarpc::client::Config;
use tarpc::context;
use tokio::sync::RwLock;
use tokio_serde::formats::Bincode;
use tracing::{debug, error, info, warn};

/// Default connection timeout in milliseconds.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Default number of retry attempts for failed connections.
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default delay between retry attempts in milliseconds.
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Deadline attached to every table call.
///
/// The table has no request timeouts, but tarpc requires a deadline and its
/// timer wheel rejects ones more than about two years out.
pub const CALL_DEADLINE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Request context for table calls, carrying [`CALL_DEADLINE`].
pub fn call_context() -> context::Context {
    let mut ctx = context::current();
    ctx.deadline = SystemTime::now() + CALL_DEADLINE;
    ctx
}

/// Configuration for client connections.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    /// Total attempts, including the first.
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Maximum in-flight requests per client.
    pub max_pending_requests: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_pending_requests: 100,
        }
    }
}

impl From<&RpcConfig> for ClientConfig {
    fn from(rpc: &RpcConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(rpc.connect_timeout_ms),
            retry_attempts: rpc.retry_attempts.max(1),
            retry_delay: Duration::from_millis(rpc.retry_delay_ms),
            max_pending_requests: rpc.max_in_flight,
        }
    }
}

/// Connect to the rank server at `addr`, bounded by `config.connect_timeout`.
///
/// # Errors
///
/// Returns `TimedOut` if the timeout elapses, or the underlying I/O error.
pub async fn connect_to_rank_with_config(
    addr: SocketAddr,
    config: &ClientConfig,
) -> Result<ShardServiceClient, std::io::Error> {
    debug!("Connecting to rank at {} with custom config", addr);

    let transport = tokio::time::timeout(
        config.connect_timeout,
        tarpc::serde_transport::tcp::connect(addr, Bincode::default),
    )
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connection timeout"))??;

    let mut tarpc_config = Config::default();
    tarpc_config.max_in_flight_requests = config.max_pending_requests;

    let client = ShardServiceClient::new(tarpc_config, transport).spawn();
    info!("Connected to rank at {}", addr);
    Ok(client)
}

/// Connect to a rank, retrying according to `config`.
///
/// # Errors
///
/// Returns the last connection error if all attempts fail.
pub async fn connect_to_rank_with_retry(
    addr: SocketAddr,
    config: &ClientConfig,
) -> Result<ShardServiceClient, std::io::Error> {
    let mut last_error = None;

    for attempt in 0..config.retry_attempts {
        if attempt > 0 {
            warn!("Retry attempt {} connecting to rank at {}", attempt + 1, addr);
            tokio::time::sleep(config.retry_delay).await;
        }

        match connect_to_rank_with_config(addr, config).await {
            Ok(client) => {
                if attempt > 0 {
                    info!(
                        "Connected to rank at {} after {} attempts",
                        addr,
                        attempt + 1
                    );
                }
                return Ok(client);
            }
            Err(e) => {
                warn!("Failed to connect to rank at {}: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    error!(
        "Failed to connect to rank at {} after {} attempts",
        addr, config.retry_attempts
    );
    Err(last_error.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotConnected, "connection failed")
    }))
}

/// A pool of rank client connections.
///
/// Addresses are registered up front; connections are opened lazily on
/// first use and cached. Clones share the same maps.
///
/// # Example
///
/// ```rust,ignore
/// use disthash::rpc::client::RankClientPool;
///
/// let pool = RankClientPool::with_config(ClientConfig::default());
/// pool.register_rank(RankId::new(1), "127.0.0.1:7401".parse().unwrap()).await;
///
/// let client = pool.get_client(RankId::new(1)).await?;
/// let stats = client.stats(call_context()).await??;
/// ```
#[derive(Clone)]
pub struct RankClientPool {
    addresses: Arc<RwLock<HashMap<RankId, SocketAddr>>>,
    clients: Arc<RwLock<HashMap<RankId, ShardServiceClient>>>,
    config: ClientConfig,
}

impl RankClientPool {
    /// Create an empty pool whose connections follow `config`.
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            addresses: Arc::new(RwLock::new(HashMap::new())),
            clients: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Register a rank's address. Does not connect.
    pub async fn register_rank(&self, rank: RankId, addr: SocketAddr) {
        let mut addresses = self.addresses.write().await;
        addresses.insert(rank, addr);
        debug!("Registered {} at {}", rank, addr);
    }

    /// Get a client for `rank`, connecting if there is no cached one.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the rank is not registered, or the connection
    /// error once retries are exhausted.
    pub async fn get_client(&self, rank: RankId) -> Result<ShardServiceClient, std::io::Error> {
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(&rank) {
                return Ok(client.clone());
            }
        }

        let addr = self.addresses.read().await.get(&rank).copied();
        let addr = addr.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not registered", rank),
            )
        })?;

        let client = connect_to_rank_with_retry(addr, &self.config).await?;

        // Two tasks may race to connect; keep whichever landed first.
        let mut clients = self.clients.write().await;
        let client = clients.entry(rank).or_insert(client).clone();
        Ok(client)
    }

    pub async fn has_rank(&self, rank: RankId) -> bool {
        self.addresses.read().await.contains_key(&rank)
    }

    /// Number of registered ranks.
    pub async fn rank_count(&self) -> usize {
        self.addresses.read().await.len()
    }

    pub async fn cached_connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Drop the cached connection for `rank` so the next call reconnects.
    pub async fn invalidate_client(&self, rank: RankId) {
        self.clients.write().await.remove(&rank);
        debug!("Invalidated cached client for {}", rank);
    }
}
