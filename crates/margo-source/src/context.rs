//! Per-worker connection caching with TTL and liveness probe

use std::time::{Duration, Instant};

use crate::client::SourceClient;
use crate::error::SourceError;
use crate::rpc::{JsonRpcClient, SourceConfig};

/// Connection lifetime before a worker reopens regardless of health.
pub const CONNECTION_TTL: Duration = Duration::from_secs(300);

/// Opens source connections. The orchestrator depends only on this trait,
/// so tests can inject fakes.
pub trait ConnectionFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn SourceClient>, SourceError>;
}

/// Factory producing authenticated JSON-RPC clients.
pub struct RpcConnectionFactory {
    config: SourceConfig,
}

impl RpcConnectionFactory {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

impl ConnectionFactory for RpcConnectionFactory {
    fn open(&self) -> Result<Box<dyn SourceClient>, SourceError> {
        Ok(Box::new(JsonRpcClient::new(self.config.clone())?))
    }
}

/// One worker's cached connection.
///
/// A connection is reused while it is younger than the TTL and still
/// answers a probe; otherwise it is dropped and reopened. Each pipeline
/// worker holds its own context, so there is no cross-thread sharing.
pub struct WorkerContext<'f> {
    factory: &'f dyn ConnectionFactory,
    ttl: Duration,
    slot: Option<(Instant, Box<dyn SourceClient>)>,
}

impl<'f> WorkerContext<'f> {
    pub fn new(factory: &'f dyn ConnectionFactory) -> Self {
        Self::with_ttl(factory, CONNECTION_TTL)
    }

    pub fn with_ttl(factory: &'f dyn ConnectionFactory, ttl: Duration) -> Self {
        Self {
            factory,
            ttl,
            slot: None,
        }
    }

    /// Borrow a live client, reconnecting if the cached one expired or
    /// stopped answering.
    pub fn client(&mut self) -> Result<&mut dyn SourceClient, SourceError> {
        let fresh = match &mut self.slot {
            Some((opened, client)) => opened.elapsed() < self.ttl && client.probe(),
            None => false,
        };
        if !fresh && self.slot.take().is_some() {
            log::debug!("source connection stale, reconnecting");
        }
        let slot = match self.slot.take() {
            Some(slot) => slot,
            None => (Instant::now(), self.factory.open()?),
        };
        let (_, client) = self.slot.insert(slot);
        Ok(client.as_mut())
    }

    /// Drop the cached connection so the next call reopens.
    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}
