//! Server assembly and accept loops.
//!
//! # Responsibilities
//! - Own the cache, admission gate, and fetcher as one explicit value
//! - Bind both listeners and drive their accept loops
//! - Spawn one task per connection sharing the proxy state
//! - On shutdown: stop accepting, close the listening sockets, drain
//!   in-flight connections bounded by the configured deadlines
//!
//! # Design Decisions
//! - No process-wide singletons: every subsystem hangs off `ProxyState`, so
//!   multiple proxy instances can run in one process (and in tests)
//! - Connection tasks live in a `JoinSet` so shutdown can join them; a task
//!   merely spawned would be abandoned when the runtime winds down
//! - Accept errors are logged and the loop continues

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::admission::AdmissionGate;
use crate::cache::{spawn_sweeper, ContentCache};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::pipeline;
use crate::net::{raw, Listener, ListenerError};
use crate::upstream::Fetcher;

/// Shared state handed to every connection task.
pub struct ProxyState {
    pub config: ProxyConfig,
    pub cache: ContentCache,
    pub gate: AdmissionGate,
    pub fetcher: Fetcher,
}

/// A caching forward proxy instance.
pub struct ProxyServer {
    state: Arc<ProxyState>,
}

impl ProxyServer {
    /// Assemble a server from configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let cache = ContentCache::new(&config.cache);
        let gate = AdmissionGate::new(
            config.admission.max_clients,
            config.admission.acquire_timeout(),
        );
        let fetcher = Fetcher::new(config.upstream.clone())?;

        Ok(Self {
            state: Arc::new(ProxyState {
                config,
                cache,
                gate,
                fetcher,
            }),
        })
    }

    /// The content cache (shared handle).
    pub fn cache(&self) -> ContentCache {
        self.state.cache.clone()
    }

    /// Bind the HTTP and raw listeners from the configured addresses.
    pub async fn bind(&self) -> Result<(Listener, Listener), ListenerError> {
        let listener = &self.state.config.listener;
        let http = Listener::bind(&listener.bind_address, listener.http_port).await?;
        let raw = Listener::bind(&listener.bind_address, listener.raw_port()).await?;
        Ok((http, raw))
    }

    /// Run both accept loops until the shutdown channel fires, then drain.
    pub async fn run(
        self,
        http_listener: Listener,
        raw_listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let sweeper = spawn_sweeper(
            self.state.cache.clone(),
            self.state.config.cache.sweep_interval(),
            shutdown.resubscribe(),
        );
        let mut connections: JoinSet<()> = JoinSet::new();

        tracing::info!(
            http = %http_listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            raw = %raw_listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            max_clients = self.state.gate.max_clients(),
            "Proxy serving"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Stopping accept loops");
                    break;
                }
                // Reap finished connection tasks as they complete.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = http_listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let state = self.state.clone();
                        connections.spawn(async move {
                            pipeline::handle_http_connection(state, stream, peer).await;
                        });
                    }
                    Err(err) => tracing::warn!(error = %err, "Accept failed on HTTP listener"),
                },
                accepted = raw_listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let state = self.state.clone();
                        connections.spawn(async move {
                            raw::handle_raw_connection(state, stream, peer).await;
                        });
                    }
                    Err(err) => tracing::warn!(error = %err, "Accept failed on raw listener"),
                },
            }
        }

        // Close the listening sockets before draining what is in flight.
        drop(http_listener);
        drop(raw_listener);

        if !connections.is_empty() {
            let drain = self.state.config.drain_timeout();
            tracing::info!(in_flight = connections.len(), "Draining in-flight connections");
            let drained = tokio::time::timeout(drain, async {
                while connections.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                tracing::warn!(
                    remaining = connections.len(),
                    "Drain deadline elapsed, aborting remaining connections"
                );
                connections.shutdown().await;
            }
        }

        // The sweeper holds its own shutdown subscription; wait for it so the
        // cache is quiescent when run() returns.
        let _ = sweeper.await;
        tracing::info!("Proxy stopped");
    }
}
