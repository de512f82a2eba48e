//! Task dispatcher and probe worker pool
//!
//! Fans probe tasks out across a fixed-size pool of tokio workers. Each
//! worker owns at most one task at a time and builds a private resolver
//! for it through the [`ResolverFactory`] seam; nothing mutable is shared
//! between workers except the task queue itself.
//!
//! The probe body runs inside its own spawned task so that a panic in one
//! probe is contained: the worker observes the failed join, synthesizes a
//! failure result, and moves on. A task is never silently dropped and
//! never retried.

use crate::probe::{execute, ProbeResult, ProbeTask};
use crate::resolve::{ProbeResolver, UpstreamResolver};
use log::{debug, warn};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};

/// Standard DNS port, applied when a server string carries none
pub const DNS_PORT: u16 = 53;

/// Workers used when the caller does not choose a pool size
pub const DEFAULT_WORKERS: usize = 8;

/// Capacity of the event channel back to the consumer
const EVENT_BUFFER: usize = 32;

/// Scanner-level errors
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid server address: {0}")]
    InvalidServer(String),
}

/// Parse `IPv4[:port]`, defaulting the port to 53
///
/// The tunnel client dials port 53 unless told otherwise, so the scanner
/// normalizes addresses the same way.
pub fn parse_server(server: &str) -> Result<SocketAddr, ScanError> {
    if let Ok(addr) = server.parse::<SocketAddr>() {
        return Ok(addr);
    }
    server
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| ScanError::InvalidServer(server.to_string()))
}

/// Builds the resolver a worker hands to one probe task
///
/// The production factory constructs an [`UpstreamResolver`] per task;
/// tests inject scripted factories. Either way the resolver is owned by
/// the task's execution context and dies with it.
pub trait ResolverFactory: Send + Sync + 'static {
    type Resolver: ProbeResolver + 'static;

    fn create(&self, server: SocketAddr, query_timeout: Duration) -> Self::Resolver;
}

/// Production factory: one single-upstream UDP resolver per task
pub struct UpstreamFactory;

impl ResolverFactory for UpstreamFactory {
    type Resolver = UpstreamResolver;

    fn create(&self, server: SocketAddr, query_timeout: Duration) -> UpstreamResolver {
        UpstreamResolver::new(server, query_timeout)
    }
}

/// Progress events streamed to the scan consumer
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A worker picked the server's task up
    Checking(String),
    /// The task produced its result
    Finished(ProbeResult),
}

/// Concurrent probe dispatcher
pub struct Scanner<F = UpstreamFactory> {
    workers: usize,
    factory: Arc<F>,
}

impl Scanner<UpstreamFactory> {
    pub fn new(workers: usize) -> Self {
        Self::with_factory(workers, UpstreamFactory)
    }
}

impl Default for Scanner<UpstreamFactory> {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl<F: ResolverFactory> Scanner<F> {
    pub fn with_factory(workers: usize, factory: F) -> Self {
        Self {
            workers: workers.max(1),
            factory: Arc::new(factory),
        }
    }

    /// Dispatch `tasks` across the pool and stream progress events
    ///
    /// Exactly one [`ScanEvent::Finished`] is emitted per task, in
    /// whatever order the probes complete. Dropping the receiver abandons
    /// the scan: workers stop picking up new tasks, and in-flight queries
    /// end at their own deadlines.
    pub fn scan(&self, tasks: Vec<ProbeTask>) -> mpsc::Receiver<ScanEvent> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        // Bounded queue: the feeder applies backpressure instead of
        // buffering an arbitrarily long server list.
        let (task_tx, task_rx) = mpsc::channel::<ProbeTask>(self.workers);
        let task_rx = Arc::new(Mutex::new(task_rx));

        tokio::spawn(async move {
            for task in tasks {
                if task_tx.send(task).await.is_err() {
                    break;
                }
            }
        });

        for worker_id in 0..self.workers {
            let task_rx = Arc::clone(&task_rx);
            let event_tx = event_tx.clone();
            let factory = Arc::clone(&self.factory);

            tokio::spawn(async move {
                loop {
                    // Hold the queue lock only while receiving; probing
                    // must not serialize the pool.
                    let task = { task_rx.lock().await.recv().await };
                    let Some(task) = task else { break };

                    debug!("worker {} checking {}", worker_id, task.server);
                    if event_tx
                        .send(ScanEvent::Checking(task.server.clone()))
                        .await
                        .is_err()
                    {
                        break;
                    }

                    let result = run_isolated(factory.as_ref(), task).await;
                    if event_tx.send(ScanEvent::Finished(result)).await.is_err() {
                        break;
                    }
                }
            });
        }

        event_rx
    }

    /// Convenience wrapper: run a scan to completion and collect results
    pub async fn scan_collect(&self, tasks: Vec<ProbeTask>) -> Vec<ProbeResult> {
        let mut events = self.scan(tasks);
        let mut results = Vec::new();
        while let Some(event) = events.recv().await {
            if let ScanEvent::Finished(result) = event {
                results.push(result);
            }
        }
        results
    }
}

/// Run one probe inside its own task so a crash cannot take the worker
/// down with it
async fn run_isolated<F: ResolverFactory>(factory: &F, task: ProbeTask) -> ProbeResult {
    let server = task.server.clone();
    let started = Instant::now();

    let addr = match parse_server(&task.server) {
        Ok(addr) => addr,
        Err(err) => {
            warn!("rejecting task for {}: {}", server, err);
            return ProbeResult::failed(server, 0, err.to_string());
        }
    };

    let resolver = factory.create(addr, task.deadline());
    let handle = tokio::spawn(async move { execute(&resolver, &task).await });

    match handle.await {
        Ok(result) => result,
        Err(err) => {
            warn!("probe for {} crashed: {}", server, err);
            ProbeResult::failed(
                server.clone(),
                started.elapsed().as_millis() as u64,
                format!("{} probe worker failed: {}", server, err),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_defaults_port() {
        let addr = parse_server("8.8.8.8").unwrap();
        assert_eq!(addr.port(), DNS_PORT);
        assert_eq!(addr.ip().to_string(), "8.8.8.8");
    }

    #[test]
    fn test_parse_server_keeps_explicit_port() {
        let addr = parse_server("8.8.8.8:5353").unwrap();
        assert_eq!(addr.port(), 5353);
    }

    #[test]
    fn test_parse_server_rejects_garbage() {
        assert!(parse_server("not-an-address").is_err());
        assert!(parse_server("").is_err());
    }

    #[test]
    fn test_scanner_floors_worker_count() {
        let scanner = Scanner::new(0);
        assert_eq!(scanner.workers, 1);
    }
}
