//! Tunnel compatibility probing
//!
//! A probe task names one DNS server, one test domain, and one tunnel
//! protocol family. Executing it runs a pre-flight reachability query and
//! then the selected protocol tester:
//!
//! - [`dnstt`]: four boolean sub-probes covering the query shapes a
//!   dnstt-style tunnel needs (NS, TXT, nested random subdomains).
//! - [`streamgate`]: fifteen escalating-size payload queries with a
//!   timing-based statistical admission test.
//!
//! Exactly one [`ProbeResult`] comes out of every task. `success` reports
//! whether the task could be evaluated at all; compatibility lives in the
//! score.

pub mod dnstt;
pub mod streamgate;

use crate::labels::random_label;
use crate::resolve::{resolve_with_deadline, ProbeResolver, QueryError};
use hickory_resolver::proto::rr::RecordType;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub use dnstt::DnsttScore;
pub use streamgate::{LatencyStats, StreamGateScore};

/// Per-query deadline applied when a task does not carry its own
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 3;

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// Tunnel protocol family a probe task tests for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// dnstt-style tunnel: NS/TXT support plus nested random subdomains
    Dnstt,
    /// Stream-Gate wire format: base32-chunked TXT-query subdomains
    Other,
}

/// One unit of scan work: probe `server` for `mode` compatibility
///
/// Immutable once created; consumed exactly once by one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeTask {
    /// Server address, `IPv4[:port]`; port defaults to 53 at parse time
    pub server: String,

    /// Test domain whose authoritative nameserver is tunnel-aware
    pub domain: String,

    /// Protocol family to test
    pub mode: ProtocolKind,

    /// Per-query deadline in seconds
    #[serde(rename = "timeout", default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl ProbeTask {
    pub fn new(server: impl Into<String>, domain: impl Into<String>, mode: ProtocolKind) -> Self {
        Self {
            server: server.into(),
            domain: domain.into(),
            mode,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Per-query deadline, converted to milliseconds internally
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.timeout_seconds.saturating_mul(1000))
    }
}

/// Compatibility score, tagged by the protocol family that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "protocol")]
pub enum ScoreResult {
    #[serde(rename = "dnstt")]
    Dnstt(DnsttScore),
    #[serde(rename = "other")]
    StreamGate(StreamGateScore),
}

impl ScoreResult {
    pub fn is_compatible(&self) -> bool {
        match self {
            ScoreResult::Dnstt(score) => score.is_compatible,
            ScoreResult::StreamGate(score) => score.is_compatible,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            ScoreResult::Dnstt(score) => format!("{}/{}", score.score, score.max_score),
            ScoreResult::StreamGate(score) => format!("{}/{}", score.score, score.max_score),
        }
    }
}

/// Outcome of one probe task
///
/// `success=true` means the task ran to completion, even when the server
/// turned out to be incompatible; `success=false` means it could not be
/// evaluated (unreachable, crashed worker, malformed address).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub server: String,

    pub success: bool,

    /// Total wall-clock time for the task in milliseconds
    #[serde(rename = "elapsed")]
    pub elapsed_ms: u64,

    #[serde(rename = "data", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProbeResult {
    /// Synthesize a failure result for a task that could not be evaluated
    pub fn failed(server: impl Into<String>, elapsed_ms: u64, message: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            success: false,
            elapsed_ms,
            score: None,
            message: Some(message.into()),
        }
    }

    pub fn is_compatible(&self) -> bool {
        self.score
            .as_ref()
            .map(ScoreResult::is_compatible)
            .unwrap_or(false)
    }

    /// Metric used as the secondary ranking key: mean query latency when
    /// the tester measured one, total elapsed time otherwise
    pub fn ranking_metric(&self) -> f64 {
        if let Some(ScoreResult::StreamGate(score)) = &self.score {
            if let Some(stats) = &score.stats {
                return stats.avg_ms;
            }
        }
        self.elapsed_ms as f64
    }
}

/// Pre-flight reachability probe
///
/// One A query on `random.{domain}`. Only a deadline miss is fatal: an
/// authoritative negative, or any other error, still proves something is
/// answering on the far side, and the task proceeds. Lenient by intent.
async fn preflight<R>(resolver: &R, domain: &str, deadline: Duration) -> bool
where
    R: ProbeResolver + ?Sized,
{
    let name = format!("{}.{}", random_label(), domain);
    let outcome = resolve_with_deadline(resolver, &name, RecordType::A, deadline).await;
    debug!("pre-flight {} -> {:?}", name, outcome);
    !matches!(outcome, Err(QueryError::Timeout))
}

/// Execute one probe task against an already-constructed resolver
///
/// Runs the pre-flight probe, then the tester selected by `mode`.
/// Sub-queries run strictly sequentially so timing measurements are never
/// contaminated by self-competition for the same socket.
pub async fn execute<R>(resolver: &R, task: &ProbeTask) -> ProbeResult
where
    R: ProbeResolver + ?Sized,
{
    let started = Instant::now();
    let deadline = task.deadline();

    if !preflight(resolver, &task.domain, deadline).await {
        return ProbeResult::failed(
            task.server.clone(),
            started.elapsed().as_millis() as u64,
            format!("{} timeout", task.server),
        );
    }

    let score = match task.mode {
        ProtocolKind::Dnstt => ScoreResult::Dnstt(dnstt::run(resolver, &task.domain, deadline).await),
        ProtocolKind::Other => {
            ScoreResult::StreamGate(streamgate::run(resolver, &task.domain, deadline).await)
        }
    };

    ProbeResult {
        server: task.server.clone(),
        success: true,
        elapsed_ms: started.elapsed().as_millis() as u64,
        score: Some(score),
        message: None,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedResolver;
    use super::*;

    fn task(mode: ProtocolKind) -> ProbeTask {
        ProbeTask::new("192.0.2.1:53", "t.example.com", mode)
    }

    #[tokio::test]
    async fn test_preflight_timeout_aborts_without_running_tester() {
        let resolver = ScriptedResolver::new(vec![Err(QueryError::Timeout)]);

        let result = execute(&resolver, &task(ProtocolKind::Dnstt)).await;

        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("192.0.2.1:53 timeout"));
        assert!(result.score.is_none());
        // Only the pre-flight query was issued.
        assert_eq!(resolver.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_preflight_negative_answer_counts_as_reachable() {
        let mut outcomes = vec![Err(QueryError::NxDomain)];
        outcomes.extend(vec![Ok(1); 4]);
        let resolver = ScriptedResolver::new(outcomes);

        let result = execute(&resolver, &task(ProtocolKind::Dnstt)).await;

        assert!(result.success);
        assert!(result.is_compatible());
        // Pre-flight plus the four sub-probes.
        assert_eq!(resolver.lookup_count(), 5);
    }

    #[tokio::test]
    async fn test_preflight_unexpected_error_is_lenient() {
        let mut outcomes = vec![Err(QueryError::Other("socket error".to_string()))];
        outcomes.extend(vec![Ok(1); 4]);
        let resolver = ScriptedResolver::new(outcomes);

        let result = execute(&resolver, &task(ProtocolKind::Dnstt)).await;

        // Anything but a timeout is treated as reachable.
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_incompatible_server_still_reports_success() {
        // Reachable, but every tester query times out.
        let mut outcomes = vec![Ok(1)];
        outcomes.extend(vec![Err(QueryError::Timeout); 4]);
        let resolver = ScriptedResolver::new(outcomes);

        let result = execute(&resolver, &task(ProtocolKind::Dnstt)).await;

        assert!(result.success);
        assert!(!result.is_compatible());
    }

    #[test]
    fn test_task_deadline_conversion() {
        let task = ProbeTask::new("192.0.2.1", "t.example.com", ProtocolKind::Dnstt)
            .with_timeout(2);
        assert_eq!(task.deadline(), Duration::from_millis(2000));
    }

    #[test]
    fn test_default_timeout() {
        let task = ProbeTask::new("192.0.2.1", "t.example.com", ProtocolKind::Other);
        assert_eq!(task.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
    }

    #[test]
    fn test_ranking_metric_prefers_measured_latency() {
        let with_stats = ProbeResult {
            server: "192.0.2.1:53".to_string(),
            success: true,
            elapsed_ms: 9000,
            score: Some(ScoreResult::StreamGate(StreamGateScore {
                score: 3,
                max_score: 3,
                is_compatible: true,
                details: "15/15 queries answered".to_string(),
                stats: Some(LatencyStats {
                    avg_ms: 120.0,
                    max_ms: 300.0,
                    std_dev_ms: 40.0,
                }),
            })),
            message: None,
        };
        assert_eq!(with_stats.ranking_metric(), 120.0);

        let without_stats = ProbeResult::failed("192.0.2.2:53", 450, "192.0.2.2:53 timeout");
        assert_eq!(without_stats.ranking_metric(), 450.0);
    }
}
