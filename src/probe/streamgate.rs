//! Stream-Gate compatibility tester
//!
//! Fifteen TXT queries carrying base32-chunked payloads of escalating size
//! (20 to 90 bytes pre-encoding), timed individually. Admission is a
//! statistical gate over the collected timings: marginal variance under
//! load predicts an unusable tunnel rather than a degraded one, so the
//! score is binary.

use crate::labels::chunked_payload;
use crate::resolve::{resolve_with_deadline, ProbeResolver, QueryError};
use hickory_resolver::proto::rr::RecordType;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Queries issued per test
pub const QUERY_COUNT: usize = 15;

/// Minimum answered queries for admission (13/15, >=87%)
pub const MIN_ANSWERED: usize = 13;

/// Points awarded on admission
pub const MAX_SCORE: u8 = 3;

/// Payload size of the first query, bytes before encoding
const BASE_PAYLOAD_BYTES: usize = 20;

/// Payload growth per query, bytes before encoding
const PAYLOAD_STEP_BYTES: usize = 5;

/// Admission ceilings over the timing samples
const MAX_AVG_MS: f64 = 1000.0;
const MAX_MAX_MS: f64 = 3000.0;
const MAX_STD_DEV_MS: f64 = 500.0;

/// Latency statistics over the measured queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub max_ms: f64,
    /// Sample standard deviation (Bessel's correction, denominator n-1)
    pub std_dev_ms: f64,
}

/// Result of the Stream-Gate tester
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamGateScore {
    /// 3 on admission, 0 otherwise
    pub score: u8,
    pub max_score: u8,
    pub is_compatible: bool,
    pub details: String,
    /// Absent only when no query produced a measured time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<LatencyStats>,
}

/// A query is answered when the server produced any definitive response:
/// records, NXDOMAIN, no-data, or an outright refusal. All of these prove
/// the server is reachable and processing the payload-shaped name.
/// Timeouts and unclassified errors are the only failures.
fn query_answered(outcome: &Result<usize, QueryError>) -> bool {
    match outcome {
        Ok(_) => true,
        Err(err) => err.is_authoritative_negative(),
    }
}

/// Compute mean, max, and sample standard deviation over timing samples
pub fn latency_stats(samples_ms: &[f64]) -> LatencyStats {
    let n = samples_ms.len();
    let avg_ms = samples_ms.iter().sum::<f64>() / n as f64;
    let max_ms = samples_ms.iter().copied().fold(0.0_f64, f64::max);

    let std_dev_ms = if n > 1 {
        let variance = samples_ms
            .iter()
            .map(|sample| (sample - avg_ms).powi(2))
            .sum::<f64>()
            / (n - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    LatencyStats {
        avg_ms,
        max_ms,
        std_dev_ms,
    }
}

/// The statistical admission gate: all four thresholds must hold
fn admitted(answered: usize, stats: &LatencyStats) -> bool {
    answered >= MIN_ANSWERED
        && stats.avg_ms < MAX_AVG_MS
        && stats.max_ms < MAX_MAX_MS
        && stats.std_dev_ms < MAX_STD_DEV_MS
}

/// Run the fifteen payload queries sequentially and apply the admission
/// gate
///
/// Always performs exactly [`QUERY_COUNT`] attempts; timeouts are absorbed
/// rather than surfaced. A timing sample is recorded for every attempt
/// that produced a measured response, answered or not; a timed-out
/// attempt measures nothing.
pub async fn run<R>(resolver: &R, domain: &str, deadline: Duration) -> StreamGateScore
where
    R: ProbeResolver + ?Sized,
{
    let mut samples_ms: Vec<f64> = Vec::with_capacity(QUERY_COUNT);
    let mut answered = 0usize;

    for i in 0..QUERY_COUNT {
        let payload_bytes = BASE_PAYLOAD_BYTES + PAYLOAD_STEP_BYTES * i;
        let name = format!("{}.{}", chunked_payload(payload_bytes), domain);

        let started = Instant::now();
        let outcome = resolve_with_deadline(resolver, &name, RecordType::TXT, deadline).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !matches!(outcome, Err(QueryError::Timeout)) {
            samples_ms.push(elapsed_ms);
        }
        if query_answered(&outcome) {
            answered += 1;
        }

        debug!(
            "stream-gate query {}/{} ({} bytes) -> {:?} in {:.1} ms",
            i + 1,
            QUERY_COUNT,
            payload_bytes,
            outcome,
            elapsed_ms
        );
    }

    if samples_ms.is_empty() {
        return StreamGateScore {
            score: 0,
            max_score: MAX_SCORE,
            is_compatible: false,
            details: "FAIL".to_string(),
            stats: None,
        };
    }

    let stats = latency_stats(&samples_ms);
    let compatible = admitted(answered, &stats);

    StreamGateScore {
        score: if compatible { MAX_SCORE } else { 0 },
        max_score: MAX_SCORE,
        is_compatible: compatible,
        details: format!("{}/{} queries answered", answered, QUERY_COUNT),
        stats: Some(stats),
    }
}
