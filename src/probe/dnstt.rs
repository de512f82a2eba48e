//! dnstt-style compatibility tester
//!
//! Four sub-probes, each a boolean, covering the query shapes a
//! dnstt-style tunnel cannot live without: NS and TXT records, and A
//! queries on deeply nested random subdomains. All four must pass; the
//! tunnel breaks if any single shape is filtered, so there is no partial
//! credit.

use crate::labels::random_label;
use crate::resolve::{resolve_with_deadline, ProbeResolver, QueryError};
use hickory_resolver::proto::rr::RecordType;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Points available from the four sub-probes
pub const MAX_SCORE: u8 = 4;

/// Result of the dnstt-style tester
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsttScore {
    /// Count of passed sub-probes, 0..=4
    pub score: u8,
    pub max_score: u8,
    /// Strict maximum required: `score == 4`
    pub is_compatible: bool,
    /// Per-sub-probe outcome tags
    pub details: String,
}

impl DnsttScore {
    fn from_passed(passed: u8, details: String) -> Self {
        Self {
            score: passed,
            max_score: MAX_SCORE,
            is_compatible: passed == MAX_SCORE,
            details,
        }
    }
}

/// A sub-probe passes when the query returned records or came back
/// authoritative-NXDOMAIN: a negative answer from the authority proves the
/// resolver forwarded the query shape correctly. Timeouts, no-data,
/// refusals, and everything else fail the sub-probe.
fn sub_probe_passes(outcome: &Result<usize, QueryError>) -> bool {
    matches!(outcome, Ok(_) | Err(QueryError::NxDomain))
}

/// Run the four sub-probes sequentially and score them
///
/// Sequential on purpose: racing the sub-probes against each other would
/// contend for the upstream socket and muddy per-query timing.
pub async fn run<R>(resolver: &R, domain: &str, deadline: Duration) -> DnsttScore
where
    R: ProbeResolver + ?Sized,
{
    let sub_probes = [
        ("NS", format!("{}.{}", random_label(), domain), RecordType::NS),
        ("TXT", format!("{}.{}", random_label(), domain), RecordType::TXT),
        (
            "RND1",
            format!("{}.{}.{}", random_label(), random_label(), domain),
            RecordType::A,
        ),
        (
            "RND2",
            format!("{}.{}.{}", random_label(), random_label(), domain),
            RecordType::A,
        ),
    ];

    let mut passed = 0u8;
    let mut details = Vec::with_capacity(sub_probes.len());

    for (tag, name, record_type) in sub_probes {
        let outcome = resolve_with_deadline(resolver, &name, record_type, deadline).await;
        debug!("dnstt sub-probe {} {} -> {:?}", tag, name, outcome);

        if sub_probe_passes(&outcome) {
            passed += 1;
            details.push(format!("{}:ok", tag));
        } else if let Err(err) = &outcome {
            details.push(format!("{}:{}", tag, err.label()));
        }
    }

    DnsttScore::from_passed(passed, details.join(" "))
}

#[cfg(test)]
mod tests {
    use super::super::testing::ScriptedResolver;
    use super::*;

    const DEADLINE: Duration = Duration::from_secs(3);

    #[tokio::test]
    async fn test_all_answers_score_four() {
        let resolver = ScriptedResolver::repeating(Ok(1), 4);

        let score = run(&resolver, "t.example.com", DEADLINE).await;

        assert_eq!(score.score, 4);
        assert_eq!(score.max_score, MAX_SCORE);
        assert!(score.is_compatible);
        assert_eq!(score.details, "NS:ok TXT:ok RND1:ok RND2:ok");
        assert_eq!(resolver.lookup_count(), 4);
    }

    #[tokio::test]
    async fn test_nxdomain_counts_as_pass() {
        // A tunnel-less domain answers every probe NXDOMAIN; that still
        // proves all four query shapes travel the full path.
        let resolver = ScriptedResolver::repeating(Err(QueryError::NxDomain), 4);

        let score = run(&resolver, "t.example.com", DEADLINE).await;

        assert_eq!(score.score, 4);
        assert!(score.is_compatible);
    }

    #[tokio::test]
    async fn test_single_failure_blocks_compatibility() {
        let resolver = ScriptedResolver::new(vec![
            Ok(1),
            Ok(2),
            Err(QueryError::NxDomain),
            Err(QueryError::Other("connection reset".to_string())),
        ]);

        let score = run(&resolver, "t.example.com", DEADLINE).await;

        assert_eq!(score.score, 3);
        assert!(!score.is_compatible);
        assert_eq!(score.details, "NS:ok TXT:ok RND1:ok RND2:error");
        assert_eq!(resolver.lookup_count(), 4);
    }

    #[tokio::test]
    async fn test_no_data_fails_a_sub_probe() {
        // Unlike NXDOMAIN, a NOERROR/no-data answer does not prove the
        // record type survived the path.
        let resolver = ScriptedResolver::new(vec![
            Err(QueryError::NoRecords),
            Ok(1),
            Ok(1),
            Ok(1),
        ]);

        let score = run(&resolver, "t.example.com", DEADLINE).await;

        assert_eq!(score.score, 3);
        assert!(!score.is_compatible);
        assert!(score.details.starts_with("NS:nodata"));
    }

    #[tokio::test]
    async fn test_all_timeouts_score_zero() {
        let resolver = ScriptedResolver::repeating(Err(QueryError::Timeout), 4);

        let score = run(&resolver, "t.example.com", DEADLINE).await;

        assert_eq!(score.score, 0);
        assert!(!score.is_compatible);
        assert_eq!(score.details, "NS:timeout TXT:timeout RND1:timeout RND2:timeout");
        // Timeouts inside the tester never abort it.
        assert_eq!(resolver.lookup_count(), 4);
    }
}
