//! Timed DNS resolution against a single upstream server
//!
//! Every probe query goes through two pieces defined here:
//!
//! - [`UpstreamResolver`]: a resolver bound to exactly one upstream server,
//!   constructed fresh for each probe task. No global resolver state is
//!   read or mutated; concurrent tasks cannot interfere with each other.
//! - [`resolve_with_deadline`]: races a lookup against a scoped deadline.
//!
//! All resolver error codes are mapped to the closed [`QueryError`]
//! enumeration in one place, so the protocol testers classify outcomes
//! without ever touching resolver-library internals.

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;

/// Outcome kinds for a single DNS query attempt
///
/// `Timeout` is a distinct kind from every protocol-level error: the
/// testers treat authoritative negatives as proof the query was forwarded,
/// while a timeout proves nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The query did not settle before its deadline
    #[error("query deadline exceeded")]
    Timeout,

    /// Authoritative NXDOMAIN: the name does not exist
    #[error("name does not exist")]
    NxDomain,

    /// Authoritative no-data: the name exists but has no records of the
    /// requested type
    #[error("no records for name")]
    NoRecords,

    /// The server refused to answer the query
    #[error("query refused")]
    Refused,

    /// Any other resolver failure (I/O, malformed response, SERVFAIL, ...)
    #[error("resolver failure: {0}")]
    Other(String),
}

impl QueryError {
    /// Negative answers that still prove the query reached a responsive
    /// server
    pub fn is_authoritative_negative(&self) -> bool {
        matches!(
            self,
            QueryError::NxDomain | QueryError::NoRecords | QueryError::Refused
        )
    }

    /// Short tag used in score details and log lines
    pub fn label(&self) -> &'static str {
        match self {
            QueryError::Timeout => "timeout",
            QueryError::NxDomain => "nxdomain",
            QueryError::NoRecords => "nodata",
            QueryError::Refused => "refused",
            QueryError::Other(_) => "error",
        }
    }
}

impl From<ResolveError> for QueryError {
    fn from(err: ResolveError) -> Self {
        match err.kind() {
            ResolveErrorKind::NoRecordsFound { response_code, .. } => match *response_code {
                ResponseCode::NXDomain => QueryError::NxDomain,
                ResponseCode::Refused => QueryError::Refused,
                // NOERROR with an empty answer section
                ResponseCode::NoError => QueryError::NoRecords,
                other => QueryError::Other(format!("response code {}", other)),
            },
            ResolveErrorKind::Timeout => QueryError::Timeout,
            _ => QueryError::Other(err.to_string()),
        }
    }
}

/// Seam between the protocol testers and the network
///
/// Production code uses [`UpstreamResolver`]; deterministic tests inject
/// scripted implementations with fixed outcomes and timings.
#[async_trait]
pub trait ProbeResolver: Send + Sync {
    /// Resolve `name` for `record_type`, returning the record count
    async fn lookup(&self, name: &str, record_type: RecordType) -> Result<usize, QueryError>;
}

/// Resolver bound to a single upstream DNS server over UDP
///
/// Each probe task constructs and owns one of these for its own lifetime.
/// Caching is disabled so repeated queries within one probe always hit the
/// wire, and a single attempt is made per query: retry policy belongs to
/// the caller, not the resolver.
pub struct UpstreamResolver {
    inner: TokioAsyncResolver,
}

impl UpstreamResolver {
    /// Build a resolver that queries only `server`
    pub fn new(server: SocketAddr, query_timeout: Duration) -> Self {
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig::new(server, Protocol::Udp));

        let mut opts = ResolverOpts::default();
        opts.timeout = query_timeout;
        opts.attempts = 1;
        opts.cache_size = 0;
        opts.use_hosts_file = false;

        Self {
            inner: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl ProbeResolver for UpstreamResolver {
    async fn lookup(&self, name: &str, record_type: RecordType) -> Result<usize, QueryError> {
        let lookup = self.inner.lookup(name, record_type).await?;
        Ok(lookup.records().len())
    }
}

/// Race a lookup against a hard deadline
///
/// Whichever settles first wins; the deadline timer is scoped to this call
/// and dropped on every exit path. An elapsed deadline maps to
/// [`QueryError::Timeout`].
pub async fn resolve_with_deadline<R>(
    resolver: &R,
    name: &str,
    record_type: RecordType,
    deadline: Duration,
) -> Result<usize, QueryError>
where
    R: ProbeResolver + ?Sized,
{
    match timeout(deadline, resolver.lookup(name, record_type)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(QueryError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Resolver that answers after a fixed delay
    struct SlowResolver {
        delay: Duration,
    }

    #[async_trait]
    impl ProbeResolver for SlowResolver {
        async fn lookup(&self, _name: &str, _record_type: RecordType) -> Result<usize, QueryError> {
            tokio::time::sleep(self.delay).await;
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_deadline_wins_the_race() {
        let resolver = SlowResolver {
            delay: Duration::from_millis(200),
        };

        let outcome = resolve_with_deadline(
            &resolver,
            "probe.example.com",
            RecordType::A,
            Duration::from_millis(10),
        )
        .await;

        assert_eq!(outcome, Err(QueryError::Timeout));
    }

    #[tokio::test]
    async fn test_fast_answer_wins_the_race() {
        let resolver = SlowResolver {
            delay: Duration::from_millis(1),
        };

        let outcome = resolve_with_deadline(
            &resolver,
            "probe.example.com",
            RecordType::A,
            Duration::from_millis(500),
        )
        .await;

        assert_eq!(outcome, Ok(1));
    }

    #[test]
    fn test_authoritative_negative_classification() {
        assert!(QueryError::NxDomain.is_authoritative_negative());
        assert!(QueryError::NoRecords.is_authoritative_negative());
        assert!(QueryError::Refused.is_authoritative_negative());
        assert!(!QueryError::Timeout.is_authoritative_negative());
        assert!(!QueryError::Other("oops".to_string()).is_authoritative_negative());
    }

    #[test]
    fn test_error_labels() {
        assert_eq!(QueryError::Timeout.label(), "timeout");
        assert_eq!(QueryError::NxDomain.label(), "nxdomain");
        assert_eq!(QueryError::NoRecords.label(), "nodata");
        assert_eq!(QueryError::Refused.label(), "refused");
        assert_eq!(QueryError::Other("x".to_string()).label(), "error");
    }

    #[test]
    fn test_upstream_resolver_construction() {
        // Construction must not touch global DNS configuration or panic.
        let _resolver = UpstreamResolver::new(
            "8.8.8.8:53".parse().unwrap(),
            Duration::from_secs(3),
        );
    }
}
