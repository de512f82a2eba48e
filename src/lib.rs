//! Rahyab: DNS Tunnel Compatibility Scanner
//!
//! Rahyab probes candidate DNS resolvers and predicts whether each one can
//! carry a covert DNS-tunneled VPN transport, producing a ranked
//! compatibility table with latency statistics.
//!
//! ## Features
//!
//! - **Two tunnel families**: dnstt-style (NS/TXT + nested random
//!   subdomains) and the Stream-Gate wire format (base32-chunked TXT
//!   payloads with a statistical admission gate)
//! - **Negative answers read correctly**: NXDOMAIN, no-data, and REFUSED
//!   are reachability proof, not failures
//! - **Isolated concurrent probes**: every task owns a private resolver
//!   bound to one upstream; no global DNS state
//! - **Deadline-raced queries**: every query runs under a scoped timeout
//!   with guaranteed timer cleanup
//! - **Progressive ranking**: results stream in; the board can be ranked
//!   at any point for live display
//!
//! ## Quick Start
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use rahyab::{ProbeTask, ProtocolKind, ScanBoard, Scanner};
//!
//! #[tokio::main]
//! async fn main() {
//!     let scanner = Scanner::new(8);
//!     let tasks = vec![
//!         ProbeTask::new("8.8.8.8", "t.example.com", ProtocolKind::Dnstt),
//!         ProbeTask::new("1.1.1.1", "t.example.com", ProtocolKind::Dnstt),
//!     ];
//!
//!     let mut board = ScanBoard::new();
//!     for task in &tasks {
//!         board.enqueue(task.server.clone());
//!     }
//!
//!     let mut events = scanner.scan(tasks);
//!     while let Some(event) = events.recv().await {
//!         board.apply(event);
//!     }
//!
//!     for result in board.ranked() {
//!         println!("{} compatible={}", result.server, result.is_compatible());
//!     }
//! }
//! ```
//!
//! ### As a Command-Line Tool
//!
//! ```bash
//! # Scan the default candidate servers for dnstt compatibility
//! rahyab scan --domain t.example.com
//!
//! # Scan specific servers for Stream-Gate compatibility, JSON output
//! rahyab scan --domain t.example.com --mode other -s 8.8.8.8 -s 1.1.1.1 --json
//!
//! # Check a single server
//! rahyab check 9.9.9.9 --domain t.example.com
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  tasks   ┌─────────────┐  queries  ┌──────────────┐
//! │ Dispatcher │─────────▶│ Worker Pool │──────────▶│ DNS Resolver │
//! └────────────┘          │ (private    │           │  (upstream)  │
//!                         │  resolvers) │           └──────────────┘
//!                         └──────┬──────┘
//!                                │ results
//!                                ▼
//!                         ┌─────────────┐
//!                         │  ScanBoard  │──▶ ranked table
//!                         └─────────────┘
//! ```

pub mod aggregate;
pub mod config;
pub mod labels;
pub mod probe;
pub mod resolve;
pub mod scanner;

// Re-export core types
pub use aggregate::{ScanBoard, ServerStage};
pub use config::ScanConfig;
pub use labels::{chunked_payload, random_label};
pub use probe::{
    DnsttScore, LatencyStats, ProbeResult, ProbeTask, ProtocolKind, ScoreResult, StreamGateScore,
    DEFAULT_TIMEOUT_SECONDS,
};
pub use resolve::{resolve_with_deadline, ProbeResolver, QueryError, UpstreamResolver};
pub use scanner::{
    parse_server, ResolverFactory, ScanError, ScanEvent, Scanner, UpstreamFactory,
    DEFAULT_WORKERS, DNS_PORT,
};
