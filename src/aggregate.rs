//! Scan result aggregation and ranking
//!
//! Collects streamed [`ScanEvent`]s for one scan session, tracks each
//! server's lifecycle stage, and ranks the finished results: compatible
//! servers first, fastest first within each group. Arrival order across
//! servers is unspecified and never assumed.

use crate::probe::ProbeResult;
use crate::scanner::ScanEvent;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Lifecycle stage of one server within a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStage {
    Queued,
    Checking,
    Done,
    Failed,
}

/// Scan-scoped aggregation of probe results
///
/// Holds state for a single scan session only; nothing persists beyond
/// it. Rankings may be read at any intermediate point for progressive
/// display.
#[derive(Debug, Default)]
pub struct ScanBoard {
    stages: HashMap<String, ServerStage>,
    results: Vec<ProbeResult>,
}

impl ScanBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server before its task is dispatched
    pub fn enqueue(&mut self, server: impl Into<String>) {
        self.stages.insert(server.into(), ServerStage::Queued);
    }

    /// Fold one scan event into the board
    pub fn apply(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Checking(server) => {
                self.stages.insert(server, ServerStage::Checking);
            }
            ScanEvent::Finished(result) => self.record(result),
        }
    }

    /// Record a finished result directly
    pub fn record(&mut self, result: ProbeResult) {
        let stage = if result.success {
            ServerStage::Done
        } else {
            ServerStage::Failed
        };
        self.stages.insert(result.server.clone(), stage);
        self.results.push(result);
    }

    pub fn stage(&self, server: &str) -> Option<ServerStage> {
        self.stages.get(server).copied()
    }

    /// True once every enqueued server has a terminal stage
    pub fn is_complete(&self) -> bool {
        self.stages
            .values()
            .all(|stage| matches!(stage, ServerStage::Done | ServerStage::Failed))
    }

    pub fn results(&self) -> &[ProbeResult] {
        &self.results
    }

    /// Results ranked for display: compatible servers first, then
    /// ascending timing metric within each group
    pub fn ranked(&self) -> Vec<&ProbeResult> {
        let mut ranked: Vec<&ProbeResult> = self.results.iter().collect();
        ranked.sort_by(|a, b| {
            b.is_compatible()
                .cmp(&a.is_compatible())
                .then_with(|| {
                    a.ranking_metric()
                        .partial_cmp(&b.ranking_metric())
                        .unwrap_or(Ordering::Equal)
                })
        });
        ranked
    }
}
