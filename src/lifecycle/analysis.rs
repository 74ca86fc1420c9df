//! Performance analyzer.
//!
//! Aggregates per-account and global metrics over the registry, flags
//! threshold breaches, and turns them into operator recommendations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::event::LifecycleEvent;
use super::record::{ConnectionRecord, ConnectionStatus};
use super::state::Shared;
use crate::config::LifecycleConfig;

/// Global error rate above which an issue is raised.
pub const ERROR_RATE_THRESHOLD: f64 = 0.10;

/// Global average latency (ms) above which an issue is raised.
pub const LATENCY_THRESHOLD_MS: f64 = 3000.0;

/// Fraction of `max_connection_age` the average age may reach.
pub const AGING_FACTOR: f64 = 0.8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub active: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub error: usize,
    pub destroyed: usize,
}

impl StatusCounts {
    fn record(&mut self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Active => self.active += 1,
            ConnectionStatus::Healthy => self.healthy += 1,
            ConnectionStatus::Unhealthy => self.unhealthy += 1,
            ConnectionStatus::Error => self.error += 1,
            ConnectionStatus::Destroyed => self.destroyed += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountMetrics {
    pub count: usize,
    pub average_age_ms: f64,
    /// Mean over connections that have a latency sample.
    pub average_latency_ms: f64,
    pub total_usage: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    #[serde(skip)]
    latency_samples: usize,
}

impl AccountMetrics {
    fn add(&mut self, record: &ConnectionRecord, age_ms: f64) {
        self.count += 1;
        self.average_age_ms += (age_ms - self.average_age_ms) / self.count as f64;
        if let Some(latency) = record.average_latency {
            self.latency_samples += 1;
            self.average_latency_ms +=
                (latency - self.average_latency_ms) / self.latency_samples as f64;
        }
        self.total_usage += record.usage_count;
        self.total_errors += record.error_count;
        self.error_rate = ratio(self.total_errors, self.total_usage);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GlobalMetrics {
    pub total_connections: usize,
    pub average_age_ms: f64,
    pub average_latency_ms: f64,
    pub total_usage: u64,
    pub total_errors: u64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    HighErrorRate,
    HighLatency,
    ConnectionAging,
}

impl IssueKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HighErrorRate => "high_error_rate",
            Self::HighLatency => "high_latency",
            Self::ConnectionAging => "connection_aging",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub timestamp: DateTime<Utc>,
    pub status_counts: StatusCounts,
    pub accounts: BTreeMap<String, AccountMetrics>,
    pub global: GlobalMetrics,
    pub issues: Vec<PerformanceIssue>,
    pub recommendations: Vec<String>,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

fn mean(sum: f64, n: usize) -> f64 {
    if n > 0 {
        sum / n as f64
    } else {
        0.0
    }
}

/// Build a report from the given records without emitting anything.
pub(crate) fn analyze<'a>(
    records: impl IntoIterator<Item = &'a ConnectionRecord>,
    config: &LifecycleConfig,
    now: Instant,
) -> PerformanceReport {
    let timestamp = Utc::now();
    let mut status_counts = StatusCounts::default();
    let mut accounts: BTreeMap<String, AccountMetrics> = BTreeMap::new();

    let mut total_connections = 0;
    let mut age_sum = 0.0;
    let mut latency_sum = 0.0;
    let mut latency_samples = 0;
    let mut total_usage = 0;
    let mut total_errors = 0;

    for record in records {
        let age_ms = record.age(now).as_secs_f64() * 1000.0;
        status_counts.record(record.status);
        accounts
            .entry(record.account_id.clone())
            .or_default()
            .add(record, age_ms);

        total_connections += 1;
        age_sum += age_ms;
        if let Some(latency) = record.average_latency {
            latency_sum += latency;
            latency_samples += 1;
        }
        total_usage += record.usage_count;
        total_errors += record.error_count;
    }

    let global = GlobalMetrics {
        total_connections,
        average_age_ms: mean(age_sum, total_connections),
        average_latency_ms: mean(latency_sum, latency_samples),
        total_usage,
        total_errors,
        error_rate: ratio(total_errors, total_usage),
    };

    let issues = detect_issues(&global, config, timestamp);
    let recommendations = recommend(&issues, &status_counts);

    PerformanceReport {
        timestamp,
        status_counts,
        accounts,
        global,
        issues,
        recommendations,
    }
}

/// Evaluate the independent global thresholds. Several may fire at once.
fn detect_issues(
    global: &GlobalMetrics,
    config: &LifecycleConfig,
    timestamp: DateTime<Utc>,
) -> Vec<PerformanceIssue> {
    let aging_threshold = config.max_connection_age_ms as f64 * AGING_FACTOR;
    [
        (
            IssueKind::HighErrorRate,
            global.error_rate,
            ERROR_RATE_THRESHOLD,
        ),
        (
            IssueKind::HighLatency,
            global.average_latency_ms,
            LATENCY_THRESHOLD_MS,
        ),
        (
            IssueKind::ConnectionAging,
            global.average_age_ms,
            aging_threshold,
        ),
    ]
    .into_iter()
    .filter(|(_, value, threshold)| value > threshold)
    .map(|(kind, value, threshold)| PerformanceIssue {
        kind,
        value,
        threshold,
        timestamp,
    })
    .collect()
}

fn recommend(issues: &[PerformanceIssue], counts: &StatusCounts) -> Vec<String> {
    let mut recommendations: Vec<String> = issues
        .iter()
        .map(|issue| match issue.kind {
            IssueKind::HighErrorRate => format!(
                "Error rate is {:.1}%: check upstream proxies and account credentials",
                issue.value * 100.0
            ),
            IssueKind::HighLatency => format!(
                "Average latency is {:.0}ms: consider moving accounts to faster proxies",
                issue.value
            ),
            IssueKind::ConnectionAging => format!(
                "Connections average {:.0} minutes old: lower max_connection_age_ms or rotate more often",
                issue.value / 60_000.0
            ),
        })
        .collect();

    let failing = counts.unhealthy + counts.error;
    if failing > 0 {
        recommendations.push(format!(
            "{failing} connection(s) are unhealthy or errored and awaiting recreation"
        ));
    }
    recommendations
}

/// Analyze the registry, then emit the report and one event per issue.
pub(crate) fn run_performance_analysis(shared: &Shared) -> PerformanceReport {
    let report = {
        let registry = shared.registry.lock();
        analyze(registry.records(), &shared.config, Instant::now())
    };

    debug!(
        connections = report.global.total_connections,
        accounts = report.accounts.len(),
        error_rate = report.global.error_rate,
        average_latency_ms = report.global.average_latency_ms,
        "Performance analysis completed"
    );
    shared
        .events
        .emit(LifecycleEvent::PerformanceAnalysis(Box::new(report.clone())));

    for issue in &report.issues {
        warn!(
            issue = issue.kind.as_str(),
            value = issue.value,
            threshold = issue.threshold,
            "Performance issue detected"
        );
        shared
            .events
            .emit(LifecycleEvent::PerformanceIssue(issue.clone()));
    }
    report
}
