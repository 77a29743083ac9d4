use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Health classification of one subsystem. Variants are ordered from best
/// to worst so the aggregate can take a maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthStatus {
    Operational,
    Degraded,
    Critical,
    Failed,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Operational)
    }
}

/// How much a subsystem's health weighs in the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthPriority {
    Critical,
    High,
    Medium,
}

/// Per-subsystem health record, mutated only by the supervisor's
/// health-check cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub status: HealthStatus,
    pub priority: HealthPriority,
    pub last_check: u64,
    pub error_count: u32,
}

/// Tunables for the health cycle and emergency escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub check_interval: Duration,
    /// Critical-error count above which emergency mode is entered.
    pub emergency_threshold: u32,
    /// Critical-error count at which graceful shutdown begins.
    pub shutdown_threshold: u32,
    /// Warning period granted to sessions before shutdown proceeds.
    pub shutdown_grace: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            emergency_threshold: 5,
            shutdown_threshold: 10,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Registry of subsystem health records with the aggregation rule.
#[derive(Debug, Default)]
pub struct HealthMonitor {
    records: BTreeMap<String, HealthRecord>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, priority: HealthPriority) {
        self.records.insert(
            name.into(),
            HealthRecord {
                status: HealthStatus::Operational,
                priority,
                last_check: 0,
                error_count: 0,
            },
        );
    }

    /// Record a probe result for a subsystem. Critical or failed statuses
    /// bump the subsystem's error count.
    pub fn report(&mut self, name: &str, status: HealthStatus, now: u64) {
        if let Some(record) = self.records.get_mut(name) {
            record.status = status;
            record.last_check = now;
            if status >= HealthStatus::Critical {
                record.error_count += 1;
            }
        }
    }

    pub fn record(&self, name: &str) -> Option<&HealthRecord> {
        self.records.get(name)
    }

    pub fn records(&self) -> &BTreeMap<String, HealthRecord> {
        &self.records
    }

    /// Subsystems with critical priority currently reporting critical or
    /// failed status.
    pub fn critical_failures(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|(_, r)| {
                r.priority == HealthPriority::Critical && r.status >= HealthStatus::Critical
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Aggregate status: critical whenever any critical-priority subsystem
    /// is critical or failed, degraded when any subsystem at all is
    /// unhealthy, operational otherwise.
    pub fn overall(&self) -> HealthStatus {
        let worst_critical = self
            .records
            .values()
            .filter(|r| r.priority == HealthPriority::Critical)
            .map(|r| r.status)
            .max()
            .unwrap_or(HealthStatus::Operational);
        if worst_critical >= HealthStatus::Critical {
            return HealthStatus::Critical;
        }
        let any_unhealthy = self.records.values().any(|r| !r.status.is_healthy());
        if worst_critical == HealthStatus::Degraded || any_unhealthy {
            HealthStatus::Degraded
        } else {
            HealthStatus::Operational
        }
    }
}
