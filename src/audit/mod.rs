//! Append-only audit trail. Every event is written to a bounded in-memory
//! ring buffer for queries and to a date-partitioned JSONL file for the
//! forensic record, mirrored through `tracing` so an operator tailing
//! stderr sees the same facts without reading the file.

mod ring;
mod sink;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

pub use ring::RingBuffer;
pub use sink::JsonlSink;

use crate::language::Language;

/// Severity inferred from [`EventType`] when not given explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ExecuteStart,
    ExecuteEnd,
    ExecuteBlocked,
    ExecuteError,
    ExecuteTimeout,
    Install,
    InstallBlocked,
    SecurityViolation,
    SessionCreated,
    SessionDestroyed,
    PoolAcquire,
    PoolRelease,
    CacheHit,
    CacheMiss,
}

impl EventType {
    fn default_severity(self) -> Severity {
        match self {
            EventType::SecurityViolation => Severity::Critical,
            EventType::ExecuteBlocked | EventType::InstallBlocked => Severity::Warn,
            EventType::ExecuteError | EventType::ExecuteTimeout => Severity::Error,
            _ => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub severity: Severity,
    pub language: Option<Language>,
    pub session_id: Option<String>,
    pub container_id: Option<String>,
    pub duration_ms: Option<u64>,
    pub success: bool,
    pub message: String,
    pub details: HashMap<String, serde_json::Value>,
}

impl AuditEvent {
    pub fn new(event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            severity: event_type.default_severity(),
            language: None,
            session_id: None,
            container_id: None,
            duration_ms: None,
            success: true,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_container(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditStats {
    pub total: usize,
    pub by_severity: std::collections::HashMap<String, usize>,
    pub violations: usize,
    pub blocked: usize,
    pub avg_execute_duration_ms: f64,
    pub events_last_hour: usize,
}

/// Optional filter applied when querying recent events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub severity: Option<Severity>,
    pub language: Option<Language>,
}

impl EventFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        self.event_type.map_or(true, |t| t == event.event_type)
            && self.severity.map_or(true, |s| s == event.severity)
            && self.language.map_or(true, |l| Some(l) == event.language)
    }
}

/// The audit log: one ring buffer for queries, one JSONL sink for the
/// durable trail. `record` never blocks on the sink; a write failure is
/// logged through `tracing` and otherwise swallowed, since losing one
/// forensic line must not fail the operation it describes.
pub struct AuditLog {
    ring: RingBuffer,
    sink: JsonlSink,
}

impl AuditLog {
    pub fn new(capacity: usize, directory: impl Into<std::path::PathBuf>) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
            sink: JsonlSink::new(directory.into()),
        }
    }

    pub fn record(&self, event: AuditEvent) {
        match event.severity {
            Severity::Critical => error!(?event.event_type, %event.message, "audit: security violation"),
            Severity::Error => error!(?event.event_type, %event.message, "audit: error"),
            Severity::Warn => warn!(?event.event_type, %event.message, "audit: blocked"),
            Severity::Info => info!(?event.event_type, %event.message, "audit"),
        }

        if let Err(e) = self.sink.append(&event) {
            error!(error = %e, "failed to append audit event to jsonl sink");
        }

        self.ring.push(event);
    }

    pub fn recent(&self, n: usize, filter: &EventFilter) -> Vec<AuditEvent> {
        self.ring
            .iter_recent_first()
            .filter(|e| filter.matches(e))
            .take(n)
            .collect()
    }

    pub fn security_events(&self, n: usize) -> Vec<AuditEvent> {
        let filter = EventFilter {
            event_type: Some(EventType::SecurityViolation),
            ..Default::default()
        };
        self.recent(n, &filter)
    }

    pub fn stats(&self) -> AuditStats {
        let events = self.ring.snapshot();
        let total = events.len();
        let mut by_severity = std::collections::HashMap::new();
        let mut violations = 0;
        let mut blocked = 0;
        let mut execute_durations = Vec::new();
        let one_hour_ago = Utc::now() - chrono::Duration::hours(1);
        let mut events_last_hour = 0;

        for event in &events {
            *by_severity.entry(format!("{:?}", event.severity)).or_insert(0) += 1;
            if event.event_type == EventType::SecurityViolation {
                violations += 1;
            }
            if matches!(event.event_type, EventType::ExecuteBlocked | EventType::InstallBlocked) {
                blocked += 1;
            }
            if event.event_type == EventType::ExecuteEnd {
                if let Some(duration) = event.duration_ms {
                    execute_durations.push(duration);
                }
            }
            if event.timestamp >= one_hour_ago {
                events_last_hour += 1;
            }
        }

        let avg_execute_duration_ms = if execute_durations.is_empty() {
            0.0
        } else {
            execute_durations.iter().sum::<u64>() as f64 / execute_durations.len() as f64
        };

        AuditStats {
            total,
            by_severity,
            violations,
            blocked,
            avg_execute_duration_ms,
            events_last_hour,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn infers_critical_severity_for_security_violation() {
        let event = AuditEvent::new(EventType::SecurityViolation, "blocked pattern");
        assert_eq!(event.severity, Severity::Critical);
    }

    #[test]
    fn infers_info_severity_by_default() {
        let event = AuditEvent::new(EventType::SessionCreated, "new session");
        assert_eq!(event.severity, Severity::Info);
    }

    #[test]
    fn stats_count_violations_and_blocked() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(100, dir.path());
        log.record(AuditEvent::new(EventType::SecurityViolation, "a"));
        log.record(AuditEvent::new(EventType::ExecuteBlocked, "b"));
        log.record(AuditEvent::new(EventType::ExecuteEnd, "c").with_duration_ms(42));

        let stats = log.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.violations, 1);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.avg_execute_duration_ms, 42.0);
    }

    #[test]
    fn recent_filters_by_language() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(100, dir.path());
        log.record(AuditEvent::new(EventType::ExecuteEnd, "py").with_language(Language::Python));
        log.record(AuditEvent::new(EventType::ExecuteEnd, "go").with_language(Language::Go));

        let filter = EventFilter {
            language: Some(Language::Go),
            ..Default::default()
        };
        let results = log.recent(10, &filter);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "go");
    }
}
