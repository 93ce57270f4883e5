//! Structured ring buffer of normalized errors

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{error, info, warn};

use wayfare_core::{epoch_millis, ApiError, ErrorKind};

/// Default ring buffer capacity
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Configuration for the error logger
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Entries kept before the oldest is dropped
    pub max_entries: usize,
    /// Emit a `tracing` event per logged error
    pub emit_events: bool,
    /// Attached to every entry's context
    pub user_agent: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            emit_events: true,
            user_agent: None,
        }
    }
}

impl LoggerConfig {
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn silent(mut self) -> Self {
        self.emit_events = false;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// The error part of a log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub endpoint: Option<String>,
    pub status: Option<u16>,
    pub code: Option<String>,
}

impl From<&ApiError> for LoggedError {
    fn from(err: &ApiError) -> Self {
        Self {
            kind: err.kind,
            message: err.message.clone(),
            retryable: err.is_retryable(),
            endpoint: err.endpoint.clone(),
            status: err.status,
            code: err.code.clone(),
        }
    }
}

/// Where an error happened
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub component: Option<String>,
    pub url: Option<String>,
    pub user_agent: Option<String>,
    /// Filled in by the logger
    pub session_id: String,
    pub extra: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub id: String,
    /// Epoch ms
    pub timestamp: u64,
    pub error: LoggedError,
    pub context: ErrorContext,
    pub resolved: bool,
}

/// Counts over the buffered entries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub total: usize,
    pub unresolved: usize,
    pub by_kind: BTreeMap<ErrorKind, usize>,
    pub by_endpoint: BTreeMap<String, usize>,
}

/// Error log shared by the request client and recovery
///
/// Cloning creates a new handle to the SAME buffer.
#[derive(Debug, Clone)]
pub struct ErrorLogger {
    entries: Arc<RwLock<VecDeque<ErrorLogEntry>>>,
    session_id: Arc<str>,
    config: LoggerConfig,
}

impl Default for ErrorLogger {
    fn default() -> Self {
        Self::new(LoggerConfig::default())
    }
}

fn random_suffix() -> String {
    format!("{:012x}", rand::random::<u64>() & 0xffff_ffff_ffff)
}

impl ErrorLogger {
    pub fn new(config: LoggerConfig) -> Self {
        let session_id = format!("session_{}_{}", epoch_millis(), random_suffix());
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            session_id: session_id.into(),
            config,
        }
    }

    /// Session id stamped on every entry
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Record an error, returning the entry id
    pub fn log(&self, err: &ApiError, mut context: ErrorContext) -> String {
        let timestamp = epoch_millis();
        let id = format!("err_{timestamp}_{}", random_suffix());
        context.session_id = self.session_id.to_string();
        if context.user_agent.is_none() {
            context.user_agent = self.config.user_agent.clone();
        }

        if self.config.emit_events {
            emit(err, &context, &id);
        }

        let entry = ErrorLogEntry {
            id: id.clone(),
            timestamp,
            error: LoggedError::from(err),
            context,
            resolved: false,
        };

        let mut entries = self.entries.write();
        entries.push_back(entry);
        while entries.len() > self.config.max_entries {
            entries.pop_front();
        }
        id
    }

    /// All entries, oldest first
    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        self.entries.read().iter().cloned().collect()
    }

    /// The newest `n` entries, newest first
    pub fn recent(&self, n: usize) -> Vec<ErrorLogEntry> {
        self.entries.read().iter().rev().take(n).cloned().collect()
    }

    /// Entries of one kind, oldest first
    pub fn by_kind(&self, kind: ErrorKind) -> Vec<ErrorLogEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.error.kind == kind)
            .cloned()
            .collect()
    }

    /// Flag an entry as handled
    ///
    /// Returns `false` if the id is unknown (or already evicted).
    pub fn mark_resolved(&self, id: &str) -> bool {
        match self.entries.write().iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.resolved = true;
                true
            }
            None => false,
        }
    }

    pub fn summary(&self) -> ErrorSummary {
        let entries = self.entries.read();
        let mut summary = ErrorSummary {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries.iter() {
            if !entry.resolved {
                summary.unresolved += 1;
            }
            *summary.by_kind.entry(entry.error.kind).or_default() += 1;
            let endpoint = entry.error.endpoint.as_deref().unwrap_or("unknown");
            *summary.by_endpoint.entry(endpoint.to_string()).or_default() += 1;
        }
        summary
    }

    /// Serialize every entry as a JSON array
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.entries.read())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

fn emit(err: &ApiError, context: &ErrorContext, id: &str) {
    let endpoint = err.endpoint.as_deref().unwrap_or("unknown");
    let component = context.component.as_deref().unwrap_or("unknown");
    match err.kind {
        ErrorKind::ValidationError => info!(
            target: "wayfare",
            id, kind = %err.kind, endpoint, component,
            "{}", err.message
        ),
        ErrorKind::NetworkError
        | ErrorKind::ApiTimeout
        | ErrorKind::RateLimit
        | ErrorKind::CorsError => warn!(
            target: "wayfare",
            id, kind = %err.kind, endpoint, component,
            "{}", err.message
        ),
        _ => error!(
            target: "wayfare",
            id, kind = %err.kind, endpoint, component,
            "{}", err.message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger(max: usize) -> ErrorLogger {
        ErrorLogger::new(LoggerConfig::default().with_max_entries(max).silent())
    }

    #[test]
    fn test_log_stamps_session() {
        let logger = logger(10);
        let err = ApiError::network("offline").with_endpoint("weather");
        let id = logger.log(&err, ErrorContext::new().component("weather-service"));

        let entries = logger.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert!(id.starts_with("err_"));
        assert_eq!(entries[0].context.session_id, logger.session_id());
        assert!(entries[0].error.retryable);
        assert!(!entries[0].resolved);
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let logger = logger(3);
        for i in 0..5 {
            logger.log(&ApiError::server(format!("boom {i}")), ErrorContext::new());
        }
        let messages: Vec<String> = logger.entries().into_iter().map(|e| e.error.message).collect();
        assert_eq!(messages, vec!["boom 2", "boom 3", "boom 4"]);
        assert_eq!(logger.recent(1)[0].error.message, "boom 4");
    }

    #[test]
    fn test_mark_resolved_and_summary() {
        let logger = logger(10);
        let first = logger.log(
            &ApiError::from_status(429, "slow down").with_endpoint("events"),
            ErrorContext::new(),
        );
        logger.log(
            &ApiError::from_status(503, "down").with_endpoint("events"),
            ErrorContext::new(),
        );
        logger.log(&ApiError::from_status(503, "down"), ErrorContext::new());

        assert!(logger.mark_resolved(&first));
        assert!(!logger.mark_resolved("err_missing"));

        let summary = logger.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.unresolved, 2);
        assert_eq!(summary.by_kind[&ErrorKind::ServerError], 2);
        assert_eq!(summary.by_endpoint["events"], 2);
        assert_eq!(summary.by_endpoint["unknown"], 1);
        assert_eq!(logger.by_kind(ErrorKind::RateLimit).len(), 1);
    }

    #[test]
    fn test_export_json() {
        let logger = logger(10);
        logger.log(
            &ApiError::invalid_response("bad row"),
            ErrorContext::new().extra("cache_key", "carousel-poi"),
        );
        let json = logger.export_json().unwrap();
        let parsed: Vec<ErrorLogEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0].error.kind, ErrorKind::InvalidResponse);
        assert_eq!(parsed[0].context.extra["cache_key"], "carousel-poi");

        logger.clear();
        assert!(logger.is_empty());
    }
}
