//! Controller Metrics
//!
//! Process-wide counters for the file transfer cycle. Cheap atomic bumps on
//! the hot paths; `snapshot` gives a consistent-enough view for logging at
//! the end of a tick.

use std::sync::atomic::{AtomicU64, Ordering};

/// Error classification used in logs and the per-kind error counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Malformed,
    Io,
    MissingConfig,
    MissingDepository,
    Upstream,
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Malformed => "malformed",
            ErrorKind::Io => "io",
            ErrorKind::MissingConfig => "missing_config",
            ErrorKind::MissingDepository => "missing_depository",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Validation => "validation",
        }
    }

    const ALL: [ErrorKind; 6] = [
        ErrorKind::Malformed,
        ErrorKind::Io,
        ErrorKind::MissingConfig,
        ErrorKind::MissingDepository,
        ErrorKind::Upstream,
        ErrorKind::Validation,
    ];

    fn index(&self) -> usize {
        Self::ALL.iter().position(|k| k == self).unwrap_or(0)
    }
}

#[derive(Default)]
pub struct ControllerMetrics {
    files_downloaded: AtomicU64,
    files_uploaded: AtomicU64,
    return_entries_processed: AtomicU64,
    /// Transfer lookups that fell back to (amount, user) matching because
    /// the return carried no usable trace number.
    trace_fallbacks: AtomicU64,
    errors: [AtomicU64; 6],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub files_downloaded: u64,
    pub files_uploaded: u64,
    pub return_entries_processed: u64,
    pub trace_fallbacks: u64,
    pub errors: Vec<(&'static str, u64)>,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file_downloaded(&self) {
        self.files_downloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_file_uploaded(&self) {
        self.files_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_return_entry_processed(&self) {
        self.return_entries_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_trace_fallback(&self) {
        self.trace_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_error(&self, kind: ErrorKind) {
        self.errors[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn error_count(&self, kind: ErrorKind) -> u64 {
        self.errors[kind.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_downloaded: self.files_downloaded.load(Ordering::Relaxed),
            files_uploaded: self.files_uploaded.load(Ordering::Relaxed),
            return_entries_processed: self.return_entries_processed.load(Ordering::Relaxed),
            trace_fallbacks: self.trace_fallbacks.load(Ordering::Relaxed),
            errors: ErrorKind::ALL
                .iter()
                .map(|k| (k.as_str(), self.errors[k.index()].load(Ordering::Relaxed)))
                .collect(),
        }
    }
}
