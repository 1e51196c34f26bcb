//! Shared helpers for the integration tests.

use calltrace::{Instrumentation, LogEntry, LogSink};
use std::sync::{Arc, Mutex};

/// A trace id of exactly the minimum accepted length.
pub const TRACE_ID: &str = "0123456789abcdef";

/// Keeps every emitted entry in memory.
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl LogSink for RecordingSink {
    fn emit(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Entries summarising an inbound request.
    #[allow(dead_code)]
    pub fn finals(&self) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.record.attr.monitor.is_final)
            .collect()
    }
}

/// Instrumentation writing into a fresh [`RecordingSink`].
pub fn recorded_instrumentation() -> (Instrumentation, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let instrumentation = Instrumentation::builder()
        .application("calltrace-tests")
        .env("test")
        .label("request")
        .sink(sink.clone())
        .build()
        .unwrap();
    (instrumentation, sink)
}
