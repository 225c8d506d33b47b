//! Diagnostic call-site recording for in-flight host calls.
//!
//! Off by default. When enabled, each registered call gets an entry with its
//! operation name and the call stack at submission, removed when the call
//! settles. Purely diagnostic: toggling tracing never changes resolution
//! semantics.

use std::backtrace::Backtrace;
use std::collections::HashMap;

use crate::call_id::CallId;

/// Captured diagnostics for one pending call.
#[derive(Debug)]
pub struct CallTraceEntry {
    op_name: String,
    stack: Backtrace,
}

impl CallTraceEntry {
    #[must_use]
    pub fn op_name(&self) -> &str {
        &self.op_name
    }

    #[must_use]
    pub const fn stack(&self) -> &Backtrace {
        &self.stack
    }
}

/// Recorder of call-site stacks per correlation id.
#[derive(Debug, Default)]
pub struct CallTracer {
    enabled: bool,
    entries: HashMap<CallId, CallTraceEntry>,
}

impl CallTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disable recording and drop all stored entries.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.entries.clear();
    }

    /// Record a trace entry for `id`. No-op while disabled.
    ///
    /// The captured stack includes this recording frame and its callers up
    /// through the bridge; `std::backtrace` offers no frame trimming, so
    /// consumers rendering the stack should skip the leading
    /// `hostcall_bridge` frames if they want the submission site alone.
    pub fn record(&mut self, id: CallId, op_name: &str) {
        if !self.enabled {
            return;
        }
        self.entries.insert(
            id,
            CallTraceEntry {
                op_name: op_name.to_string(),
                stack: Backtrace::force_capture(),
            },
        );
        tracing::trace!(
            target: "hostcall_bridge.call_trace",
            event = "call_trace.record",
            call_id = %id,
            op = op_name,
            "Recorded call trace"
        );
    }

    /// Remove and return the entry for `id`, if any. Called when the call
    /// settles, regardless of success or failure.
    pub fn remove(&mut self, id: CallId) -> Option<CallTraceEntry> {
        self.entries.remove(&id)
    }

    #[must_use]
    pub fn get(&self, id: CallId) -> Option<&CallTraceEntry> {
        self.entries.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
