//! hostcall-bridge - call-correlation core for a scripting runtime
//!
//! This library bridges fire-and-forget host calls (native operations
//! invoked from script code) to the script's asynchronous-result
//! abstraction. Each in-flight call gets a correlation id, its completion
//! handle is held in a ring-first two-tier store, and out-of-band host
//! resolutions settle the script-visible future, routing failure payloads
//! through an extensible error-kind registry.
//!
//! The bridge owns only the bookkeeping; the host operations themselves,
//! the script engine, and the embedding event loop are external
//! collaborators reached through the [`bridge::HostChannel`] trait and the
//! batched [`bridge::HostcallBridge::deliver_completions`] channel.

#![forbid(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

pub mod bridge;
pub mod call_id;
pub mod call_trace;
pub mod error;
pub mod error_registry;
pub mod pending_store;

pub use bridge::{HostChannel, HostcallBridge, HostcallFuture, HostcallWrapper};
pub use call_id::{CallId, CallIdAllocator};
pub use call_trace::{CallTraceEntry, CallTracer};
pub use error::{Error, Result};
pub use error_registry::{
    CallPayload, ErrorRegistry, FailurePayload, ScriptError, BUILTIN_ERROR_KINDS,
};
pub use pending_store::{PendingCallStore, PendingStoreStats, PENDING_RING_CAPACITY};
