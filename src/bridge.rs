//! The hostcall bridge: correlation core between script-visible futures and
//! fire-and-forget host submissions.
//!
//! ```text
//! Script                        Host
//! ------                        ----
//! wrapper.call(args)       -->  HostChannel::submit(op, id, args)
//!   allocate id                 (fire-and-forget, may fail synchronously)
//!   register pending call
//!   returns HostcallFuture
//!
//! deliver_completions      <--  host signals (id, payload) batches
//!   take pending call by id
//!   settle its handle
//!   future unwraps payload through the error registry
//! ```
//!
//! All state lives in one explicit context behind `Rc<RefCell<…>>`; every
//! mutation happens on the single script thread, so no locks are involved.
//! Independent bridges are fully isolated, which is what tests rely on.

use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::call_id::{CallId, CallIdAllocator};
use crate::call_trace::CallTracer;
use crate::error::{Error, Result};
use crate::error_registry::{CallPayload, ErrorRegistry, ScriptError};
use crate::pending_store::{CompletionReceiver, PendingCallStore, PendingStoreStats};

/// Host boundary consumed by the bridge.
///
/// `submit` is fire-and-forget: a successful return means the host accepted
/// the call and will eventually deliver exactly one resolution for its id
/// through [`HostcallBridge::deliver_completions`]. A synchronous `Err` means
/// nothing was accepted and no resolution will follow.
pub trait HostChannel {
    fn submit(&self, op_name: &str, id: CallId, args: &[Value]) -> Result<()>;

    /// Flip whether the pending call keeps the embedding event loop alive.
    fn set_ref(&self, id: CallId, keep_alive: bool);
}

struct BridgeState {
    allocator: CallIdAllocator,
    store: PendingCallStore,
    tracer: CallTracer,
    protocol_violations: u64,
}

/// Cheaply clonable handle to one bridge context.
///
/// The error registry lives behind its own handle so an outstanding
/// [`HostcallFuture`] keeps only the registry alive, not the pending store:
/// when the last bridge handle goes away the store drops, every held
/// completion sender drops with it, and outstanding futures reject instead
/// of hanging.
pub struct HostcallBridge {
    state: Rc<RefCell<BridgeState>>,
    registry: Rc<RefCell<ErrorRegistry>>,
    host: Rc<dyn HostChannel>,
}

impl Clone for HostcallBridge {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            registry: Rc::clone(&self.registry),
            host: Rc::clone(&self.host),
        }
    }
}

impl HostcallBridge {
    /// Create a bridge with the default ring capacity and the builtin error
    /// kinds pre-registered.
    #[must_use]
    pub fn new(host: Rc<dyn HostChannel>) -> Self {
        Self::with_ring_capacity(host, crate::pending_store::PENDING_RING_CAPACITY)
    }

    /// Create a bridge with a custom pending-store ring capacity.
    #[must_use]
    pub fn with_ring_capacity(host: Rc<dyn HostChannel>, capacity: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(BridgeState {
                allocator: CallIdAllocator::new(),
                store: PendingCallStore::with_capacity(capacity),
                tracer: CallTracer::new(),
                protocol_violations: 0,
            })),
            registry: Rc::new(RefCell::new(ErrorRegistry::with_builtin_kinds())),
            host,
        }
    }

    /// Register a script-error constructor for `kind`. Fails if the tag is
    /// already registered.
    pub fn register_error_kind(
        &self,
        kind: impl Into<String>,
        ctor: impl Fn(&str) -> ScriptError + 'static,
    ) -> Result<()> {
        self.registry.borrow_mut().register(kind, ctor)
    }

    #[must_use]
    pub fn is_error_kind_registered(&self, kind: &str) -> bool {
        self.registry.borrow().is_registered(kind)
    }

    pub fn enable_call_tracing(&self) {
        self.state.borrow_mut().tracer.enable();
    }

    pub fn disable_call_tracing(&self) {
        self.state.borrow_mut().tracer.disable();
    }

    #[must_use]
    pub fn call_tracing_enabled(&self) -> bool {
        self.state.borrow().tracer.is_enabled()
    }

    /// Operation name recorded for a pending call, when tracing is enabled.
    #[must_use]
    pub fn traced_op_name(&self, id: CallId) -> Option<String> {
        self.state
            .borrow()
            .tracer
            .get(id)
            .map(|entry| entry.op_name().to_string())
    }

    /// Synthesize a script-callable asynchronous wrapper for a host
    /// operation with a fixed argument count.
    #[must_use]
    pub fn async_wrapper(&self, op_name: impl Into<String>, arity: usize) -> HostcallWrapper {
        HostcallWrapper {
            bridge: self.clone(),
            op_name: op_name.into(),
            arity,
        }
    }

    /// Deliver a batch of `(id, payload)` resolutions from the host, in
    /// array order. Returns how many pairs settled a pending call.
    ///
    /// A pair whose id has no pending call is a protocol violation: it is
    /// logged and counted, and processing continues with the remaining
    /// pairs.
    pub fn deliver_completions(
        &self,
        batch: impl IntoIterator<Item = (CallId, CallPayload)>,
    ) -> usize {
        let mut settled = 0;
        for (id, payload) in batch {
            let sender = {
                let mut state = self.state.borrow_mut();
                let Some(sender) = state.store.take(id) else {
                    state.protocol_violations = state.protocol_violations.saturating_add(1);
                    tracing::warn!(
                        target: "hostcall_bridge.bridge",
                        event = "bridge.completion.not_found",
                        call_id = %id,
                        "Resolution delivered for unknown or already-settled call"
                    );
                    continue;
                };
                state.tracer.remove(id);
                sender
            };

            if sender.send(payload).is_err() {
                // The script side dropped its future; the settlement is
                // unobservable but the call is accounted for.
                tracing::debug!(
                    target: "hostcall_bridge.bridge",
                    event = "bridge.completion.dropped",
                    call_id = %id,
                    "Completion delivered to a dropped future"
                );
            }
            settled += 1;
        }
        settled
    }

    /// Decode a JSON-encoded resolution batch (`[[id, payload], …]`) from a
    /// wire-backed delivery channel and deliver it.
    ///
    /// Returns how many pairs settled a pending call; a batch that fails to
    /// decode delivers nothing.
    pub fn deliver_completions_json(&self, raw: &str) -> Result<usize> {
        let batch: Vec<(CallId, CallPayload)> = serde_json::from_str(raw)?;
        Ok(self.deliver_completions(batch))
    }

    /// Mark a pending call as counted toward event-loop liveness.
    /// No-op if the call already settled.
    pub fn ref_call(&self, id: CallId) {
        if self.state.borrow().store.contains(id) {
            self.host.set_ref(id, true);
        }
    }

    /// Mark a pending call as not counted toward event-loop liveness.
    /// No-op if the call already settled.
    pub fn unref_call(&self, id: CallId) {
        if self.state.borrow().store.contains(id) {
            self.host.set_ref(id, false);
        }
    }

    /// Whether a call is currently pending.
    #[must_use]
    pub fn contains(&self, id: CallId) -> bool {
        self.state.borrow().store.contains(id)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.borrow().store.pending_count()
    }

    #[must_use]
    pub fn pending_ids(&self) -> Vec<CallId> {
        self.state.borrow().store.pending_ids()
    }

    #[must_use]
    pub fn store_stats(&self) -> PendingStoreStats {
        self.state.borrow().store.snapshot()
    }

    /// Total resolutions delivered for ids with no pending call.
    #[must_use]
    pub fn protocol_violations(&self) -> u64 {
        self.state.borrow().protocol_violations
    }
}

/// Script-callable asynchronous wrapper for one host operation.
///
/// Calling it allocates a correlation id, registers the pending call,
/// submits to the host, and returns the future for the eventual result.
pub struct HostcallWrapper {
    bridge: HostcallBridge,
    op_name: String,
    arity: usize,
}

impl HostcallWrapper {
    #[must_use]
    pub fn op_name(&self) -> &str {
        &self.op_name
    }

    #[must_use]
    pub const fn arity(&self) -> usize {
        self.arity
    }

    /// Invoke the host operation with `args`.
    ///
    /// On synchronous submission failure the pending registration is rolled
    /// back before the host error propagates, so no dangling registration
    /// outlives the call and the future is never left pending.
    pub fn call(&self, args: Vec<Value>) -> Result<HostcallFuture> {
        if args.len() != self.arity {
            return Err(Error::wrapper(
                &self.op_name,
                format!("expected {} argument(s), got {}", self.arity, args.len()),
            ));
        }

        let (id, receiver) = {
            let mut state = self.bridge.state.borrow_mut();
            let id = state.allocator.next();
            let receiver = state.store.register(id);
            (id, receiver)
        };

        if let Err(err) = self.bridge.host.submit(&self.op_name, id, &args) {
            let mut state = self.bridge.state.borrow_mut();
            let orphaned = state.store.take(id);
            debug_assert!(orphaned.is_some());
            state.tracer.remove(id);
            tracing::debug!(
                target: "hostcall_bridge.bridge",
                event = "bridge.submit.rollback",
                call_id = %id,
                op = %self.op_name,
                "Synchronous submit failure, rolled back pending registration"
            );
            return Err(err);
        }

        {
            let mut state = self.bridge.state.borrow_mut();
            state.tracer.record(id, &self.op_name);
        }
        tracing::trace!(
            target: "hostcall_bridge.bridge",
            event = "bridge.submit",
            call_id = %id,
            op = %self.op_name,
            "Submitted host call"
        );

        Ok(HostcallFuture {
            call_id: id,
            receiver,
            registry: Rc::clone(&self.bridge.registry),
        })
    }
}

/// Future for one in-flight host call.
///
/// Resolves to the success value or the script error unwrapped from the
/// delivered payload. Carries its correlation id for introspection. Holds
/// the error registry but not the pending store: if every bridge handle is
/// dropped while the call is still in flight, the completion sender drops
/// with the store and the future rejects with a generic script error.
pub struct HostcallFuture {
    call_id: CallId,
    receiver: CompletionReceiver,
    registry: Rc<RefCell<ErrorRegistry>>,
}

impl fmt::Debug for HostcallFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostcallFuture")
            .field("call_id", &self.call_id)
            .finish_non_exhaustive()
    }
}

impl HostcallFuture {
    /// Correlation id of the call this future belongs to.
    #[must_use]
    pub const fn call_id(&self) -> CallId {
        self.call_id
    }
}

impl Future for HostcallFuture {
    type Output = std::result::Result<Value, ScriptError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(payload)) => {
                let registry = this.registry.borrow();
                Poll::Ready(registry.unwrap(payload))
            }
            Poll::Ready(Err(_canceled)) => Poll::Ready(Err(ScriptError::new(
                "Error",
                format!("{} abandoned before resolution", this.call_id),
            ))),
        }
    }
}
