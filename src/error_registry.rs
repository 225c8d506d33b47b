//! Error-kind registry and the resolution payload protocol.
//!
//! A resolution delivered by the host either carries a plain success value or
//! a failure envelope tagged with an error kind. The registry maps each kind
//! tag to a constructor for the script-visible error; kinds the embedding
//! never registered fall through to a generic error that still names the tag
//! so the failure stays observable.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// JS primitive error kinds registered in every new bridge so a native error
/// round-tripped through the host boundary reconstructs the same kind on the
/// script side.
pub const BUILTIN_ERROR_KINDS: [&str; 7] = [
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
    "EvalError",
    "URIError",
];

const GENERIC_ERROR_KIND: &str = "Error";

/// Failure envelope carried by a rejecting resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePayload {
    /// Error-kind tag, looked up in the registry.
    pub kind: String,
    /// Human-readable message passed to the constructor.
    pub message: String,
    /// Optional OS-style numeric code attached to the constructed error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
}

impl FailurePayload {
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            errno: None,
        }
    }

    #[must_use]
    pub const fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }
}

/// Resolution payload delivered by the host for one correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPayload {
    /// Successful result, passed through to the awaiting script unchanged.
    Success(Value),
    /// Failure envelope, unwrapped through the error registry.
    Failure(FailurePayload),
}

/// Script-visible error value constructed from a failure payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptError {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
}

impl ScriptError {
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            errno: None,
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errno {
            Some(errno) => write!(f, "{}: {} (errno {errno})", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ScriptError {}

/// Constructor producing a script error from a failure message.
pub type ErrorCtor = Box<dyn Fn(&str) -> ScriptError>;

/// Open extension table from error-kind tag to constructor.
///
/// Populated with the JS builtin kinds at construction; collaborators extend
/// it at startup. A tag registers at most once for the life of the bridge.
pub struct ErrorRegistry {
    ctors: HashMap<String, ErrorCtor>,
}

impl ErrorRegistry {
    /// Create a registry pre-populated with [`BUILTIN_ERROR_KINDS`].
    #[must_use]
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self {
            ctors: HashMap::new(),
        };
        for kind in BUILTIN_ERROR_KINDS {
            let owned = kind.to_string();
            let previous = registry
                .ctors
                .insert(kind.to_string(), Box::new(move |message| {
                    ScriptError::new(owned.clone(), message)
                }));
            debug_assert!(previous.is_none());
        }
        registry
    }

    /// Create an empty registry with no kinds at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            ctors: HashMap::new(),
        }
    }

    /// Register a constructor for `kind`.
    ///
    /// Re-registering an existing tag is a usage error and leaves the
    /// original constructor in place.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        ctor: impl Fn(&str) -> ScriptError + 'static,
    ) -> Result<()> {
        let kind = kind.into();
        if self.ctors.contains_key(&kind) {
            return Err(Error::registry(format!(
                "error kind {kind:?} is already registered"
            )));
        }
        tracing::trace!(
            target: "hostcall_bridge.error_registry",
            event = "error_registry.register",
            kind = %kind,
            "Registered error kind"
        );
        self.ctors.insert(kind, Box::new(ctor));
        Ok(())
    }

    #[must_use]
    pub fn is_registered(&self, kind: &str) -> bool {
        self.ctors.contains_key(kind)
    }

    /// All registered kind tags, in no particular order.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        self.ctors.keys().map(String::as_str).collect()
    }

    /// Unwrap a delivered payload into the script-visible result.
    ///
    /// Success values pass through unchanged. Failure envelopes run through
    /// the registered constructor for their kind, with the numeric code from
    /// the payload attached afterwards; unregistered kinds produce a generic
    /// error naming the tag.
    pub fn unwrap(&self, payload: CallPayload) -> std::result::Result<Value, ScriptError> {
        match payload {
            CallPayload::Success(value) => Ok(value),
            CallPayload::Failure(failure) => {
                let mut error = match self.ctors.get(&failure.kind) {
                    Some(ctor) => ctor(&failure.message),
                    None => {
                        tracing::debug!(
                            target: "hostcall_bridge.error_registry",
                            event = "error_registry.unknown_kind",
                            kind = %failure.kind,
                            "Unwrapping failure with unregistered error kind"
                        );
                        ScriptError::new(
                            GENERIC_ERROR_KIND,
                            format!(
                                "unregistered error kind {:?}: {}",
                                failure.kind, failure.message
                            ),
                        )
                    }
                };
                if failure.errno.is_some() {
                    error.errno = failure.errno;
                }
                Err(error)
            }
        }
    }
}

impl Default for ErrorRegistry {
    fn default() -> Self {
        Self::with_builtin_kinds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_kinds_round_trip() {
        let registry = ErrorRegistry::with_builtin_kinds();
        for kind in BUILTIN_ERROR_KINDS {
            assert!(registry.is_registered(kind), "missing builtin {kind}");
        }

        let payload = CallPayload::Failure(FailurePayload::new("TypeError", "not a function"));
        let error = registry.unwrap(payload).unwrap_err();
        assert_eq!(error.kind, "TypeError");
        assert_eq!(error.message, "not a function");
        assert_eq!(error.errno, None);
    }

    #[test]
    fn duplicate_registration_is_rejected_and_keeps_original() {
        let mut registry = ErrorRegistry::empty();
        registry
            .register("NotFound", |message| ScriptError::new("NotFound", message))
            .unwrap();
        let err = registry
            .register("NotFound", |message| ScriptError::new("Bogus", message))
            .unwrap_err();
        assert!(err.to_string().contains("NotFound"));

        let error = registry
            .unwrap(CallPayload::Failure(FailurePayload::new("NotFound", "x")))
            .unwrap_err();
        assert_eq!(error.kind, "NotFound");
    }

    #[test]
    fn registered_kind_constructs_matching_error() {
        let mut registry = ErrorRegistry::with_builtin_kinds();
        registry
            .register("NotFound", |message| ScriptError::new("NotFound", message))
            .unwrap();

        let payload = CallPayload::Failure(FailurePayload::new("NotFound", "x"));
        let error = registry.unwrap(payload).unwrap_err();
        assert_eq!(error.kind, "NotFound");
        assert_eq!(error.message, "x");
    }

    #[test]
    fn unregistered_kind_falls_back_to_generic_error_naming_the_tag() {
        let registry = ErrorRegistry::with_builtin_kinds();
        let payload = CallPayload::Failure(FailurePayload::new("Exotic", "boom"));
        let error = registry.unwrap(payload).unwrap_err();
        assert_eq!(error.kind, "Error");
        assert!(error.message.contains("Exotic"));
        assert!(error.message.contains("boom"));
    }

    #[test]
    fn errno_from_the_payload_is_attached() {
        let registry = ErrorRegistry::with_builtin_kinds();
        let payload =
            CallPayload::Failure(FailurePayload::new("Error", "no such file").with_errno(-2));
        let error = registry.unwrap(payload).unwrap_err();
        assert_eq!(error.errno, Some(-2));
    }

    #[test]
    fn success_values_pass_through_unchanged() {
        let registry = ErrorRegistry::with_builtin_kinds();
        let value = json!({"bytes": 5});
        let payload = CallPayload::Success(value.clone());
        assert_eq!(registry.unwrap(payload).unwrap(), value);
    }

    #[test]
    fn payload_wire_shape_is_stable() {
        let success = CallPayload::Success(json!({"bytes": 5}));
        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            json!({"success": {"bytes": 5}})
        );

        let failure = CallPayload::Failure(FailurePayload::new("NotFound", "x").with_errno(-2));
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({"failure": {"kind": "NotFound", "message": "x", "errno": -2}})
        );
    }
}
