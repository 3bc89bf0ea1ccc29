//! Response envelope for gateway operations
//!
//! Every operation answers with the same externally observable shape,
//! whatever transport carries it:
//!
//! ```json
//! { "ok": true, ...payload fields... }
//! { "ok": false, "error": "reason", "kind": "validation" }
//! ```

use serde::Serialize;

use crate::error::FailureKind;

/// Tagged success/failure result with the payload flattened into the object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl<T> Envelope<T> {
    /// Whether this envelope carries a payload
    pub fn is_ok(&self) -> bool {
        self.ok
    }
}

/// Create a successful envelope around any serializable payload
///
/// # Example
///
/// ```rust,ignore
/// use gateway_common::success;
///
/// #[derive(Serialize)]
/// struct Rows { row_count: usize }
///
/// let envelope = success(Rows { row_count: 3 });
/// ```
pub fn success<T>(data: T) -> Envelope<T> {
    Envelope {
        ok: true,
        data: Some(data),
        error: None,
        kind: None,
    }
}

/// Create a failed envelope from any classified error
pub fn failure<T, E: FailureKind + ?Sized>(err: &E) -> Envelope<T> {
    Envelope {
        ok: false,
        data: None,
        error: Some(err.to_string()),
        kind: Some(err.kind()),
    }
}

/// Render an envelope as pretty-printed JSON
///
/// Serialization of the envelope itself cannot fail for well-formed payloads;
/// a failing payload is reported as a failure envelope instead.
pub fn to_json_pretty<T: Serialize>(envelope: &Envelope<T>) -> String {
    match serde_json::to_string_pretty(envelope) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("Failed to serialize response: {}", e);
            let fallback: Envelope<()> = failure(&e);
            serde_json::to_string_pretty(&fallback)
                .unwrap_or_else(|_| r#"{"ok":false,"error":"serialization failed"}"#.to_string())
        }
    }
}
