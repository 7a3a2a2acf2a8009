use thiserror::Error;

/// Errors surfaced while constructing a [`crate::PartialSpanProcessor`].
///
/// Runtime failures (export rejection, a panicking serializer) never reach the
/// caller as an error value — per [`opentelemetry_sdk::trace::SpanProcessor`]'s
/// contract, `on_start`/`on_end` are total functions. Those are instead logged
/// via `opentelemetry`'s internal diagnostic macros and folded into the
/// `OTelSdkResult` returned by `shutdown`/`force_flush`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartialSpanError {
    /// A configuration parameter was out of range or missing.
    #[error("invalid argument `{parameter}`: {reason}")]
    InvalidArgument {
        /// Name of the offending configuration field.
        parameter: &'static str,
        /// Human-readable explanation of why it was rejected.
        reason: String,
    },
}

impl PartialSpanError {
    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter,
            reason: reason.into(),
        }
    }
}
