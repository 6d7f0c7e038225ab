use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "options.model")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected value, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "adapter_registry", "engine_builder")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Unified error type for the conversation engine.
///
/// Per-chunk extraction failures have no variant here: a chunk a parse
/// function cannot read yields no channel value and the stream continues.
/// Cancellation is not an error either; an aborted stream simply stops
/// producing events.
#[derive(Debug, Error)]
pub enum Error {
    /// Broken integration, raised before any request is made: unknown
    /// service id in the registry, missing adapter, invalid base URL.
    #[error("configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("network transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// Non-2xx response, raised before any streaming begins. Carries the
    /// server-provided error text when available. Never retried here;
    /// retry policy belongs to the caller.
    #[error("remote error: HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_rendered_in_display() {
        let err = Error::configuration_with_context(
            "unknown service id",
            ErrorContext::new()
                .with_field_path("service_id")
                .with_source("adapter_registry"),
        );
        let rendered = err.to_string();
        assert!(rendered.contains("unknown service id"));
        assert!(rendered.contains("field: service_id"));
        assert!(rendered.contains("source: adapter_registry"));
    }

    #[test]
    fn remote_error_carries_status_and_body() {
        let err = Error::Remote {
            status: 429,
            message: "quota exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "remote error: HTTP 429: quota exceeded");
    }
}
