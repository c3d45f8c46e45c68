use thiserror::Error;

/// Aggregates every failure mode exposed by the normalization layer.
///
/// Callers can match on the specific variant to decide whether to retry a whole
/// request, fall back to another provider, or surface an actionable message to the
/// user interface. Frame-level parse failures are deliberately absent: a malformed
/// line inside an otherwise healthy stream is swallowed locally and never becomes
/// an [`LLMError`].
#[derive(Debug, Error)]
pub enum LLMError {
    /// Missing or unusable credentials or settings, detected before any network call.
    #[error("configuration error: {message}")]
    Config { message: String },
    /// The requested model identifier is not in the known model table.
    #[error("unsupported model: {model}")]
    UnsupportedModel { model: String },
    /// The requested provider tag is not known to the dispatcher.
    #[error("unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },
    /// The vendor answered with a non-success HTTP status.
    #[error("upstream error (HTTP {status}): {message}")]
    Upstream {
        /// HTTP status code reported by the vendor.
        status: u16,
        /// Vendor-supplied error message, or a synthesized `HTTP <status>: <reason>`.
        message: String,
    },
    /// Baidu access-token exchange failed before the chat call was attempted.
    #[error("token exchange failed: {message}")]
    TokenExchange { message: String },
    /// Network-level failure: connection refused, dropped mid-stream, or timed out.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// The caller cancelled the request through a [`crate::types::CancelToken`].
    #[error("request aborted: {message}")]
    Aborted { message: String },
    /// The request payload failed validation before dispatch.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// Wraps provider-defined errors that cannot be normalized further.
    #[error("provider {provider} error: {message}")]
    Provider {
        /// Adapter name, such as `openai_compat`.
        provider: &'static str,
        /// Human-readable error message.
        message: String,
    },
}

impl LLMError {
    /// Creates an [`LLMError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use nagare_llm::error::LLMError;
    ///
    /// let err = LLMError::transport("dns lookup failed");
    /// assert!(matches!(err, LLMError::Transport { .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Config`] for missing credentials or bad settings.
    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Provider`] with the given adapter name and message.
    ///
    /// ```
    /// use nagare_llm::error::LLMError;
    ///
    /// let err = LLMError::provider("openai_compat", "bad JSON payload");
    /// assert!(matches!(err, LLMError::Provider { provider: "openai_compat", .. }));
    /// ```
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Aborted`] describing who cancelled the request.
    pub fn aborted<T: Into<String>>(message: T) -> Self {
        Self::Aborted {
            message: message.into(),
        }
    }
}

/// Renders `HTTP <status>: <reason>` for upstream bodies that carry no usable message.
pub(crate) fn status_line(status: u16) -> String {
    match reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
    {
        Some(reason) => format!("HTTP {status}: {reason}"),
        None => format!("HTTP {status}"),
    }
}
