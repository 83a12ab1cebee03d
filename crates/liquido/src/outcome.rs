//! Host-facing render entry point
//!
//! [`render_document`] never returns an error and never panics: every failure,
//! including a panic inside the engine, comes back as a
//! [`RenderOutcome::Failure`] that serializes cleanly for a host.

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::{render_str, RenderOptions, TemplateError};

/// Failure category reported to hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidDocument,
    SyntaxError,
    UnknownFilter,
    IterationLimitExceeded,
    InternalError,
}

/// Result of a render, shaped for serialization
///
/// ```
/// use liquido::{render_document, RenderOutcome};
///
/// let outcome = render_document(r#"[1, 2, 3]"#, "{{ model | join: \", \" }}");
/// assert_eq!(outcome, RenderOutcome::Success { output: "1, 2, 3".into() });
/// assert_eq!(
///     serde_json::to_string(&outcome).unwrap(),
///     r#"{"status":"success","output":"1, 2, 3"}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RenderOutcome {
    Success {
        output: String,
    },
    Failure {
        kind: ErrorKind,
        message: String,
        /// 1-based `(line, column)`
        position: Option<(usize, usize)>,
    },
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RenderOutcome::Success { .. })
    }

    /// Rendered text, if the render succeeded
    pub fn output(&self) -> Option<&str> {
        match self {
            RenderOutcome::Success { output } => Some(output),
            RenderOutcome::Failure { .. } => None,
        }
    }
}

impl From<TemplateError> for RenderOutcome {
    fn from(err: TemplateError) -> Self {
        RenderOutcome::Failure {
            kind: err.kind(),
            message: err.to_string(),
            position: err.position().map(|p| (p.line, p.column)),
        }
    }
}

impl From<crate::Result<String>> for RenderOutcome {
    fn from(result: crate::Result<String>) -> Self {
        match result {
            Ok(output) => RenderOutcome::Success { output },
            Err(err) => err.into(),
        }
    }
}

/// Render a template against a JSON document with default options
pub fn render_document(document_text: &str, template_text: &str) -> RenderOutcome {
    render_document_with(document_text, template_text, &RenderOptions::default())
}

/// Render a template against a JSON document
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(document_len = document_text.len(), template_len = template_text.len())
)]
pub fn render_document_with(document_text: &str, template_text: &str, options: &RenderOptions) -> RenderOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        render_str(document_text, template_text, options)
    }));
    let outcome = match result {
        Ok(result) => RenderOutcome::from(result),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(%message, "render panicked");
            TemplateError::Internal(message).into()
        }
    };
    if let RenderOutcome::Failure { kind, message, .. } = &outcome {
        tracing::debug!(?kind, %message, "render failed");
    }
    outcome
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "render panicked".to_string()
    }
}
