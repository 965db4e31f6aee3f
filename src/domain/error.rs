use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("template `{template_id}` is misconfigured: {reason}")]
    Template { template_id: String, reason: String },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("domain invariant violated: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn template(template_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Template {
            template_id: template_id.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
