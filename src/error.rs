use thiserror::Error;

use crate::intake::EntryId;

/// Failure reading or decoding one submitted file. Terminal for that entry.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is not valid UTF-8 text")]
    NotText,
}

/// First structural violation found in a collaborator response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("response is not an object with a `certificates` array")]
    MalformedEnvelope,

    #[error("certificates[{0}] is not an object")]
    NotAnObject(usize),

    #[error("certificates[{index}].{field} is not {expected}")]
    WrongType {
        index: usize,
        field: &'static str,
        expected: &'static str,
    },
}

impl ValidationError {
    /// Path of the offending value, e.g. `certificates[0].subject`.
    pub fn path(&self) -> String {
        match self {
            ValidationError::MalformedEnvelope => "certificates".to_string(),
            ValidationError::NotAnObject(index) => format!("certificates[{index}]"),
            ValidationError::WrongType { index, field, .. } => {
                format!("certificates[{index}].{field}")
            }
        }
    }
}

/// Failure talking to the parsing service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// Non-success status. The message is the service's own `error` string.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("parse service unreachable: {0}")]
    Transport(String),

    #[error("parse service returned an undecodable body: {0}")]
    Decode(String),
}

impl CollaboratorError {
    /// Message suitable for showing to the user as-is.
    pub fn user_message(&self) -> String {
        match self {
            CollaboratorError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// How a failed parse attempt is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    /// The attempt carried a password. The message goes back to the prompt.
    #[error("{0}")]
    PasswordRejected(String),

    /// Any other failure. The message becomes a notice.
    #[error("{0}")]
    Unparsed(String),
}

impl ParseFailure {
    pub fn classify(carried_secret: bool, message: String) -> Self {
        if carried_secret {
            ParseFailure::PasswordRejected(message)
        } else {
            ParseFailure::Unparsed(message)
        }
    }
}

/// Invalid password session transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordError {
    #[error("no password prompt is open")]
    NotPrompting,

    #[error("no password verification is in flight")]
    NotVerifying,

    #[error("password retry is only possible after a failed or skipped attempt")]
    NothingToRetry,

    #[error("password must not be empty")]
    EmptySecret,
}

/// Errors returned by session commands.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no entry with id {0}")]
    UnknownEntry(EntryId),

    #[error("entry {0} has no readable content yet")]
    NotReadable(EntryId),

    #[error("no entry is selected")]
    NothingSelected,

    #[error("no certificate bundle is loaded")]
    NoBundle,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("session has shut down")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_paths_name_the_offending_field() {
        let err = ValidationError::WrongType {
            index: 2,
            field: "isCA",
            expected: "boolean",
        };
        assert_eq!(err.path(), "certificates[2].isCA");
        assert_eq!(err.to_string(), "certificates[2].isCA is not boolean");
        assert_eq!(ValidationError::NotAnObject(1).path(), "certificates[1]");
    }

    #[test]
    fn failures_with_a_secret_are_password_rejections() {
        assert_eq!(
            ParseFailure::classify(true, "bad mac".into()),
            ParseFailure::PasswordRejected("bad mac".into())
        );
        assert_eq!(
            ParseFailure::classify(false, "bad mac".into()),
            ParseFailure::Unparsed("bad mac".into())
        );
    }

    #[test]
    fn rejected_message_is_verbatim() {
        let err = CollaboratorError::Rejected {
            status: 400,
            message: "unsupported certificate format".into(),
        };
        assert_eq!(err.user_message(), "unsupported certificate format");
    }
}
