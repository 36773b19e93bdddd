use serde::Serialize;

use crate::error::PasswordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PasswordPhase {
    #[default]
    Idle,
    Prompting,
    Verifying,
    Resolved,
    Failed,
    Skipped,
}

/// Password gate for the selected entry.
///
/// The prompt is visible exactly when `might_need_password && !attempted`.
/// A failed verification clears `attempted` again, which re-opens the prompt
/// while `attempt_count` keeps counting.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSession {
    phase: PasswordPhase,
    might_need_password: bool,
    attempted: bool,
    #[serde(skip)]
    secret: Option<String>,
    error: Option<String>,
    attempt_count: u32,
}

impl PasswordSession {
    pub fn phase(&self) -> PasswordPhase {
        self.phase
    }

    pub fn might_need_password(&self) -> bool {
        self.might_need_password
    }

    pub fn attempted(&self) -> bool {
        self.attempted
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn prompt_visible(&self) -> bool {
        self.might_need_password && !self.attempted
    }

    /// Re-arm for a newly selected entry. Attempt history is per entry.
    pub fn arm(&mut self, might_need_password: bool) {
        *self = Self {
            might_need_password,
            phase: if might_need_password {
                PasswordPhase::Prompting
            } else {
                PasswordPhase::Idle
            },
            ..Self::default()
        };
    }

    pub fn submit(&mut self, secret: &str) -> Result<(), PasswordError> {
        if secret.is_empty() {
            return Err(PasswordError::EmptySecret);
        }
        if !self.prompt_visible()
            || !matches!(self.phase, PasswordPhase::Prompting | PasswordPhase::Failed)
        {
            return Err(PasswordError::NotPrompting);
        }
        self.phase = PasswordPhase::Verifying;
        self.secret = Some(secret.to_string());
        self.attempted = true;
        self.attempt_count += 1;
        Ok(())
    }

    pub fn resolve(&mut self) -> Result<(), PasswordError> {
        if self.phase != PasswordPhase::Verifying {
            return Err(PasswordError::NotVerifying);
        }
        self.phase = PasswordPhase::Resolved;
        self.attempted = true;
        self.error = None;
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), PasswordError> {
        if self.phase != PasswordPhase::Verifying {
            return Err(PasswordError::NotVerifying);
        }
        self.phase = PasswordPhase::Failed;
        self.attempted = false;
        self.error = Some(message.into());
        Ok(())
    }

    pub fn skip(&mut self) -> Result<(), PasswordError> {
        if !self.prompt_visible() {
            return Err(PasswordError::NotPrompting);
        }
        self.phase = PasswordPhase::Skipped;
        self.attempted = true;
        self.error = None;
        Ok(())
    }

    pub fn retry(&mut self) -> Result<(), PasswordError> {
        if !matches!(self.phase, PasswordPhase::Failed | PasswordPhase::Skipped) {
            return Err(PasswordError::NothingToRetry);
        }
        self.phase = PasswordPhase::Prompting;
        self.attempted = false;
        self.error = None;
        self.secret = None;
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
