use crate::portal::PortalError;

/// What to do after a failed attempt at checking a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Log in again, then retry the contract
    Relogin,
    /// Reset portal navigation, then retry the contract
    ResetAndRetry,
    /// Mark the contract failed for this cycle. `restore_session` asks for a
    /// fresh login so the next contract starts from a live session.
    GiveUp { restore_session: bool },
}

/// Local retries for one contract within a cycle
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// `attempt` is zero-based: the first try is attempt 0
    pub fn decide(&self, attempt: u32, error: &PortalError) -> RetryDecision {
        if attempt >= self.max_retries {
            return RetryDecision::GiveUp {
                restore_session: error.is_session_error(),
            };
        }

        if error.is_session_error() {
            RetryDecision::Relogin
        } else {
            RetryDecision::ResetAndRetry
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}
