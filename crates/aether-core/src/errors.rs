/// Why a provider call failed internally.
///
/// Never escapes a provider: each implementation renders its failure
/// into a short diagnostic string delivered as ordinary reply content,
/// so the round loop and its observers see a completed phase rather
/// than an error. Timeout is kept distinct from backend failures so the
/// diagnostic can say which one happened.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ProviderFailure {
    #[error("request timed out after {budget_secs}s")]
    Timeout { budget_secs: u64 },

    #[error("{0}")]
    Backend(String),
}

impl ProviderFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classification() {
        assert!(ProviderFailure::Timeout { budget_secs: 120 }.is_timeout());
        assert!(!ProviderFailure::backend("connection refused").is_timeout());
    }

    #[test]
    fn display_messages() {
        let timeout = ProviderFailure::Timeout { budget_secs: 60 };
        assert_eq!(timeout.to_string(), "request timed out after 60s");

        let backend = ProviderFailure::backend("connection refused");
        assert_eq!(backend.to_string(), "connection refused");
    }
}
