use std::fmt;

use uuid::Uuid;

// ---------------------------------------------------------------------------
// PeerAddr
// ---------------------------------------------------------------------------

/// Address of a local or remote participant.
///
/// `account` identifies the person; `endpoint` identifies one signed-in
/// instance of that account and doubles as the transport routing hint.
/// Two addresses that share an account are *siblings*: a transport to one
/// endpoint is usable for a session with any of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    // ---
    pub account: String,
    pub endpoint: Option<Uuid>,
}

// ---

impl PeerAddr {
    // ---
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            endpoint: None,
        }
    }

    // ---

    pub fn with_endpoint(account: impl Into<String>, endpoint: Uuid) -> Self {
        Self {
            account: account.into(),
            endpoint: Some(endpoint),
        }
    }

    // ---

    /// `true` when both addresses belong to the same account.
    pub fn is_sibling(&self, other: &PeerAddr) -> bool {
        self.account.eq_ignore_ascii_case(&other.account)
    }

    // ---

    /// Case-folded account name, used as the registry key.
    pub fn account_key(&self) -> String {
        self.account.to_ascii_lowercase()
    }
}

// ---

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.endpoint {
            Some(ep) => write!(f, "{};{{{ep}}}", self.account),
            None => f.write_str(&self.account),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn siblings_ignore_case_and_endpoint() {
        // ---
        let a = PeerAddr::with_endpoint("Alice@example.com", Uuid::new_v4());
        let b = PeerAddr::with_endpoint("alice@EXAMPLE.com", Uuid::new_v4());
        let c = PeerAddr::new("bob@example.com");

        assert!(a.is_sibling(&b));
        assert!(!a.is_sibling(&c));
        assert_eq!(a.account_key(), b.account_key());
    }
}
