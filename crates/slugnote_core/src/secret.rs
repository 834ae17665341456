//! Shared-secret tokens for the revalidation hook and admin sessions.

use std::fmt::{Debug, Formatter};

/// Configured secret compared in constant time.
///
/// An empty secret never verifies.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn is_configured(&self) -> bool {
        !self.0.is_empty()
    }

    /// Checks a presented token against the configured secret.
    pub fn verify(&self, presented: &str) -> bool {
        self.is_configured() && constant_time_eq(&self.0, presented.trim())
    }
}

impl Debug for SecretToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // never print the secret itself
        f.debug_tuple("SecretToken")
            .field(&if self.is_configured() { "<set>" } else { "<unset>" })
            .finish()
    }
}

/// Byte comparison whose running time depends only on the longer input.
pub fn constant_time_eq(expected: &str, presented: &str) -> bool {
    let expected_bytes = expected.as_bytes();
    let presented_bytes = presented.as_bytes();
    let max_len = expected_bytes.len().max(presented_bytes.len());
    let mut diff = expected_bytes.len() ^ presented_bytes.len();

    for idx in 0..max_len {
        let left = expected_bytes.get(idx).copied().unwrap_or(0);
        let right = presented_bytes.get(idx).copied().unwrap_or(0);
        diff |= usize::from(left ^ right);
    }

    diff == 0
}

#[cfg(test)]
mod tests {
    use super::{constant_time_eq, SecretToken};

    #[test]
    fn verifies_only_exact_token() {
        let token = SecretToken::new("s3cret");
        assert!(token.verify("s3cret"));
        assert!(!token.verify("s3cre"));
        assert!(!token.verify("s3cret!"));
        assert!(!token.verify(""));
    }

    #[test]
    fn unset_token_rejects_everything() {
        let token = SecretToken::new("   ");
        assert!(!token.is_configured());
        assert!(!token.verify(""));
        assert!(!token.verify("   "));
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(!constant_time_eq("", "a"));
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", SecretToken::new("hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
