//! Player handle validation
//!
//! Syntactic rules only. Uniqueness is checked by the session manager against
//! the live roster.

/// Minimum handle length (inclusive)
pub const MIN_LEN: usize = 5;
/// Maximum handle length (inclusive)
pub const MAX_LEN: usize = 20;

/// A single rule broken by a candidate handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandleViolation {
    #[error("handle must be at least 5 characters")]
    TooShort,
    #[error("handle must be at most 20 characters")]
    TooLong,
    #[error("handle may only contain letters and digits")]
    InvalidCharacters,
}

/// Outcome of validating a handle. Violations are kept in rule order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleValidation {
    pub valid: bool,
    pub errors: Vec<HandleViolation>,
}

impl HandleValidation {
    /// The violation surfaced to the user, if any
    pub fn first_error(&self) -> Option<HandleViolation> {
        self.errors.first().copied()
    }

    /// Convert into a `Result`, failing fast on the first violation
    pub fn into_result(self) -> Result<(), HandleViolation> {
        match self.first_error() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }
}

/// Check a candidate handle against every rule
pub fn validate(candidate: &str) -> HandleValidation {
    let mut errors = Vec::new();
    // Counts chars, not UTF-16 units. Only non-ASCII input can differ, and
    // that is rejected as InvalidCharacters either way.
    let len = candidate.chars().count();

    if len < MIN_LEN {
        errors.push(HandleViolation::TooShort);
    }
    if len > MAX_LEN {
        errors.push(HandleViolation::TooLong);
    }
    // Empty input fails the pattern too: one or more alphanumerics required
    if candidate.is_empty() || !candidate.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        errors.push(HandleViolation::InvalidCharacters);
    }

    HandleValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Strip everything but ASCII letters and digits from raw user input
pub fn sanitize_input(raw: &str) -> String {
    raw.chars().filter(|ch| ch.is_ascii_alphanumeric()).collect()
}

/// Whether two handles are the same for uniqueness purposes
pub fn handles_collide(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
