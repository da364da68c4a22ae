//! Field-name-based PII redaction, applied before a log line is emitted.

/// Field names whose values are replaced with `"[REDACTED]"` rather than
/// logged verbatim. Matched case-insensitively against the tracing field
/// name, so `contains_pii`-flagged attributes (e.g. `email`, `token`) never
/// reach stdout regardless of which span or event they were recorded on.
const PII_FIELD_NAMES: &[&str] = &[
    "email",
    "password",
    "token",
    "api_key",
    "apikey",
    "secret",
    "authorization",
    "ssn",
    "phone",
    "address",
    "credit_card",
];

pub const REDACTED: &str = "[REDACTED]";

pub fn is_pii_field(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    PII_FIELD_NAMES.iter().any(|pii| lower.contains(pii))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_pii_fields_case_insensitively() {
        assert!(is_pii_field("Email"));
        assert!(is_pii_field("user_password"));
        assert!(is_pii_field("AUTH_TOKEN"));
    }

    #[test]
    fn leaves_ordinary_fields_alone() {
        assert!(!is_pii_field("operation"));
        assert!(!is_pii_field("status"));
        assert!(!is_pii_field("duration_ms"));
    }
}
