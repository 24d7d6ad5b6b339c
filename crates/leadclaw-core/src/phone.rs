//! Phone canonicalization.
//!
//! Mirrors the campaign frontend's rules: strip everything but digits, treat
//! a bare 10-digit number as Mexican, and derive the lead document id from
//! the digits alone.

use crate::error::{LeadClawError, Result};

/// Canonicalize to E.164 (with leading `+`).
///
/// 10 digits → `+52` prefix (MX default). Longer numbers are taken as already
/// carrying a country code.
pub fn to_e164(raw: &str) -> Result<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(LeadClawError::Validation(format!(
            "invalid phone number: '{raw}'"
        )));
    }
    if digits.len() == 10 {
        return Ok(format!("+52{digits}"));
    }
    if digits.len() < 10 || digits.len() > 15 {
        return Err(LeadClawError::Validation(format!(
            "invalid phone number length: '{raw}'"
        )));
    }
    Ok(format!("+{digits}"))
}

/// Canonical digits (no `+`) — the lead id and transport address.
pub fn canonical_digits(raw: &str) -> Result<String> {
    Ok(to_e164(raw)?.trim_start_matches('+').to_string())
}

/// Lead id for a phone in any accepted format.
/// Also accepts ids of the form `<digits>@s.whatsapp.net`.
pub fn lead_id(raw: &str) -> Result<String> {
    let bare = raw.split('@').next().unwrap_or(raw);
    canonical_digits(bare)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_digit_defaults_to_mx() {
        assert_eq!(to_e164("55 1234 5678").unwrap(), "+525512345678");
    }

    #[test]
    fn test_full_number_passthrough() {
        assert_eq!(to_e164("+521 55 1234 5678").unwrap(), "+5215512345678");
        assert_eq!(canonical_digits("5215512345678").unwrap(), "5215512345678");
    }

    #[test]
    fn test_jid_suffix_stripped() {
        assert_eq!(lead_id("5215512345678@s.whatsapp.net").unwrap(), "5215512345678");
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(to_e164("").is_err());
        assert!(to_e164("abc").is_err());
        assert!(to_e164("123").is_err());
    }
}
