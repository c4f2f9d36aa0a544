//! Setup code: the eight-digit PIN printed on an accessory.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, ValidationError};

/// A validated setup code in `XXX-XX-XXX` form.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SetupCode(String);

impl SetupCode {
    /// Parse `XXX-XX-XXX` or the bare eight digits.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSetupCode`] for any other shape.
    pub fn parse(raw: &str) -> Result<Self, HubError> {
        let raw = raw.trim();
        let bytes = raw.as_bytes();
        let dashes_ok = match bytes.len() {
            8 => !raw.contains('-'),
            10 => bytes[3] == b'-' && bytes[6] == b'-',
            _ => false,
        };
        let digits: String = raw.chars().filter(|c| *c != '-').collect();
        if !dashes_ok || digits.len() != 8 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidSetupCode.into());
        }
        Ok(Self(format!(
            "{}-{}-{}",
            &digits[..3],
            &digits[3..5],
            &digits[5..]
        )))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SetupCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Keep the code out of logs.
impl fmt::Debug for SetupCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SetupCode(***-**-***)")
    }
}

impl FromStr for SetupCode {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SetupCode {
    type Error = HubError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SetupCode> for String {
    fn from(value: SetupCode) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_accept_dashed_form() {
        let code = SetupCode::parse("111-22-333").unwrap();
        assert_eq!(code.as_str(), "111-22-333");
    }

    #[test]
    fn should_normalise_bare_digits() {
        let code: SetupCode = "11122333".parse().unwrap();
        assert_eq!(code.to_string(), "111-22-333");
    }

    #[test]
    fn should_reject_malformed_codes() {
        for raw in ["111-22-33", "1112-2-333", "abc-de-fgh", "", "111-22-3333"] {
            assert!(
                matches!(
                    SetupCode::parse(raw),
                    Err(HubError::Validation(ValidationError::InvalidSetupCode))
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn should_redact_debug_output() {
        let code = SetupCode::parse("111-22-333").unwrap();
        assert!(!format!("{code:?}").contains("111"));
    }
}
