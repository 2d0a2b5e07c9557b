//! Fallback trigger conditions.
//!
//! A condition is a set of HTTP status codes plus a negation flag, written
//! in configuration as `"404,410"` or `"!200,302"`. It is parsed once when
//! the owning service is built and never changes afterwards.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Condition used when a service does not set `fallback_if_rc`.
pub const DEFAULT_CONDITION: &str = "404";

/// Error returned when a condition string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("condition lists no status codes")]
    Empty,

    #[error("invalid status code {0:?}: expected three digits between 100 and 599")]
    InvalidCode(String),
}

/// Parsed fallback condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionSpec {
    codes: BTreeSet<u16>,
    negated: bool,
}

impl ConditionSpec {
    /// Build a condition from already-numeric codes.
    ///
    /// Unlike [`ConditionSpec::parse`] an empty set is accepted: a negated
    /// empty condition matches every status.
    pub fn from_codes(
        codes: impl IntoIterator<Item = u16>,
        negated: bool,
    ) -> Result<Self, ConditionError> {
        let codes = codes
            .into_iter()
            .map(|code| {
                if (100..=599).contains(&code) {
                    Ok(code)
                } else {
                    Err(ConditionError::InvalidCode(code.to_string()))
                }
            })
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { codes, negated })
    }

    /// Parse `"<codes>"` or `"!<codes>"`.
    pub fn parse(raw: &str) -> Result<Self, ConditionError> {
        let (negated, list) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        if list.is_empty() {
            return Err(ConditionError::Empty);
        }
        let codes = list
            .split(',')
            .map(parse_code)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { codes, negated })
    }

    /// Whether a response with `status` should fall back.
    pub fn evaluate(&self, status: u16) -> bool {
        if self.codes.contains(&status) {
            !self.negated
        } else {
            self.negated
        }
    }

    /// Configured codes in ascending order.
    pub fn codes(&self) -> impl Iterator<Item = u16> + '_ {
        self.codes.iter().copied()
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }
}

impl Default for ConditionSpec {
    fn default() -> Self {
        Self {
            codes: BTreeSet::from([404]),
            negated: false,
        }
    }
}

impl FromStr for ConditionSpec {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConditionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("!")?;
        }
        for (i, code) in self.codes.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{code}")?;
        }
        Ok(())
    }
}

fn parse_code(token: &str) -> Result<u16, ConditionError> {
    match token.as_bytes() {
        [hundreds @ b'1'..=b'5', tens @ b'0'..=b'9', units @ b'0'..=b'9'] => Ok(
            u16::from(hundreds - b'0') * 100 + u16::from(tens - b'0') * 10 + u16::from(units - b'0'),
        ),
        _ => Err(ConditionError::InvalidCode(token.to_string())),
    }
}
