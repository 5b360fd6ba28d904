use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_SYMBOL_LEN: usize = 10;

/// A validated, upper-cased ticker symbol.
///
/// The matching core only ever sees well-formed symbols; the pattern
/// check (`[A-Z0-9.-]{1,10}` after upper-casing) happens here at the
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let upper = raw.as_ref().trim().to_uppercase();
        if upper.is_empty() || upper.len() > MAX_SYMBOL_LEN {
            return Err(ValidationError::InvalidSymbol(upper));
        }
        if !upper
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
        {
            return Err(ValidationError::InvalidSymbol(upper));
        }
        Ok(Self(upper))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::new(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
