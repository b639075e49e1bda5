use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::catalog::KeyKind;
use crate::ValidationError;

const DUNS_LEN: usize = 9;

/// Normalized key a data product is cached and requested under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String")]
pub struct LookupKey(String);

impl LookupKey {
    /// Parse and normalize `input` for the given key kind.
    ///
    /// DUNS numbers lose their dashes, must then be all digits and are
    /// left-padded with zeros to nine characters. Longer numbers pass through
    /// as they are. LEIs are used verbatim.
    pub fn parse(kind: KeyKind, input: &str) -> Result<Self, ValidationError> {
        match kind {
            KeyKind::Duns => {
                let stripped: String = input.chars().filter(|ch| *ch != '-').collect();
                if stripped.is_empty() {
                    return Err(ValidationError::EmptyKey);
                }
                if !stripped.chars().all(|ch| ch.is_ascii_digit()) {
                    return Err(ValidationError::NonNumericDuns { value: stripped });
                }
                Ok(Self(format!("{stripped:0>DUNS_LEN$}")))
            }
            KeyKind::Lei => {
                if input.is_empty() {
                    return Err(ValidationError::EmptyKey);
                }
                Ok(Self(input.to_owned()))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LookupKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LookupKey> for String {
    fn from(value: LookupKey) -> Self {
        value.0
    }
}
