//! Common types for TextBlast

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Unique identifier for mailings
pub type MailingId = i64;

/// Unique identifier for clients
pub type ClientId = i64;

/// Unique identifier for messages
pub type MessageId = i64;

/// Unique identifier for mailing tags
pub type TagId = i64;

/// Mobile operator code (e.g. 900, 910)
pub type OperatorCode = i32;

/// HTTP-style status code returned by the delivery endpoint
pub type StatusCode = u16;

/// A validated mobile phone number in the 7XXXXXXXXXX range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct PhoneNumber(i64);

impl PhoneNumber {
    /// Lowest accepted number
    pub const MIN: i64 = 70_000_000_000;
    /// Highest accepted number
    pub const MAX: i64 = 79_999_999_999;

    /// Create a phone number, validating the numeric range
    pub fn new(value: i64) -> crate::Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(crate::Error::Validation(format!(
                "Phone number {} outside range {}..={}",
                value,
                Self::MIN,
                Self::MAX
            )))
        }
    }

    /// Get the raw numeric value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for PhoneNumber {
    type Error = crate::Error;

    fn try_from(value: i64) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<PhoneNumber> for i64 {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PhoneNumber {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let value: i64 = s
            .parse()
            .map_err(|_| crate::Error::Validation(format!("Invalid phone number: {}", s)))?;
        Self::new(value)
    }
}

/// Validate an IANA timezone name (e.g. "Europe/Amsterdam")
pub fn validate_timezone(timezone: &str) -> crate::Result<()> {
    chrono_tz::Tz::from_str(timezone)
        .map(|_| ())
        .map_err(|_| crate::Error::Validation(format!("Timezone doesn't exist: {}", timezone)))
}
