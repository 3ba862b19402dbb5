//! Address parsing for the loosely typed address fields of [`MailOptions`].
//!
//! Address fields accept a single `"Name <addr>"` string, a comma separated
//! list of those, an array of strings, or `{ "name": .., "address": .. }`
//! objects (and arrays of them).
//!
//! [`MailOptions`]: crate::MailOptions

use crate::{MailError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Email address with optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// The email address.
    pub email: String,
    /// Optional display name.
    pub name: Option<String>,
}

impl Address {
    /// Create a new address with just an email.
    pub fn new(email: impl Into<String>) -> Result<Self> {
        let email = email.into();
        validate_email(&email)?;
        Ok(Self { email, name: None })
    }

    /// Create a new address with a display name.
    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let email = email.into();
        validate_email(&email)?;
        Ok(Self {
            email,
            name: Some(name.into()),
        })
    }

    /// Parse an address from a string like "Name <email@example.com>" or "email@example.com".
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if let Some(start) = s.find('<')
            && let Some(end) = s.rfind('>')
            && start < end
        {
            let name = s[..start].trim().trim_matches('"');
            let email = s[start + 1..end].trim();

            return if name.is_empty() {
                Self::new(email)
            } else {
                Self::with_name(email, name)
            };
        }

        Self::new(s)
    }

    /// Parse every address held by an address field value.
    pub fn parse_list(value: &Value) -> Result<Vec<Self>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::String(s) => split_list(s)
                .into_iter()
                .map(Self::parse)
                .collect(),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.extend(Self::parse_list(item)?);
                }
                Ok(out)
            }
            Value::Object(map) => {
                let email = map
                    .get("address")
                    .and_then(Value::as_str)
                    .ok_or(MailError::MissingField("address"))?;
                match map.get("name").and_then(Value::as_str) {
                    Some(name) if !name.is_empty() => Self::with_name(email, name).map(|a| vec![a]),
                    _ => Self::new(email).map(|a| vec![a]),
                }
            }
            other => Err(MailError::InvalidAddress(other.to_string())),
        }
    }

    /// Parse a field that must hold exactly one address.
    pub fn parse_single(value: &Value) -> Result<Option<Self>> {
        let mut list = Self::parse_list(value)?;
        match list.len() {
            0 => Ok(None),
            1 => Ok(list.pop()),
            _ => Err(MailError::InvalidAddress(format!(
                "expected a single address, got {}",
                list.len()
            ))),
        }
    }

    /// Get the email address.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Get the display name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn to_lettre(&self) -> Result<lettre::Address> {
        self.email
            .parse()
            .map_err(|_| MailError::InvalidAddress(self.email.clone()))
    }

    pub(crate) fn to_mailbox(&self) -> Result<lettre::message::Mailbox> {
        Ok(lettre::message::Mailbox::new(
            self.name.clone(),
            self.to_lettre()?,
        ))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.email),
            None => write!(f, "{}", self.email),
        }
    }
}

impl TryFrom<&str> for Address {
    type Error = MailError;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split a comma separated address list, ignoring commas inside quoted
/// display names and angle brackets.
fn split_list(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();

    if email.is_empty() {
        return Err(MailError::InvalidAddress(
            "Email cannot be empty".to_string(),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(MailError::InvalidAddress(format!(
            "Invalid email format: {}",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(MailError::InvalidAddress(format!(
            "Invalid email format: {}",
            email
        )));
    }

    Ok(())
}
