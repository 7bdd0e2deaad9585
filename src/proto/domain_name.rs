use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use bytes::BufMut;
use thiserror::Error;

pub const MAX_LABEL_LENGTH: usize = 63;
pub const MAX_NAME_LENGTH: usize = 253;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainNameError {
    #[error("The label '{0}' is too long. A label can be at most {MAX_LABEL_LENGTH} bytes.")]
    LabelTooLong(String),
    #[error("The domain name is {0} bytes long, expected at most {MAX_NAME_LENGTH}.")]
    NameTooLong(usize),
    #[error("The domain name contains an empty label")]
    EmptyLabel,
    #[error(
        "The character code of {0:#04x} is not allowed in a label. Expected A-Z, a-z, 0-9, -, and _."
    )]
    IllegalLabelChar(u8),
}

/// A validated domain name in dotted form, without the trailing dot. The root is empty.
///
/// Comparison and hashing ignore ASCII case, the same way name servers match names.
#[derive(Clone)]
pub struct DomainName(Arc<str>);

impl DomainName {
    pub fn new(name: &str) -> Result<Self, DomainNameError> {
        let name = name.strip_suffix('.').unwrap_or(name);
        if name.len() > MAX_NAME_LENGTH {
            return Err(DomainNameError::NameTooLong(name.len()));
        }
        if !name.is_empty() {
            for label in name.split('.') {
                validate_label(label)?;
            }
        }
        Ok(Self(Arc::from(name)))
    }

    pub fn root() -> Self {
        Self(Arc::from(""))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|label| !label.is_empty())
    }

    /// The name as lower case ASCII, for use as a lookup key.
    pub fn to_lowercase(&self) -> Self {
        Self(Arc::from(self.0.to_ascii_lowercase()))
    }

    /// Whether `self` is `other` or lies below it in the tree.
    pub fn is_subdomain_of(&self, other: &DomainName) -> bool {
        if other.is_root() || self == other {
            return true;
        }
        let (name, parent) = (self.as_str(), other.as_str());
        name.len() > parent.len()
            && name.as_bytes()[name.len() - parent.len() - 1] == b'.'
            && name[name.len() - parent.len()..].eq_ignore_ascii_case(parent)
    }

    pub fn len_in_packet(&self) -> usize {
        1 + self.labels().map(|label| label.len() + 1).sum::<usize>()
    }

    /// Encode as a sequence of length prefixed labels. Names are never compressed.
    pub fn write_into<B: BufMut>(&self, buffer: &mut B) {
        for label in self.labels() {
            buffer.put_u8(label.len() as u8);
            buffer.put_slice(label.as_bytes());
        }
        buffer.put_u8(0);
    }
}

fn validate_label(label: &str) -> Result<(), DomainNameError> {
    use DomainNameError::*;

    let bytes = label.as_bytes();
    if bytes.is_empty() {
        return Err(EmptyLabel);
    }
    if bytes.len() > MAX_LABEL_LENGTH {
        return Err(LabelTooLong(label.to_owned()));
    }
    for (i, c) in bytes.iter().enumerate() {
        match c {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' => {}
            b'-' if i != 0 && i + 1 != bytes.len() => {}
            c => return Err(IllegalLabelChar(*c)),
        }
    }
    Ok(())
}

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for DomainName {}

impl PartialEq<str> for DomainName {
    fn eq(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.strip_suffix('.').unwrap_or(other))
    }
}

impl PartialEq<&str> for DomainName {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl Hash for DomainName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.0.as_bytes() {
            state.write_u8(c.to_ascii_lowercase());
        }
        state.write_u8(0);
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, ".")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<ROOT>")
        } else {
            write!(f, "\"{}\"", self.0)
        }
    }
}
