//! Usage keys and usage strings.
//!
//! A [`UsageKey`] names the thing being looked up: a bare internal class name
//! (`a/b/C`) or a member (`a/b/C:name:descriptor`). A [`UsageString`] names the
//! site a reference was found in and carries a one-letter tag:
//!
//! - `c:<class>` for class-level sites
//! - `m:<class>:<name>:<descriptor>` for method sites
//! - `f:<class>:<name>:<descriptor>` for field sites
//!
//! Both encodings are stable and are exchanged verbatim with shards and
//! consumers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    pub fn is_method(&self) -> bool {
        self.descriptor.starts_with('(')
    }

    /// Owner ends at the first `:` and the descriptor starts after the last
    /// one, so member names containing `:` survive a round trip.
    fn parse(raw: &str) -> Result<Self, UsageParseError> {
        let malformed = || UsageParseError::Malformed(raw.to_string());
        let (owner, rest) = raw.split_once(':').ok_or_else(malformed)?;
        let (name, descriptor) = rest.rsplit_once(':').ok_or_else(malformed)?;
        if owner.is_empty() || name.is_empty() || descriptor.is_empty() {
            return Err(malformed());
        }
        Ok(Self::new(owner, name, descriptor))
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.owner, self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageParseError {
    #[error("empty usage key")]
    Empty,
    #[error("malformed usage encoding: {0}")]
    Malformed(String),
    #[error("unknown usage tag in: {0}")]
    UnknownTag(String),
}

/// Lookup target. Member keys do not say whether they name a method or a
/// field; callers know which one they asked for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum UsageKey {
    Class(String),
    Member(MemberRef),
}

impl UsageKey {
    pub fn class(name: impl Into<String>) -> Self {
        Self::Class(name.into())
    }

    pub fn member(owner: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self::Member(MemberRef::new(owner, name, descriptor))
    }

    /// Short form for display: the simple class name, plus `.member` and the
    /// descriptor for methods.
    pub fn label(&self) -> String {
        match self {
            UsageKey::Class(name) => simple_name(name).to_string(),
            UsageKey::Member(member) if member.is_method() => format!(
                "{}.{}{}",
                simple_name(&member.owner),
                member.name,
                member.descriptor
            ),
            UsageKey::Member(member) => format!("{}.{}", simple_name(&member.owner), member.name),
        }
    }
}

impl fmt::Display for UsageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageKey::Class(name) => f.write_str(name),
            UsageKey::Member(member) => write!(f, "{member}"),
        }
    }
}

impl FromStr for UsageKey {
    type Err = UsageParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(UsageParseError::Empty);
        }
        if raw.contains(':') {
            return MemberRef::parse(raw).map(UsageKey::Member);
        }
        Ok(UsageKey::Class(raw.to_string()))
    }
}

impl From<UsageKey> for String {
    fn from(key: UsageKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for UsageKey {
    type Error = UsageParseError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

/// The site that contains a reference, not the position inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum UsageString {
    Class(String),
    Method(MemberRef),
    Field(MemberRef),
}

impl UsageString {
    pub fn class(&self) -> &str {
        match self {
            UsageString::Class(name) => name,
            UsageString::Method(member) | UsageString::Field(member) => &member.owner,
        }
    }

    pub fn label(&self) -> String {
        match self {
            UsageString::Class(name) => name.clone(),
            UsageString::Method(member) => format!("{}{}", member.name, member.descriptor),
            UsageString::Field(member) => member.name.clone(),
        }
    }

    /// Archive entry holding the outer class of this site.
    pub fn target_entry(&self) -> String {
        let class = self.class();
        let outer = class.split('$').next().unwrap_or(class);
        format!("{outer}.class")
    }
}

impl fmt::Display for UsageString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageString::Class(name) => write!(f, "c:{name}"),
            UsageString::Method(member) => write!(f, "m:{member}"),
            UsageString::Field(member) => write!(f, "f:{member}"),
        }
    }
}

impl FromStr for UsageString {
    type Err = UsageParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = raw.strip_prefix("c:") {
            if rest.is_empty() || rest.contains(':') {
                return Err(UsageParseError::Malformed(raw.to_string()));
            }
            return Ok(UsageString::Class(rest.to_string()));
        }
        if let Some(rest) = raw.strip_prefix("m:") {
            return MemberRef::parse(rest).map(UsageString::Method);
        }
        if let Some(rest) = raw.strip_prefix("f:") {
            return MemberRef::parse(rest).map(UsageString::Field);
        }
        Err(UsageParseError::UnknownTag(raw.to_string()))
    }
}

impl From<UsageString> for String {
    fn from(usage: UsageString) -> Self {
        usage.to_string()
    }
}

impl TryFrom<String> for UsageString {
    type Error = UsageParseError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

/// Resolves either an encoded usage string or a bare class name to the entry
/// that should be opened for it.
pub fn target_entry_for(raw: &str) -> String {
    match raw.parse::<UsageString>() {
        Ok(usage) => usage.target_entry(),
        Err(_) => UsageString::Class(raw.to_string()).target_entry(),
    }
}

fn simple_name(internal: &str) -> &str {
    internal.rsplit('/').next().unwrap_or(internal)
}
