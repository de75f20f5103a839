//! Identifiers and track references handled by the orchestrator.

use std::fmt;

/// Identity of the group a session belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<u64> for GroupId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Unresolved reference to a track or collection, as supplied by a command.
///
/// Opaque to the orchestrator: only the resolver interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlayableRef(String);

impl PlayableRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PlayableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayableRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PlayableRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A reference resolved just before playback: display title plus a
/// transport-ready stream location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub title: String,
    pub stream_url: String,
}

impl ResolvedTrack {
    pub fn new(title: impl Into<String>, stream_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            stream_url: stream_url.into(),
        }
    }
}
