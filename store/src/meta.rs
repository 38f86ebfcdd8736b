//! The `meta.json` record.
//!
//! `ConversationMeta` is the structured twin of `conversation.md`: together the
//! two files are enough to rebuild any derived index, so the record is never a
//! cache of the transcript. It is built once through [`ConversationMetaBuilder`]
//! and exposes no way to change it afterwards.

use crate::errors::{StoreError, StoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Schema version written by the save path.
pub const META_SCHEMA_VERSION: &str = "1.0.0";

/// Lifecycle tag of a stored conversation. Transitions are driven by whoever
/// edits `meta.json`; nothing in this crate moves a conversation between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    /// Still being discussed.
    #[default]
    Active,
    /// Design settled.
    Frozen,
    /// Superseded by a later round.
    Deprecated,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Frozen => "frozen",
            Self::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "frozen" => Ok(Self::Frozen),
            "deprecated" => Ok(Self::Deprecated),
            other => Err(StoreError::Validation(format!(
                "Unknown conversation status: {}",
                other
            ))),
        }
    }
}

/// A stable, referencable decision recorded against a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Identifier within the conversation, e.g. `D1`.
    pub id: String,
    pub text: String,
    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl Decision {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            created_at: Utc::now(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMeta {
    conversation_id: String,
    topic: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    decisions: Vec<Decision>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    status: ConversationStatus,
    version: String,
    #[serde(with = "iso8601")]
    created_at: DateTime<Utc>,
    #[serde(with = "iso8601")]
    updated_at: DateTime<Utc>,
}

impl ConversationMeta {
    pub fn builder(
        conversation_id: impl Into<String>,
        topic: impl Into<String>,
    ) -> ConversationMetaBuilder {
        ConversationMetaBuilder {
            conversation_id: conversation_id.into(),
            topic: topic.into(),
            summary: String::new(),
            decisions: Vec::new(),
            tags: Vec::new(),
            status: ConversationStatus::default(),
            version: META_SCHEMA_VERSION.to_string(),
            created_at: None,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Canonical JSON form: enums as strings, timestamps as ISO-8601.
    pub fn to_json_value(&self) -> StoreResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// The text written to `meta.json`: two-space indented, non-ASCII left as is.
    pub fn to_pretty_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a stored record, re-checking the invariants the builder enforces.
    pub fn from_json_str(json: &str) -> StoreResult<Self> {
        let meta: Self = serde_json::from_str(json)?;
        validate_fields(&meta.conversation_id, &meta.topic)?;
        Ok(meta)
    }
}

/// Collects the optional parts of a [`ConversationMeta`] before validation.
#[derive(Debug, Clone)]
pub struct ConversationMetaBuilder {
    conversation_id: String,
    topic: String,
    summary: String,
    decisions: Vec<Decision>,
    tags: Vec<String>,
    status: ConversationStatus,
    version: String,
    created_at: Option<DateTime<Utc>>,
}

impl ConversationMetaBuilder {
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn decisions(mut self, decisions: Vec<Decision>) -> Self {
        self.decisions = decisions;
        self
    }

    pub fn status(mut self, status: ConversationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Pin the creation instant; `updated_at` starts equal to it.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn build(self) -> StoreResult<ConversationMeta> {
        validate_fields(&self.conversation_id, &self.topic)?;
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        Ok(ConversationMeta {
            conversation_id: self.conversation_id,
            topic: self.topic,
            summary: self.summary,
            decisions: self.decisions,
            tags: self.tags,
            status: self.status,
            version: self.version,
            created_at,
            updated_at: created_at,
        })
    }
}

fn validate_fields(conversation_id: &str, topic: &str) -> StoreResult<()> {
    if conversation_id.is_empty() {
        return Err(StoreError::Validation(
            "conversation_id is required".to_string(),
        ));
    }
    if topic.trim().is_empty() {
        return Err(StoreError::Validation("topic cannot be empty".to_string()));
    }
    Ok(())
}

/// Timestamp format shared by `meta.json` and the transcript header.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

mod iso8601 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
