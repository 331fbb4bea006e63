use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated principal as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    pub fn new<S: Into<String>>(uid: S) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
        }
    }

    pub fn with_display_name<S: Into<String>>(mut self, name: S) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Host-level network reachability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Subscription plan attached to a profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Producer,
    Studio,
}

impl PlanTier {
    /// Parse a stored plan name; unknown names fall back to the free plan
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "producer" => Self::Producer,
            "studio" => Self::Studio,
            _ => Self::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Producer => "producer",
            Self::Studio => "studio",
        }
    }
}

/// Profile counters that can be adjusted through [`crate::CounterWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterField {
    /// Uploaded media files (`beatsCount`)
    MediaCount,
    /// Produced artifacts such as showcase videos (`showcasesCount`)
    ArtifactCount,
}

impl CounterField {
    /// Field name in the durable document
    pub fn document_field(&self) -> &'static str {
        match self {
            Self::MediaCount => "beatsCount",
            Self::ArtifactCount => "showcasesCount",
        }
    }
}

/// Durable per-identity account record as the document store keeps it.
///
/// Every field is optional: documents written by older clients or by hand may
/// be missing any of them, and readers fill the gaps field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beats_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub showcases_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ProfileDocument {
    pub fn counter(&self, field: CounterField) -> Option<i64> {
        match field {
            CounterField::MediaCount => self.beats_count,
            CounterField::ArtifactCount => self.showcases_count,
        }
    }

    pub fn add_to_counter(&mut self, field: CounterField, delta: i64) {
        let slot = match field {
            CounterField::MediaCount => &mut self.beats_count,
            CounterField::ArtifactCount => &mut self.showcases_count,
        };
        *slot = Some(slot.unwrap_or(0) + delta);
    }
}

/// In-memory view of a profile with every field resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub plan: PlanTier,
    pub media_count: i64,
    pub artifact_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// Fallback display name when neither the document nor the identity has one
    pub const DEFAULT_DISPLAY_NAME: &'static str = "User";

    /// Synthesized default for an identity: free plan, zero counters
    pub fn default_for(identity: &Identity) -> Self {
        Self {
            id: identity.uid.clone(),
            display_name: identity
                .display_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| Self::DEFAULT_DISPLAY_NAME.to_string()),
            email: identity.email.clone().unwrap_or_default(),
            plan: PlanTier::Free,
            media_count: 0,
            artifact_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Resolve a stored document, falling back to identity-supplied defaults
    /// for each missing (or empty) field
    pub fn from_document(identity: &Identity, doc: &ProfileDocument) -> Self {
        let defaults = Self::default_for(identity);
        Self {
            id: identity.uid.clone(),
            display_name: doc
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or(defaults.display_name),
            email: doc
                .email
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or(defaults.email),
            plan: doc
                .subscription
                .as_deref()
                .map(PlanTier::parse)
                .unwrap_or(defaults.plan),
            media_count: doc.beats_count.unwrap_or(0),
            artifact_count: doc.showcases_count.unwrap_or(0),
            created_at: doc.created_at.unwrap_or(defaults.created_at),
        }
    }

    pub fn to_document(&self) -> ProfileDocument {
        ProfileDocument {
            name: Some(self.display_name.clone()),
            email: Some(self.email.clone()),
            subscription: Some(self.plan.as_str().to_string()),
            beats_count: Some(self.media_count),
            showcases_count: Some(self.artifact_count),
            created_at: Some(self.created_at),
        }
    }

    pub fn counter(&self, field: CounterField) -> i64 {
        match field {
            CounterField::MediaCount => self.media_count,
            CounterField::ArtifactCount => self.artifact_count,
        }
    }

    pub fn add_to_counter(&mut self, field: CounterField, delta: i64) {
        match field {
            CounterField::MediaCount => self.media_count += delta,
            CounterField::ArtifactCount => self.artifact_count += delta,
        }
    }
}

/// Unique identifier for a catalog record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaRecordId(pub String);

impl MediaRecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MediaRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MediaRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog entry describing one uploaded media file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub owner: String,
    pub title: String,
    pub bpm: u32,
    pub key: String,
    pub genre: String,
    pub upload_date: DateTime<Utc>,
    pub audio_url: String,
    pub storage_key: String,
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_fields_fall_back_individually() {
        let identity = Identity::new("u1")
            .with_display_name("Dee")
            .with_email("dee@example.com");
        let doc = ProfileDocument {
            name: None,
            email: Some(String::new()),
            subscription: Some("studio".into()),
            beats_count: Some(4),
            ..Default::default()
        };

        let profile = Profile::from_document(&identity, &doc);
        assert_eq!(profile.display_name, "Dee");
        assert_eq!(profile.email, "dee@example.com");
        assert_eq!(profile.plan, PlanTier::Studio);
        assert_eq!(profile.media_count, 4);
        assert_eq!(profile.artifact_count, 0);
    }

    #[test]
    fn test_anonymous_identity_gets_placeholder_name() {
        let profile = Profile::default_for(&Identity::new("u2"));
        assert_eq!(profile.display_name, Profile::DEFAULT_DISPLAY_NAME);
        assert_eq!(profile.email, "");
        assert_eq!(profile.plan, PlanTier::Free);
    }

    #[test]
    fn test_document_uses_stored_field_names() {
        let mut doc = ProfileDocument::default();
        doc.add_to_counter(CounterField::MediaCount, 1);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json, serde_json::json!({ "beatsCount": 1 }));
    }
}
