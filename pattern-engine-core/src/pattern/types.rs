//! The `Pattern` data model: a durable, content-addressed unit of reusable
//! development knowledge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

use crate::config::TrustLevel;

/// Current schema version. The loader accepts any version <= this and
/// rewrites to this version on next save.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Tags {
    pub confirmed: BTreeSet<String>,
    pub inferred: Vec<InferredTag>,
    pub negative: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferredTag {
    pub tag: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Applies {
    pub languages: BTreeSet<String>,
    pub frameworks: BTreeSet<String>,
    pub file_patterns: Vec<String>,
    pub keywords: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    pub trust: TrustLevel,
    pub hash: String,
    pub reviewed: bool,
}

impl Default for Security {
    fn default() -> Self {
        Self {
            trust: TrustLevel::Community,
            hash: String::new(),
            reviewed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learning {
    pub effectiveness: f32,
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,
}

impl Default for Learning {
    fn default() -> Self {
        Self {
            effectiveness: 0.5,
            usage_count: 0,
            last_used: None,
        }
    }
}

/// Lifecycle status. Transitions: `active -> deprecated -> archived ->
/// deleted`, plus reactivation `archived -> active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Active,
    Deprecated,
    Archived,
    Deleted,
}

impl LifecycleStatus {
    /// Whether `self -> next` is an allowed lifecycle transition.
    #[must_use]
    pub fn can_transition_to(self, next: LifecycleStatus) -> bool {
        use LifecycleStatus::{Active, Archived, Deleted, Deprecated};
        matches!(
            (self, next),
            (Active, Deprecated)
                | (Active, Archived)
                | (Deprecated, Archived)
                | (Archived, Deleted)
                | (Archived, Active)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub status: LifecycleStatus,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub deprecation_reason: Option<String>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: LifecycleStatus::Active,
            created: now,
            updated: now,
            deprecation_reason: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Relations {
    pub supersedes: Option<Uuid>,
    pub related: BTreeSet<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Health {
    pub score: f32,
    pub last_consolidated: Option<DateTime<Utc>>,
}

/// A single reusable pattern: durable advice, debugging tip, or convention
/// captured from prior sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub content: String,

    pub tags: Tags,
    pub applies: Applies,
    pub security: Security,
    pub learning: Learning,
    pub lifecycle: Lifecycle,
    pub relations: Relations,
    pub health: Health,

    pub schema_version: u32,
}

/// Maximum content size, per the data model's bound.
pub const MAX_CONTENT_BYTES: usize = 50_000;

impl Pattern {
    /// Construct a new active pattern, computing its initial content hash.
    /// Fails if `content` exceeds the size bound.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, String> {
        let content = content.into();
        if content.len() > MAX_CONTENT_BYTES {
            return Err(format!(
                "content exceeds {MAX_CONTENT_BYTES} bytes ({} given)",
                content.len()
            ));
        }
        let hash = content_hash(&content);
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            content,
            tags: Tags::default(),
            applies: Applies::default(),
            security: Security {
                hash,
                ..Security::default()
            },
            learning: Learning::default(),
            lifecycle: Lifecycle::new(now),
            relations: Relations::default(),
            health: Health::default(),
            schema_version: CURRENT_SCHEMA_VERSION,
        })
    }

    /// Recompute and store the content hash. Must be called as the final
    /// step of any mutation that changes `content`, after any sanitizer
    /// strip action, so a subsequent hash mismatch always indicates
    /// out-of-band tampering rather than an ordering bug.
    pub fn rehash(&mut self) {
        self.security.hash = content_hash(&self.content);
    }

    /// Whether the stored hash matches the current content.
    #[must_use]
    pub fn hash_matches(&self) -> bool {
        self.security.hash == content_hash(&self.content)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lifecycle.status == LifecycleStatus::Active
    }

    /// Filesystem-safe slug derived from `name`, used as the filename stem.
    #[must_use]
    pub fn slug(&self) -> String {
        self.name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect()
    }

    /// All pattern ids this pattern references via `relations.*`.
    #[must_use]
    pub fn referenced_ids(&self) -> HashSet<Uuid> {
        let mut set: HashSet<Uuid> = self.relations.related.iter().copied().collect();
        if let Some(s) = self.relations.supersedes {
            set.insert(s);
        }
        set
    }
}

fn content_hash(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(content.as_bytes());
    format!("{digest:x}")
}
