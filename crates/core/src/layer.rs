//! Context layer domain types.
//!
//! A layer is one fragment of workspace content with a token cost, a tier
//! describing its lifecycle stage, and protection flags that exempt it from
//! automatic eviction. The budget engine owns collections of these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a context layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle stage of a layer, ordered by importance/recency intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerTier {
    /// Always relevant; always counted as protected
    Core,
    /// In active use right now
    Active,
    /// Useful but not current
    Reference,
    /// Kept for the record, first to go
    Archive,
}

impl LayerTier {
    /// Eviction ordering weight: lower evicts first. Core-tier layers are
    /// never eviction candidates; the weight exists so candidate sorting is
    /// a total order.
    pub fn eviction_weight(&self) -> u8 {
        match self {
            LayerTier::Archive => 0,
            LayerTier::Reference => 1,
            LayerTier::Active => 2,
            LayerTier::Core => 3,
        }
    }
}

impl std::fmt::Display for LayerTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LayerTier::Core => "core",
            LayerTier::Active => "active",
            LayerTier::Reference => "reference",
            LayerTier::Archive => "archive",
        };
        write!(f, "{s}")
    }
}

/// Where a layer's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerOrigin {
    User,
    Ai,
    System,
}

/// One stored fragment of workspace context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextLayer {
    /// Unique ID, assigned on insertion
    pub id: LayerId,

    /// Opaque project/workspace identifier
    pub scope: String,

    /// Lifecycle stage
    pub tier: LayerTier,

    /// The text payload
    pub content: String,

    /// Cheap token estimate; recomputed when content changes
    pub estimated_tokens: u64,

    /// Authoritative count from an exact pass, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_tokens: Option<u64>,

    /// Starred layers are exempt from pruning and archival suggestions
    #[serde(default)]
    pub starred: bool,

    /// Immutable layers are exempt from demotion and deletion
    #[serde(default)]
    pub immutable: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Last explicit access (promotion); `None` until first touched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,

    /// Number of explicit accesses
    #[serde(default)]
    pub access_count: u32,

    /// Who produced the content
    pub origin: LayerOrigin,
}

impl ContextLayer {
    /// Create a layer with fresh timestamps and no protection flags.
    pub fn new(
        scope: impl Into<String>,
        tier: LayerTier,
        content: impl Into<String>,
        origin: LayerOrigin,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: LayerId::new(),
            scope: scope.into(),
            tier,
            content: content.into(),
            estimated_tokens: 0,
            actual_tokens: None,
            starred: false,
            immutable: false,
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            access_count: 0,
            origin,
        }
    }

    pub fn with_starred(mut self, starred: bool) -> Self {
        self.starred = starred;
        self
    }

    pub fn with_immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    pub fn with_estimated_tokens(mut self, tokens: u64) -> Self {
        self.estimated_tokens = tokens;
        self
    }

    pub fn with_actual_tokens(mut self, tokens: u64) -> Self {
        self.actual_tokens = Some(tokens);
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }

    pub fn with_last_accessed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_accessed_at = Some(at);
        self
    }

    pub fn with_access_count(mut self, count: u32) -> Self {
        self.access_count = count;
        self
    }

    /// The token cost counted toward the budget: the exact count when
    /// available, the estimate otherwise.
    pub fn effective_tokens(&self) -> u64 {
        self.actual_tokens.unwrap_or(self.estimated_tokens)
    }

    /// Last access time, falling back to creation time for layers that were
    /// never explicitly touched.
    pub fn last_touch(&self) -> DateTime<Utc> {
        self.last_accessed_at.unwrap_or(self.created_at)
    }

    /// Record an explicit access.
    pub fn touch(&mut self) {
        self.last_accessed_at = Some(Utc::now());
        self.access_count = self.access_count.saturating_add(1);
    }

    /// Counted into the protected budget pool: core tier always, starred
    /// layers regardless of tier.
    pub fn is_protected(&self) -> bool {
        self.starred || self.tier == LayerTier::Core
    }
}

/// A partial update to a layer. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerPatch {
    pub content: Option<String>,
    pub tier: Option<LayerTier>,
    pub scope: Option<String>,
    pub starred: Option<bool>,
    pub immutable: Option<bool>,
}

impl LayerPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn tier(tier: LayerTier) -> Self {
        Self {
            tier: Some(tier),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actual_tokens_win_when_present() {
        let layer = ContextLayer::new("ws", LayerTier::Active, "hello", LayerOrigin::User)
            .with_estimated_tokens(100)
            .with_actual_tokens(80);
        assert_eq!(layer.effective_tokens(), 80);

        let estimated_only =
            ContextLayer::new("ws", LayerTier::Active, "hello", LayerOrigin::User)
                .with_estimated_tokens(100);
        assert_eq!(estimated_only.effective_tokens(), 100);
    }

    #[test]
    fn last_touch_falls_back_to_created_at() {
        let layer = ContextLayer::new("ws", LayerTier::Reference, "x", LayerOrigin::System);
        assert_eq!(layer.last_touch(), layer.created_at);

        let accessed = Utc::now();
        let touched = layer.with_last_accessed_at(accessed);
        assert_eq!(touched.last_touch(), accessed);
    }

    #[test]
    fn core_tier_is_always_protected() {
        let core = ContextLayer::new("ws", LayerTier::Core, "x", LayerOrigin::System);
        assert!(core.is_protected());

        let starred = ContextLayer::new("ws", LayerTier::Archive, "x", LayerOrigin::User)
            .with_starred(true);
        assert!(starred.is_protected());

        let plain = ContextLayer::new("ws", LayerTier::Active, "x", LayerOrigin::User);
        assert!(!plain.is_protected());
    }

    #[test]
    fn touch_bumps_access_count() {
        let mut layer = ContextLayer::new("ws", LayerTier::Active, "x", LayerOrigin::Ai);
        layer.touch();
        layer.touch();
        assert_eq!(layer.access_count, 2);
        assert!(layer.last_accessed_at.is_some());
    }

    #[test]
    fn eviction_weight_orders_archive_first() {
        assert!(LayerTier::Archive.eviction_weight() < LayerTier::Reference.eviction_weight());
        assert!(LayerTier::Reference.eviction_weight() < LayerTier::Active.eviction_weight());
        assert!(LayerTier::Active.eviction_weight() < LayerTier::Core.eviction_weight());
    }

    #[test]
    fn layer_serialization_roundtrip() {
        let layer = ContextLayer::new("ws", LayerTier::Reference, "notes", LayerOrigin::Ai)
            .with_estimated_tokens(12)
            .with_starred(true);
        let json = serde_json::to_string(&layer).unwrap();
        assert!(json.contains("\"reference\""));
        let back: ContextLayer = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, layer.id);
        assert!(back.starred);
        assert_eq!(back.estimated_tokens, 12);
    }
}
