//! Thread-safe context budget engine — owns the layer collection, tracks
//! token usage against the ceiling, and drives promotion, demotion,
//! archival and automatic pruning.

use crate::estimator::HeuristicEstimator;
use crate::snapshot::BudgetSnapshot;
use chrono::{Duration, Utc};
use deskhive_core::{
    ContextError, ContextLayer, DomainEvent, EventBus, LayerId, LayerOrigin, LayerPatch,
    LayerTier, TokenEstimator,
};
use std::sync::{Arc, RwLock};

/// Default token ceiling.
const DEFAULT_MAX_TOKENS: u64 = 200_000;
/// Fraction of the ceiling at which the snapshot reports `warning`.
const DEFAULT_WARNING_THRESHOLD: f64 = 0.85;
/// Fraction of the ceiling at which the snapshot reports `critical`.
const DEFAULT_CRITICAL_THRESHOLD: f64 = 0.95;

/// Days without access before a layer is suggested for archival.
const ARCHIVE_AFTER_DAYS: i64 = 30;
/// Access count at or above which a stale layer is no longer suggested.
const ARCHIVE_MAX_ACCESS: u32 = 2;
/// Recency window for promotion suggestions.
const PROMOTE_WITHIN_DAYS: i64 = 7;
/// Access count floor for promotion suggestions.
const PROMOTE_MIN_ACCESS: u32 = 5;
/// A demoted layer idle longer than this drops straight to archive.
const DEMOTE_IDLE_DAYS: i64 = 7;
/// A demoted layer accessed fewer times than this drops straight to archive.
const DEMOTE_MIN_ACCESS: u32 = 3;

/// The core budget engine.
///
/// Thread-safe via `RwLock`. Every mutating operation completes in a single
/// step; callers treat the snapshot as advisory and re-fetch after mutating.
pub struct BudgetEngine {
    /// Token ceiling for the whole layer set.
    max_tokens: u64,
    warning_threshold: f64,
    critical_threshold: f64,
    /// Pluggable token counter.
    estimator: Arc<dyn TokenEstimator>,
    /// Bus for archival side effects.
    events: Arc<EventBus>,
    /// All layers, insertion order.
    layers: RwLock<Vec<ContextLayer>>,
}

impl BudgetEngine {
    /// Create an engine with the default ceiling, thresholds and estimator.
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
            estimator: Arc::new(HeuristicEstimator),
            events,
            layers: RwLock::new(Vec::new()),
        }
    }

    /// Replace the token ceiling.
    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Replace the warning/critical thresholds (fractions of the ceiling).
    pub fn with_thresholds(mut self, warning: f64, critical: f64) -> Self {
        self.warning_threshold = warning;
        self.critical_threshold = critical;
        self
    }

    /// Replace the token counter.
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn max_tokens(&self) -> u64 {
        self.max_tokens
    }

    // ── Layer commands ────────────────────────────────────────────────

    /// Insert a new layer. Assigns a fresh id and fills in the cheap token
    /// estimate when the caller did not supply one. Returns the stored layer.
    pub fn add_layer(&self, mut layer: ContextLayer) -> ContextLayer {
        layer.id = LayerId::new();
        if layer.estimated_tokens == 0 {
            layer.estimated_tokens = self.estimator.estimate(&layer.content);
        }
        let mut layers = self.layers.write().unwrap();
        layers.push(layer.clone());
        tracing::debug!(
            layer_id = %layer.id,
            tier = %layer.tier,
            tokens = layer.effective_tokens(),
            "Layer added"
        );
        layer
    }

    /// Apply a partial update. A content change re-estimates the cheap count
    /// and invalidates any exact count until the next recalculation.
    pub fn update_layer(
        &self,
        id: &LayerId,
        patch: LayerPatch,
    ) -> Result<ContextLayer, ContextError> {
        let mut layers = self.layers.write().unwrap();
        let layer = Self::find_mut(&mut layers, id)?;

        if let Some(content) = patch.content {
            layer.estimated_tokens = self.estimator.estimate(&content);
            layer.actual_tokens = None;
            layer.content = content;
        }
        if let Some(tier) = patch.tier {
            layer.tier = tier;
        }
        if let Some(scope) = patch.scope {
            layer.scope = scope;
        }
        if let Some(starred) = patch.starred {
            layer.starred = starred;
        }
        if let Some(immutable) = patch.immutable {
            layer.immutable = immutable;
        }
        layer.updated_at = Utc::now();
        Ok(layer.clone())
    }

    /// Remove a layer. Immutable layers cannot be deleted.
    pub fn delete_layer(&self, id: &LayerId) -> Result<ContextLayer, ContextError> {
        let mut layers = self.layers.write().unwrap();
        let idx = layers
            .iter()
            .position(|l| &l.id == id)
            .ok_or_else(|| ContextError::NotFound(id.to_string()))?;
        if layers[idx].immutable {
            return Err(ContextError::ImmutableViolation(id.to_string()));
        }
        Ok(layers.remove(idx))
    }

    /// Flip the star flag. Returns the new value.
    pub fn toggle_star(&self, id: &LayerId) -> Result<bool, ContextError> {
        let mut layers = self.layers.write().unwrap();
        let layer = Self::find_mut(&mut layers, id)?;
        layer.starred = !layer.starred;
        layer.updated_at = Utc::now();
        Ok(layer.starred)
    }

    /// Move a layer up to `core`, `active` or `reference`. Promoting to
    /// `core` forces the star on. Counts as an access.
    pub fn promote_layer(
        &self,
        id: &LayerId,
        target: LayerTier,
    ) -> Result<ContextLayer, ContextError> {
        if target == LayerTier::Archive {
            return Err(ContextError::InvalidPromotionTier(target.to_string()));
        }
        let mut layers = self.layers.write().unwrap();
        let layer = Self::find_mut(&mut layers, id)?;
        layer.tier = target;
        if target == LayerTier::Core {
            layer.starred = true;
        }
        layer.touch();
        layer.updated_at = Utc::now();
        tracing::debug!(layer_id = %id, tier = %target, "Layer promoted");
        Ok(layer.clone())
    }

    /// Demote a layer. The target tier is computed, not caller-chosen:
    /// layers idle for over a week or rarely accessed drop straight to
    /// `archive`, everything else lands in `reference`. Demotion always
    /// clears the star.
    pub fn demote_layer(&self, id: &LayerId) -> Result<ContextLayer, ContextError> {
        let mut layers = self.layers.write().unwrap();
        let layer = Self::find_mut(&mut layers, id)?;
        if layer.immutable {
            return Err(ContextError::ImmutableViolation(id.to_string()));
        }
        let idle_days = Utc::now()
            .signed_duration_since(layer.last_touch())
            .num_days();
        layer.tier = if idle_days > DEMOTE_IDLE_DAYS || layer.access_count < DEMOTE_MIN_ACCESS {
            LayerTier::Archive
        } else {
            LayerTier::Reference
        };
        layer.starred = false;
        layer.updated_at = Utc::now();
        tracing::debug!(layer_id = %id, tier = %layer.tier, "Layer demoted");
        Ok(layer.clone())
    }

    /// Force a layer to the archive tier. AI-origin layers whose content
    /// reads like a conversation transcript additionally raise a
    /// `LayerArchived` event carrying the text and the caller's reason, so
    /// an external store can persist it. The engine itself persists nothing.
    pub fn archive_layer(
        &self,
        id: &LayerId,
        reason: impl Into<String>,
    ) -> Result<ContextLayer, ContextError> {
        let archived = {
            let mut layers = self.layers.write().unwrap();
            let layer = Self::find_mut(&mut layers, id)?;
            layer.tier = LayerTier::Archive;
            layer.updated_at = Utc::now();
            layer.clone()
        };

        if archived.origin == LayerOrigin::Ai && is_conversational(&archived.content) {
            self.events.publish(DomainEvent::LayerArchived {
                layer_id: archived.id.clone(),
                scope: archived.scope.clone(),
                reason: reason.into(),
                content: archived.content.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(archived)
    }

    // ── Suggestions ───────────────────────────────────────────────────

    /// Layers that look forgotten: unprotected, not already archived, idle
    /// for over thirty days and accessed fewer than twice.
    pub fn suggested_archives(&self) -> Vec<ContextLayer> {
        let cutoff = Utc::now() - Duration::days(ARCHIVE_AFTER_DAYS);
        let layers = self.layers.read().unwrap();
        layers
            .iter()
            .filter(|l| {
                !l.starred
                    && !l.immutable
                    && l.tier != LayerTier::Archive
                    && l.last_touch() < cutoff
                    && l.access_count < ARCHIVE_MAX_ACCESS
            })
            .cloned()
            .collect()
    }

    /// Layers that earned a higher tier: recently and frequently accessed
    /// but still sitting below `active`.
    pub fn suggested_promotions(&self) -> Vec<ContextLayer> {
        let cutoff = Utc::now() - Duration::days(PROMOTE_WITHIN_DAYS);
        let layers = self.layers.read().unwrap();
        layers
            .iter()
            .filter(|l| {
                l.tier != LayerTier::Core
                    && l.tier != LayerTier::Active
                    && l.last_touch() > cutoff
                    && l.access_count >= PROMOTE_MIN_ACCESS
            })
            .cloned()
            .collect()
    }

    // ── Pruning ───────────────────────────────────────────────────────

    /// Evict unprotected layers until usage drops to `target` × ceiling.
    ///
    /// Candidates are deleted lowest tier first (archive, then reference,
    /// then active), least accessed first, oldest first. Starred, immutable
    /// and core-tier layers are never touched, so the target may be missed
    /// when protected layers dominate usage. Returns the deleted layers in
    /// eviction order.
    pub fn auto_prune(&self, target: f64) -> Vec<ContextLayer> {
        let mut layers = self.layers.write().unwrap();
        let total: u64 = layers.iter().map(|l| l.effective_tokens()).sum();
        let target_tokens = (target * self.max_tokens as f64) as u64;
        let excess = total.saturating_sub(target_tokens);
        if excess == 0 {
            return Vec::new();
        }

        let mut order: Vec<usize> = (0..layers.len())
            .filter(|&i| {
                let l = &layers[i];
                !l.starred && !l.immutable && l.tier != LayerTier::Core
            })
            .collect();
        order.sort_by(|&a, &b| {
            let (la, lb) = (&layers[a], &layers[b]);
            la.tier
                .eviction_weight()
                .cmp(&lb.tier.eviction_weight())
                .then(la.access_count.cmp(&lb.access_count))
                .then(la.last_touch().cmp(&lb.last_touch()))
        });

        let mut freed = 0u64;
        let mut doomed: Vec<LayerId> = Vec::new();
        for i in order {
            if freed >= excess {
                break;
            }
            freed += layers[i].effective_tokens();
            doomed.push(layers[i].id.clone());
        }

        let deleted: Vec<ContextLayer> = doomed
            .iter()
            .filter_map(|id| layers.iter().find(|l| &l.id == id).cloned())
            .collect();
        layers.retain(|l| !doomed.contains(&l.id));

        tracing::info!(
            deleted = deleted.len(),
            freed_tokens = freed,
            excess_tokens = excess,
            "Auto-prune complete"
        );
        deleted
    }

    // ── Token recalculation ───────────────────────────────────────────

    /// Run the exact counter over every layer whose authoritative count is
    /// missing or was invalidated by a content change, and make the result
    /// the new baseline. Returns the number of layers updated.
    pub fn recalculate_actual_tokens(&self) -> usize {
        let mut layers = self.layers.write().unwrap();
        let mut updated = 0;
        for layer in layers.iter_mut().filter(|l| l.actual_tokens.is_none()) {
            let exact = self.estimator.exact(&layer.content);
            layer.actual_tokens = Some(exact);
            layer.estimated_tokens = exact;
            updated += 1;
        }
        if updated > 0 {
            tracing::debug!(updated, "Recalculated exact token counts");
        }
        updated
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// All layers, insertion order.
    pub fn layers(&self) -> Vec<ContextLayer> {
        self.layers.read().unwrap().clone()
    }

    /// Layers belonging to one workspace scope.
    pub fn layers_in_scope(&self, scope: &str) -> Vec<ContextLayer> {
        let layers = self.layers.read().unwrap();
        layers.iter().filter(|l| l.scope == scope).cloned().collect()
    }

    /// Look up a single layer.
    pub fn get_layer(&self, id: &LayerId) -> Option<ContextLayer> {
        let layers = self.layers.read().unwrap();
        layers.iter().find(|l| &l.id == id).cloned()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.read().unwrap().len()
    }

    /// Current aggregate usage against the ceiling.
    pub fn snapshot(&self) -> BudgetSnapshot {
        let layers = self.layers.read().unwrap();
        BudgetSnapshot::compute(
            &layers,
            self.max_tokens,
            self.warning_threshold,
            self.critical_threshold,
        )
    }

    fn find_mut<'a>(
        layers: &'a mut [ContextLayer],
        id: &LayerId,
    ) -> Result<&'a mut ContextLayer, ContextError> {
        layers
            .iter_mut()
            .find(|l| &l.id == id)
            .ok_or_else(|| ContextError::NotFound(id.to_string()))
    }
}

/// Heuristic for transcript-like content: any line opening with a speaker
/// tag such as `user:` or `assistant:`.
fn is_conversational(content: &str) -> bool {
    content.lines().any(|line| {
        let lower = line.trim_start().to_ascii_lowercase();
        lower.starts_with("user:")
            || lower.starts_with("assistant:")
            || lower.starts_with("ai:")
            || lower.starts_with("human:")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::WarningLevel;

    fn make_engine() -> BudgetEngine {
        BudgetEngine::new(Arc::new(EventBus::default()))
    }

    fn layer(tier: LayerTier, tokens: u64) -> ContextLayer {
        ContextLayer::new("ws", tier, "content", LayerOrigin::User).with_actual_tokens(tokens)
    }

    #[test]
    fn add_assigns_fresh_id_and_estimate() {
        let engine = make_engine();
        let template = ContextLayer::new("ws", LayerTier::Active, "a".repeat(100), LayerOrigin::User);

        let first = engine.add_layer(template.clone());
        let second = engine.add_layer(template);

        assert_ne!(first.id, second.id);
        assert_eq!(first.estimated_tokens, 25);
        assert_eq!(engine.layer_count(), 2);
    }

    #[test]
    fn update_content_invalidates_exact_count() {
        let engine = make_engine();
        let stored = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Active, "old", LayerOrigin::User)
                .with_actual_tokens(500),
        );

        let updated = engine
            .update_layer(&stored.id, LayerPatch::content("brand new text"))
            .unwrap();

        assert_eq!(updated.content, "brand new text");
        assert_eq!(updated.actual_tokens, None);
        assert_eq!(updated.estimated_tokens, 4); // 14 chars
    }

    #[test]
    fn unknown_layer_is_not_found() {
        let engine = make_engine();
        let bogus = LayerId::new();

        assert!(matches!(
            engine.update_layer(&bogus, LayerPatch::tier(LayerTier::Core)),
            Err(ContextError::NotFound(_))
        ));
        assert!(matches!(
            engine.delete_layer(&bogus),
            Err(ContextError::NotFound(_))
        ));
        assert!(matches!(
            engine.toggle_star(&bogus),
            Err(ContextError::NotFound(_))
        ));
    }

    #[test]
    fn delete_respects_immutability() {
        let engine = make_engine();
        let locked = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Reference, "keep", LayerOrigin::System)
                .with_immutable(true),
        );
        let plain =
            engine.add_layer(ContextLayer::new("ws", LayerTier::Reference, "x", LayerOrigin::User));

        assert!(matches!(
            engine.delete_layer(&locked.id),
            Err(ContextError::ImmutableViolation(_))
        ));
        assert_eq!(engine.layer_count(), 2);

        engine.delete_layer(&plain.id).unwrap();
        assert_eq!(engine.layer_count(), 1);
    }

    #[test]
    fn toggle_star_flips() {
        let engine = make_engine();
        let stored =
            engine.add_layer(ContextLayer::new("ws", LayerTier::Active, "x", LayerOrigin::User));

        assert!(engine.toggle_star(&stored.id).unwrap());
        assert!(!engine.toggle_star(&stored.id).unwrap());
    }

    #[test]
    fn promote_to_core_forces_star() {
        let engine = make_engine();
        let stored = engine
            .add_layer(ContextLayer::new("ws", LayerTier::Reference, "x", LayerOrigin::User));
        assert!(!stored.starred);

        let promoted = engine.promote_layer(&stored.id, LayerTier::Core).unwrap();

        assert_eq!(promoted.tier, LayerTier::Core);
        assert!(promoted.starred);
        assert_eq!(promoted.access_count, 1);
        assert!(promoted.last_accessed_at.is_some());
    }

    #[test]
    fn promote_rejects_archive_target() {
        let engine = make_engine();
        let stored =
            engine.add_layer(ContextLayer::new("ws", LayerTier::Active, "x", LayerOrigin::User));

        assert!(matches!(
            engine.promote_layer(&stored.id, LayerTier::Archive),
            Err(ContextError::InvalidPromotionTier(_))
        ));
        assert_eq!(engine.get_layer(&stored.id).unwrap().tier, LayerTier::Active);
    }

    #[test]
    fn demote_clears_star_and_computes_target() {
        let engine = make_engine();

        // Recently and frequently accessed: lands in reference
        let warm = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Active, "x", LayerOrigin::User)
                .with_starred(true)
                .with_access_count(5)
                .with_last_accessed_at(Utc::now()),
        );
        let demoted = engine.demote_layer(&warm.id).unwrap();
        assert_eq!(demoted.tier, LayerTier::Reference);
        assert!(!demoted.starred);

        // Idle for over a week: straight to archive
        let idle = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Active, "x", LayerOrigin::User)
                .with_access_count(5)
                .with_last_accessed_at(Utc::now() - Duration::days(10)),
        );
        assert_eq!(
            engine.demote_layer(&idle.id).unwrap().tier,
            LayerTier::Archive
        );

        // Rarely accessed: straight to archive even when recent
        let rare = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Active, "x", LayerOrigin::User)
                .with_access_count(1)
                .with_last_accessed_at(Utc::now()),
        );
        assert_eq!(
            engine.demote_layer(&rare.id).unwrap().tier,
            LayerTier::Archive
        );
    }

    #[test]
    fn demote_immutable_rejected() {
        let engine = make_engine();
        let locked = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Active, "x", LayerOrigin::System)
                .with_immutable(true),
        );

        assert!(matches!(
            engine.demote_layer(&locked.id),
            Err(ContextError::ImmutableViolation(_))
        ));
    }

    #[test]
    fn archive_emits_event_for_ai_transcripts() {
        let bus = Arc::new(EventBus::default());
        let engine = BudgetEngine::new(bus.clone());
        let mut rx = bus.subscribe();

        let transcript = engine.add_layer(ContextLayer::new(
            "ws",
            LayerTier::Active,
            "User: what broke?\nAssistant: the build step",
            LayerOrigin::Ai,
        ));
        let archived = engine.archive_layer(&transcript.id, "stale thread").unwrap();
        assert_eq!(archived.tier, LayerTier::Archive);

        let event = rx.try_recv().unwrap();
        match event.as_ref() {
            DomainEvent::LayerArchived {
                layer_id,
                reason,
                content,
                ..
            } => {
                assert_eq!(layer_id, &transcript.id);
                assert_eq!(reason, "stale thread");
                assert!(content.contains("what broke?"));
            }
            other => panic!("Expected LayerArchived, got {other:?}"),
        }
    }

    #[test]
    fn archive_stays_quiet_for_non_transcripts() {
        let bus = Arc::new(EventBus::default());
        let engine = BudgetEngine::new(bus.clone());
        let mut rx = bus.subscribe();

        // AI origin but plain prose
        let note = engine.add_layer(ContextLayer::new(
            "ws",
            LayerTier::Active,
            "Summary of the planning discussion",
            LayerOrigin::Ai,
        ));
        engine.archive_layer(&note.id, "done").unwrap();

        // Transcript-shaped but user origin
        let pasted = engine.add_layer(ContextLayer::new(
            "ws",
            LayerTier::Active,
            "user: hello\nassistant: hi",
            LayerOrigin::User,
        ));
        engine.archive_layer(&pasted.id, "done").unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn archive_allowed_on_immutable_layers() {
        let engine = make_engine();
        let locked = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Active, "x", LayerOrigin::System)
                .with_immutable(true),
        );

        let archived = engine.archive_layer(&locked.id, "season over").unwrap();
        assert_eq!(archived.tier, LayerTier::Archive);
        assert!(archived.immutable);
    }

    #[test]
    fn suggestions_scenario() {
        let engine = make_engine();
        let a = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Reference, "a", LayerOrigin::User)
                .with_actual_tokens(5000)
                .with_access_count(0)
                .with_created_at(Utc::now() - Duration::days(40)),
        );
        let _b = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Active, "b", LayerOrigin::User)
                .with_actual_tokens(3000)
                .with_starred(true),
        );
        let c = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Reference, "c", LayerOrigin::User)
                .with_actual_tokens(2000)
                .with_access_count(6)
                .with_created_at(Utc::now() - Duration::days(1)),
        );

        let archives = engine.suggested_archives();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].id, a.id);

        let promotions = engine.suggested_promotions();
        assert_eq!(promotions.len(), 1);
        assert_eq!(promotions[0].id, c.id);
    }

    #[test]
    fn archived_layers_not_resuggested() {
        let engine = make_engine();
        engine.add_layer(
            ContextLayer::new("ws", LayerTier::Archive, "already out", LayerOrigin::User)
                .with_actual_tokens(100)
                .with_created_at(Utc::now() - Duration::days(90)),
        );

        assert!(engine.suggested_archives().is_empty());
    }

    #[test]
    fn prune_scenario_removes_cheapest_cover() {
        let engine = make_engine().with_max_tokens(10_000);
        let a = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Reference, "a", LayerOrigin::User)
                .with_actual_tokens(5000)
                .with_access_count(0)
                .with_created_at(Utc::now() - Duration::days(40)),
        );
        let b = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Active, "b", LayerOrigin::User)
                .with_actual_tokens(3000)
                .with_starred(true),
        );
        let c = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Reference, "c", LayerOrigin::User)
                .with_actual_tokens(2000)
                .with_access_count(6)
                .with_created_at(Utc::now() - Duration::days(1)),
        );

        // total 10000, target 6000: A alone covers the excess
        let deleted = engine.auto_prune(0.6);
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, a.id);
        assert!(engine.get_layer(&b.id).is_some());
        assert!(engine.get_layer(&c.id).is_some());
    }

    #[test]
    fn prune_never_removes_protected() {
        let engine = make_engine().with_max_tokens(1000);
        engine.add_layer(layer(LayerTier::Core, 400));
        engine.add_layer(layer(LayerTier::Active, 400).with_starred(true));
        engine.add_layer(layer(LayerTier::Reference, 400).with_immutable(true));
        engine.add_layer(layer(LayerTier::Archive, 400));

        let deleted = engine.auto_prune(0.0);

        for gone in &deleted {
            assert!(!gone.starred);
            assert!(!gone.immutable);
            assert_ne!(gone.tier, LayerTier::Core);
        }
        assert_eq!(deleted.len(), 1);
        assert_eq!(engine.layer_count(), 3);
    }

    #[test]
    fn prune_reaches_target_or_exhausts_candidates() {
        // Enough unprotected weight: usage drops under the target
        let engine = make_engine();
        engine.add_layer(layer(LayerTier::Core, 100_000));
        engine.add_layer(layer(LayerTier::Active, 30_000));
        engine.add_layer(layer(LayerTier::Active, 30_000));
        engine.add_layer(layer(LayerTier::Active, 30_000));

        engine.auto_prune(0.7);
        assert!(engine.snapshot().total_tokens <= 140_000);

        // Protected layers dominate: candidates run out instead
        let stuck = make_engine();
        stuck.add_layer(layer(LayerTier::Active, 190_000).with_starred(true));
        stuck.add_layer(layer(LayerTier::Reference, 5_000));

        let deleted = stuck.auto_prune(0.7);
        assert_eq!(deleted.len(), 1);
        assert!(stuck.layers().iter().all(|l| l.is_protected()));
    }

    #[test]
    fn prune_order_is_tier_then_access_then_age() {
        let engine = make_engine().with_max_tokens(1000);
        let archived = engine.add_layer(layer(LayerTier::Archive, 100).with_access_count(9));
        let ref_old = engine.add_layer(
            layer(LayerTier::Reference, 100)
                .with_access_count(2)
                .with_created_at(Utc::now() - Duration::days(10)),
        );
        let ref_new = engine.add_layer(
            layer(LayerTier::Reference, 100)
                .with_access_count(2)
                .with_created_at(Utc::now() - Duration::days(1)),
        );
        let active = engine.add_layer(layer(LayerTier::Active, 100));

        // total 400, target 100: the first three candidates cover the excess
        let deleted = engine.auto_prune(0.1);

        let ids: Vec<_> = deleted.iter().map(|l| l.id.clone()).collect();
        assert_eq!(ids, vec![archived.id, ref_old.id, ref_new.id]);
        assert!(engine.get_layer(&active.id).is_some());
    }

    #[test]
    fn prune_noop_under_target() {
        let engine = make_engine().with_max_tokens(10_000);
        engine.add_layer(layer(LayerTier::Active, 1000));

        assert!(engine.auto_prune(0.7).is_empty());
        assert_eq!(engine.layer_count(), 1);
    }

    #[test]
    fn budget_levels_through_operations() {
        let engine = make_engine();
        engine.add_layer(layer(LayerTier::Active, 150_000));

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.warning_level, WarningLevel::Safe);
        assert!((snapshot.percent_used - 0.75).abs() < 1e-10);

        engine.add_layer(layer(LayerTier::Reference, 40_000));
        assert_eq!(engine.snapshot().warning_level, WarningLevel::Critical);
    }

    #[test]
    fn recalculate_fills_missing_counts() {
        let engine = make_engine();
        let pending = engine.add_layer(ContextLayer::new(
            "ws",
            LayerTier::Active,
            "hello world",
            LayerOrigin::User,
        ));
        let counted = engine.add_layer(
            ContextLayer::new("ws", LayerTier::Active, "hello world", LayerOrigin::User)
                .with_actual_tokens(10),
        );

        assert_eq!(engine.recalculate_actual_tokens(), 1);

        let pending = engine.get_layer(&pending.id).unwrap();
        assert_eq!(pending.actual_tokens, Some(4));
        assert_eq!(pending.estimated_tokens, 4);
        assert_eq!(engine.get_layer(&counted.id).unwrap().actual_tokens, Some(10));

        // A content edit invalidates the exact count; the next pass redoes it
        engine
            .update_layer(&counted.id, LayerPatch::content("a b"))
            .unwrap();
        assert_eq!(engine.recalculate_actual_tokens(), 1);
        assert_eq!(engine.get_layer(&counted.id).unwrap().actual_tokens, Some(2));
    }

    #[test]
    fn layers_in_scope_filters() {
        let engine = make_engine();
        engine.add_layer(ContextLayer::new("alpha", LayerTier::Active, "x", LayerOrigin::User));
        engine.add_layer(ContextLayer::new("beta", LayerTier::Active, "x", LayerOrigin::User));
        engine.add_layer(ContextLayer::new("alpha", LayerTier::Core, "x", LayerOrigin::System));

        assert_eq!(engine.layers_in_scope("alpha").len(), 2);
        assert_eq!(engine.layers_in_scope("beta").len(), 1);
        assert_eq!(engine.layers_in_scope("gamma").len(), 0);
    }

    #[test]
    fn conversational_detection() {
        assert!(is_conversational("user: hello"));
        assert!(is_conversational("Some heading\n  Assistant: reply text"));
        assert!(is_conversational("AI: short answer"));
        assert!(is_conversational("Human: question"));
        assert!(!is_conversational("Meeting notes about user accounts"));
        assert!(!is_conversational(""));
    }
}
