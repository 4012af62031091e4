//! Derived budget aggregates.

use deskhive_core::{ContextLayer, LayerTier};
use serde::{Deserialize, Serialize};

/// How close total usage is to the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Safe,
    Warning,
    Critical,
}

impl std::fmt::Display for WarningLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Token sums partitioned by tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTotals {
    pub core: u64,
    pub active: u64,
    pub reference: u64,
    pub archive: u64,
}

/// Point-in-time usage of the layer set against the ceiling.
///
/// Derived, never stored. Callers must treat it as advisory and re-fetch
/// after any mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// Sum of every layer's effective token cost.
    pub total_tokens: u64,
    /// The configured ceiling. Zero means unlimited.
    pub max_tokens: u64,
    /// Per-tier breakdown of `total_tokens`.
    pub tiers: TierTotals,
    /// Tokens held by starred or core-tier layers. Display only; eviction
    /// eligibility checks the flags on each layer directly.
    pub protected_tokens: u64,
    /// `total_tokens / max_tokens`, or 0.0 for an unlimited ceiling.
    pub percent_used: f64,
    pub warning_level: WarningLevel,
    pub layer_count: usize,
}

impl BudgetSnapshot {
    /// Aggregate a layer set against the ceiling and thresholds.
    pub fn compute(
        layers: &[ContextLayer],
        max_tokens: u64,
        warning_threshold: f64,
        critical_threshold: f64,
    ) -> Self {
        let mut tiers = TierTotals::default();
        let mut total = 0u64;
        let mut protected = 0u64;

        for layer in layers {
            let tokens = layer.effective_tokens();
            total += tokens;
            match layer.tier {
                LayerTier::Core => tiers.core += tokens,
                LayerTier::Active => tiers.active += tokens,
                LayerTier::Reference => tiers.reference += tokens,
                LayerTier::Archive => tiers.archive += tokens,
            }
            if layer.is_protected() {
                protected += tokens;
            }
        }

        let percent_used = if max_tokens == 0 {
            0.0
        } else {
            total as f64 / max_tokens as f64
        };
        let warning_level = if max_tokens > 0 && percent_used >= critical_threshold {
            WarningLevel::Critical
        } else if max_tokens > 0 && percent_used >= warning_threshold {
            WarningLevel::Warning
        } else {
            WarningLevel::Safe
        };

        Self {
            total_tokens: total,
            max_tokens,
            tiers,
            protected_tokens: protected,
            percent_used,
            warning_level,
            layer_count: layers.len(),
        }
    }
}
