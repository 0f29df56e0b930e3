//! Weighted rarity draws.
//!
//! A rarity table is an ordered list of tiers whose probabilities partition
//! the unit interval into contiguous slices, in table order.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Allowed drift between the summed tier probabilities and 1.0.
const PROBABILITY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RarityId {
    Common,
    Rare,
    Epic,
    Legendary,
    Mythic,
}

impl RarityId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RarityId::Common => "common",
            RarityId::Rare => "rare",
            RarityId::Epic => "epic",
            RarityId::Legendary => "legendary",
            RarityId::Mythic => "mythic",
        }
    }

    /// Epic and above get a fanfare on top of the stamp.
    pub fn earns_fanfare(&self) -> bool {
        matches!(self, RarityId::Epic | RarityId::Legendary | RarityId::Mythic)
    }
}

impl fmt::Display for RarityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One gamification tier with its badge text, display color and weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RarityTier {
    pub id: RarityId,
    pub label: &'static str,
    /// Hex display color (e.g., "#F59E0B").
    pub color: &'static str,
    pub probability: f64,
}

/// The booth's tier table, most common first.
pub const STANDARD_TIERS: [RarityTier; 5] = [
    RarityTier { id: RarityId::Common, label: "COMMON VIBE", color: "#A0A0A0", probability: 0.40 },
    RarityTier { id: RarityId::Rare, label: "RARE AURA", color: "#3B82F6", probability: 0.30 },
    RarityTier { id: RarityId::Epic, label: "EPIC ENERGY", color: "#8B5CF6", probability: 0.20 },
    RarityTier { id: RarityId::Legendary, label: "LEGENDARY SOUL", color: "#F59E0B", probability: 0.09 },
    RarityTier { id: RarityId::Mythic, label: "MYTHIC PRESENCE", color: "#EF4444", probability: 0.01 },
];

#[derive(Error, Debug, PartialEq)]
pub enum RarityError {
    #[error("rarity table has no tiers")]
    Empty,
    #[error("tier {0} has invalid probability {1}")]
    InvalidProbability(RarityId, f64),
    #[error("tier probabilities sum to {0}, expected 1.0")]
    BadTotal(f64),
}

/// Index of the first tier whose cumulative mass exceeds `draw`.
fn cumulative_index(tiers: &[RarityTier], draw: f64) -> Option<usize> {
    let mut cumulative = 0.0;
    for (i, tier) in tiers.iter().enumerate() {
        cumulative += tier.probability;
        if draw < cumulative {
            return Some(i);
        }
    }
    None
}

/// Map a uniform draw in [0, 1) onto `tiers`.
///
/// When the draw lands at or past the summed mass (float shortfall, or a
/// NaN draw) the last tier is returned. `None` only for an empty slice.
pub fn select_rarity(tiers: &[RarityTier], draw: f64) -> Option<&RarityTier> {
    let last = tiers.len().checked_sub(1)?;
    Some(&tiers[cumulative_index(tiers, draw).unwrap_or(last)])
}

/// A validated, non-empty tier table.
#[derive(Debug, Clone)]
pub struct RarityTable {
    tiers: Vec<RarityTier>,
}

impl RarityTable {
    pub fn new(tiers: Vec<RarityTier>) -> Result<Self, RarityError> {
        if tiers.is_empty() {
            return Err(RarityError::Empty);
        }
        for tier in &tiers {
            if !tier.probability.is_finite() || tier.probability < 0.0 {
                return Err(RarityError::InvalidProbability(tier.id, tier.probability));
            }
        }
        let total: f64 = tiers.iter().map(|t| t.probability).sum();
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(RarityError::BadTotal(total));
        }
        Ok(Self { tiers })
    }

    pub fn standard() -> Self {
        Self {
            tiers: STANDARD_TIERS.to_vec(),
        }
    }

    pub fn tiers(&self) -> &[RarityTier] {
        &self.tiers
    }

    /// Deterministic selection for a given draw.
    pub fn select(&self, draw: f64) -> &RarityTier {
        match select_rarity(&self.tiers, draw) {
            Some(tier) => tier,
            None => unreachable!("rarity tables are validated non-empty"),
        }
    }

    /// Draw a tier using `rng`.
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> &RarityTier {
        let draw: f64 = rng.gen();
        let tier = self.select(draw);
        tracing::debug!(draw, tier = %tier.id, "rarity rolled");
        tier
    }
}

impl Default for RarityTable {
    fn default() -> Self {
        Self::standard()
    }
}
