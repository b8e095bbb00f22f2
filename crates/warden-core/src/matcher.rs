//! Tolerance-based identity matching.
//!
//! A probe matches an enrolled identity when their Euclidean distance is at
//! or below the tolerance. When several identities match, the one registered
//! first wins; candidates are not ranked by distance.

use crate::store::Gallery;
use crate::types::Embedding;

/// Maximum embedding distance accepted as a positive match.
pub const DEFAULT_TOLERANCE: f32 = 0.5;

/// Outcome of matching one probe embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Known {
        label: String,
        /// Store position of the matched identity.
        index: usize,
        distance: f32,
    },
    Unknown,
}

impl MatchResult {
    pub fn is_known(&self) -> bool {
        matches!(self, MatchResult::Known { .. })
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            MatchResult::Known { label, .. } => Some(label),
            MatchResult::Unknown => None,
        }
    }
}

/// Strategy for comparing a probe embedding against enrolled identities.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult;
}

/// First-registered-wins matcher.
///
/// Computes a match/no-match flag for every enrolled embedding and reports
/// the lowest store index among the matches. The whole gallery is always
/// walked so the time taken does not depend on where the match sits.
#[derive(Debug, Clone, Copy)]
pub struct FirstMatchMatcher {
    pub tolerance: f32,
}

impl Default for FirstMatchMatcher {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl FirstMatchMatcher {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    fn distance_within(&self, probe: &Embedding, enrolled: &Embedding) -> Option<f32> {
        probe
            .euclidean_distance(enrolled)
            .filter(|distance| *distance <= self.tolerance)
    }
}

impl Matcher for FirstMatchMatcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult {
        let mut first: Option<(usize, f32, &str)> = None;

        // No early exit: every identity is compared.
        for (index, record) in gallery.iter().enumerate() {
            if probe.dim() != record.embedding.dim() {
                tracing::warn!(
                    label = %record.label,
                    probe_dim = probe.dim(),
                    enrolled_dim = record.embedding.dim(),
                    "embedding dimension mismatch; skipping identity"
                );
            }
            let hit = self.distance_within(probe, &record.embedding);
            if let (None, Some(distance)) = (first, hit) {
                first = Some((index, distance, record.label.as_str()));
            }
        }

        match first {
            Some((index, distance, label)) => MatchResult::Known {
                label: label.to_string(),
                index,
                distance,
            },
            None => MatchResult::Unknown,
        }
    }
}
