//! Element relocation: find the live element a recorded fingerprint refers to.
//!
//! Each candidate is scored against the fingerprint with weighted evidence:
//!
//! | evidence                    | weight | scoring                          |
//! |-----------------------------|--------|----------------------------------|
//! | `id` attribute              | 10     | exact match                      |
//! | `name` attribute            | 5      | exact match                      |
//! | `class` attribute           | 3      | token overlap ratio (Jaccard)    |
//! | structural path             | 1      | common suffix of path segments   |
//!
//! The best candidate wins only when it clears the minimum score and is not
//! tied with the runner-up. Otherwise there is no match.

use crate::agent::CandidateElement;
use crate::config::ReplayConfig;
use crate::recording::schema::ElementFingerprint;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelocatorWeights {
    pub identifier: f64,
    pub name: f64,
    pub class: f64,
    pub path: f64,
}

impl Default for RelocatorWeights {
    fn default() -> Self {
        Self {
            identifier: 10.0,
            name: 5.0,
            class: 3.0,
            path: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelocationVerdict {
    Matched,
    NoCandidates,
    /// Fingerprint has nothing to compare against
    NoEvidence,
    BelowThreshold,
    Ambiguous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relocation {
    pub verdict: RelocationVerdict,
    /// Selected index, only for [`RelocationVerdict::Matched`]
    pub index: Option<u64>,
    /// Best aggregate score seen
    pub score: f64,
    /// Best score relative to the maximum the fingerprint allows, in `0..=1`
    pub confidence: f64,
}

impl Relocation {
    fn miss(verdict: RelocationVerdict, score: f64, confidence: f64) -> Self {
        Self {
            verdict,
            index: None,
            score,
            confidence,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Relocator {
    weights: RelocatorWeights,
    min_score: f64,
    tie_epsilon: f64,
}

impl Default for Relocator {
    fn default() -> Self {
        Self::from_config(&ReplayConfig::default())
    }
}

impl Relocator {
    pub fn new(weights: RelocatorWeights, min_score: f64, tie_epsilon: f64) -> Self {
        Self {
            weights,
            min_score,
            tie_epsilon,
        }
    }

    pub fn from_config(config: &ReplayConfig) -> Self {
        Self::new(
            RelocatorWeights::default(),
            config.min_confidence_score,
            config.tie_epsilon,
        )
    }

    /// Highest score this fingerprint can reach.
    pub fn max_score(&self, fingerprint: &ElementFingerprint) -> f64 {
        let mut max = 0.0;
        if fingerprint.attribute("id").is_some() {
            max += self.weights.identifier;
        }
        if fingerprint.attribute("name").is_some() {
            max += self.weights.name;
        }
        if fingerprint.attribute("class").is_some() {
            max += self.weights.class;
        }
        if !fingerprint.x_path.is_empty() {
            max += self.weights.path;
        }
        max
    }

    pub fn score(&self, fingerprint: &ElementFingerprint, candidate: &CandidateElement) -> f64 {
        let live = |key: &str| {
            candidate
                .attributes
                .get(key)
                .map(String::as_str)
                .filter(|v| !v.trim().is_empty())
        };

        let mut score = 0.0;

        if let (Some(expected), Some(actual)) = (fingerprint.attribute("id"), live("id")) {
            if expected == actual {
                score += self.weights.identifier;
            }
        }
        if let (Some(expected), Some(actual)) = (fingerprint.attribute("name"), live("name")) {
            if expected == actual {
                score += self.weights.name;
            }
        }
        if let (Some(expected), Some(actual)) = (fingerprint.attribute("class"), live("class")) {
            score += self.weights.class * class_overlap(expected, actual);
        }
        score += self.weights.path * path_similarity(&fingerprint.x_path, &candidate.x_path);

        score
    }

    /// Pick the candidate matching `fingerprint`, or report why none qualifies.
    pub fn relocate(
        &self,
        fingerprint: &ElementFingerprint,
        candidates: &[CandidateElement],
    ) -> Relocation {
        if candidates.is_empty() {
            return Relocation::miss(RelocationVerdict::NoCandidates, 0.0, 0.0);
        }

        let max = self.max_score(fingerprint);
        if max <= 0.0 {
            return Relocation::miss(RelocationVerdict::NoEvidence, 0.0, 0.0);
        }

        let mut scored: Vec<(f64, u64)> = candidates
            .iter()
            .map(|c| (self.score(fingerprint, c), c.index))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let (best, index) = scored[0];
        let confidence = (best / max).clamp(0.0, 1.0);

        if best < self.min_score {
            return Relocation::miss(RelocationVerdict::BelowThreshold, best, confidence);
        }

        if let Some(&(runner_up, _)) = scored.get(1) {
            if best - runner_up <= self.tie_epsilon {
                return Relocation::miss(RelocationVerdict::Ambiguous, best, confidence);
            }
        }

        Relocation {
            verdict: RelocationVerdict::Matched,
            index: Some(index),
            score: best,
            confidence,
        }
    }
}

/// Jaccard overlap of whitespace-separated class tokens.
fn class_overlap(expected: &str, actual: &str) -> f64 {
    let a: HashSet<&str> = expected.split_whitespace().collect();
    let b: HashSet<&str> = actual.split_whitespace().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Length of the common trailing segment run, relative to the longer path.
fn path_similarity(expected: &str, actual: &str) -> f64 {
    let a: Vec<&str> = expected.split('/').filter(|s| !s.is_empty()).collect();
    let b: Vec<&str> = actual.split('/').filter(|s| !s.is_empty()).collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }

    let common = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    common as f64 / longest as f64
}
