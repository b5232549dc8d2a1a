//! Per-learner mastery and interest tracking.
//!
//! State is keyed by an opaque [`LearnerId`] and is independent of any
//! concept graph: labels are recorded whether or not a graph contains them.
//! Mastery for a concept never decreases.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use learnpath_shared::{LearnPathError, LearnerId, Result, normalize_label};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

/// Mastery recorded for one concept.
#[derive(Debug, Clone)]
struct MasteryEntry {
    /// Label as first reported by the learner.
    label: String,
    value: f64,
}

#[derive(Debug, Default)]
struct LearnerState {
    /// Normalized label -> entry.
    mastery: HashMap<String, MasteryEntry>,
    /// Display labels in the order they were added.
    interests: Vec<String>,
}

impl LearnerState {
    fn knowledge_state(&self) -> BTreeMap<String, f64> {
        self.mastery
            .values()
            .map(|entry| (entry.label.clone(), entry.value))
            .collect()
    }
}

/// Read-only view of one learner, keyed by normalized label.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LearnerSnapshot {
    pub mastery: HashMap<String, f64>,
    pub interests: HashSet<String>,
}

impl LearnerSnapshot {
    /// Mastery for `label` in any casing; `0.0` when never reported.
    pub fn mastery_of(&self, label: &str) -> f64 {
        self.mastery
            .get(&normalize_label(label))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn is_interested_in(&self, label: &str) -> bool {
        self.interests.contains(&normalize_label(label))
    }
}

/// Tracks every learner seen by the process.
///
/// Updates for one learner serialize on that learner's mutex; different
/// learners never contend beyond the brief map lookup.
#[derive(Debug, Default)]
pub struct LearnerTracker {
    learners: RwLock<HashMap<LearnerId, Arc<Mutex<LearnerState>>>>,
}

impl LearnerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record mastery for a concept and return the learner's full state.
    ///
    /// Values are clamped to `[0, 1]` and merged with `max`, so a lower
    /// report never overwrites a higher one.
    #[instrument(skip_all, fields(learner = %learner, concept = %concept))]
    pub async fn update(
        &self,
        learner: &LearnerId,
        concept: &str,
        mastery: f64,
    ) -> Result<BTreeMap<String, f64>> {
        let key = checked_key(concept)?;
        if !mastery.is_finite() {
            return Err(LearnPathError::validation("mastery must be a finite number"));
        }
        let value = mastery.clamp(0.0, 1.0);

        let state = self.state_for(learner).await;
        let mut state = state.lock().await;
        let entry = state.mastery.entry(key).or_insert_with(|| MasteryEntry {
            label: concept.trim().to_string(),
            value: 0.0,
        });
        entry.value = entry.value.max(value);
        debug!(concept = %entry.label, mastery = entry.value, "mastery recorded");

        Ok(state.knowledge_state())
    }

    /// Full mastery map for a learner; empty when the learner is unknown.
    pub async fn get(&self, learner: &LearnerId) -> BTreeMap<String, f64> {
        match self.existing(learner).await {
            Some(state) => state.lock().await.knowledge_state(),
            None => BTreeMap::new(),
        }
    }

    /// Add a concept to the learner's interests and return the list.
    #[instrument(skip_all, fields(learner = %learner, concept = %concept))]
    pub async fn add_interest(&self, learner: &LearnerId, concept: &str) -> Result<Vec<String>> {
        let key = checked_key(concept)?;

        let state = self.state_for(learner).await;
        let mut state = state.lock().await;
        if !state
            .interests
            .iter()
            .any(|existing| normalize_label(existing) == key)
        {
            state.interests.push(concept.trim().to_string());
        }

        Ok(state.interests.clone())
    }

    /// Normalized view consumed by the pathfinder.
    pub async fn snapshot(&self, learner: &LearnerId) -> LearnerSnapshot {
        let Some(state) = self.existing(learner).await else {
            return LearnerSnapshot::default();
        };
        let state = state.lock().await;
        LearnerSnapshot {
            mastery: state
                .mastery
                .iter()
                .map(|(key, entry)| (key.clone(), entry.value))
                .collect(),
            interests: state.interests.iter().map(|l| normalize_label(l)).collect(),
        }
    }

    async fn existing(&self, learner: &LearnerId) -> Option<Arc<Mutex<LearnerState>>> {
        self.learners.read().await.get(learner).cloned()
    }

    async fn state_for(&self, learner: &LearnerId) -> Arc<Mutex<LearnerState>> {
        if let Some(state) = self.existing(learner).await {
            return state;
        }
        self.learners
            .write()
            .await
            .entry(learner.clone())
            .or_default()
            .clone()
    }
}

fn checked_key(concept: &str) -> Result<String> {
    let key = normalize_label(concept);
    if key.is_empty() {
        return Err(LearnPathError::validation("concept_id must not be empty"));
    }
    Ok(key)
}
