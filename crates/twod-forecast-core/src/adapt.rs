use serde::{Deserialize, Serialize};
use time::Date;

use crate::engine::ForecastEngine;
use crate::experts::ScoringContext;
use crate::record::{DrawEntry, RecordStore};
use crate::storage::ForecastStorage;
use crate::{DrawRecord, ExpertKind, ForecastError, RecordId, TwoDigit, WeightVector};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    Morning,
    Evening,
}

impl Session {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Evening => "evening",
        }
    }
}

/// Result of crediting the experts for one observed outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightUpdate {
    pub outcome: TwoDigit,
    pub predicted_by: Vec<ExpertKind>,
    pub before: WeightVector,
    pub after: WeightVector,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedOutcome {
    pub record_id: RecordId,
    pub updates: Vec<(Session, WeightUpdate)>,
    pub weights: WeightVector,
}

impl ForecastEngine {
    /// Shifts weight toward the experts that would have scored `outcome`
    /// above the prediction threshold against `prior_history`.
    ///
    /// With `c` predicting experts out of `n`, predictors gain `lr / c` and the
    /// others lose `lr / (n - c)`; the vector is then clamped into the weight
    /// band and renormalized. Nothing changes when no expert predicted the
    /// outcome or when there is no prior history.
    #[must_use]
    pub fn adapt(
        &self,
        outcome: TwoDigit,
        prior_history: &[DrawRecord],
        weights: &WeightVector,
        target_date: Date,
    ) -> WeightUpdate {
        let ruleset = self.ruleset();
        let before = self.effective_weights(weights);

        let unchanged = |predicted_by: Vec<ExpertKind>| WeightUpdate {
            outcome,
            predicted_by,
            before: before.clone(),
            after: before.clone(),
            changed: false,
        };

        if prior_history.is_empty() {
            tracing::debug!(%outcome, "no prior history; weights left unchanged");
            return unchanged(Vec::new());
        }

        let market = prior_history.first().and_then(DrawRecord::market_reading);
        let ctx = ScoringContext {
            history: prior_history,
            target_date,
            market: market.as_ref(),
            ruleset,
        };

        let predicted_by: Vec<ExpertKind> = self
            .registry()
            .iter()
            .filter(|expert| expert.score(outcome, &ctx).score > ruleset.prediction_threshold)
            .map(|expert| expert.kind())
            .collect();

        let predictors = predicted_by.len();
        let total = self.registry().len();
        if predictors == 0 {
            tracing::info!(%outcome, "no expert predicted the outcome; weights left unchanged");
            return unchanged(predicted_by);
        }

        #[allow(clippy::cast_precision_loss)]
        let reward = ruleset.learning_rate / predictors as f64;
        #[allow(clippy::cast_precision_loss)]
        let penalty = if total > predictors {
            ruleset.learning_rate / (total - predictors) as f64
        } else {
            0.0
        };

        let mut after = before.clone();
        for kind in self.registry().kinds() {
            if predicted_by.contains(&kind) {
                after.add(kind, reward);
            } else {
                after.add(kind, -penalty);
            }
        }
        after.clamp_and_normalize(ruleset.weight_floor, ruleset.weight_ceiling);

        let changed = after != before;
        tracing::info!(
            %outcome,
            predictors,
            experts = total,
            changed,
            "adapted expert weights"
        );

        WeightUpdate {
            outcome,
            predicted_by,
            before,
            after,
            changed,
        }
    }
}

/// Commits `entry` and adapts the weights for its morning then evening
/// outcome, both judged against the history strictly before `entry.date`.
/// The adapted weights are saved through the store's storage.
///
/// # Errors
/// Returns [`ForecastError::Storage`] when saving the record or the weights
/// fails.
pub fn record_outcome<S: ForecastStorage>(
    store: &mut RecordStore<S>,
    engine: &ForecastEngine,
    entry: DrawEntry,
    weights: &WeightVector,
) -> Result<RecordedOutcome, ForecastError> {
    let prior = store.history_before(entry.date).to_vec();
    let (date, am, pm) = (entry.date, entry.am, entry.pm);
    let record_id = store.add_or_replace(entry)?;

    let morning = engine.adapt(am, &prior, weights, date);
    let evening = engine.adapt(pm, &prior, &morning.after, date);
    let weights = evening.after.clone();
    store.storage_mut().save_weights(&weights)?;

    Ok(RecordedOutcome {
        record_id,
        updates: vec![(Session::Morning, morning), (Session::Evening, evening)],
        weights,
    })
}
