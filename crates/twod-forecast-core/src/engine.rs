use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime};

use crate::experts::{ExpertRegistry, ScoringContext};
use crate::market::{MarketQuote, MarketReading};
use crate::{now_utc, DrawRecord, ExpertKind, ForecastError, ForecastRuleset, TwoDigit, WeightVector};

pub const SIM_VERIFIED_TAG: &str = "sim-verified";

/// Inputs of one prediction run besides the history and the weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionRequest {
    pub target_date: Date,
    pub market_quote: Option<MarketQuote>,
    /// Clock used to judge whether `market_quote` is stale.
    pub now: OffsetDateTime,
}

impl PredictionRequest {
    #[must_use]
    pub fn for_date(target_date: Date) -> Self {
        Self {
            target_date,
            market_quote: None,
            now: now_utc(),
        }
    }

    #[must_use]
    pub fn with_market_quote(mut self, quote: MarketQuote) -> Self {
        self.market_quote = Some(quote);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredNumber {
    pub number: TwoDigit,
    pub score: f64,
    pub confidence: u8,
    pub tags: Vec<String>,
    pub reasons: Vec<String>,
    pub excluded: bool,
    /// Unweighted score of every registered expert.
    pub sub_scores: BTreeMap<ExpertKind, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionMeta {
    pub analyzed_count: usize,
    pub weights: WeightVector,
    pub simulations_run: usize,
    /// Sources that were requested but could not contribute.
    pub degraded: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionResult {
    pub high_confidence: Vec<ScoredNumber>,
    pub medium_confidence: Vec<ScoredNumber>,
    pub excluded: Vec<TwoDigit>,
    pub strongest_head: Option<u8>,
    pub strongest_tail: Option<u8>,
    pub insights: Vec<String>,
    pub is_double_risk: bool,
    pub meta: PredictionMeta,
}

impl PredictionResult {
    /// High then medium confidence picks, in rank order.
    pub fn ranked(&self) -> impl Iterator<Item = &ScoredNumber> + '_ {
        self.high_confidence.iter().chain(self.medium_confidence.iter())
    }

    #[must_use]
    pub fn contains(&self, value: TwoDigit) -> bool {
        self.ranked().any(|scored| scored.number == value)
    }

    /// Records a source that could not contribute, once.
    pub fn mark_degraded(&mut self, source: &str) {
        if self.meta.degraded.iter().any(|known| known == source) {
            return;
        }
        self.meta.degraded.push(source.to_string());
        self.insights.push(format!("Degraded: {source}."));
    }
}

/// Combines the registered experts into one ranking over all 100 values.
#[derive(Debug)]
pub struct ForecastEngine {
    ruleset: ForecastRuleset,
    registry: ExpertRegistry,
}

impl ForecastEngine {
    /// # Errors
    /// Returns [`ForecastError::Configuration`] when the ruleset is invalid or
    /// the registry holds no expert.
    pub fn new(ruleset: ForecastRuleset, registry: ExpertRegistry) -> Result<Self, ForecastError> {
        ruleset.validate()?;
        if registry.is_empty() {
            return Err(ForecastError::Configuration(
                "expert registry MUST hold at least one expert".to_string(),
            ));
        }
        Ok(Self { ruleset, registry })
    }

    /// Ruleset v1 with the standard experts.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            ruleset: ForecastRuleset::v1(),
            registry: ExpertRegistry::standard(),
        }
    }

    #[must_use]
    pub fn ruleset(&self) -> &ForecastRuleset {
        &self.ruleset
    }

    #[must_use]
    pub fn registry(&self) -> &ExpertRegistry {
        &self.registry
    }

    /// The stored weights restricted to the registered experts.
    #[must_use]
    pub fn effective_weights(&self, weights: &WeightVector) -> WeightVector {
        weights.aligned_to(&self.registry.kinds())
    }

    /// Predicts the draw for `request.target_date` from `history` (most
    /// recent first, strictly older than the target).
    #[must_use]
    pub fn predict(
        &self,
        history: &[DrawRecord],
        weights: &WeightVector,
        request: &PredictionRequest,
    ) -> PredictionResult {
        self.predict_with_rng(history, weights, request, &mut rand::rng())
    }

    /// [`Self::predict`] with an injected random source for the Monte Carlo
    /// refinement.
    pub fn predict_with_rng<R: Rng + ?Sized>(
        &self,
        history: &[DrawRecord],
        weights: &WeightVector,
        request: &PredictionRequest,
        rng: &mut R,
    ) -> PredictionResult {
        let ruleset = &self.ruleset;
        let weights = self.effective_weights(weights);

        if history.len() < ruleset.min_history {
            return self.insufficient_history(history.len(), weights);
        }

        let mut degraded = Vec::new();
        let market = self.resolve_market(history, request, &mut degraded);
        let ctx = ScoringContext {
            history,
            target_date: request.target_date,
            market: market.as_ref(),
            ruleset,
        };

        let excluded = self.exclusion_set(history);
        tracing::debug!(
            excluded = excluded.len(),
            window = ruleset.exclusion_window,
            "computed exclusion set"
        );

        let mut candidates: Vec<ScoredNumber> = TwoDigit::all()
            .filter(|candidate| !excluded.contains(candidate))
            .map(|candidate| self.score_candidate(candidate, &ctx, &weights))
            .collect();
        sort_ranking(&mut candidates);
        candidates.truncate(ruleset.refine_top_k);

        let simulations_run = self.refine_confidence(&mut candidates, history, rng);
        sort_ranking(&mut candidates);

        let high_count = ruleset.high_confidence_count;
        let medium_count = ruleset.medium_confidence_count;
        let medium_confidence: Vec<ScoredNumber> = candidates
            .iter()
            .skip(high_count)
            .take(medium_count)
            .cloned()
            .collect();
        candidates.truncate(high_count);
        let high_confidence = candidates;

        let top = high_confidence.first().or_else(|| medium_confidence.first());
        let strongest_head = top.map(|scored| scored.number.head());
        let strongest_tail = top.map(|scored| scored.number.tail());
        let is_double_risk = self.is_double_risk(history);

        let mut insights = vec![
            format!(
                "Scored {} candidates with {} experts over {} draws.",
                TwoDigit::all().count() - excluded.len(),
                self.registry.len(),
                history.len()
            ),
            format!(
                "Excluded {} numbers drawn at least {} times in the last {} draws.",
                excluded.len(),
                ruleset.exclusion_threshold,
                ruleset.exclusion_window
            ),
        ];
        if simulations_run > 0 {
            insights.push(format!(
                "Monte Carlo: {simulations_run} trials per top candidate."
            ));
        } else {
            insights.push(format!(
                "Monte Carlo skipped below {} draws; confidence is neutral.",
                ruleset.simulation_min_history
            ));
        }
        if is_double_risk {
            insights.push(format!(
                "No double in the last {} draws.",
                ruleset.double_risk_streak + 1
            ));
        }
        for source in &degraded {
            insights.push(format!("Degraded: {source}."));
        }

        PredictionResult {
            high_confidence,
            medium_confidence,
            excluded: excluded.into_iter().collect(),
            strongest_head,
            strongest_tail,
            insights,
            is_double_risk,
            meta: PredictionMeta {
                analyzed_count: history.len(),
                weights,
                simulations_run,
                degraded,
            },
        }
    }

    /// Values drawn at least `exclusion_threshold` times, counting both
    /// sessions, within the most recent `exclusion_window` draws.
    #[must_use]
    pub fn exclusion_set(&self, history: &[DrawRecord]) -> BTreeSet<TwoDigit> {
        let window = &history[..history.len().min(self.ruleset.exclusion_window)];
        let mut counts: BTreeMap<TwoDigit, usize> = BTreeMap::new();
        for value in window.iter().flat_map(DrawRecord::values) {
            *counts.entry(value).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count >= self.ruleset.exclusion_threshold)
            .map(|(value, _)| value)
            .collect()
    }

    /// Weighted sum of every registered expert for one candidate. Reasons and
    /// tags are unioned in registry order without duplicates.
    #[must_use]
    pub fn score_candidate(
        &self,
        candidate: TwoDigit,
        ctx: &ScoringContext<'_>,
        weights: &WeightVector,
    ) -> ScoredNumber {
        let mut scored = ScoredNumber {
            number: candidate,
            score: 0.0,
            confidence: 0,
            tags: Vec::new(),
            reasons: Vec::new(),
            excluded: false,
            sub_scores: BTreeMap::new(),
        };

        for expert in self.registry.iter() {
            let kind = expert.kind();
            let result = expert.score(candidate, ctx);
            scored.score += result.score * weights.get(kind);
            scored.sub_scores.insert(kind, result.score);
            push_unique(&mut scored.reasons, result.reasons);
            push_unique(&mut scored.tags, result.tags);
        }
        scored
    }

    /// More than `double_risk_streak` consecutive recent draws without a
    /// double in either session.
    #[must_use]
    pub fn is_double_risk(&self, history: &[DrawRecord]) -> bool {
        let streak = history
            .iter()
            .take_while(|record| !record.am.is_double() && !record.pm.is_double())
            .count();
        streak > self.ruleset.double_risk_streak
    }

    /// Returns the number of trials run per candidate, zero when skipped.
    fn refine_confidence<R: Rng + ?Sized>(
        &self,
        candidates: &mut [ScoredNumber],
        history: &[DrawRecord],
        rng: &mut R,
    ) -> usize {
        let ruleset = &self.ruleset;
        if history.len() < ruleset.simulation_min_history {
            for scored in candidates.iter_mut() {
                scored.confidence = clamp_confidence(ruleset.neutral_confidence, ruleset.confidence_cap);
            }
            return 0;
        }

        let trials = ruleset.simulation_trials;
        for scored in candidates.iter_mut() {
            let hits = (0..trials)
                .filter(|_| history[rng.random_range(0..history.len())].contains(scored.number))
                .count();
            #[allow(clippy::cast_precision_loss)]
            let rate = hits as f64 / trials as f64 * 100.0;

            let scaled = (rate * ruleset.confidence_scale).min(ruleset.confidence_cap);
            scored.confidence = clamp_confidence(scaled, ruleset.confidence_cap);
            if scaled > ruleset.simulation_boost_threshold {
                scored.score += ruleset.simulation_boost_score;
                push_unique(&mut scored.tags, [SIM_VERIFIED_TAG.to_string()]);
            }
        }
        trials
    }

    fn resolve_market(
        &self,
        history: &[DrawRecord],
        request: &PredictionRequest,
        degraded: &mut Vec<String>,
    ) -> Option<MarketReading> {
        if !self.registry.kinds().contains(&ExpertKind::Market) {
            return None;
        }
        if let Some(quote) = &request.market_quote {
            let max_age = Duration::seconds(self.ruleset.market_max_age_secs);
            if quote.is_fresh(request.now, max_age) {
                return Some(quote.reading.clone());
            }
            tracing::warn!(
                observed_at = %quote.observed_at,
                "market quote is stale; ignoring it"
            );
            degraded.push("market quote is stale".to_string());
        }
        history.first().and_then(DrawRecord::market_reading)
    }

    fn insufficient_history(&self, analyzed_count: usize, weights: WeightVector) -> PredictionResult {
        PredictionResult {
            high_confidence: Vec::new(),
            medium_confidence: Vec::new(),
            excluded: Vec::new(),
            strongest_head: None,
            strongest_tail: None,
            insights: vec![format!(
                "Not enough history: at least {} draws are required, found {analyzed_count}.",
                self.ruleset.min_history
            )],
            is_double_risk: false,
            meta: PredictionMeta {
                analyzed_count,
                weights,
                simulations_run: 0,
                degraded: Vec::new(),
            },
        }
    }
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::standard()
    }
}

/// Score descending; ties go to the smaller number.
pub(crate) fn sort_ranking(candidates: &mut [ScoredNumber]) {
    candidates.sort_by(|lhs, rhs| match rhs.score.total_cmp(&lhs.score) {
        Ordering::Equal => lhs.number.cmp(&rhs.number),
        other => other,
    });
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn clamp_confidence(raw: f64, cap: f64) -> u8 {
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(0.0, cap.min(99.0)) as u8
}

pub(crate) fn push_unique(target: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}
