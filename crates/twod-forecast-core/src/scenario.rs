use std::collections::BTreeMap;

use rand::Rng;
use time::Date;

use crate::engine::{
    clamp_confidence, sort_ranking, ForecastEngine, PredictionMeta, PredictionRequest,
    PredictionResult, ScoredNumber,
};
use crate::{today_utc, DrawRecord, TwoDigit, WeightVector};

impl ForecastEngine {
    /// "What if" prediction for a hypothetical next draw.
    ///
    /// With only `am`, evening values are ranked by how often they followed
    /// that morning value historically. With both values, a hypothetical
    /// record is placed the day after the latest record and the full engine
    /// predicts the day after that.
    #[must_use]
    pub fn simulate_scenario(
        &self,
        history: &[DrawRecord],
        weights: &WeightVector,
        am: TwoDigit,
        pm: Option<TwoDigit>,
    ) -> PredictionResult {
        self.simulate_scenario_with_rng(history, weights, am, pm, &mut rand::rng())
    }

    pub fn simulate_scenario_with_rng<R: Rng + ?Sized>(
        &self,
        history: &[DrawRecord],
        weights: &WeightVector,
        am: TwoDigit,
        pm: Option<TwoDigit>,
        rng: &mut R,
    ) -> PredictionResult {
        match pm {
            None => self.evening_given_morning(history, weights, am),
            Some(pm) => {
                let scenario_date = history
                    .first()
                    .map_or_else(today_utc, |latest| next_day(latest.date));
                let mut extended = Vec::with_capacity(history.len() + 1);
                extended.push(DrawRecord::new(scenario_date, am, pm));
                extended.extend(history.iter().filter(|r| r.date < scenario_date).cloned());

                tracing::debug!(%am, %pm, scenario_date = %scenario_date, "running full scenario");
                let request = PredictionRequest::for_date(next_day(scenario_date));
                self.predict_with_rng(&extended, weights, &request, rng)
            }
        }
    }

    fn evening_given_morning(
        &self,
        history: &[DrawRecord],
        weights: &WeightVector,
        am: TwoDigit,
    ) -> PredictionResult {
        let ruleset = self.ruleset();

        let mut followers: BTreeMap<TwoDigit, usize> = BTreeMap::new();
        let mut matches = 0_usize;
        for record in history.iter().filter(|record| record.am == am) {
            matches += 1;
            *followers.entry(record.pm).or_default() += 1;
        }
        let recent = &history[..history.len().min(ruleset.recency_window)];

        let mut candidates: Vec<ScoredNumber> = TwoDigit::all()
            .filter_map(|candidate| {
                let mut scored = ScoredNumber {
                    number: candidate,
                    score: 0.0,
                    confidence: 0,
                    tags: Vec::new(),
                    reasons: Vec::new(),
                    excluded: false,
                    sub_scores: BTreeMap::new(),
                };
                if let Some(count) = followers.get(&candidate).copied() {
                    #[allow(clippy::cast_precision_loss)]
                    let bonus = count as f64 * ruleset.scenario_pattern_bonus;
                    scored.score += bonus;
                    scored
                        .reasons
                        .push(format!("followed morning {am} {count}x before"));
                    scored.tags.push("pattern".to_string());
                }
                let frequency: usize = recent
                    .iter()
                    .map(|r| usize::from(r.am == candidate) + usize::from(r.pm == candidate))
                    .sum();
                #[allow(clippy::cast_precision_loss)]
                let recency = frequency as f64 * ruleset.scenario_recency_factor;
                scored.score += recency;
                (scored.score > 0.0).then_some(scored)
            })
            .collect();
        sort_ranking(&mut candidates);
        for scored in &mut candidates {
            scored.confidence = clamp_confidence(
                scored.score * ruleset.scenario_confidence_scale,
                ruleset.confidence_cap,
            );
        }

        let medium_confidence: Vec<ScoredNumber> = candidates
            .iter()
            .skip(ruleset.high_confidence_count)
            .take(ruleset.medium_confidence_count)
            .cloned()
            .collect();
        candidates.truncate(ruleset.high_confidence_count);
        let top = candidates.first().or_else(|| medium_confidence.first());

        PredictionResult {
            strongest_head: top.map(|scored| scored.number.head()),
            strongest_tail: top.map(|scored| scored.number.tail()),
            high_confidence: candidates,
            medium_confidence,
            excluded: Vec::new(),
            insights: vec![
                format!("Based on {matches} past mornings that drew {am}."),
                "Ranked by morning/evening pattern matching.".to_string(),
            ],
            is_double_risk: false,
            meta: PredictionMeta {
                analyzed_count: matches,
                weights: self.effective_weights(weights),
                simulations_run: 0,
                degraded: Vec::new(),
            },
        }
    }
}

fn next_day(date: Date) -> Date {
    date.next_day().unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, digit, draw, five_draws};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn morning_only_ranks_past_followers_first() {
        let engine = ForecastEngine::standard();
        let history = vec![
            draw("2026-01-23", "43", "91"),
            draw("2026-01-22", "12", "55"),
            draw("2026-01-21", "43", "91"),
            draw("2026-01-20", "43", "08"),
        ];
        let result = engine.simulate_scenario(&history, &WeightVector::default(), digit("43"), None);

        let top = &result.high_confidence[0];
        assert_eq!(top.number, digit("91"));
        // 2 follows x 15 + 2 recent draws x 0.5
        assert!((top.score - 31.0).abs() < 1e-9);
        assert_eq!(top.confidence, 99);
        assert_eq!(result.high_confidence[1].number, digit("08"));
        assert!(result.excluded.is_empty());
        assert_eq!(result.meta.simulations_run, 0);
        assert_eq!(result.meta.analyzed_count, 3);
        assert_eq!(result.strongest_head, Some(9));
    }

    #[test]
    fn morning_only_confidence_scales_small_scores() {
        let engine = ForecastEngine::standard();
        let history = vec![draw("2026-01-23", "10", "20")];
        let result = engine.simulate_scenario(&history, &WeightVector::default(), digit("77"), None);
        // no follower; recency 0.5 -> confidence round(2.5) = 3
        assert_eq!(result.high_confidence.len(), 2);
        assert!(result.high_confidence.iter().all(|scored| scored.confidence == 3));
    }

    #[test]
    fn full_scenario_prepends_hypothetical_record() {
        let engine = ForecastEngine::standard();
        let history = five_draws();
        let mut rng = StdRng::seed_from_u64(3);
        let result = engine.simulate_scenario_with_rng(
            &history,
            &WeightVector::default(),
            digit("43"),
            Some(digit("43")),
            &mut rng,
        );

        assert_eq!(result.meta.analyzed_count, history.len() + 1);
        // 43 now appears twice within the exclusion window
        assert!(result.excluded.contains(&digit("43")));
        assert!(!result.contains(digit("43")));
    }

    #[test]
    fn next_day_rolls_over_month_end() {
        assert_eq!(next_day(date("2026-01-31")), date("2026-02-01"));
    }
}
