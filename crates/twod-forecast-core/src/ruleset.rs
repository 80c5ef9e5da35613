use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ForecastError;

/// Every tunable constant of the engine, the experts and the weight adapter.
///
/// Rulesets are versioned so that a stored history of predictions can always
/// be explained by the constants that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastRuleset {
    pub ruleset_version: u32,

    pub min_history: usize,
    pub exclusion_window: usize,
    pub exclusion_threshold: usize,

    pub recency_window: usize,
    pub recency_multiplier: f64,
    pub day_of_week_window: usize,
    pub day_of_week_multiplier: f64,
    pub seasonal_multiplier: f64,
    pub power_bonus: f64,
    pub nakhat_bonus: f64,
    pub neighbor_pair_bonus: f64,
    pub trend_window: usize,
    pub trend_min_draws: usize,
    pub trend_min_count: usize,
    pub trend_multiplier: f64,
    pub break_window: usize,
    pub break_min_count: usize,
    pub break_multiplier: f64,
    pub digit_window: usize,
    pub hot_digit_count: usize,
    pub hot_digit_bonus: f64,
    pub gap_baseline: usize,
    pub gap_multiplier: f64,
    pub gap_bonus_cap: f64,
    pub market_difference_bonus: f64,
    pub market_sum_bonus: f64,
    pub market_max_age_secs: i64,

    pub refine_top_k: usize,
    pub simulation_trials: usize,
    pub simulation_min_history: usize,
    pub neutral_confidence: f64,
    pub confidence_scale: f64,
    pub confidence_cap: f64,
    pub simulation_boost_threshold: f64,
    pub simulation_boost_score: f64,
    pub high_confidence_count: usize,
    pub medium_confidence_count: usize,
    pub double_risk_streak: usize,

    pub scenario_pattern_bonus: f64,
    pub scenario_recency_factor: f64,
    pub scenario_confidence_scale: f64,

    pub learning_rate: f64,
    pub weight_floor: f64,
    pub weight_ceiling: f64,
    pub prediction_threshold: f64,
}

impl ForecastRuleset {
    #[must_use]
    pub fn v1() -> Self {
        Self {
            ruleset_version: 1,
            min_history: 5,
            exclusion_window: 7,
            exclusion_threshold: 2,
            recency_window: 15,
            recency_multiplier: 1.5,
            day_of_week_window: 20,
            day_of_week_multiplier: 1.2,
            seasonal_multiplier: 2.0,
            power_bonus: 4.0,
            nakhat_bonus: 5.0,
            neighbor_pair_bonus: 10.0,
            trend_window: 5,
            trend_min_draws: 3,
            trend_min_count: 2,
            trend_multiplier: 2.0,
            break_window: 10,
            break_min_count: 2,
            break_multiplier: 2.0,
            digit_window: 10,
            hot_digit_count: 3,
            hot_digit_bonus: 3.0,
            gap_baseline: 30,
            gap_multiplier: 0.2,
            gap_bonus_cap: 10.0,
            market_difference_bonus: 10.0,
            market_sum_bonus: 8.0,
            market_max_age_secs: 600,
            refine_top_k: 20,
            simulation_trials: 1_000,
            simulation_min_history: 50,
            neutral_confidence: 50.0,
            confidence_scale: 50.0,
            confidence_cap: 99.0,
            simulation_boost_threshold: 95.0,
            simulation_boost_score: 50.0,
            high_confidence_count: 4,
            medium_confidence_count: 6,
            double_risk_streak: 8,
            scenario_pattern_bonus: 15.0,
            scenario_recency_factor: 0.5,
            scenario_confidence_scale: 5.0,
            learning_rate: 0.05,
            weight_floor: 0.01,
            weight_ceiling: 0.5,
            prediction_threshold: 0.0,
        }
    }

    /// Validates window sizes, bounds and the weight band.
    ///
    /// # Errors
    /// Returns [`ForecastError::Configuration`] when one or more fields are
    /// outside allowed bounds.
    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.ruleset_version == 0 {
            return Err(ForecastError::Configuration(
                "ruleset_version MUST be >= 1".to_string(),
            ));
        }

        for (name, value) in [
            ("min_history", self.min_history),
            ("exclusion_window", self.exclusion_window),
            ("exclusion_threshold", self.exclusion_threshold),
            ("recency_window", self.recency_window),
            ("day_of_week_window", self.day_of_week_window),
            ("trend_window", self.trend_window),
            ("break_window", self.break_window),
            ("digit_window", self.digit_window),
            ("refine_top_k", self.refine_top_k),
            ("simulation_trials", self.simulation_trials),
        ] {
            if value == 0 {
                return Err(ForecastError::Configuration(format!("{name} MUST be >= 1")));
            }
        }

        if self.trend_min_draws > self.trend_window {
            return Err(ForecastError::Configuration(
                "trend_min_draws MUST be <= trend_window".to_string(),
            ));
        }

        if self.hot_digit_count > 10 {
            return Err(ForecastError::Configuration(
                "hot_digit_count MUST be <= 10".to_string(),
            ));
        }

        if self.high_confidence_count + self.medium_confidence_count == 0 {
            return Err(ForecastError::Configuration(
                "at least one high or medium confidence slot is required".to_string(),
            ));
        }

        for (name, value) in [
            ("recency_multiplier", self.recency_multiplier),
            ("day_of_week_multiplier", self.day_of_week_multiplier),
            ("seasonal_multiplier", self.seasonal_multiplier),
            ("power_bonus", self.power_bonus),
            ("nakhat_bonus", self.nakhat_bonus),
            ("neighbor_pair_bonus", self.neighbor_pair_bonus),
            ("trend_multiplier", self.trend_multiplier),
            ("break_multiplier", self.break_multiplier),
            ("hot_digit_bonus", self.hot_digit_bonus),
            ("gap_multiplier", self.gap_multiplier),
            ("gap_bonus_cap", self.gap_bonus_cap),
            ("market_difference_bonus", self.market_difference_bonus),
            ("market_sum_bonus", self.market_sum_bonus),
            ("confidence_scale", self.confidence_scale),
            ("simulation_boost_score", self.simulation_boost_score),
            ("prediction_threshold", self.prediction_threshold),
            ("scenario_pattern_bonus", self.scenario_pattern_bonus),
            ("scenario_recency_factor", self.scenario_recency_factor),
            ("scenario_confidence_scale", self.scenario_confidence_scale),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ForecastError::Configuration(format!(
                    "{name} MUST be a finite non-negative number"
                )));
            }
        }

        if self.market_max_age_secs <= 0 {
            return Err(ForecastError::Configuration(
                "market_max_age_secs MUST be > 0".to_string(),
            ));
        }

        if !(0.0..=99.0).contains(&self.confidence_cap) {
            return Err(ForecastError::Configuration(
                "confidence_cap MUST be in [0, 99]".to_string(),
            ));
        }

        if !(0.0..=self.confidence_cap).contains(&self.neutral_confidence) {
            return Err(ForecastError::Configuration(
                "neutral_confidence MUST be in [0, confidence_cap]".to_string(),
            ));
        }

        if !self.simulation_boost_threshold.is_finite() {
            return Err(ForecastError::Configuration(
                "simulation_boost_threshold MUST be finite".to_string(),
            ));
        }

        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ForecastError::Configuration(
                "learning_rate MUST be in (0.0, 1.0]".to_string(),
            ));
        }

        if !(self.weight_floor > 0.0
            && self.weight_floor < self.weight_ceiling
            && self.weight_ceiling <= 1.0)
        {
            return Err(ForecastError::Configuration(
                "weight band MUST satisfy 0 < weight_floor < weight_ceiling <= 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Decodes and validates a ruleset from JSON.
    ///
    /// # Errors
    /// Returns [`ForecastError::Configuration`] when JSON decoding fails
    /// or decoded values violate ruleset constraints.
    pub fn from_json(value: &Value) -> Result<Self, ForecastError> {
        let ruleset: Self = serde_json::from_value(value.clone()).map_err(|err| {
            ForecastError::Configuration(format!("invalid ruleset JSON payload: {err}"))
        })?;
        ruleset.validate()?;
        Ok(ruleset)
    }
}

impl Default for ForecastRuleset {
    fn default() -> Self {
        Self::v1()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::must_ok;

    #[test]
    fn v1_is_valid() {
        must_ok(ForecastRuleset::v1().validate());
    }

    #[test]
    fn inverted_weight_band_is_rejected() {
        let mut ruleset = ForecastRuleset::v1();
        ruleset.weight_floor = 0.6;
        ruleset.weight_ceiling = 0.5;
        assert!(matches!(
            ruleset.validate(),
            Err(ForecastError::Configuration(_))
        ));
    }

    #[test]
    fn zero_window_is_rejected_with_field_name() {
        let mut ruleset = ForecastRuleset::v1();
        ruleset.exclusion_window = 0;
        let err = match ruleset.validate() {
            Ok(()) => panic!("expected configuration error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("exclusion_window"));
    }

    #[test]
    fn json_round_trip_preserves_values() {
        let ruleset = ForecastRuleset::v1();
        let value = must_ok(serde_json::to_value(&ruleset));
        let decoded = must_ok(ForecastRuleset::from_json(&value));
        assert_eq!(decoded, ruleset);
    }

    #[test]
    fn json_with_missing_fields_is_reported_clearly() {
        let err = match ForecastRuleset::from_json(&serde_json::json!({"ruleset_version": 2})) {
            Ok(_) => panic!("expected configuration error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("invalid ruleset JSON payload"));
    }
}
