use std::collections::BTreeMap;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::engine::{ForecastEngine, PredictionRequest};
use crate::{DrawRecord, ForecastError, WeightVector};

pub const BACKTEST_CONTRACT_VERSION: &str = "backtest_report.v1";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct BacktestConfig {
    /// Number of most recent records to evaluate.
    pub days: usize,
    pub seed: u64,
    /// Feed each evaluated outcome back through the weight adapter.
    pub adapt_weights: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            days: 30,
            seed: 0,
            adapt_weights: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyStats {
    /// `YYYY-MM`
    pub month: String,
    pub hits: usize,
    pub total: usize,
    pub accuracy_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestReport {
    pub contract_version: String,
    pub days: usize,
    pub seed: u64,
    pub evaluated: usize,
    /// Records in the window with too little prior history to predict from.
    pub skipped: usize,
    pub hits: usize,
    pub accuracy_pct: f64,
    pub months: Vec<MonthlyStats>,
    pub predict_p50_ms: f64,
    pub predict_p95_ms: f64,
    pub final_weights: WeightVector,
}

impl ForecastEngine {
    /// Walk-forward evaluation over the most recent `config.days` records,
    /// oldest first. Each record is predicted from the records strictly older
    /// than it; a hit is either session landing in the high or medium set.
    ///
    /// # Errors
    /// Returns [`ForecastError::Validation`] when `config.days` is zero.
    pub fn run_backtest(
        &self,
        history: &[DrawRecord],
        weights: &WeightVector,
        config: &BacktestConfig,
    ) -> Result<BacktestReport, ForecastError> {
        if config.days == 0 {
            return Err(ForecastError::Validation(
                "backtest days MUST be >= 1".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut weights = self.effective_weights(weights);
        let mut samples_ms = Vec::new();
        let mut months: BTreeMap<(i32, u8), (usize, usize)> = BTreeMap::new();
        let (mut evaluated, mut skipped, mut hits) = (0_usize, 0_usize, 0_usize);

        let window = config.days.min(history.len());
        for index in (0..window).rev() {
            let actual = &history[index];
            let prior = &history[index + 1..];
            if prior.len() < self.ruleset().min_history {
                skipped += 1;
                continue;
            }

            let request = PredictionRequest::for_date(actual.date);
            let start = Instant::now();
            let result = self.predict_with_rng(prior, &weights, &request, &mut rng);
            samples_ms.push(start.elapsed().as_secs_f64() * 1_000.0);

            let hit = result.contains(actual.am) || result.contains(actual.pm);
            evaluated += 1;
            hits += usize::from(hit);
            let month = months
                .entry((actual.date.year(), u8::from(actual.date.month())))
                .or_default();
            month.0 += usize::from(hit);
            month.1 += 1;

            if config.adapt_weights {
                weights = self.adapt(actual.am, prior, &weights, actual.date).after;
                weights = self.adapt(actual.pm, prior, &weights, actual.date).after;
            }
        }

        tracing::info!(
            evaluated,
            skipped,
            hits,
            adapt_weights = config.adapt_weights,
            "backtest finished"
        );

        Ok(BacktestReport {
            contract_version: BACKTEST_CONTRACT_VERSION.to_string(),
            days: config.days,
            seed: config.seed,
            evaluated,
            skipped,
            hits,
            accuracy_pct: accuracy_pct(hits, evaluated),
            months: months
                .into_iter()
                .map(|((year, month), (hits, total))| MonthlyStats {
                    month: format!("{year:04}-{month:02}"),
                    hits,
                    total,
                    accuracy_pct: accuracy_pct(hits, total),
                })
                .collect(),
            predict_p50_ms: percentile(&samples_ms, 0.50),
            predict_p95_ms: percentile(&samples_ms, 0.95),
            final_weights: weights,
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn accuracy_pct(hits: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    hits as f64 / total as f64 * 100.0
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn percentile(values: &[f64], percentile_rank: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = (percentile_rank * sorted.len() as f64).ceil() as usize;
    let index = position.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{must_ok, synthetic_history};

    #[test]
    fn percentile_uses_nearest_rank() {
        let values = [5.0, 1.0, 3.0, 2.0, 4.0];
        assert!((percentile(&values, 0.50) - 3.0).abs() < f64::EPSILON);
        assert!((percentile(&values, 0.95) - 5.0).abs() < f64::EPSILON);
        assert!((percentile(&[], 0.95)).abs() < f64::EPSILON);
    }

    #[test]
    fn skips_records_without_enough_prior_history() {
        let engine = ForecastEngine::standard();
        let history = synthetic_history(8);
        let report = must_ok(engine.run_backtest(
            &history,
            &WeightVector::default(),
            &BacktestConfig {
                days: 8,
                ..BacktestConfig::default()
            },
        ));

        // the oldest five records have fewer than five older records
        assert_eq!(report.skipped, 5);
        assert_eq!(report.evaluated, 3);
        assert_eq!(report.contract_version, BACKTEST_CONTRACT_VERSION);
        assert!(report.hits <= report.evaluated);
    }

    #[test]
    fn monthly_breakdown_adds_up() {
        let engine = ForecastEngine::standard();
        let history = synthetic_history(60);
        let report = must_ok(engine.run_backtest(
            &history,
            &WeightVector::default(),
            &BacktestConfig {
                days: 40,
                seed: 11,
                adapt_weights: true,
            },
        ));

        assert_eq!(report.evaluated, 40);
        let total: usize = report.months.iter().map(|month| month.total).sum();
        let hits: usize = report.months.iter().map(|month| month.hits).sum();
        assert_eq!(total, report.evaluated);
        assert_eq!(hits, report.hits);
        assert!(report.months.windows(2).all(|pair| pair[0].month < pair[1].month));
        assert!((0.0..=100.0).contains(&report.accuracy_pct));
        assert!(report.final_weights.is_normalized(1e-9));
        assert!(report.predict_p50_ms <= report.predict_p95_ms);
    }

    #[test]
    fn same_seed_gives_same_hits() {
        let engine = ForecastEngine::standard();
        let history = synthetic_history(70);
        let config = BacktestConfig {
            days: 10,
            seed: 5,
            adapt_weights: false,
        };
        let first = must_ok(engine.run_backtest(&history, &WeightVector::default(), &config));
        let second = must_ok(engine.run_backtest(&history, &WeightVector::default(), &config));
        assert_eq!(first.hits, second.hits);
        assert_eq!(first.months, second.months);
    }

    #[test]
    fn zero_days_is_rejected() {
        let engine = ForecastEngine::standard();
        let config = BacktestConfig {
            days: 0,
            ..BacktestConfig::default()
        };
        assert!(engine
            .run_backtest(&synthetic_history(10), &WeightVector::default(), &config)
            .is_err());
    }
}
