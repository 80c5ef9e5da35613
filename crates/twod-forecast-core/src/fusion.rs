use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::PredictionResult;
use crate::{format_iso_date, DrawRecord, ForecastError, TwoDigit};

const FUSED_PICK_LIMIT: usize = 10;

/// Ranking returned by a hosted generative model.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ExternalPrediction {
    pub top_picks: Vec<TwoDigit>,
    pub strongest_head: Option<u8>,
    pub strongest_tail: Option<u8>,
    pub analysis_summary: String,
}

impl ExternalPrediction {
    /// Validates a raw model answer.
    ///
    /// `top_picks` must be a non-empty array of two-digit strings. Head and
    /// tail digits that are missing or not a single digit are dropped rather
    /// than rejected.
    ///
    /// # Errors
    /// Returns [`ForecastError::Validation`] when `top_picks` is missing,
    /// empty, or holds anything other than a two-digit value.
    pub fn from_json(value: &Value) -> Result<Self, ForecastError> {
        let picks = value
            .get("top_picks")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ForecastError::Validation("external answer is missing top_picks".to_string())
            })?;
        if picks.is_empty() {
            return Err(ForecastError::Validation(
                "external answer has empty top_picks".to_string(),
            ));
        }

        let mut top_picks = Vec::with_capacity(picks.len());
        for pick in picks {
            let raw = pick.as_str().ok_or_else(|| {
                ForecastError::Validation(format!("external pick {pick} is not a string"))
            })?;
            let parsed = TwoDigit::parse(raw)?;
            if !top_picks.contains(&parsed) {
                top_picks.push(parsed);
            }
        }

        Ok(Self {
            top_picks,
            strongest_head: single_digit(value.get("strongest_head")),
            strongest_tail: single_digit(value.get("strongest_tail")),
            analysis_summary: value
                .get("analysis_summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

fn single_digit(value: Option<&Value>) -> Option<u8> {
    let digit = match value? {
        Value::String(raw) => raw.trim().parse::<u8>().ok()?,
        Value::Number(number) => u8::try_from(number.as_u64()?).ok()?,
        _ => return None,
    };
    (digit < 10).then_some(digit)
}

/// A source of rankings outside the local engine.
///
/// Returns `None` when the source is unavailable; callers then fall back to
/// the local ranking alone.
pub trait ExternalPredictor {
    fn predict(&self, history: &[DrawRecord]) -> Option<ExternalPrediction>;
}

/// Stand-in used when no credential is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailablePredictor;

impl ExternalPredictor for UnavailablePredictor {
    fn predict(&self, _history: &[DrawRecord]) -> Option<ExternalPrediction> {
        None
    }
}

/// Compact history lines for a model prompt, one per draw, most recent first:
/// `2026-01-23 (Fri): AM=43, PM=91`.
#[must_use]
pub fn format_history_prompt(history: &[DrawRecord], limit: usize) -> String {
    history
        .iter()
        .take(limit)
        .map(|record| {
            let day = record.day_of_week();
            format!(
                "{} ({}): AM={}, PM={}",
                format_iso_date(record.date),
                day.get(..3).unwrap_or(day),
                record.am,
                record.pm
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PickSource {
    Both,
    External,
    Local,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct FusedPick {
    pub number: TwoDigit,
    pub source: PickSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct FusedPicks {
    pub picks: Vec<FusedPick>,
    pub external_available: bool,
    pub summary: String,
}

/// Merges the local ranking with an optional external one: picks both agree
/// on come first in external order, then external-only picks, then
/// local-only picks, capped at ten.
#[must_use]
pub fn fuse_rankings(local: &PredictionResult, external: Option<&ExternalPrediction>) -> FusedPicks {
    let local_picks: Vec<TwoDigit> = local.ranked().map(|scored| scored.number).collect();

    let Some(external) = external else {
        tracing::warn!("external ranking unavailable; using local ranking only");
        return FusedPicks {
            picks: local_picks
                .into_iter()
                .take(FUSED_PICK_LIMIT)
                .map(|number| FusedPick {
                    number,
                    source: PickSource::Local,
                })
                .collect(),
            external_available: false,
            summary: "External ranking unavailable; showing the local ranking only.".to_string(),
        };
    };

    let mut picks: Vec<FusedPick> = Vec::with_capacity(FUSED_PICK_LIMIT);
    let mut push = |number: TwoDigit, source: PickSource| {
        if picks.len() < FUSED_PICK_LIMIT && !picks.iter().any(|pick| pick.number == number) {
            picks.push(FusedPick { number, source });
        }
    };

    for number in &external.top_picks {
        if local_picks.contains(number) {
            push(*number, PickSource::Both);
        }
    }
    for number in &external.top_picks {
        push(*number, PickSource::External);
    }
    for number in &local_picks {
        push(*number, PickSource::Local);
    }

    let agreed = picks
        .iter()
        .filter(|pick| pick.source == PickSource::Both)
        .count();
    FusedPicks {
        picks,
        external_available: true,
        summary: format!("{agreed} picks agreed between the local and external rankings."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ForecastEngine, PredictionRequest};
    use crate::test_support::{date, digit, five_draws, must_ok};
    use crate::WeightVector;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn local_result() -> PredictionResult {
        ForecastEngine::standard().predict_with_rng(
            &five_draws(),
            &WeightVector::default(),
            &PredictionRequest::for_date(date("2026-01-24")),
            &mut StdRng::seed_from_u64(1),
        )
    }

    #[test]
    fn from_json_accepts_model_answer() {
        let parsed = must_ok(ExternalPrediction::from_json(&json!({
            "top_picks": ["45", "09", "45"],
            "strongest_head": "4",
            "strongest_tail": 9,
            "analysis_summary": "power digits are hot"
        })));
        assert_eq!(parsed.top_picks, vec![digit("45"), digit("09")]);
        assert_eq!(parsed.strongest_head, Some(4));
        assert_eq!(parsed.strongest_tail, Some(9));
    }

    #[test]
    fn from_json_rejects_missing_or_malformed_picks() {
        assert!(ExternalPrediction::from_json(&json!({})).is_err());
        assert!(ExternalPrediction::from_json(&json!({"top_picks": []})).is_err());
        assert!(ExternalPrediction::from_json(&json!({"top_picks": ["Error"]})).is_err());
        assert!(ExternalPrediction::from_json(&json!({"top_picks": [45]})).is_err());

        let lenient = must_ok(ExternalPrediction::from_json(
            &json!({"top_picks": ["45"], "strongest_head": "X"}),
        ));
        assert_eq!(lenient.strongest_head, None);
        assert_eq!(lenient.analysis_summary, "");
    }

    #[test]
    fn prompt_lines_use_short_weekday() {
        let prompt = format_history_prompt(&five_draws(), 2);
        assert_eq!(
            prompt,
            "2026-01-23 (Fri): AM=43, PM=91\n2026-01-22 (Thu): AM=42, PM=44"
        );
    }

    #[test]
    fn unavailable_source_falls_back_to_local_ranking() {
        let local = local_result();
        let external = UnavailablePredictor.predict(&five_draws());
        let fused = fuse_rankings(&local, external.as_ref());

        assert!(!fused.external_available);
        assert_eq!(fused.picks.len(), 10);
        assert!(fused.picks.iter().all(|pick| pick.source == PickSource::Local));
        let expected: Vec<TwoDigit> = local.ranked().map(|scored| scored.number).collect();
        let actual: Vec<TwoDigit> = fused.picks.iter().map(|pick| pick.number).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn agreement_comes_first_in_external_order() {
        let local = local_result();
        let local_picks: Vec<TwoDigit> = local.ranked().map(|scored| scored.number).collect();
        let outsider = must_ok(TwoDigit::all()
            .find(|value| !local_picks.contains(value))
            .ok_or("no outsider"));

        let external = ExternalPrediction {
            top_picks: vec![outsider, local_picks[3], local_picks[0]],
            strongest_head: None,
            strongest_tail: None,
            analysis_summary: String::new(),
        };
        let fused = fuse_rankings(&local, Some(&external));

        assert!(fused.external_available);
        assert_eq!(fused.picks.len(), 10);
        assert_eq!(
            fused.picks[0],
            FusedPick { number: local_picks[3], source: PickSource::Both }
        );
        assert_eq!(
            fused.picks[1],
            FusedPick { number: local_picks[0], source: PickSource::Both }
        );
        assert_eq!(
            fused.picks[2],
            FusedPick { number: outsider, source: PickSource::External }
        );
        assert_eq!(fused.picks[3].source, PickSource::Local);
        assert!(fused.summary.starts_with('2'));
    }
}
