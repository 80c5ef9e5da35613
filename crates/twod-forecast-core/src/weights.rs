use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ForecastError;

/// Identifies one scoring heuristic and its slot in the [`WeightVector`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExpertKind {
    Recency,
    Relationship,
    Trend,
    BreakTotal,
    DigitFrequency,
    DayOfWeek,
    Gap,
    Seasonal,
    Market,
}

impl ExpertKind {
    /// The experts every standard registry carries.
    pub const STANDARD: [Self; 7] = [
        Self::Recency,
        Self::Relationship,
        Self::Trend,
        Self::BreakTotal,
        Self::DigitFrequency,
        Self::DayOfWeek,
        Self::Gap,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recency => "recency",
            Self::Relationship => "relationship",
            Self::Trend => "trend",
            Self::BreakTotal => "break_total",
            Self::DigitFrequency => "digit_frequency",
            Self::DayOfWeek => "day_of_week",
            Self::Gap => "gap",
            Self::Seasonal => "seasonal",
            Self::Market => "market",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "recency" => Some(Self::Recency),
            "relationship" => Some(Self::Relationship),
            "trend" => Some(Self::Trend),
            "break_total" => Some(Self::BreakTotal),
            "digit_frequency" => Some(Self::DigitFrequency),
            "day_of_week" => Some(Self::DayOfWeek),
            "gap" => Some(Self::Gap),
            "seasonal" => Some(Self::Seasonal),
            "market" => Some(Self::Market),
            _ => None,
        }
    }
}

/// Credit assigned to each expert. Components are non-negative and sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct WeightVector {
    weights: BTreeMap<ExpertKind, f64>,
}

impl WeightVector {
    /// Default distribution over the standard experts.
    #[must_use]
    pub fn v1_default() -> Self {
        let mut vector = Self {
            weights: BTreeMap::from([
                (ExpertKind::Recency, 0.20),
                (ExpertKind::Relationship, 0.20),
                (ExpertKind::Trend, 0.15),
                (ExpertKind::DigitFrequency, 0.15),
                (ExpertKind::BreakTotal, 0.10),
                (ExpertKind::DayOfWeek, 0.10),
                (ExpertKind::Gap, 0.10),
            ]),
        };
        vector.normalize();
        vector
    }

    #[must_use]
    pub fn uniform(kinds: &[ExpertKind]) -> Self {
        let mut vector = Self {
            weights: kinds.iter().map(|kind| (*kind, 1.0)).collect(),
        };
        vector.normalize();
        vector
    }

    /// Builds a vector from explicit weights and renormalizes it.
    ///
    /// # Errors
    /// Returns [`ForecastError::Validation`] when the input is empty, holds a
    /// negative or non-finite weight, or sums to zero.
    pub fn from_weights(
        weights: impl IntoIterator<Item = (ExpertKind, f64)>,
    ) -> Result<Self, ForecastError> {
        let weights: BTreeMap<ExpertKind, f64> = weights.into_iter().collect();
        if weights.is_empty() {
            return Err(ForecastError::Validation(
                "weight vector MUST name at least one expert".to_string(),
            ));
        }
        for (kind, value) in &weights {
            if !value.is_finite() || *value < 0.0 {
                return Err(ForecastError::Validation(format!(
                    "weight for {} MUST be a finite non-negative number",
                    kind.as_str()
                )));
            }
        }
        if weights.values().sum::<f64>() <= 0.0 {
            return Err(ForecastError::Validation(
                "weight vector MUST have a positive total".to_string(),
            ));
        }
        let mut vector = Self { weights };
        vector.normalize();
        Ok(vector)
    }

    #[must_use]
    pub fn get(&self, kind: ExpertKind) -> f64 {
        self.weights.get(&kind).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExpertKind, f64)> + '_ {
        self.weights.iter().map(|(kind, value)| (*kind, *value))
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<ExpertKind> {
        self.weights.keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    #[must_use]
    pub fn is_normalized(&self, tolerance: f64) -> bool {
        !self.weights.is_empty()
            && self.weights.values().all(|value| *value >= 0.0)
            && (self.total() - 1.0).abs() <= tolerance
    }

    /// Restricts the vector to `kinds`. Experts without a weight get the mean
    /// of the weights that carry over; weights for absent experts are dropped.
    #[must_use]
    pub fn aligned_to(&self, kinds: &[ExpertKind]) -> Self {
        let carried: Vec<f64> = kinds
            .iter()
            .filter_map(|kind| self.weights.get(kind).copied())
            .collect();
        if carried.is_empty() {
            return Self::uniform(kinds);
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = carried.iter().sum::<f64>() / carried.len() as f64;

        let mut aligned = Self {
            weights: kinds
                .iter()
                .map(|kind| (*kind, self.weights.get(kind).copied().unwrap_or(mean)))
                .collect(),
        };
        aligned.normalize();
        aligned
    }

    pub(crate) fn add(&mut self, kind: ExpertKind, delta: f64) {
        if let Some(value) = self.weights.get_mut(&kind) {
            *value += delta;
        }
    }

    /// Clamps every weight into `[floor, ceiling]`, then renormalizes.
    pub(crate) fn clamp_and_normalize(&mut self, floor: f64, ceiling: f64) {
        for value in self.weights.values_mut() {
            *value = value.clamp(floor, ceiling);
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        let total = self.total();
        if !total.is_finite() || total <= 0.0 {
            #[allow(clippy::cast_precision_loss)]
            let share = 1.0 / self.weights.len().max(1) as f64;
            for value in self.weights.values_mut() {
                *value = share;
            }
            return;
        }
        for value in self.weights.values_mut() {
            *value /= total;
        }
    }
}

impl Default for WeightVector {
    fn default() -> Self {
        Self::v1_default()
    }
}
