use std::fmt::{Debug, Formatter};

use time::Date;

use crate::market::{market_tails, MarketReading};
use crate::{day_name, DrawRecord, ExpertKind, ForecastRuleset, TwoDigit};

/// Everything an expert may look at. `history` is most recent first and never
/// contains the draw being predicted.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub history: &'a [DrawRecord],
    pub target_date: Date,
    pub market: Option<&'a MarketReading>,
    pub ruleset: &'a ForecastRuleset,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpertScore {
    pub score: f64,
    pub reasons: Vec<String>,
    pub tags: Vec<String>,
}

impl ExpertScore {
    fn zero() -> Self {
        Self::default()
    }

    fn of(score: f64) -> Self {
        Self {
            score,
            ..Self::default()
        }
    }

    fn because(mut self, reason: impl Into<String>, tag: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self.tags.push(tag.into());
        self
    }
}

/// An independent heuristic that scores one candidate against the history.
///
/// Implementations must be pure: the same candidate and context always give
/// the same score, and no expert observes another's output.
pub trait Expert: Send + Sync {
    fn kind(&self) -> ExpertKind;
    fn score(&self, candidate: TwoDigit, ctx: &ScoringContext<'_>) -> ExpertScore;
}

fn window(history: &[DrawRecord], len: usize) -> &[DrawRecord] {
    &history[..history.len().min(len)]
}

#[allow(clippy::cast_precision_loss)]
fn as_score(count: usize) -> f64 {
    count as f64
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecencyExpert;

impl Expert for RecencyExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Recency
    }

    fn score(&self, candidate: TwoDigit, ctx: &ScoringContext<'_>) -> ExpertScore {
        let total: f64 = window(ctx.history, ctx.ruleset.recency_window)
            .iter()
            .enumerate()
            .map(|(rank, record)| {
                let hits = usize::from(record.am == candidate) + usize::from(record.pm == candidate);
                as_score(hits) / as_score(rank + 1)
            })
            .sum();
        if total <= 0.0 {
            return ExpertScore::zero();
        }
        ExpertScore::of(total * ctx.ruleset.recency_multiplier)
            .because(format!("{candidate} appeared recently"), "recent")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DayOfWeekExpert;

impl Expert for DayOfWeekExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::DayOfWeek
    }

    fn score(&self, candidate: TwoDigit, ctx: &ScoringContext<'_>) -> ExpertScore {
        let weekday = day_name(ctx.target_date);
        let count: usize = ctx
            .history
            .iter()
            .filter(|record| record.day_of_week() == weekday)
            .take(ctx.ruleset.day_of_week_window)
            .map(|record| usize::from(record.am == candidate) + usize::from(record.pm == candidate))
            .sum();
        if count == 0 {
            return ExpertScore::zero();
        }
        ExpertScore::of(as_score(count) * ctx.ruleset.day_of_week_multiplier)
            .because(format!("drawn {count}x on recent {weekday}s"), "weekday")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SeasonalExpert;

impl Expert for SeasonalExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Seasonal
    }

    fn score(&self, candidate: TwoDigit, ctx: &ScoringContext<'_>) -> ExpertScore {
        let month = ctx.target_date.month();
        let count: usize = ctx
            .history
            .iter()
            .filter(|record| record.date.month() == month)
            .map(|record| usize::from(record.am == candidate) + usize::from(record.pm == candidate))
            .sum();
        if count == 0 {
            return ExpertScore::zero();
        }
        ExpertScore::of(as_score(count) * ctx.ruleset.seasonal_multiplier)
            .because(format!("drawn {count}x in past {month}s"), "seasonal")
    }
}

/// `d -> (d + 5) mod 10`
fn power_of(digit: u8) -> u8 {
    (digit + 5) % 10
}

/// Fixed pairing `0-6, 1-8, 2-4, 3-5, 7-9`.
fn nakhat_of(digit: u8) -> u8 {
    const NAKHAT: [u8; 10] = [6, 8, 4, 5, 2, 3, 0, 9, 1, 7];
    NAKHAT[usize::from(digit % 10)]
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RelationshipExpert;

impl Expert for RelationshipExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Relationship
    }

    fn score(&self, candidate: TwoDigit, ctx: &ScoringContext<'_>) -> ExpertScore {
        let Some(previous) = ctx.history.first() else {
            return ExpertScore::zero();
        };
        let ruleset = ctx.ruleset;

        let mut previous_digits = [false; 10];
        for value in previous.values() {
            previous_digits[usize::from(value.head())] = true;
            previous_digits[usize::from(value.tail())] = true;
        }

        let positions = [candidate.head(), candidate.tail()];
        let mut score = 0.0;
        for digit in (0..10_u8).filter(|digit| previous_digits[usize::from(*digit)]) {
            for position in positions {
                if power_of(digit) == position {
                    score += ruleset.power_bonus;
                }
                if nakhat_of(digit) == position {
                    score += ruleset.nakhat_bonus;
                }
            }
        }

        let mut result = ExpertScore::of(score);
        if score > 2.0 * ruleset.power_bonus {
            result = result.because("nakhat/power link to previous draw", "nakhat-power");
        } else if score > ruleset.power_bonus {
            result = result.because("power link to previous draw", "power");
        }

        if candidate.is_neighbor_pair() && previous.values().iter().any(|v| v.is_neighbor_pair()) {
            result.score += ruleset.neighbor_pair_bonus;
            result = result.because("neighbor pair follows neighbor pair", "brother");
        }
        result
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrendExpert;

impl Expert for TrendExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Trend
    }

    fn score(&self, candidate: TwoDigit, ctx: &ScoringContext<'_>) -> ExpertScore {
        let ruleset = ctx.ruleset;
        let recent = window(ctx.history, ruleset.trend_window);
        if recent.len() < ruleset.trend_min_draws {
            return ExpertScore::zero();
        }

        let values = recent.iter().flat_map(DrawRecord::values);
        let (heads, tails) = values.fold((0_usize, 0_usize), |(heads, tails), value| {
            (
                heads + usize::from(value.head() == candidate.head()),
                tails + usize::from(value.tail() == candidate.tail()),
            )
        });

        let mut result = ExpertScore::zero();
        if heads >= ruleset.trend_min_count {
            result.score += as_score(heads) * ruleset.trend_multiplier;
            result = result.because(format!("head {} is trending", candidate.head()), "head-trend");
        }
        if tails >= ruleset.trend_min_count {
            result.score += as_score(tails) * ruleset.trend_multiplier;
            result = result.because(format!("tail {} is trending", candidate.tail()), "tail-trend");
        }
        result
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BreakTotalExpert;

impl Expert for BreakTotalExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::BreakTotal
    }

    fn score(&self, candidate: TwoDigit, ctx: &ScoringContext<'_>) -> ExpertScore {
        let target = candidate.break_value();
        let count = window(ctx.history, ctx.ruleset.break_window)
            .iter()
            .flat_map(DrawRecord::values)
            .filter(|value| value.break_value() == target)
            .count();
        if count < ctx.ruleset.break_min_count || count == 0 {
            return ExpertScore::zero();
        }
        ExpertScore::of(as_score(count) * ctx.ruleset.break_multiplier)
            .because(format!("break {target} recurred {count}x"), "break")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DigitFrequencyExpert;

impl DigitFrequencyExpert {
    /// The most frequent digits, ties toward the smaller digit; a digit that
    /// never appeared is never hot.
    fn hot_digits(history: &[DrawRecord], ruleset: &ForecastRuleset) -> [bool; 10] {
        let mut counts = [0_usize; 10];
        for value in window(history, ruleset.digit_window)
            .iter()
            .flat_map(DrawRecord::values)
        {
            counts[usize::from(value.head())] += 1;
            counts[usize::from(value.tail())] += 1;
        }

        let mut ranked: Vec<usize> = (0..10).filter(|digit| counts[*digit] > 0).collect();
        ranked.sort_by(|lhs, rhs| counts[*rhs].cmp(&counts[*lhs]).then(lhs.cmp(rhs)));

        let mut hot = [false; 10];
        for digit in ranked.into_iter().take(ruleset.hot_digit_count) {
            hot[digit] = true;
        }
        hot
    }
}

impl Expert for DigitFrequencyExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::DigitFrequency
    }

    fn score(&self, candidate: TwoDigit, ctx: &ScoringContext<'_>) -> ExpertScore {
        let hot = Self::hot_digits(ctx.history, ctx.ruleset);
        let positions = usize::from(hot[usize::from(candidate.head())])
            + usize::from(hot[usize::from(candidate.tail())]);
        if positions == 0 {
            return ExpertScore::zero();
        }
        ExpertScore::of(as_score(positions) * ctx.ruleset.hot_digit_bonus)
            .because("built from hot digits", "hot-digit")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GapExpert;

impl Expert for GapExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Gap
    }

    fn score(&self, candidate: TwoDigit, ctx: &ScoringContext<'_>) -> ExpertScore {
        let gap = ctx
            .history
            .iter()
            .position(|record| record.contains(candidate))
            .unwrap_or(ctx.history.len());
        let ruleset = ctx.ruleset;
        if gap <= ruleset.gap_baseline {
            return ExpertScore::zero();
        }
        let score = (as_score(gap - ruleset.gap_baseline) * ruleset.gap_multiplier)
            .min(ruleset.gap_bonus_cap);
        ExpertScore::of(score).because(format!("absent for {gap} draws"), "overdue")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarketExpert;

impl Expert for MarketExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Market
    }

    fn score(&self, candidate: TwoDigit, ctx: &ScoringContext<'_>) -> ExpertScore {
        let Some(tails) = ctx.market.and_then(market_tails) else {
            return ExpertScore::zero();
        };
        if candidate == tails.difference {
            ExpertScore::of(ctx.ruleset.market_difference_bonus)
                .because("matches market difference tail", "market")
        } else if candidate == tails.sum {
            ExpertScore::of(ctx.ruleset.market_sum_bonus)
                .because("matches market sum tail", "market")
        } else {
            ExpertScore::zero()
        }
    }
}

/// The experts that take part in scoring and adaptation, at most one per kind.
pub struct ExpertRegistry {
    experts: Vec<Box<dyn Expert>>,
}

impl ExpertRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            experts: Vec::new(),
        }
    }

    /// The seven experts covered by the default weight vector.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(RecencyExpert));
        registry.register(Box::new(RelationshipExpert));
        registry.register(Box::new(TrendExpert));
        registry.register(Box::new(BreakTotalExpert));
        registry.register(Box::new(DigitFrequencyExpert));
        registry.register(Box::new(DayOfWeekExpert));
        registry.register(Box::new(GapExpert));
        registry
    }

    /// Standard experts plus the seasonal and market experts.
    #[must_use]
    pub fn extended() -> Self {
        let mut registry = Self::standard();
        registry.register(Box::new(SeasonalExpert));
        registry.register(Box::new(MarketExpert));
        registry
    }

    /// Adds `expert`, replacing any registered expert of the same kind.
    pub fn register(&mut self, expert: Box<dyn Expert>) {
        let kind = expert.kind();
        match self.experts.iter_mut().find(|existing| existing.kind() == kind) {
            Some(slot) => *slot = expert,
            None => self.experts.push(expert),
        }
    }

    /// Returns whether an expert of `kind` was registered.
    pub fn remove(&mut self, kind: ExpertKind) -> bool {
        let before = self.experts.len();
        self.experts.retain(|expert| expert.kind() != kind);
        self.experts.len() != before
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<ExpertKind> {
        self.experts.iter().map(|expert| expert.kind()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Expert> + '_ {
        self.experts.iter().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.experts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experts.is_empty()
    }
}

impl Default for ExpertRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl Debug for ExpertRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpertRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
