use serde::{Deserialize, Serialize};
use time::Date;

use crate::import::{parse_import, ImportReport};
use crate::market::MarketReading;
use crate::storage::ForecastStorage;
use crate::{day_name, ForecastError, RecordId, TwoDigit};

/// One historical draw: the morning and evening results of a single date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawRecord {
    pub id: RecordId,
    #[serde(with = "crate::iso_date")]
    pub date: Date,
    pub am: TwoDigit,
    pub pm: TwoDigit,
    pub market_index: Option<String>,
    pub market_value: Option<String>,
    day_of_week: String,
}

impl DrawRecord {
    #[must_use]
    pub fn new(date: Date, am: TwoDigit, pm: TwoDigit) -> Self {
        Self::restore(RecordId::generate(), DrawEntry::new(date, am, pm))
    }

    /// Rebuilds a persisted record under its existing id.
    #[must_use]
    pub fn restore(id: RecordId, entry: DrawEntry) -> Self {
        Self {
            id,
            date: entry.date,
            am: entry.am,
            pm: entry.pm,
            market_index: entry.market_index,
            market_value: entry.market_value,
            day_of_week: day_name(entry.date).to_string(),
        }
    }

    #[must_use]
    pub fn day_of_week(&self) -> &str {
        &self.day_of_week
    }

    #[must_use]
    pub fn contains(&self, value: TwoDigit) -> bool {
        self.am == value || self.pm == value
    }

    #[must_use]
    pub fn values(&self) -> [TwoDigit; 2] {
        [self.am, self.pm]
    }

    /// Both market fields, when the record carries a complete reading.
    #[must_use]
    pub fn market_reading(&self) -> Option<MarketReading> {
        match (&self.market_index, &self.market_value) {
            (Some(index), Some(value)) => Some(MarketReading::new(index.clone(), value.clone())),
            _ => None,
        }
    }

    fn normalize_derived(&mut self) {
        self.day_of_week = day_name(self.date).to_string();
    }
}

/// Input for [`RecordStore::add_or_replace`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawEntry {
    #[serde(with = "crate::iso_date")]
    pub date: Date,
    pub am: TwoDigit,
    pub pm: TwoDigit,
    pub market_index: Option<String>,
    pub market_value: Option<String>,
}

impl DrawEntry {
    #[must_use]
    pub fn new(date: Date, am: TwoDigit, pm: TwoDigit) -> Self {
        Self {
            date,
            am,
            pm,
            market_index: None,
            market_value: None,
        }
    }

    #[must_use]
    pub fn with_market(mut self, index: Option<String>, value: Option<String>) -> Self {
        self.market_index = index;
        self.market_value = value;
        self
    }
}

/// Draw history keyed by date, most recent first.
///
/// Every mutation builds the next collection, persists it through the
/// injected storage and only then swaps it in, so a failed save leaves the
/// in-memory state untouched.
#[derive(Debug)]
pub struct RecordStore<S> {
    records: Vec<DrawRecord>,
    storage: S,
}

impl<S: ForecastStorage> RecordStore<S> {
    /// Loads the stored collection; an empty store when nothing was saved.
    ///
    /// # Errors
    /// Returns [`ForecastError::Storage`] when loading fails.
    pub fn open(storage: S) -> Result<Self, ForecastError> {
        let mut records = storage.load_records()?.unwrap_or_default();
        let loaded = records.len();
        normalize(&mut records);
        if records.len() != loaded {
            tracing::warn!(
                loaded,
                kept = records.len(),
                "dropped stored records with duplicate dates"
            );
        }
        Ok(Self { records, storage })
    }

    #[must_use]
    pub fn records(&self) -> &[DrawRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&DrawRecord> {
        self.records.first()
    }

    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&DrawRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    /// Records strictly older than `date`, most recent first.
    #[must_use]
    pub fn history_before(&self, date: Date) -> &[DrawRecord] {
        let start = self.records.partition_point(|record| record.date >= date);
        &self.records[start..]
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Inserts the draw for `entry.date`, or overwrites the existing record of
    /// that date in place, keeping its id.
    ///
    /// # Errors
    /// Returns [`ForecastError::Storage`] when persisting fails.
    pub fn add_or_replace(&mut self, entry: DrawEntry) -> Result<RecordId, ForecastError> {
        let mut next = self.records.clone();
        let id = upsert(&mut next, entry);
        self.commit(next)?;
        Ok(id)
    }

    /// Removes the record with `id`; returns whether one was removed.
    ///
    /// # Errors
    /// Returns [`ForecastError::Storage`] when persisting fails.
    pub fn delete(&mut self, id: RecordId) -> Result<bool, ForecastError> {
        let next: Vec<DrawRecord> = self
            .records
            .iter()
            .filter(|record| record.id != id)
            .cloned()
            .collect();
        let removed = next.len() != self.records.len();
        self.commit(next)?;
        Ok(removed)
    }

    /// # Errors
    /// Returns [`ForecastError::Storage`] when persisting fails.
    pub fn clear(&mut self) -> Result<(), ForecastError> {
        self.commit(Vec::new())
    }

    /// Parses pasted report text and commits every complete draw.
    ///
    /// Malformed lines never fail the import; they are counted in the report.
    ///
    /// # Errors
    /// Returns [`ForecastError::Storage`] when persisting fails.
    pub fn bulk_import(&mut self, text: &str) -> Result<ImportReport, ForecastError> {
        let parsed = parse_import(text);
        let imported = parsed.entries.len();

        if imported > 0 {
            let mut next = self.records.clone();
            for entry in parsed.entries {
                upsert(&mut next, entry);
            }
            self.commit(next)?;
        }

        tracing::info!(
            imported,
            errors = parsed.issues.len(),
            total_records = self.records.len(),
            "bulk import finished"
        );

        Ok(ImportReport {
            imported,
            errors: parsed.issues,
        })
    }

    fn commit(&mut self, mut next: Vec<DrawRecord>) -> Result<(), ForecastError> {
        normalize(&mut next);
        self.storage.save_records(&next)?;
        self.records = next;
        Ok(())
    }
}

fn upsert(records: &mut Vec<DrawRecord>, entry: DrawEntry) -> RecordId {
    if let Some(existing) = records.iter_mut().find(|record| record.date == entry.date) {
        let id = existing.id;
        *existing = DrawRecord::restore(id, entry);
        return id;
    }

    let record = DrawRecord::restore(RecordId::generate(), entry);
    let id = record.id;
    records.push(record);
    id
}

/// Sorts descending by date and keeps the first record seen for each date.
fn normalize(records: &mut Vec<DrawRecord>) {
    records.sort_by(|lhs, rhs| rhs.date.cmp(&lhs.date));
    records.dedup_by(|later, earlier| later.date == earlier.date);
    for record in records.iter_mut() {
        record.normalize_derived();
    }
}
