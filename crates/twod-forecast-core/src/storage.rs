use crate::{DrawRecord, ForecastError, WeightVector};

/// Persistence capability for everything that outlives a process: the record
/// collection, the weight vector and the external-model credential.
///
/// `load_*` returns `Ok(None)` when nothing was saved yet. Saves replace the
/// whole stored value.
pub trait ForecastStorage {
    fn load_records(&self) -> Result<Option<Vec<DrawRecord>>, ForecastError>;
    fn save_records(&mut self, records: &[DrawRecord]) -> Result<(), ForecastError>;
    fn load_weights(&self) -> Result<Option<WeightVector>, ForecastError>;
    fn save_weights(&mut self, weights: &WeightVector) -> Result<(), ForecastError>;
    fn load_credential(&self) -> Result<Option<String>, ForecastError>;
    fn save_credential(&mut self, credential: &str) -> Result<(), ForecastError>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    records: Option<Vec<DrawRecord>>,
    weights: Option<WeightVector>,
    credential: Option<String>,
    record_saves: usize,
}

impl InMemoryStorage {
    #[must_use]
    pub fn with_records(records: Vec<DrawRecord>) -> Self {
        Self {
            records: Some(records),
            ..Self::default()
        }
    }

    /// Number of times the record collection was written.
    #[must_use]
    pub fn record_saves(&self) -> usize {
        self.record_saves
    }
}

impl ForecastStorage for InMemoryStorage {
    fn load_records(&self) -> Result<Option<Vec<DrawRecord>>, ForecastError> {
        Ok(self.records.clone())
    }

    fn save_records(&mut self, records: &[DrawRecord]) -> Result<(), ForecastError> {
        self.records = Some(records.to_vec());
        self.record_saves += 1;
        Ok(())
    }

    fn load_weights(&self) -> Result<Option<WeightVector>, ForecastError> {
        Ok(self.weights.clone())
    }

    fn save_weights(&mut self, weights: &WeightVector) -> Result<(), ForecastError> {
        self.weights = Some(weights.clone());
        Ok(())
    }

    fn load_credential(&self) -> Result<Option<String>, ForecastError> {
        Ok(self.credential.clone())
    }

    fn save_credential(&mut self, credential: &str) -> Result<(), ForecastError> {
        self.credential = Some(credential.to_string());
        Ok(())
    }
}
