//! Record storage and aggregation.
use super::{Record, RecordValue};
use log::warn;
use std::collections::HashSet;
use xxhash_rust::xxh3::Xxh3Builder;

/// Stores records and aggregates them.
///
/// Scalars stored under the same key more than once are reduced to
/// `<key>_min`, `<key>_max`, `<key>_mean` and `<key>_median`. For every other
/// value type the most recent value is kept.
#[derive(Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

fn min(vs: &[f32]) -> f32 {
    vs.iter().copied().fold(f32::INFINITY, f32::min)
}

fn max(vs: &[f32]) -> f32 {
    vs.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

fn mean(vs: &[f32]) -> f32 {
    vs.iter().sum::<f32>() / vs.len() as f32
}

fn median(mut vs: Vec<f32>) -> f32 {
    vs.sort_by(|x, y| x.total_cmp(y));
    vs[vs.len() / 2]
}

impl RecordStorage {
    /// Creates a new empty record storage.
    pub fn new() -> Self {
        Self { data: vec![] }
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn keys(&self) -> HashSet<String, Xxh3Builder> {
        let mut keys = HashSet::<String, Xxh3Builder>::default();
        for record in self.data.iter() {
            keys.extend(record.keys().cloned());
        }
        keys
    }

    fn latest(&self, key: &str) -> Option<&RecordValue> {
        self.data.iter().rev().find_map(|r| r.get(key))
    }

    fn scalar(&self, key: &str) -> Record {
        let vs: Vec<f32> = self
            .data
            .iter()
            .filter_map(|record| match record.get(key) {
                Some(RecordValue::Scalar(v)) => Some(*v),
                Some(_) => {
                    warn!("Skipped a non-scalar value stored under {}", key);
                    None
                }
                None => None,
            })
            .collect();

        match vs.len() {
            0 => Record::empty(),
            1 => Record::from_scalar(key, vs[0]),
            _ => Record::from_slice(&[
                (format!("{}_min", key), RecordValue::Scalar(min(&vs))),
                (format!("{}_max", key), RecordValue::Scalar(max(&vs))),
                (format!("{}_mean", key), RecordValue::Scalar(mean(&vs))),
                (format!("{}_median", key), RecordValue::Scalar(median(vs))),
            ]),
        }
    }

    /// Aggregates all stored records and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let mut record = Record::empty();

        for key in self.keys().iter() {
            let r = match self.latest(key) {
                Some(RecordValue::Scalar(..)) => self.scalar(key),
                Some(value) => Record::from_slice(&[(key.as_str(), value.clone())]),
                None => continue,
            };
            record.merge_inplace(r);
        }

        self.data.clear();

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_scalars() {
        let mut storage = RecordStorage::new();
        for v in [3.0, 1.0, 2.0] {
            storage.store(Record::from_scalar("rew_torques", v));
        }
        storage.store(Record::from_scalar("terrain_level", 4.0));

        let record = storage.aggregate();
        assert_eq!(record.get_scalar("rew_torques_min"), Ok(1.0));
        assert_eq!(record.get_scalar("rew_torques_max"), Ok(3.0));
        assert_eq!(record.get_scalar("rew_torques_mean"), Ok(2.0));
        assert_eq!(record.get_scalar("rew_torques_median"), Ok(2.0));
        assert_eq!(record.get_scalar("terrain_level"), Ok(4.0));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_aggregate_keeps_latest_array() {
        let mut storage = RecordStorage::new();
        storage.store(Record::from_slice(&[(
            "time_outs",
            RecordValue::Array1(vec![0.0, 1.0]),
        )]));
        storage.store(Record::from_slice(&[(
            "time_outs",
            RecordValue::Array1(vec![1.0, 1.0]),
        )]));

        let record = storage.aggregate();
        assert_eq!(record.get_array1("time_outs"), Ok(vec![1.0, 1.0]));
    }
}
