//! In-flight computation table

use super::types::CacheKey;
use crate::error::ScoutResult;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;

/// Shared outcome of one computation
pub(crate) type FlightOutcome = Shared<BoxFuture<'static, ScoutResult<serde_json::Value>>>;

struct Flight {
    id: u64,
    outcome: FlightOutcome,
}

/// At most one computation per key.
///
/// Each flight carries an id so a computation that was detached by
/// invalidation cannot complete a newer flight for the same key.
#[derive(Default)]
pub(crate) struct FlightTable {
    flights: HashMap<CacheKey, Flight>,
    next_id: u64,
}

impl FlightTable {
    /// Outcome of the running computation for `key`, if any
    pub fn get(&self, key: &CacheKey) -> Option<FlightOutcome> {
        self.flights.get(key).map(|flight| flight.outcome.clone())
    }

    /// Reserve an id for a new flight
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn insert(&mut self, key: CacheKey, id: u64, outcome: FlightOutcome) {
        self.flights.insert(key, Flight { id, outcome });
    }

    /// Remove the flight if `id` is still the current one for `key`
    pub fn complete(&mut self, key: &CacheKey, id: u64) -> bool {
        match self.flights.get(key) {
            Some(flight) if flight.id == id => {
                self.flights.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Forget the flight for `key`; its result will not be stored
    pub fn detach(&mut self, key: &CacheKey) -> bool {
        self.flights.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.flights.clear();
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }
}
