// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Known destinations and their topic filters.
//!
//! Destinations are only ever added. Filters are replaced whole under a write lock, so a reader
//! sees either the previous pattern or the new one.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use regex::Regex;

#[derive(Debug, Default)]
pub struct DestinationRegistry {
    destinations: RwLock<BTreeSet<String>>,
    filters: RwLock<HashMap<String, Regex>>,
}

impl DestinationRegistry {
    #[must_use]
    pub fn new(destinations: impl IntoIterator<Item = String>) -> Self {
        DestinationRegistry {
            destinations: RwLock::new(destinations.into_iter().collect()),
            filters: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a destination. Returns `true` if it was not known before.
    pub fn register(&self, destination: &str) -> bool {
        let mut destinations = self
            .destinations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if destinations.contains(destination) {
            return false;
        }
        destinations.insert(destination.to_string())
    }

    #[must_use]
    pub fn is_known(&self, destination: &str) -> bool {
        self.destinations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(destination)
    }

    /// Sorted snapshot of every known destination.
    #[must_use]
    pub fn destinations(&self) -> Vec<String> {
        self.destinations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn filter_for(&self, destination: &str) -> Option<Regex> {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(destination)
            .cloned()
    }

    /// Installs `filter` for `destination`, or removes the filter when `None`.
    pub fn set_filter(&self, destination: &str, filter: Option<Regex>) {
        let mut filters = self.filters.write().unwrap_or_else(PoisonError::into_inner);
        match filter {
            Some(filter) => {
                filters.insert(destination.to_string(), filter);
            }
            None => {
                filters.remove(destination);
            }
        }
    }
}
