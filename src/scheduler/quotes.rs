//! Comment text selection without immediate repeats

use rand::seq::IndexedRandom;
use std::collections::VecDeque;

/// Picks random quotes, avoiding the last `capacity` picks.
///
/// When the pool has no more distinct quotes than the history holds,
/// suppression is disabled and repeats are allowed.
#[derive(Debug, Clone)]
pub struct QuoteSelector {
    recent: VecDeque<String>,
    capacity: usize,
}

impl QuoteSelector {
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Pick the next quote, or None for an empty pool
    pub fn next(&mut self, pool: &[String]) -> Option<String> {
        let mut rng = rand::rng();
        let choice = if pool.len() > self.capacity {
            let fresh: Vec<&String> = pool.iter().filter(|q| !self.recent.contains(q)).collect();
            // Duplicates in the pool can leave nothing fresh
            match fresh.choose(&mut rng) {
                Some(quote) => (*quote).clone(),
                None => pool.choose(&mut rng)?.clone(),
            }
        } else {
            pool.choose(&mut rng)?.clone()
        };

        self.recent.push_back(choice.clone());
        while self.recent.len() > self.capacity {
            self.recent.pop_front();
        }
        Some(choice)
    }

    pub fn recent(&self) -> impl Iterator<Item = &String> {
        self.recent.iter()
    }
}
