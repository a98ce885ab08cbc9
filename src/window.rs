//! Per-source bounded time buffer.
//!
//! Events are kept in arrival order. While arrivals are time-ordered the
//! old end is evicted FIFO; once an out-of-order timestamp arrives the
//! buffer is re-sorted before the next eviction so that eviction always
//! removes the genuinely oldest events.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A timestamped magnitude observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Seconds
    pub timestamp: f64,
    pub value: f64,
}

impl Event {
    /// Validate raw input. Non-finite fields and negative values are rejected.
    pub fn checked(timestamp: f64, value: f64) -> Option<Self> {
        if !timestamp.is_finite() || !value.is_finite() || value < 0.0 {
            return None;
        }
        Some(Self { timestamp, value })
    }
}

#[derive(Debug, Clone)]
pub struct EventWindow {
    events: VecDeque<Event>,
    /// W in seconds
    horizon: f64,
    /// Raw retention is `horizon * retention_factor`
    retention_factor: f64,
    max_events: usize,
    latest: f64,
    /// Set when an insert broke timestamp order
    needs_sort: bool,
    accepted: u64,
    dropped: u64,
}

impl EventWindow {
    pub fn new(horizon: f64, retention_factor: f64, max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(4096)),
            horizon: horizon.max(f64::EPSILON),
            retention_factor: retention_factor.max(1.0),
            max_events: max_events.max(2),
            latest: f64::NEG_INFINITY,
            needs_sort: false,
            accepted: 0,
            dropped: 0,
        }
    }

    /// Append an event and evict anything older than the retention horizon.
    ///
    /// Returns false (and stores nothing) for malformed input.
    pub fn add_event(&mut self, timestamp: f64, value: f64) -> bool {
        let Some(event) = Event::checked(timestamp, value) else {
            self.dropped += 1;
            return false;
        };

        if let Some(last) = self.events.back() {
            if event.timestamp < last.timestamp {
                self.needs_sort = true;
            }
        }
        self.latest = self.latest.max(event.timestamp);
        self.events.push_back(event);
        self.accepted += 1;

        self.evict();
        true
    }

    fn evict(&mut self) {
        if self.needs_sort {
            self.events
                .make_contiguous()
                .sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
            self.needs_sort = false;
        }

        let cutoff = self.latest - self.horizon * self.retention_factor;
        while let Some(front) = self.events.front() {
            if front.timestamp < cutoff || self.events.len() > self.max_events {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time-sorted copy of every retained event.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.iter().copied().collect();
        if self.needs_sort {
            events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        }
        events
    }

    /// Time-sorted events no older than `latest - horizon`.
    pub fn snapshot_within_horizon(&self) -> Vec<Event> {
        let cutoff = self.latest - self.horizon;
        self.snapshot()
            .into_iter()
            .filter(|e| e.timestamp >= cutoff)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// (accepted, dropped) counters since creation
    pub fn counters(&self) -> (u64, u64) {
        (self.accepted, self.dropped)
    }
}
