//! Per-round buffer of player performance samples
//!
//! Clients report their own estimation time and submitted score once a
//! ticket is revealed. The buffer keeps the latest report per player until
//! the round is resolved (aggregated into team statistics) or abandoned
//! (discarded), whichever comes first.

use log::debug;
use shared::{PlayerId, Team};
use std::collections::HashMap;

/// A single player's report for the open ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSample {
    pub player_id: PlayerId,
    /// Milliseconds the player took to estimate
    pub estimation_time: u64,
    pub score: f64,
    pub team: Team,
}

#[derive(Debug, Default)]
pub struct PerformanceBuffer {
    samples: HashMap<PlayerId, PerformanceSample>,
}

impl PerformanceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sample, replacing any earlier one from the same player.
    ///
    /// Returns true if an earlier sample was overwritten.
    pub fn track(&mut self, sample: PerformanceSample) -> bool {
        let player_id = sample.player_id;
        let replaced = self.samples.insert(player_id, sample).is_some();
        if replaced {
            debug!("Replaced performance sample for player {}", player_id);
        }
        replaced
    }

    pub fn remove_player(&mut self, player_id: &PlayerId) -> Option<PerformanceSample> {
        self.samples.remove(player_id)
    }

    /// Samples ordered by player id so aggregation is deterministic.
    pub fn samples(&self) -> Vec<&PerformanceSample> {
        let mut samples: Vec<&PerformanceSample> = self.samples.values().collect();
        samples.sort_by_key(|sample| sample.player_id);
        samples
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(player_id: PlayerId, estimation_time: u64, score: f64) -> PerformanceSample {
        PerformanceSample {
            player_id,
            estimation_time,
            score,
            team: Team::Developers,
        }
    }

    #[test]
    fn test_last_write_wins() {
        let mut buffer = PerformanceBuffer::new();

        assert!(!buffer.track(sample(1, 9_000, 3.0)));
        assert!(buffer.track(sample(1, 4_000, 5.0)));

        assert_eq!(buffer.len(), 1);
        let samples = buffer.samples();
        assert_eq!(samples[0].estimation_time, 4_000);
        assert_eq!(samples[0].score, 5.0);
    }

    #[test]
    fn test_samples_sorted_by_player() {
        let mut buffer = PerformanceBuffer::new();
        buffer.track(sample(9, 1, 1.0));
        buffer.track(sample(2, 1, 1.0));
        buffer.track(sample(5, 1, 1.0));

        let ids: Vec<PlayerId> = buffer.samples().iter().map(|s| s.player_id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_clear_and_remove() {
        let mut buffer = PerformanceBuffer::new();
        buffer.track(sample(1, 1, 1.0));
        buffer.track(sample(2, 1, 1.0));

        assert!(buffer.remove_player(&1).is_some());
        assert!(buffer.remove_player(&1).is_none());
        assert_eq!(buffer.len(), 1);

        buffer.clear();
        assert!(buffer.is_empty());
    }
}
