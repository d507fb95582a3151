//! Team statistics engine
//!
//! Pure functions that fold one round of aggregated team performance into
//! the cumulative `TeamCompetition` record. Nothing here touches the
//! network or the lobby actor, so every rule can be exercised directly.
//!
//! A round is processed in two steps:
//! 1. `calculate_performance_data` reduces the buffered per-player samples
//!    into one `AggregatedTeamPerformance` per team that reported.
//! 2. `update_team_competition_stats` runs `fold_round` for each competing
//!    team, advances the round counter and records the round winner.

use crate::performance::PerformanceSample;
use log::debug;
use shared::{Team, TeamCompetition, TeamStats, MAX_ACHIEVEMENTS};
use std::collections::HashMap;

pub const LIGHTNING_FAST: &str = "Lightning Fast";
pub const PRECISION_MASTER: &str = "Precision Master";
pub const FIVE_IN_A_ROW: &str = "Five in a Row";
pub const PERFECT_TEN: &str = "Perfect Ten";
pub const FULL_TEAM_UNITY: &str = "Full Team Unity";
pub const CENTURY_CLUB: &str = "Century Club";
pub const STORY_POINT_MASTER: &str = "Story Point Master";

const LIGHTNING_FAST_MS: f64 = 10_000.0;
const PRECISION_THRESHOLD: f64 = 0.95;
const STREAK_ACCURACY: f64 = 0.8;
const CENTURY_POINTS: f64 = 100.0;
const MASTER_POINTS: f64 = 500.0;

/// One team's showing in a single round.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedTeamPerformance {
    pub team: Team,
    /// Mean estimation time of the responders, in milliseconds
    pub estimation_time: f64,
    pub accuracy: f64,
    pub participation_rate: f64,
    pub consensus_achieved: bool,
}

/// What happened to the competition when a round was folded in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundResult {
    pub round: u32,
    pub winner: Option<Team>,
}

fn running_mean(old: f64, count: u32, value: f64) -> f64 {
    (old * count as f64 + value) / (count as f64 + 1.0)
}

/// Folds one round into a team's cumulative record.
///
/// `story_points` is the value carried by the round's ticket, if any. It is
/// added once per team, never per player.
pub fn fold_round(
    stats: &TeamStats,
    performance: &AggregatedTeamPerformance,
    story_points: Option<f64>,
) -> TeamStats {
    let completed = stats.tickets_completed;
    let consensus = if performance.consensus_achieved { 1.0 } else { 0.0 };

    let mut next = stats.clone();
    next.average_estimation_time = running_mean(
        stats.average_estimation_time,
        completed,
        performance.estimation_time,
    );
    next.accuracy_score = running_mean(stats.accuracy_score, completed, performance.accuracy);
    next.participation_rate = running_mean(
        stats.participation_rate,
        completed,
        performance.participation_rate,
    );
    next.consensus_rate = running_mean(stats.consensus_rate, completed, consensus);
    if let Some(points) = story_points {
        next.total_story_points += points;
    }
    next.tickets_completed = completed + 1;

    if performance.consensus_achieved && performance.accuracy > STREAK_ACCURACY {
        next.current_streak += 1;
        next.best_streak = next.best_streak.max(next.current_streak);
    } else {
        next.current_streak = 0;
    }

    award_achievements(&mut next, performance);
    next
}

fn award_achievements(stats: &mut TeamStats, performance: &AggregatedTeamPerformance) {
    let earned = [
        (performance.estimation_time < LIGHTNING_FAST_MS, LIGHTNING_FAST),
        (performance.accuracy >= PRECISION_THRESHOLD, PRECISION_MASTER),
        (stats.current_streak == 5, FIVE_IN_A_ROW),
        (stats.current_streak == 10, PERFECT_TEN),
        (performance.participation_rate == 1.0, FULL_TEAM_UNITY),
        (stats.total_story_points >= CENTURY_POINTS, CENTURY_CLUB),
        (stats.total_story_points >= MASTER_POINTS, STORY_POINT_MASTER),
    ];

    for (unlocked, name) in earned {
        if unlocked && !stats.achievements.iter().any(|a| a == name) {
            stats.achievements.push(name.to_string());
        }
    }

    // Oldest entries go first
    if stats.achievements.len() > MAX_ACHIEVEMENTS {
        let excess = stats.achievements.len() - MAX_ACHIEVEMENTS;
        stats.achievements.drain(..excess);
    }
}

/// The strictly higher scoring team, or None on an exact tie.
pub fn round_winner(competition: &TeamCompetition) -> Option<Team> {
    let developers = competition.developers.score();
    let qa = competition.qa.score();
    if developers > qa {
        Some(Team::Developers)
    } else if qa > developers {
        Some(Team::Qa)
    } else {
        None
    }
}

/// Folds a round into the lobby's competition block.
///
/// Does nothing and returns None when the lobby has no competition running.
/// Spectator entries are ignored.
pub fn update_team_competition_stats(
    competition: Option<&mut TeamCompetition>,
    performance: &[AggregatedTeamPerformance],
    story_points: Option<f64>,
) -> Option<RoundResult> {
    let competition = competition?;

    for entry in performance {
        if let Some(stats) = competition.stats_mut(entry.team) {
            *stats = fold_round(stats, entry, story_points);
        }
    }

    competition.current_round += 1;
    let winner = round_winner(competition);
    if let Some(team) = winner {
        competition.winner_history.push(team);
    }

    debug!(
        "Round {} scored: developers {:.1}, qa {:.1}, winner {:?}",
        competition.current_round,
        competition.developers.score(),
        competition.qa.score(),
        winner
    );

    Some(RoundResult {
        round: competition.current_round,
        winner,
    })
}

/// How close one estimate came to the round's final score.
///
/// Not clamped: the result follows `1 - |score - final| / max(score, final)`
/// and is 1 when both are zero.
pub fn player_accuracy(score: f64, final_score: f64) -> f64 {
    let largest = score.max(final_score);
    if largest == 0.0 {
        return 1.0;
    }
    1.0 - (score - final_score).abs() / largest
}

/// Reduces the round's samples into one entry per competing team that
/// reported. Spectator samples are ignored.
///
/// `team_sizes` is the roster size of each team at resolution time. A roster
/// smaller than its responder count is raised to it, so participation stays
/// within `[0, 1]`.
pub fn calculate_performance_data(
    team_sizes: &HashMap<Team, usize>,
    samples: &[&PerformanceSample],
    final_score: f64,
) -> Vec<AggregatedTeamPerformance> {
    let mut result = Vec::new();

    for team in Team::ALL.into_iter().filter(|team| team.is_competing()) {
        let responders: Vec<&PerformanceSample> = samples
            .iter()
            .copied()
            .filter(|sample| sample.team == team)
            .collect();
        if responders.is_empty() {
            continue;
        }

        let count = responders.len() as f64;
        let roster = team_sizes
            .get(&team)
            .copied()
            .unwrap_or(0)
            .max(responders.len());
        let estimation_time = responders
            .iter()
            .map(|sample| sample.estimation_time as f64)
            .sum::<f64>()
            / count;
        let accuracy = responders
            .iter()
            .map(|sample| player_accuracy(sample.score, final_score))
            .sum::<f64>()
            / count;
        let first = responders[0].score.to_bits();
        let consensus_achieved =
            responders.len() >= 2 && responders.iter().all(|s| s.score.to_bits() == first);

        result.push(AggregatedTeamPerformance {
            team,
            estimation_time,
            accuracy,
            participation_rate: responders.len() as f64 / roster as f64,
            consensus_achieved,
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::PlayerId;

    fn performance(
        team: Team,
        estimation_time: f64,
        accuracy: f64,
        participation_rate: f64,
        consensus_achieved: bool,
    ) -> AggregatedTeamPerformance {
        AggregatedTeamPerformance {
            team,
            estimation_time,
            accuracy,
            participation_rate,
            consensus_achieved,
        }
    }

    fn perfect(team: Team) -> AggregatedTeamPerformance {
        performance(team, 5_000.0, 1.0, 1.0, true)
    }

    fn sample(player_id: PlayerId, team: Team, estimation_time: u64, score: f64) -> PerformanceSample {
        PerformanceSample {
            player_id,
            estimation_time,
            score,
            team,
        }
    }

    #[test]
    fn test_first_round_for_new_team() {
        let stats = TeamStats::default();
        let round = performance(Team::Developers, 8_000.0, 0.97, 1.0, true);

        let next = fold_round(&stats, &round, Some(5.0));

        assert_eq!(next.tickets_completed, 1);
        assert_approx_eq!(next.average_estimation_time, 8_000.0, 1e-9);
        assert_approx_eq!(next.accuracy_score, 0.97, 1e-9);
        assert_approx_eq!(next.participation_rate, 1.0, 1e-9);
        assert_approx_eq!(next.consensus_rate, 1.0, 1e-9);
        assert_approx_eq!(next.total_story_points, 5.0, 1e-9);
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.best_streak, 1);
        assert!(next.achievements.contains(&LIGHTNING_FAST.to_string()));
        assert!(next.achievements.contains(&PRECISION_MASTER.to_string()));
        assert!(next.achievements.contains(&FULL_TEAM_UNITY.to_string()));
    }

    #[test]
    fn test_streak_break_keeps_best() {
        let stats = TeamStats {
            tickets_completed: 6,
            current_streak: 4,
            best_streak: 6,
            ..TeamStats::default()
        };
        let round = performance(Team::Qa, 12_000.0, 0.99, 1.0, false);

        let next = fold_round(&stats, &round, None);

        assert_eq!(next.current_streak, 0);
        assert_eq!(next.best_streak, 6);
    }

    #[test]
    fn test_low_accuracy_breaks_streak() {
        let stats = TeamStats {
            current_streak: 2,
            best_streak: 2,
            ..TeamStats::default()
        };
        // Consensus on the wrong number
        let round = performance(Team::Qa, 12_000.0, 0.8, 1.0, true);

        assert_eq!(fold_round(&stats, &round, None).current_streak, 0);
    }

    #[test]
    fn test_running_mean_is_exact_and_order_independent() {
        let times = [1_000.0, 2_000.0, 6_000.0, 3_000.0, 13_000.0];
        let mean = times.iter().sum::<f64>() / times.len() as f64;

        let mut forward = TeamStats::default();
        for time in times {
            forward = fold_round(&forward, &performance(Team::Qa, time, 0.5, 0.5, false), None);
        }

        let mut backward = TeamStats::default();
        for time in times.iter().rev() {
            backward = fold_round(
                &backward,
                &performance(Team::Qa, *time, 0.5, 0.5, false),
                None,
            );
        }

        assert_eq!(forward.tickets_completed, 5);
        assert_approx_eq!(forward.average_estimation_time, mean, 1e-6);
        assert_approx_eq!(backward.average_estimation_time, mean, 1e-6);
    }

    #[test]
    fn test_consensus_rate_is_running_fraction() {
        let mut stats = TeamStats::default();
        for consensus in [true, false, true, true] {
            stats = fold_round(
                &stats,
                &performance(Team::Developers, 20_000.0, 0.5, 0.5, consensus),
                None,
            );
        }
        assert_approx_eq!(stats.consensus_rate, 0.75, 1e-9);
    }

    #[test]
    fn test_best_streak_never_below_current() {
        let pattern = [true, true, false, true, true, true, false, false, true];
        let mut stats = TeamStats::default();
        let mut previous_best = 0;

        for hit in pattern {
            let accuracy = if hit { 0.9 } else { 0.1 };
            stats = fold_round(
                &stats,
                &performance(Team::Qa, 15_000.0, accuracy, 0.5, hit),
                None,
            );
            assert!(stats.best_streak >= stats.current_streak);
            assert!(stats.best_streak >= previous_best);
            previous_best = stats.best_streak;
        }

        assert_eq!(stats.best_streak, 3);
        assert_eq!(stats.current_streak, 1);
    }

    #[test]
    fn test_streak_milestones_awarded_once() {
        let mut stats = TeamStats::default();
        for _ in 0..5 {
            stats = fold_round(&stats, &perfect(Team::Qa), None);
        }
        assert!(stats.achievements.contains(&FIVE_IN_A_ROW.to_string()));
        assert!(!stats.achievements.contains(&PERFECT_TEN.to_string()));

        for _ in 0..5 {
            stats = fold_round(&stats, &perfect(Team::Qa), None);
        }
        assert_eq!(stats.current_streak, 10);
        assert!(stats.achievements.contains(&PERFECT_TEN.to_string()));

        let fives = stats
            .achievements
            .iter()
            .filter(|a| a.as_str() == FIVE_IN_A_ROW)
            .count();
        assert_eq!(fives, 1);
    }

    #[test]
    fn test_story_point_milestones() {
        let slow = performance(Team::Developers, 30_000.0, 0.5, 0.5, false);
        let stats = TeamStats {
            total_story_points: 95.0,
            ..TeamStats::default()
        };

        let next = fold_round(&stats, &slow, Some(8.0));
        assert_approx_eq!(next.total_story_points, 103.0, 1e-9);
        assert_eq!(next.achievements, vec![CENTURY_CLUB.to_string()]);

        let stats = TeamStats {
            total_story_points: 495.0,
            achievements: next.achievements.clone(),
            ..TeamStats::default()
        };
        let next = fold_round(&stats, &slow, Some(5.0));
        assert_eq!(
            next.achievements,
            vec![CENTURY_CLUB.to_string(), STORY_POINT_MASTER.to_string()]
        );
    }

    #[test]
    fn test_achievements_capped_without_duplicates() {
        let stats = TeamStats {
            achievements: (0..MAX_ACHIEVEMENTS).map(|i| format!("Old {}", i)).collect(),
            ..TeamStats::default()
        };

        let next = fold_round(&stats, &perfect(Team::Qa), None);

        assert_eq!(next.achievements.len(), MAX_ACHIEVEMENTS);
        // Lightning Fast, Precision Master and Full Team Unity pushed out the three oldest
        assert_eq!(next.achievements[0], "Old 3");
        assert_eq!(next.achievements[9], FULL_TEAM_UNITY);

        let again = fold_round(&next, &perfect(Team::Qa), None);
        assert_eq!(again.achievements, next.achievements);

        let mut unique = again.achievements.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), again.achievements.len());
    }

    #[test]
    fn test_no_competition_is_noop() {
        let result = update_team_competition_stats(None, &[perfect(Team::Qa)], Some(3.0));
        assert!(result.is_none());
    }

    #[test]
    fn test_round_counter_and_spectators_ignored() {
        let mut competition = TeamCompetition::default();
        let data = vec![perfect(Team::Developers), perfect(Team::Spectators)];

        let result = update_team_competition_stats(Some(&mut competition), &data, Some(3.0)).unwrap();

        assert_eq!(result.round, 1);
        assert_eq!(competition.current_round, 1);
        assert_eq!(competition.developers.tickets_completed, 1);
        assert_eq!(competition.qa.tickets_completed, 0);
        assert_eq!(result.winner, Some(Team::Developers));
        assert_eq!(competition.winner_history, vec![Team::Developers]);
    }

    #[test]
    fn test_winner_strictly_higher_score() {
        let mut competition = TeamCompetition::default();
        competition.developers.total_story_points = 120.0;
        competition.qa.total_story_points = 119.9;

        let result = update_team_competition_stats(Some(&mut competition), &[], None).unwrap();

        assert_eq!(result.winner, Some(Team::Developers));
        assert_eq!(competition.winner_history, vec![Team::Developers]);
    }

    #[test]
    fn test_tie_appends_nothing() {
        let mut competition = TeamCompetition::default();
        competition.developers.total_story_points = 40.0;
        competition.qa.total_story_points = 40.0;

        let result = update_team_competition_stats(Some(&mut competition), &[], None).unwrap();

        assert_eq!(result.winner, None);
        assert!(competition.winner_history.is_empty());
        assert_eq!(competition.current_round, 1);
    }

    #[test]
    fn test_player_accuracy() {
        assert_approx_eq!(player_accuracy(0.0, 0.0), 1.0, 1e-12);
        assert_approx_eq!(player_accuracy(5.0, 5.0), 1.0, 1e-12);
        assert_approx_eq!(player_accuracy(3.0, 5.0), 0.6, 1e-12);
        assert_approx_eq!(player_accuracy(8.0, 5.0), 0.625, 1e-12);
        assert_approx_eq!(player_accuracy(0.0, 5.0), 0.0, 1e-12);
        // Far overshoot stays unclamped but cannot drop below zero for non-negative scores
        assert_approx_eq!(player_accuracy(20.0, 5.0), 0.25, 1e-12);
    }

    #[test]
    fn test_aggregation_per_team() {
        let samples = vec![
            sample(1, Team::Developers, 4_000, 5.0),
            sample(2, Team::Developers, 6_000, 5.0),
            sample(3, Team::Qa, 12_000, 3.0),
        ];
        let refs: Vec<&PerformanceSample> = samples.iter().collect();
        let sizes = HashMap::from([(Team::Developers, 2), (Team::Qa, 4)]);

        let data = calculate_performance_data(&sizes, &refs, 5.0);

        assert_eq!(data.len(), 2);
        let developers = &data[0];
        assert_eq!(developers.team, Team::Developers);
        assert_approx_eq!(developers.estimation_time, 5_000.0, 1e-9);
        assert_approx_eq!(developers.accuracy, 1.0, 1e-9);
        assert_approx_eq!(developers.participation_rate, 1.0, 1e-9);
        assert!(developers.consensus_achieved);

        let qa = &data[1];
        assert_eq!(qa.team, Team::Qa);
        assert_approx_eq!(qa.accuracy, 0.6, 1e-9);
        assert_approx_eq!(qa.participation_rate, 0.25, 1e-9);
        // A lone responder never reaches consensus
        assert!(!qa.consensus_achieved);
    }

    #[test]
    fn test_aggregation_split_votes_and_empty_roster() {
        let samples = vec![
            sample(1, Team::Qa, 1_000, 3.0),
            sample(2, Team::Qa, 1_000, 5.0),
        ];
        let refs: Vec<&PerformanceSample> = samples.iter().collect();

        let data = calculate_performance_data(&HashMap::new(), &refs, 0.0);

        assert_eq!(data.len(), 1);
        assert!(!data[0].consensus_achieved);
        // Roster floored to the responder count
        assert_approx_eq!(data[0].participation_rate, 1.0, 1e-9);
        assert_approx_eq!(data[0].accuracy, 0.0, 1e-9);
    }

    #[test]
    fn test_aggregation_omits_silent_teams() {
        let data = calculate_performance_data(&HashMap::new(), &[], 3.0);
        assert!(data.is_empty());
    }

    #[test]
    fn test_aggregation_skips_spectators() {
        let samples = vec![
            sample(1, Team::Spectators, 1_000, 5.0),
            sample(2, Team::Spectators, 1_000, 5.0),
            sample(3, Team::Developers, 2_000, 5.0),
        ];
        let refs: Vec<&PerformanceSample> = samples.iter().collect();
        let sizes = HashMap::from([(Team::Developers, 1), (Team::Spectators, 2)]);

        let data = calculate_performance_data(&sizes, &refs, 5.0);

        assert_eq!(data.len(), 1);
        assert_eq!(data[0].team, Team::Developers);
        assert!(data.iter().all(|entry| entry.team.is_competing()));
    }
}
