//! Authoritative state of a single lobby
//!
//! A `Lobby` is only ever mutated by its own actor task, one event at a
//! time. Every transition is validated first: a rejected event returns a
//! `GameError` and leaves the lobby exactly as it was.
//!
//! Round progression:
//!
//! ```text
//! forming --start_round--> estimating --reveal--> revealing
//!    ^                        |                       |
//!    |          advance (abandon, samples dropped)    | advance
//!    |                        v                       v
//!    +------advance/reset------------------------- resolved --start_round--> estimating
//! ```

use crate::error::GameError;
use crate::performance::{PerformanceBuffer, PerformanceSample};
use crate::stats::{self, RoundResult};
use crate::validate;
use log::{debug, info, warn};
use shared::{
    Boss, ClientEvent, LobbySnapshot, Phase, PlayerId, PlayerInfo, Position, Settings, Team,
    TeamCompetition, Ticket,
};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub team: Team,
    pub connected: bool,
}

/// What an accepted event changed, used to decide what gets broadcast.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Joined { player_id: PlayerId },
    Updated,
    Left { player_id: PlayerId },
    RoundResolved { result: Option<RoundResult> },
}

#[derive(Debug)]
pub struct Lobby {
    code: String,
    name: String,
    host_id: PlayerId,
    /// Join order, used to pick the next host
    players: Vec<Player>,
    phase: Phase,
    boss: Option<Boss>,
    ticket: Option<Ticket>,
    positions: HashMap<PlayerId, Position>,
    settings: Settings,
    team_competition: Option<TeamCompetition>,
    estimates: HashMap<PlayerId, f64>,
    performance: PerformanceBuffer,
}

impl Lobby {
    /// Creates a lobby with the host as its only player.
    ///
    /// Names are expected to be validated by the caller.
    pub fn new(
        code: String,
        name: String,
        host_id: PlayerId,
        host_name: String,
        settings: Settings,
    ) -> Self {
        Self {
            code,
            name,
            host_id,
            players: vec![Player {
                id: host_id,
                name: host_name,
                team: Team::Spectators,
                connected: true,
            }],
            phase: Phase::Forming,
            boss: None,
            ticket: None,
            positions: HashMap::new(),
            settings,
            team_competition: None,
            estimates: HashMap::new(),
            performance: PerformanceBuffer::new(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn host_id(&self) -> PlayerId {
        self.host_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }

    pub fn team_competition(&self) -> Option<&TeamCompetition> {
        self.team_competition.as_ref()
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    fn player_mut(&mut self, player_id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn member_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn buffered_samples(&self) -> usize {
        self.performance.len()
    }

    pub fn add_player(&mut self, player_id: PlayerId, raw_name: &str) -> Result<Outcome, GameError> {
        if self.player(player_id).is_some() {
            return Err(GameError::AlreadyInLobby);
        }
        let name = validate::player_name(raw_name)?;

        info!("Player {} ({}) joined lobby {}", player_id, name, self.code);
        self.players.push(Player {
            id: player_id,
            name,
            team: Team::Spectators,
            connected: true,
        });
        Ok(Outcome::Joined { player_id })
    }

    /// Drops a player and everything they contributed to the open round.
    ///
    /// If the host left, the earliest remaining player takes over.
    pub fn remove_player(&mut self, player_id: PlayerId) -> Result<Outcome, GameError> {
        let index = self
            .players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or(GameError::UnknownPlayer(player_id))?;
        let player = self.players.remove(index);
        self.positions.remove(&player_id);
        self.estimates.remove(&player_id);
        self.performance.remove_player(&player_id);
        info!("Player {} ({}) left lobby {}", player.id, player.name, self.code);

        if player_id == self.host_id {
            if let Some(next) = self.players.first() {
                self.host_id = next.id;
                info!("Player {} is now host of lobby {}", next.id, self.code);
            }
        }
        Ok(Outcome::Left { player_id })
    }

    pub fn set_connected(&mut self, player_id: PlayerId, connected: bool) -> Result<Outcome, GameError> {
        let player = self
            .player_mut(player_id)
            .ok_or(GameError::UnknownPlayer(player_id))?;
        player.connected = connected;
        Ok(Outcome::Updated)
    }

    fn require_host(&self, sender: PlayerId) -> Result<(), GameError> {
        if sender != self.host_id {
            return Err(GameError::NotHost);
        }
        Ok(())
    }

    fn require_phase(&self, action: &'static str, allowed: &[Phase]) -> Result<(), GameError> {
        if !allowed.contains(&self.phase) {
            return Err(GameError::InvalidPhase {
                action,
                phase: self.phase,
            });
        }
        Ok(())
    }

    /// Validates and applies one in-lobby event from `sender`.
    pub fn apply(&mut self, sender: PlayerId, event: ClientEvent) -> Result<Outcome, GameError> {
        if self.player(sender).is_none() {
            return Err(GameError::UnknownPlayer(sender));
        }
        debug!("Lobby {}: {} from player {}", self.code, event.name(), sender);

        match event {
            ClientEvent::CreateLobby { .. } | ClientEvent::JoinLobby { .. } => {
                Err(GameError::AlreadyInLobby)
            }
            ClientEvent::LeaveLobby => self.remove_player(sender),
            ClientEvent::SelectTeam { player_id, team } => self.select_team(sender, player_id, team),
            ClientEvent::UpdateSettings { settings } => self.update_settings(sender, settings),
            ClientEvent::SetBoss { name, max_health } => self.set_boss(sender, &name, max_health),
            ClientEvent::EnableTeamCompetition => self.enable_team_competition(sender),
            ClientEvent::StartRound { ticket } => self.start_round(sender, ticket),
            ClientEvent::SubmitEstimate { score } => self.submit_estimate(sender, score),
            ClientEvent::Reveal => self.reveal(sender),
            ClientEvent::PlayerPerformance {
                player_id,
                estimation_time,
                score,
                team,
                ticket_id,
            } => self.track_performance(sender, player_id, estimation_time, score, team, &ticket_id),
            ClientEvent::AttackBoss { damage } => self.attack_boss(sender, damage),
            ClientEvent::AdvanceToNextTicket {
                final_score,
                next_ticket,
            } => self.advance_to_next_ticket(sender, final_score, next_ticket),
            ClientEvent::ResetLobby => self.reset(sender),
            ClientEvent::UpdatePosition { x, y } => self.update_position(sender, x, y),
        }
    }

    fn select_team(&mut self, sender: PlayerId, player_id: PlayerId, team: Team) -> Result<Outcome, GameError> {
        if sender != player_id {
            self.require_host(sender)?;
        }
        let player = self
            .player_mut(player_id)
            .ok_or(GameError::UnknownPlayer(player_id))?;
        player.team = team;
        Ok(Outcome::Updated)
    }

    fn update_settings(&mut self, sender: PlayerId, settings: Settings) -> Result<Outcome, GameError> {
        self.require_host(sender)?;
        self.require_phase("change settings", &[Phase::Forming, Phase::Resolved])?;
        validate::settings(&settings)?;
        self.settings = settings;
        Ok(Outcome::Updated)
    }

    fn set_boss(&mut self, sender: PlayerId, name: &str, max_health: u32) -> Result<Outcome, GameError> {
        self.require_host(sender)?;
        let name = validate::boss_name(name)?;
        if max_health == 0 {
            return Err(GameError::InvalidPayload(
                "boss needs health".to_string(),
            ));
        }
        self.boss = Some(Boss::new(name, max_health));
        Ok(Outcome::Updated)
    }

    fn enable_team_competition(&mut self, sender: PlayerId) -> Result<Outcome, GameError> {
        self.require_host(sender)?;
        if self.team_competition.is_none() {
            info!("Team competition enabled in lobby {}", self.code);
            self.team_competition = Some(TeamCompetition::default());
        }
        Ok(Outcome::Updated)
    }

    fn start_round(&mut self, sender: PlayerId, ticket: Ticket) -> Result<Outcome, GameError> {
        self.require_host(sender)?;
        self.require_phase("start a round", &[Phase::Forming, Phase::Resolved])?;
        validate::ticket(&ticket)?;
        self.open_ticket(ticket);
        Ok(Outcome::Updated)
    }

    fn open_ticket(&mut self, ticket: Ticket) {
        info!("Lobby {}: estimating ticket {}", self.code, ticket.id);
        self.estimates.clear();
        self.performance.clear();
        self.ticket = Some(ticket);
        self.phase = Phase::Estimating;
    }

    fn submit_estimate(&mut self, sender: PlayerId, score: f64) -> Result<Outcome, GameError> {
        self.require_phase("submit an estimate", &[Phase::Estimating])?;
        if !self.settings.allows_estimate(score) {
            return Err(GameError::InvalidEstimate(score));
        }
        self.estimates.insert(sender, score);
        Ok(Outcome::Updated)
    }

    fn reveal(&mut self, sender: PlayerId) -> Result<Outcome, GameError> {
        self.require_host(sender)?;
        self.require_phase("reveal", &[Phase::Estimating])?;
        self.phase = Phase::Revealing;
        Ok(Outcome::Updated)
    }

    fn track_performance(
        &mut self,
        sender: PlayerId,
        player_id: PlayerId,
        estimation_time: u64,
        score: f64,
        reported_team: Team,
        ticket_id: &str,
    ) -> Result<Outcome, GameError> {
        self.require_phase("report performance", &[Phase::Estimating, Phase::Revealing])?;
        let team = match self.player(player_id) {
            Some(player) => player.team,
            None => {
                warn!(
                    "Lobby {}: performance for unknown player {} ignored",
                    self.code, player_id
                );
                return Err(GameError::UnknownPlayer(player_id));
            }
        };
        if player_id != sender {
            return Err(GameError::NotYourPerformance);
        }
        let open = self.ticket.as_ref().map(|t| t.id.as_str()).unwrap_or_default();
        if open != ticket_id {
            return Err(GameError::StaleTicket {
                expected: open.to_string(),
                got: ticket_id.to_string(),
            });
        }
        let score = validate::score(score, "score")?;
        if reported_team != team {
            warn!(
                "Lobby {}: player {} reported team {} but plays for {}",
                self.code, player_id, reported_team, team
            );
        }

        self.performance.track(PerformanceSample {
            player_id,
            estimation_time,
            score,
            team,
        });
        Ok(Outcome::Updated)
    }

    fn attack_boss(&mut self, sender: PlayerId, damage: u32) -> Result<Outcome, GameError> {
        self.require_phase("attack the boss", &[Phase::Revealing])?;
        let boss = self.boss.as_mut().ok_or(GameError::NoBoss)?;
        let health = boss.take_damage(damage);
        debug!(
            "Lobby {}: player {} hit {} for {}, {} left",
            self.code, sender, boss.name, damage, health
        );
        if boss.is_defeated() {
            info!("Lobby {}: {} defeated", self.code, boss.name);
        }
        Ok(Outcome::Updated)
    }

    fn advance_to_next_ticket(
        &mut self,
        sender: PlayerId,
        final_score: Option<f64>,
        next_ticket: Option<Ticket>,
    ) -> Result<Outcome, GameError> {
        self.require_host(sender)?;
        self.require_phase(
            "advance to the next ticket",
            &[Phase::Estimating, Phase::Revealing, Phase::Resolved],
        )?;
        if let Some(score) = final_score {
            validate::score(score, "final score")?;
        }
        if let Some(ticket) = &next_ticket {
            validate::ticket(ticket)?;
        }

        let outcome = match self.phase {
            Phase::Revealing => {
                let result = self.resolve_round(final_score);
                Outcome::RoundResolved { result }
            }
            Phase::Estimating => {
                info!(
                    "Lobby {}: round abandoned, {} samples discarded",
                    self.code,
                    self.performance.len()
                );
                self.discard_round();
                Outcome::Updated
            }
            // Already resolved, nothing left to score
            _ => Outcome::Updated,
        };

        match next_ticket {
            Some(ticket) => self.open_ticket(ticket),
            None if matches!(outcome, Outcome::RoundResolved { .. }) => {}
            None => {
                self.discard_round();
                self.phase = Phase::Forming;
            }
        }
        Ok(outcome)
    }

    /// Scores the revealed round and moves to `resolved`.
    fn resolve_round(&mut self, final_score: Option<f64>) -> Option<RoundResult> {
        if let (Some(score), Some(ticket)) = (final_score, self.ticket.as_mut()) {
            ticket.story_points = Some(score);
        }
        let story_points = self.ticket.as_ref().and_then(|t| t.story_points);
        let final_score = story_points.unwrap_or_else(|| self.most_common_estimate());

        let mut team_sizes: HashMap<Team, usize> = HashMap::new();
        for player in &self.players {
            *team_sizes.entry(player.team).or_insert(0) += 1;
        }
        // Players may have switched team since reporting
        let samples: Vec<PerformanceSample> = self
            .performance
            .samples()
            .into_iter()
            .filter_map(|sample| {
                let team = self.player(sample.player_id)?.team;
                Some(PerformanceSample {
                    team,
                    ..sample.clone()
                })
            })
            .collect();
        let refs: Vec<&PerformanceSample> = samples.iter().collect();
        let data = stats::calculate_performance_data(&team_sizes, &refs, final_score);
        let result = stats::update_team_competition_stats(
            self.team_competition.as_mut(),
            &data,
            story_points,
        );
        self.performance.clear();
        self.phase = Phase::Resolved;

        info!(
            "Lobby {}: round resolved at {} ({} teams reported)",
            self.code,
            final_score,
            data.len()
        );
        result
    }

    /// Mode of the revealed estimates, preferring the larger value on ties.
    fn most_common_estimate(&self) -> f64 {
        let mut counts: Vec<(f64, usize)> = Vec::new();
        for score in self.estimates.values() {
            match counts.iter_mut().find(|(value, _)| value.to_bits() == score.to_bits()) {
                Some((_, count)) => *count += 1,
                None => counts.push((*score, 1)),
            }
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(a.0.total_cmp(&b.0)))
            .map(|(value, _)| value)
            .unwrap_or(0.0)
    }

    fn discard_round(&mut self) {
        self.estimates.clear();
        self.performance.clear();
        self.ticket = None;
    }

    fn reset(&mut self, sender: PlayerId) -> Result<Outcome, GameError> {
        self.require_host(sender)?;
        self.discard_round();
        self.phase = Phase::Forming;
        info!("Lobby {} reset", self.code);
        Ok(Outcome::Updated)
    }

    fn update_position(&mut self, sender: PlayerId, x: f32, y: f32) -> Result<Outcome, GameError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(GameError::InvalidPayload("position must be finite".to_string()));
        }
        self.positions.insert(sender, Position { x, y });
        Ok(Outcome::Updated)
    }

    pub fn snapshot(&self) -> LobbySnapshot {
        let mut submitted: Vec<PlayerId> = self.estimates.keys().copied().collect();
        submitted.sort_unstable();

        let revealed_estimates = match self.phase {
            Phase::Revealing | Phase::Resolved => {
                let mut estimates: Vec<(PlayerId, f64)> =
                    self.estimates.iter().map(|(id, score)| (*id, *score)).collect();
                estimates.sort_by_key(|(id, _)| *id);
                Some(estimates)
            }
            _ => None,
        };

        LobbySnapshot {
            code: self.code.clone(),
            name: self.name.clone(),
            host_id: self.host_id,
            phase: self.phase,
            players: self
                .players
                .iter()
                .map(|p| PlayerInfo {
                    id: p.id,
                    name: p.name.clone(),
                    is_host: p.id == self.host_id,
                    team: p.team,
                    connected: p.connected,
                })
                .collect(),
            boss: self.boss.clone(),
            ticket: self.ticket.clone(),
            positions: self.positions.clone(),
            settings: self.settings.clone(),
            team_competition: self.team_competition.clone(),
            submitted,
            revealed_estimates,
        }
    }
}
