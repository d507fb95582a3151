//! Wire protocol and data model shared by the lobby server and its clients.
//!
//! Every type here is serialized with `bincode`, one `Packet` per UDP
//! datagram. Enums use serde's default externally tagged representation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub type PlayerId = u32;

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_PACKET_SIZE: usize = 65_507;

pub const LOBBY_CODE_LEN: usize = 6;
pub const MAX_LOBBY_NAME_LEN: usize = 30;
pub const MAX_PLAYER_NAME_LEN: usize = 20;
pub const MAX_BOSS_NAME_LEN: usize = 30;
pub const MAX_TICKET_ID_LEN: usize = 64;
pub const MAX_URL_LEN: usize = 200;
/// Keeps every lobby snapshot well inside one datagram.
pub const MAX_SCALE_VALUES: usize = 32;
pub const MAX_ACHIEVEMENTS: usize = 10;
pub const DEFAULT_TIMER_SECONDS: u32 = 60;
pub const DEFAULT_ESTIMATION_SCALE: [f64; 11] =
    [0.0, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0, 55.0, 89.0];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Heartbeat,
    Disconnect,
    Client(ClientEvent),

    Connected {
        client_id: PlayerId,
    },
    Server(ServerEvent),
    Disconnected {
        reason: String,
    },
}

/// Named events a participant sends to the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ClientEvent {
    CreateLobby {
        lobby_name: String,
        host_name: String,
    },
    JoinLobby {
        lobby_id: String,
        player_name: String,
    },
    LeaveLobby,
    SelectTeam {
        player_id: PlayerId,
        team: Team,
    },
    UpdateSettings {
        settings: Settings,
    },
    SetBoss {
        name: String,
        max_health: u32,
    },
    EnableTeamCompetition,
    StartRound {
        ticket: Ticket,
    },
    SubmitEstimate {
        score: f64,
    },
    Reveal,
    PlayerPerformance {
        player_id: PlayerId,
        estimation_time: u64,
        score: f64,
        team: Team,
        ticket_id: String,
    },
    AttackBoss {
        damage: u32,
    },
    AdvanceToNextTicket {
        final_score: Option<f64>,
        next_ticket: Option<Ticket>,
    },
    ResetLobby,
    UpdatePosition {
        x: f32,
        y: f32,
    },
}

impl ClientEvent {
    /// Event name as it appears on the wire protocol documentation.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::CreateLobby { .. } => "create_lobby",
            ClientEvent::JoinLobby { .. } => "join_lobby",
            ClientEvent::LeaveLobby => "leave_lobby",
            ClientEvent::SelectTeam { .. } => "select_team",
            ClientEvent::UpdateSettings { .. } => "update_settings",
            ClientEvent::SetBoss { .. } => "set_boss",
            ClientEvent::EnableTeamCompetition => "enable_team_competition",
            ClientEvent::StartRound { .. } => "start_round",
            ClientEvent::SubmitEstimate { .. } => "submit_estimate",
            ClientEvent::Reveal => "reveal",
            ClientEvent::PlayerPerformance { .. } => "player_performance",
            ClientEvent::AttackBoss { .. } => "attack_boss",
            ClientEvent::AdvanceToNextTicket { .. } => "advance_to_next_ticket",
            ClientEvent::ResetLobby => "reset_lobby",
            ClientEvent::UpdatePosition { .. } => "update_position",
        }
    }
}

/// Named events the server emits to participants.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ServerEvent {
    LobbyJoined {
        player_id: PlayerId,
        lobby: LobbySnapshot,
    },
    LobbyUpdated {
        lobby: LobbySnapshot,
    },
    TeamCompetitionUpdated {
        lobby_code: String,
        round_winner: Option<Team>,
        competition: TeamCompetition,
    },
    GameError {
        message: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Developers,
    Qa,
    Spectators,
}

impl Team {
    pub const ALL: [Team; 3] = [Team::Developers, Team::Qa, Team::Spectators];

    pub fn is_competing(self) -> bool {
        !matches!(self, Team::Spectators)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Team::Developers => "developers",
            Team::Qa => "qa",
            Team::Spectators => "spectators",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round progression of a lobby.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Forming,
    Estimating,
    Revealing,
    Resolved,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Forming => "forming",
            Phase::Estimating => "estimating",
            Phase::Revealing => "revealing",
            Phase::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Ticket {
    pub id: String,
    pub story_points: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Boss {
    pub name: String,
    pub max_health: u32,
    pub health: u32,
}

impl Boss {
    pub fn new(name: String, max_health: u32) -> Self {
        Self {
            name,
            max_health,
            health: max_health,
        }
    }

    /// Applies damage and returns the health left.
    pub fn take_damage(&mut self, damage: u32) -> u32 {
        self.health = self.health.saturating_sub(damage);
        self.health
    }

    pub fn is_defeated(&self) -> bool {
        self.health == 0
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Resolved lobby settings. Presets are stored elsewhere; the server only
/// ever sees the values a lobby currently runs with.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub timer_seconds: u32,
    pub jira_base_url: Option<String>,
    pub estimation_scale: Vec<f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timer_seconds: DEFAULT_TIMER_SECONDS,
            jira_base_url: None,
            estimation_scale: DEFAULT_ESTIMATION_SCALE.to_vec(),
        }
    }
}

impl Settings {
    pub fn allows_estimate(&self, score: f64) -> bool {
        self.estimation_scale
            .iter()
            .any(|value| value.to_bits() == score.to_bits())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
    pub team: Team,
    pub connected: bool,
}

/// Cumulative record of one competing team.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct TeamStats {
    pub tickets_completed: u32,
    pub average_estimation_time: f64,
    pub accuracy_score: f64,
    pub participation_rate: f64,
    pub consensus_rate: f64,
    pub total_story_points: f64,
    pub current_streak: u32,
    pub best_streak: u32,
    pub achievements: Vec<String>,
}

impl TeamStats {
    /// Weighted scalar used to rank the two teams after a round.
    pub fn score(&self) -> f64 {
        self.total_story_points
            + self.accuracy_score * 50.0
            + self.consensus_rate * 30.0
            + self.participation_rate * 20.0
            + self.current_streak as f64 * 10.0
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct TeamCompetition {
    pub current_round: u32,
    pub developers: TeamStats,
    pub qa: TeamStats,
    pub winner_history: Vec<Team>,
}

impl TeamCompetition {
    pub fn stats(&self, team: Team) -> Option<&TeamStats> {
        match team {
            Team::Developers => Some(&self.developers),
            Team::Qa => Some(&self.qa),
            Team::Spectators => None,
        }
    }

    pub fn stats_mut(&mut self, team: Team) -> Option<&mut TeamStats> {
        match team {
            Team::Developers => Some(&mut self.developers),
            Team::Qa => Some(&mut self.qa),
            Team::Spectators => None,
        }
    }
}

/// Everything a participant needs to render a lobby.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LobbySnapshot {
    pub code: String,
    pub name: String,
    pub host_id: PlayerId,
    pub phase: Phase,
    pub players: Vec<PlayerInfo>,
    pub boss: Option<Boss>,
    pub ticket: Option<Ticket>,
    pub positions: HashMap<PlayerId, Position>,
    pub settings: Settings,
    pub team_competition: Option<TeamCompetition>,
    /// Players that have voted on the open ticket.
    pub submitted: Vec<PlayerId>,
    /// Individual estimates, only present once the round is revealed.
    pub revealed_estimates: Option<Vec<(PlayerId, f64)>>,
}
