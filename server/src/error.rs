//! Errors reported back to participants as `game_error` events

use shared::{Phase, PlayerId};
use thiserror::Error;

/// Every way an inbound event can be refused.
///
/// None of these are process faults: the offending event leaves lobby
/// state untouched and the `Display` text is sent to the originator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameError {
    #[error("Lobby {0} not found")]
    LobbyNotFound(String),
    #[error("Lobby codes are {} letters or digits", shared::LOBBY_CODE_LEN)]
    InvalidLobbyCode,
    #[error("{field} must be between 1 and {max} characters")]
    InvalidName { field: &'static str, max: usize },
    #[error("Only the host can do that")]
    NotHost,
    #[error("Cannot {action} while the lobby is {phase}")]
    InvalidPhase { action: &'static str, phase: Phase },
    #[error("Player {0} is not in this lobby")]
    UnknownPlayer(PlayerId),
    #[error("Players can only report their own performance")]
    NotYourPerformance,
    #[error("Ticket {got} is not the open ticket ({expected})")]
    StaleTicket { expected: String, got: String },
    #[error("{0} is not on the estimation scale")]
    InvalidEstimate(f64),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("You are not in a lobby")]
    NotInLobby,
    #[error("You are already in a lobby")]
    AlreadyInLobby,
    #[error("There is no boss to attack")]
    NoBoss,
    #[error("Lobby is busy, try again")]
    LobbyBusy,
    #[error("Server full")]
    ServerFull,
}
