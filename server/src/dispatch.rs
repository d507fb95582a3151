//! Broadcast dispatcher
//!
//! Turns the result of one lobby event into the outbound events it implies:
//! rejected events produce a `game_error` for the originator only, accepted
//! ones produce a fresh lobby snapshot for every member, and resolved rounds
//! additionally produce a team competition update.

use crate::channel::EventSink;
use crate::error::GameError;
use crate::lobby::{Lobby, Outcome};
use log::warn;
use shared::{PlayerId, ServerEvent};

/// One event and who should receive it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub recipients: Vec<PlayerId>,
    pub event: ServerEvent,
}

pub fn error_event(error: &GameError) -> ServerEvent {
    ServerEvent::GameError {
        message: error.to_string(),
    }
}

pub fn plan(lobby: &Lobby, origin: PlayerId, result: &Result<Outcome, GameError>) -> Vec<Delivery> {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Lobby {}: rejected event from {}: {}", lobby.code(), origin, e);
            return vec![Delivery {
                recipients: vec![origin],
                event: error_event(e),
            }];
        }
    };

    let members = lobby.member_ids();
    let snapshot = lobby.snapshot();
    let mut deliveries = Vec::new();

    match outcome {
        Outcome::Joined { player_id } => {
            deliveries.push(Delivery {
                recipients: vec![*player_id],
                event: ServerEvent::LobbyJoined {
                    player_id: *player_id,
                    lobby: snapshot.clone(),
                },
            });
            let others: Vec<PlayerId> = members.into_iter().filter(|id| id != player_id).collect();
            if !others.is_empty() {
                deliveries.push(Delivery {
                    recipients: others,
                    event: ServerEvent::LobbyUpdated { lobby: snapshot },
                });
            }
        }
        Outcome::RoundResolved { result } => {
            if let (Some(result), Some(competition)) = (result, lobby.team_competition()) {
                deliveries.push(Delivery {
                    recipients: members.clone(),
                    event: ServerEvent::TeamCompetitionUpdated {
                        lobby_code: lobby.code().to_string(),
                        round_winner: result.winner,
                        competition: competition.clone(),
                    },
                });
            }
            deliveries.push(Delivery {
                recipients: members,
                event: ServerEvent::LobbyUpdated { lobby: snapshot },
            });
        }
        Outcome::Updated | Outcome::Left { .. } => {
            if !members.is_empty() {
                deliveries.push(Delivery {
                    recipients: members,
                    event: ServerEvent::LobbyUpdated { lobby: snapshot },
                });
            }
        }
    }

    deliveries
}

pub fn deliver(deliveries: Vec<Delivery>, sink: &dyn EventSink) {
    for delivery in deliveries {
        sink.emit_all(&delivery.recipients, &delivery.event);
    }
}

pub fn dispatch(
    lobby: &Lobby,
    origin: PlayerId,
    result: &Result<Outcome, GameError>,
    sink: &dyn EventSink,
) {
    deliver(plan(lobby, origin, result), sink);
}
