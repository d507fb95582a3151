//! Per-lobby actor task
//!
//! Each lobby lives inside its own tokio task and is reachable only through
//! a bounded command queue. Commands are applied strictly in arrival order,
//! and the resulting broadcasts are emitted before the next command is
//! looked at, so one lobby's events are never reordered or interleaved.
//! Different lobbies run on different tasks and never block each other.

use crate::channel::EventSink;
use crate::dispatch;
use crate::error::GameError;
use crate::lobby::{Lobby, Outcome};
use crate::registry::LobbyRegistry;
use log::{debug, info, warn};
use shared::{ClientEvent, PlayerId};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum LobbyCommand {
    Join {
        player_id: PlayerId,
        name: String,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    Event {
        sender: PlayerId,
        event: ClientEvent,
    },
    Disconnect {
        player_id: PlayerId,
    },
    Liveness {
        player_id: PlayerId,
        connected: bool,
    },
}

/// A queued join whose answer has not arrived yet.
#[derive(Debug)]
pub struct PendingJoin {
    code: String,
    response: oneshot::Receiver<Result<(), GameError>>,
}

impl PendingJoin {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub async fn accepted(self) -> Result<(), GameError> {
        // A dropped reply means the lobby closed before reaching our request
        let code = self.code;
        self.response
            .await
            .unwrap_or_else(|_| Err(GameError::LobbyNotFound(code)))
    }
}

/// Cloneable address of a running lobby actor.
#[derive(Debug, Clone)]
pub struct LobbyHandle {
    code: String,
    tx: mpsc::Sender<LobbyCommand>,
}

impl LobbyHandle {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the actor has stopped accepting commands.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Queues a command without waiting for room in the mailbox.
    fn enqueue(&self, command: LobbyCommand) -> Result<(), GameError> {
        match self.tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("Lobby {} mailbox full", self.code);
                Err(GameError::LobbyBusy)
            }
            Err(TrySendError::Closed(_)) => Err(GameError::LobbyNotFound(self.code.clone())),
        }
    }

    pub fn submit(&self, sender: PlayerId, event: ClientEvent) -> Result<(), GameError> {
        self.enqueue(LobbyCommand::Event { sender, event })
    }

    /// Adds a player and waits for the actor to accept or refuse them.
    pub async fn join(&self, player_id: PlayerId, name: String) -> Result<(), GameError> {
        self.request_join(player_id, name)?.accepted().await
    }

    /// Queues a join now and hands back its pending answer, so commands the
    /// same player sends afterwards are applied after the join.
    pub fn request_join(&self, player_id: PlayerId, name: String) -> Result<PendingJoin, GameError> {
        let (reply, response) = oneshot::channel();
        self.enqueue(LobbyCommand::Join {
            player_id,
            name,
            reply,
        })?;
        Ok(PendingJoin {
            code: self.code.clone(),
            response,
        })
    }

    pub fn set_connected(&self, player_id: PlayerId, connected: bool) -> Result<(), GameError> {
        self.enqueue(LobbyCommand::Liveness {
            player_id,
            connected,
        })
    }

    /// Removes a player. Never dropped for lack of mailbox space.
    pub fn disconnect(&self, player_id: PlayerId) {
        let command = LobbyCommand::Disconnect { player_id };
        match self.tx.try_send(command) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(command)) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(command).await;
                });
            }
        }
    }
}

/// Starts the actor for a freshly created lobby.
///
/// The host receives the initial `lobby_joined` snapshot as soon as the task
/// runs.
pub fn spawn(
    lobby: Lobby,
    capacity: usize,
    sink: Arc<dyn EventSink>,
    registry: LobbyRegistry,
) -> LobbyHandle {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = LobbyHandle {
        code: lobby.code().to_string(),
        tx,
    };
    tokio::spawn(run(lobby, rx, sink, registry));
    handle
}

async fn run(
    mut lobby: Lobby,
    mut rx: mpsc::Receiver<LobbyCommand>,
    sink: Arc<dyn EventSink>,
    registry: LobbyRegistry,
) {
    let host_id = lobby.host_id();
    dispatch::dispatch(
        &lobby,
        host_id,
        &Ok(Outcome::Joined { player_id: host_id }),
        sink.as_ref(),
    );

    while let Some(command) = rx.recv().await {
        match command {
            LobbyCommand::Join {
                player_id,
                name,
                reply,
            } => {
                let result = lobby.add_player(player_id, &name);
                if result.is_ok() {
                    dispatch::dispatch(&lobby, player_id, &result, sink.as_ref());
                }
                let _ = reply.send(result.map(|_| ()));
            }
            LobbyCommand::Event { sender, event } => {
                let result = lobby.apply(sender, event);
                dispatch::dispatch(&lobby, sender, &result, sink.as_ref());
            }
            LobbyCommand::Disconnect { player_id } => {
                let result = lobby.remove_player(player_id);
                if result.is_ok() {
                    dispatch::dispatch(&lobby, player_id, &result, sink.as_ref());
                }
            }
            LobbyCommand::Liveness {
                player_id,
                connected,
            } => {
                debug!(
                    "Lobby {}: player {} connected={}",
                    lobby.code(),
                    player_id,
                    connected
                );
                let result = lobby.set_connected(player_id, connected);
                if result.is_ok() {
                    dispatch::dispatch(&lobby, player_id, &result, sink.as_ref());
                }
            }
        }

        if lobby.is_empty() {
            break;
        }
    }

    // Refuse queued joins before giving the code back
    rx.close();
    registry.remove_closed(lobby.code()).await;
    info!("Lobby {} closed", lobby.code());
}
