//! Routes decoded client events to the lobby they belong to
//!
//! The router remembers which lobby each connected participant is in. Lobby
//! creation goes through the registry; every other event is queued on the
//! participant's lobby actor without waiting for it to be applied.
//!
//! A join is recorded as soon as it is queued. Its reply is awaited on a
//! separate task, and a refused join comes back as
//! `ServerMessage::JoinFailed` so the membership can be dropped again.
//! Failures that happen before an event reaches a lobby are answered with a
//! `game_error` to the sender.

use crate::actor::{LobbyHandle, PendingJoin};
use crate::channel::EventSink;
use crate::dispatch::error_event;
use crate::error::GameError;
use crate::network::ServerMessage;
use crate::registry::LobbyRegistry;
use log::{debug, warn};
use shared::{ClientEvent, PlayerId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Router {
    registry: LobbyRegistry,
    sink: Arc<dyn EventSink>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    /// Lobby code per participant, including joins still in flight
    memberships: HashMap<PlayerId, String>,
}

impl Router {
    pub fn new(
        registry: LobbyRegistry,
        sink: Arc<dyn EventSink>,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            registry,
            sink,
            server_tx,
            memberships: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &LobbyRegistry {
        &self.registry
    }

    pub fn lobby_of(&self, client_id: PlayerId) -> Option<&str> {
        self.memberships.get(&client_id).map(String::as_str)
    }

    /// Handles one event from `client_id`. Errors go back to the sender.
    pub async fn route(&mut self, client_id: PlayerId, event: ClientEvent) {
        debug!("Client {} sent {}", client_id, event.name());
        if let Err(e) = self.try_route(client_id, event).await {
            warn!("Event from client {} failed: {}", client_id, e);
            self.sink.emit(client_id, error_event(&e));
        }
    }

    async fn try_route(&mut self, client_id: PlayerId, event: ClientEvent) -> Result<(), GameError> {
        match event {
            ClientEvent::CreateLobby {
                lobby_name,
                host_name,
            } => {
                self.ensure_free(client_id)?;
                let handle = self
                    .registry
                    .create_lobby(client_id, &host_name, &lobby_name)
                    .await?;
                self.memberships.insert(client_id, handle.code().to_string());
                Ok(())
            }
            ClientEvent::JoinLobby {
                lobby_id,
                player_name,
            } => {
                self.ensure_free(client_id)?;
                let handle = self.registry.lookup(&lobby_id).await?;
                let pending = handle.request_join(client_id, player_name)?;
                self.memberships.insert(client_id, pending.code().to_string());
                self.await_join(client_id, pending);
                Ok(())
            }
            ClientEvent::LeaveLobby => {
                let code = self
                    .memberships
                    .remove(&client_id)
                    .ok_or(GameError::NotInLobby)?;
                if let Some(handle) = self.registry.find(&code).await {
                    handle.disconnect(client_id);
                }
                Ok(())
            }
            event => self.current_lobby(client_id).await?.submit(client_id, event),
        }
    }

    /// Waits for the lobby to accept the player without holding up the
    /// transport loop.
    fn await_join(&self, client_id: PlayerId, pending: PendingJoin) {
        let sink = Arc::clone(&self.sink);
        let server_tx = self.server_tx.clone();
        tokio::spawn(async move {
            let code = pending.code().to_string();
            if let Err(e) = pending.accepted().await {
                warn!("Client {} could not join lobby {}: {}", client_id, code, e);
                sink.emit(client_id, error_event(&e));
                if server_tx
                    .send(ServerMessage::JoinFailed { client_id, code })
                    .is_err()
                {
                    debug!("Server loop gone, join failure for {} dropped", client_id);
                }
            }
        });
    }

    /// Forgets a refused join, unless the client has moved on since.
    pub fn join_failed(&mut self, client_id: PlayerId, code: &str) {
        if self.lobby_of(client_id) == Some(code) {
            self.memberships.remove(&client_id);
        }
    }

    fn ensure_free(&self, client_id: PlayerId) -> Result<(), GameError> {
        if self.memberships.contains_key(&client_id) {
            Err(GameError::AlreadyInLobby)
        } else {
            Ok(())
        }
    }

    async fn current_lobby(&mut self, client_id: PlayerId) -> Result<LobbyHandle, GameError> {
        let code = self
            .memberships
            .get(&client_id)
            .cloned()
            .ok_or(GameError::NotInLobby)?;
        match self.registry.find(&code).await {
            Some(handle) => Ok(handle),
            None => {
                self.memberships.remove(&client_id);
                Err(GameError::LobbyNotFound(code))
            }
        }
    }

    /// Removes a departed client from its lobby.
    pub async fn disconnect(&mut self, client_id: PlayerId) {
        if let Some(code) = self.memberships.remove(&client_id) {
            if let Some(handle) = self.registry.find(&code).await {
                handle.disconnect(client_id);
            }
        }
    }

    /// Marks a client as present or absent in its lobby's roster.
    pub async fn set_liveness(&mut self, client_id: PlayerId, connected: bool) {
        if !self.memberships.contains_key(&client_id) {
            return;
        }
        match self.current_lobby(client_id).await {
            Ok(handle) => {
                if let Err(e) = handle.set_connected(client_id, connected) {
                    debug!("Liveness update for {} dropped: {}", client_id, e);
                }
            }
            Err(e) => debug!("Liveness update for {} dropped: {}", client_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Outbound;
    use shared::{ServerEvent, Settings};
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout, Duration};

    fn router() -> (Router, mpsc::UnboundedReceiver<Outbound>) {
        let (router, rx, _server_rx) = router_with_loop();
        (router, rx)
    }

    fn router_with_loop() -> (
        Router,
        mpsc::UnboundedReceiver<Outbound>,
        mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn EventSink> = Arc::new(tx);
        let registry = LobbyRegistry::new(Arc::clone(&sink), Settings::default(), 32);
        (Router::new(registry, sink, server_tx), rx, server_rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Outbound {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("sink closed")
    }

    fn create(name: &str) -> ClientEvent {
        ClientEvent::CreateLobby {
            lobby_name: "Sprint".to_string(),
            host_name: name.to_string(),
        }
    }

    fn error_message(outbound: Outbound) -> String {
        match outbound.event {
            ServerEvent::GameError { message } => message,
            other => panic!("Expected game_error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_records_membership() {
        let (mut router, mut rx) = router();

        router.route(1, create("Ada")).await;

        let code = router.lobby_of(1).unwrap().to_string();
        match next(&mut rx).await.event {
            ServerEvent::LobbyJoined { lobby, .. } => assert_eq!(lobby.code, code),
            other => panic!("Unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cannot_be_in_two_lobbies() {
        let (mut router, mut rx) = router();
        router.route(1, create("Ada")).await;
        next(&mut rx).await;

        router.route(1, create("Ada")).await;

        let outbound = next(&mut rx).await;
        assert_eq!(outbound.client_id, 1);
        assert_eq!(error_message(outbound), "You are already in a lobby");
        assert_eq!(router.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_event_without_lobby_is_rejected() {
        let (mut router, mut rx) = router();

        router.route(9, ClientEvent::Reveal).await;

        assert_eq!(error_message(next(&mut rx).await), "You are not in a lobby");
    }

    #[tokio::test]
    async fn test_join_unknown_lobby() {
        let (mut router, mut rx) = router();

        router
            .route(
                2,
                ClientEvent::JoinLobby {
                    lobby_id: "ZZZZZZ".to_string(),
                    player_name: "Grace".to_string(),
                },
            )
            .await;

        assert_eq!(error_message(next(&mut rx).await), "Lobby ZZZZZZ not found");
        assert!(router.lobby_of(2).is_none());
    }

    #[tokio::test]
    async fn test_refused_join_clears_membership() {
        let (mut router, mut rx, mut server_rx) = router_with_loop();
        router.route(1, create("Ada")).await;
        next(&mut rx).await;
        let code = router.lobby_of(1).unwrap().to_string();

        router
            .route(
                2,
                ClientEvent::JoinLobby {
                    lobby_id: code.clone(),
                    player_name: "   ".to_string(),
                },
            )
            .await;
        // Held while the lobby decides
        assert_eq!(router.lobby_of(2), Some(code.as_str()));

        let outbound = next(&mut rx).await;
        assert_eq!(outbound.client_id, 2);
        assert_eq!(
            error_message(outbound),
            "Player name must be between 1 and 20 characters"
        );

        let message = timeout(Duration::from_secs(1), server_rx.recv())
            .await
            .expect("timed out waiting for join result")
            .expect("server channel closed");
        match message {
            ServerMessage::JoinFailed { client_id, code: failed } => {
                assert_eq!(client_id, 2);
                assert_eq!(failed, code);
                router.join_failed(client_id, &failed);
            }
            other => panic!("Unexpected message {:?}", other),
        }
        assert!(router.lobby_of(2).is_none());
    }

    #[tokio::test]
    async fn test_stale_join_failure_keeps_new_membership() {
        let (mut router, mut rx) = router();
        router.route(1, create("Ada")).await;
        next(&mut rx).await;

        router.join_failed(1, "OTHER1");

        assert!(router.lobby_of(1).is_some());
    }

    #[tokio::test]
    async fn test_join_then_leave() {
        let (mut router, mut rx) = router();
        router.route(1, create("Ada")).await;
        next(&mut rx).await;
        let code = router.lobby_of(1).unwrap().to_string();

        router
            .route(
                2,
                ClientEvent::JoinLobby {
                    lobby_id: code.to_lowercase(),
                    player_name: "Grace".to_string(),
                },
            )
            .await;
        assert_eq!(router.lobby_of(2), Some(code.as_str()));
        next(&mut rx).await;
        next(&mut rx).await;

        router.route(2, ClientEvent::LeaveLobby).await;
        assert!(router.lobby_of(2).is_none());

        let update = next(&mut rx).await;
        assert_eq!(update.client_id, 1);
        match update.event {
            ServerEvent::LobbyUpdated { lobby } => assert_eq!(lobby.players.len(), 1),
            other => panic!("Unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_of_last_player_removes_lobby() {
        let (mut router, mut rx) = router();
        router.route(1, create("Ada")).await;
        next(&mut rx).await;

        router.disconnect(1).await;
        assert!(router.lobby_of(1).is_none());

        for _ in 0..100 {
            if router.registry().is_empty().await {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(router.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_liveness_is_broadcast() {
        let (mut router, mut rx) = router();
        router.route(1, create("Ada")).await;
        next(&mut rx).await;

        router.set_liveness(1, false).await;

        match next(&mut rx).await.event {
            ServerEvent::LobbyUpdated { lobby } => assert!(!lobby.players[0].connected),
            other => panic!("Unexpected event {:?}", other),
        }
    }
}
