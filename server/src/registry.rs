//! Process-wide lobby registry
//!
//! Maps lobby codes to running lobby actors. The map is the only state
//! shared between lobbies; it is touched to create, look up and remove
//! lobbies and never while a lobby applies an event.

use crate::actor::{self, LobbyHandle};
use crate::channel::EventSink;
use crate::error::GameError;
use crate::lobby::Lobby;
use crate::validate;
use log::info;
use rand::Rng;
use shared::{PlayerId, Settings, LOBBY_CODE_LEN};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn generate_code<R: Rng>(rng: &mut R) -> String {
    (0..LOBBY_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Generates codes until one is not taken.
fn generate_unique_code(existing: &HashMap<String, LobbyHandle>) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let code = generate_code(&mut rng);
        if !existing.contains_key(&code) {
            return code;
        }
    }
}

#[derive(Clone)]
pub struct LobbyRegistry {
    lobbies: Arc<RwLock<HashMap<String, LobbyHandle>>>,
    sink: Arc<dyn EventSink>,
    default_settings: Settings,
    queue_capacity: usize,
}

impl LobbyRegistry {
    /// `default_settings` seeds every new lobby; `queue_capacity` bounds
    /// each lobby's command mailbox.
    pub fn new(sink: Arc<dyn EventSink>, default_settings: Settings, queue_capacity: usize) -> Self {
        Self {
            lobbies: Arc::new(RwLock::new(HashMap::new())),
            sink,
            default_settings,
            queue_capacity,
        }
    }

    /// Creates a lobby with `host_id` as its only player and host.
    pub async fn create_lobby(
        &self,
        host_id: PlayerId,
        host_name: &str,
        lobby_name: &str,
    ) -> Result<LobbyHandle, GameError> {
        let lobby_name = validate::lobby_name(lobby_name)?;
        let host_name = validate::player_name(host_name)?;

        let mut lobbies = self.lobbies.write().await;
        let code = generate_unique_code(&lobbies);
        info!(
            "Lobby {} ({}) created by player {} ({})",
            code, lobby_name, host_id, host_name
        );

        let lobby = Lobby::new(
            code.clone(),
            lobby_name,
            host_id,
            host_name,
            self.default_settings.clone(),
        );
        let handle = actor::spawn(
            lobby,
            self.queue_capacity,
            Arc::clone(&self.sink),
            self.clone(),
        );
        lobbies.insert(code, handle.clone());
        Ok(handle)
    }

    /// Adds a player to the lobby behind `code`, case-insensitively.
    pub async fn join_lobby(
        &self,
        code: &str,
        player_id: PlayerId,
        player_name: &str,
    ) -> Result<LobbyHandle, GameError> {
        let handle = self.lookup(code).await?;
        handle.join(player_id, player_name.to_string()).await?;
        Ok(handle)
    }

    /// Validates a user-supplied code and finds its running lobby.
    pub async fn lookup(&self, code: &str) -> Result<LobbyHandle, GameError> {
        let code = validate::lobby_code(code)?;
        self.find(&code).await.ok_or(GameError::LobbyNotFound(code))
    }

    /// Looks up a running lobby. Entries whose actor died are dropped.
    pub async fn find(&self, code: &str) -> Option<LobbyHandle> {
        let code = code.to_ascii_uppercase();
        {
            let lobbies = self.lobbies.read().await;
            match lobbies.get(&code) {
                Some(handle) if !handle.is_closed() => return Some(handle.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.remove_closed(&code).await;
        None
    }

    /// Tears a lobby down. Dropping the registry's handle stops the actor
    /// once no other handle is left, discarding any round in progress.
    pub async fn remove_lobby(&self, code: &str) -> bool {
        let removed = self
            .lobbies
            .write()
            .await
            .remove(&code.to_ascii_uppercase())
            .is_some();
        if removed {
            info!("Lobby {} removed", code);
        }
        removed
    }

    /// Removes `code` only if its actor has stopped, so a code that was
    /// already handed to a new lobby is left alone.
    pub(crate) async fn remove_closed(&self, code: &str) {
        let mut lobbies = self.lobbies.write().await;
        if lobbies.get(code).map_or(false, |handle| handle.is_closed()) {
            lobbies.remove(code);
        }
    }

    pub async fn len(&self) -> usize {
        self.lobbies.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lobbies.read().await.is_empty()
    }

    pub async fn codes(&self) -> Vec<String> {
        self.lobbies.read().await.keys().cloned().collect()
    }
}
