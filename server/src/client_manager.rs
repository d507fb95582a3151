//! Connection tracking and liveness for the lobby server
//!
//! This module handles the transport-level view of participants:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Address lookup for routing inbound datagrams to a client id
//! - Liveness: idle clients are reported once, silent clients are dropped
//! - Capacity limits
//!
//! Lobby membership is not tracked here; the router owns that mapping.

use log::info;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected participant
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server, doubles as player id
    pub id: PlayerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Set once the client has been reported idle
    pub idle: bool,
}

impl Client {
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            idle: false,
        }
    }

    /// Checks if the client has been silent for longer than `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Liveness changes found by a timeout sweep.
#[derive(Debug, Default, PartialEq)]
pub struct TimeoutReport {
    /// Newly idle clients, still connected
    pub idle: Vec<PlayerId>,
    /// Clients removed for silence
    pub dropped: Vec<PlayerId>,
}

pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<PlayerId, Client>,
    /// Next available client ID for new connections
    next_client_id: PlayerId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Returns true if the client was found and removed.
    pub fn remove_client(&mut self, client_id: &PlayerId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get_addr(&self, client_id: PlayerId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Records activity from a client.
    ///
    /// Returns true if the client had been reported idle and is back.
    pub fn touch(&mut self, client_id: PlayerId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.last_seen = Instant::now();
                std::mem::replace(&mut client.idle, false)
            }
            None => false,
        }
    }

    /// Flags clients silent for `idle_after` and removes those silent for
    /// `drop_after`. Each client is reported idle at most once per silence.
    pub fn check_timeouts(&mut self, idle_after: Duration, drop_after: Duration) -> TimeoutReport {
        let mut report = TimeoutReport::default();

        for (id, client) in self.clients.iter_mut() {
            if client.is_timed_out(drop_after) {
                report.dropped.push(*id);
            } else if !client.idle && client.is_timed_out(idle_after) {
                client.idle = true;
                report.idle.push(*id);
            }
        }

        for client_id in &report.dropped {
            self.remove_client(client_id);
        }

        report
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
