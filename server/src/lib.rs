//! # Boss Battle Lobby Server
//!
//! This library provides the authoritative server for collaborative story
//! point estimation played as a boss battle. Participants gather in lobbies,
//! split into Developers and QA, estimate tickets together and compete on
//! running team statistics that are broadcast after every round.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Lobby State
//! Every lobby's roster, round phase, estimates and team statistics live on
//! the server. Clients only send intents; the server validates them, applies
//! them and tells everyone in the lobby what the lobby now looks like.
//!
//! ### Client Management
//! Handles the lifecycle of client connections:
//! - Connection establishment and id assignment
//! - Liveness tracking through heartbeats and any other traffic
//! - Marking quiet players as disconnected and removing silent ones
//!
//! ### Team Competition
//! When a round is resolved, per-player performance samples are aggregated
//! per team and folded into cumulative statistics: running averages,
//! consensus rate, streaks, achievements and the winner history.
//!
//! ## Architecture Design
//!
//! ### One Actor Per Lobby
//! Each lobby is owned by its own tokio task fed by a bounded command queue.
//! Events for one lobby are applied and broadcast strictly in arrival order,
//! while separate lobbies make progress independently. A lobby whose queue
//! is full refuses new events instead of stalling the network loop.
//!
//! ### UDP-Based Communication
//! One bincode encoded `shared::Packet` per datagram. Named lobby events
//! travel inside `Packet::Client` and `Packet::Server`.
//!
//! ## Module Organization
//!
//! - `lobby`: lobby state machine and event validation
//! - `performance`: per-round buffer of player performance samples
//! - `stats`: pure team statistics engine
//! - `dispatch`: maps an applied event to the broadcasts it implies
//! - `channel`: the outbound event sink lobbies write to
//! - `actor`: per-lobby task and its handle
//! - `registry`: lobby code allocation and lookup
//! - `router`: participant to lobby routing
//! - `client_manager`: connection tracking and liveness
//! - `network`: UDP socket tasks and the main loop
//! - `config`: command line configuration
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::parse_from(["server", "--port", "8080"]);
//!     let mut server = Server::new(&config).await?;
//!
//!     // Runs until a Shutdown message arrives on `server.control()`
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks that handle:
//! - **Network Receiver**: Continuously listens for incoming packets
//! - **Network Sender**: Frames outbound lobby events and replies
//! - **Timeout Checker**: Flags idle clients and removes silent ones
//! - **Lobby Actors**: One task per live lobby
//!
//! ## Validation
//!
//! Every inbound event is checked against the sender's role, the lobby phase
//! and the payload bounds before it touches state. A refused event leaves the
//! lobby unchanged and answers the sender with a `game_error`.

pub mod actor;
pub mod channel;
pub mod client_manager;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lobby;
pub mod network;
pub mod performance;
pub mod registry;
pub mod router;
pub mod stats;
pub mod validate;
