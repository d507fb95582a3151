//! Scripted client that plays one competitive round against a running server.
//!
//! A host and a guest connect over separate sockets, split into Developers
//! and QA, estimate one ticket and print every event the server sends back.

use bincode::{deserialize, serialize};
use clap::Parser;
use shared::{ClientEvent, Packet, PlayerId, ServerEvent, Team, Ticket, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Plays a scripted round against the lobby server")]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,
    /// Story points both bots estimate
    #[clap(short, long, default_value = "5")]
    estimate: f64,
}

struct Bot {
    name: &'static str,
    socket: UdpSocket,
    server: SocketAddr,
    id: PlayerId,
}

impl Bot {
    async fn connect(name: &'static str, server: SocketAddr) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let mut bot = Bot {
            name,
            socket,
            server,
            id: 0,
        };
        bot.send(&Packet::Connect { client_version: 1 }).await?;
        match bot.recv().await? {
            Some(Packet::Connected { client_id }) => {
                println!("{} connected as client {}", name, client_id);
                bot.id = client_id;
                Ok(bot)
            }
            other => Err(format!("{} expected Connected, got {:?}", name, other).into()),
        }
    }

    async fn send(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        self.socket.send_to(&serialize(packet)?, self.server).await?;
        Ok(())
    }

    async fn event(&self, event: ClientEvent) -> Result<(), Box<dyn std::error::Error>> {
        println!("{} -> {}", self.name, event.name());
        self.send(&Packet::Client(event)).await
    }

    async fn recv(&self) -> Result<Option<Packet>, Box<dyn std::error::Error>> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        match timeout(Duration::from_millis(500), self.socket.recv_from(&mut buf)).await {
            Ok(result) => {
                let (len, _) = result?;
                Ok(Some(deserialize::<Packet>(&buf[0..len])?))
            }
            Err(_) => Ok(None),
        }
    }

    /// Prints everything received until the server goes quiet.
    async fn drain(&self) -> Result<Vec<ServerEvent>, Box<dyn std::error::Error>> {
        let mut events = Vec::new();
        while let Some(packet) = self.recv().await? {
            match packet {
                Packet::Server(event) => {
                    describe(self.name, &event);
                    events.push(event);
                }
                other => println!("{} <- {:?}", self.name, other),
            }
        }
        Ok(events)
    }
}

fn describe(name: &str, event: &ServerEvent) {
    match event {
        ServerEvent::LobbyJoined { lobby, .. } | ServerEvent::LobbyUpdated { lobby } => println!(
            "{} <- lobby {} [{}] players={} submitted={:?}",
            name,
            lobby.code,
            lobby.phase,
            lobby.players.len(),
            lobby.submitted
        ),
        ServerEvent::TeamCompetitionUpdated {
            round_winner,
            competition,
            ..
        } => {
            println!(
                "{} <- round {} winner {:?}",
                name, competition.current_round, round_winner
            );
            for team in [Team::Developers, Team::Qa] {
                if let Some(stats) = competition.stats(team) {
                    println!(
                        "    {}: score {:.1}, accuracy {:.2}, streak {}, achievements {:?}",
                        team,
                        stats.score(),
                        stats.accuracy_score,
                        stats.current_streak,
                        stats.achievements
                    );
                }
            }
        }
        ServerEvent::GameError { message } => println!("{} <- error: {}", name, message),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let host = Bot::connect("host", args.server).await?;
    let guest = Bot::connect("guest", args.server).await?;

    host.event(ClientEvent::CreateLobby {
        lobby_name: "Bot Sprint".to_string(),
        host_name: "Hosty".to_string(),
    })
    .await?;
    let code = host
        .drain()
        .await?
        .into_iter()
        .find_map(|event| match event {
            ServerEvent::LobbyJoined { lobby, .. } => Some(lobby.code),
            _ => None,
        })
        .ok_or("server never confirmed the lobby")?;
    println!("Lobby code {}", code);

    guest
        .event(ClientEvent::JoinLobby {
            lobby_id: code,
            player_name: "Guesty".to_string(),
        })
        .await?;
    guest.drain().await?;

    host.event(ClientEvent::SelectTeam {
        player_id: host.id,
        team: Team::Developers,
    })
    .await?;
    host.event(ClientEvent::SelectTeam {
        player_id: guest.id,
        team: Team::Qa,
    })
    .await?;
    host.event(ClientEvent::EnableTeamCompetition).await?;

    let ticket = Ticket {
        id: "BOT-1".to_string(),
        story_points: None,
    };
    host.event(ClientEvent::StartRound {
        ticket: ticket.clone(),
    })
    .await?;
    host.drain().await?;

    let started = Instant::now();
    for (bot, team) in [(&host, Team::Developers), (&guest, Team::Qa)] {
        bot.event(ClientEvent::SubmitEstimate {
            score: args.estimate,
        })
        .await?;
        bot.event(ClientEvent::PlayerPerformance {
            player_id: bot.id,
            estimation_time: started.elapsed().as_millis() as u64,
            score: args.estimate,
            team,
            ticket_id: ticket.id.clone(),
        })
        .await?;
    }
    host.event(ClientEvent::Reveal).await?;
    host.event(ClientEvent::AdvanceToNextTicket {
        final_score: Some(args.estimate),
        next_ticket: None,
    })
    .await?;

    host.drain().await?;
    guest.drain().await?;

    for bot in [&host, &guest] {
        bot.send(&Packet::Disconnect).await?;
    }
    println!("Test client finished");
    Ok(())
}
