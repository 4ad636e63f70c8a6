//! Server network layer: TCP sessions and the game actor loop
//!
//! One reader task and one writer task run per connection; everything they
//! learn flows to the single actor loop in [`Server::run`] as [`GameEvent`]
//! intents over a channel. The actor owns the [`GameState`] outright and
//! applies intents strictly one at a time, so no lock ever guards the shared
//! game state.

use crate::game::{Directive, GameEvent, GameState, Phase, SERVER_NAME};
use crate::registry::PlayerId;
use log::{debug, error, info, warn};
use shared::{read_message, write_message, Message};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Notice sent to a connection rejected at capacity.
const SERVER_FULL: &str = "The server is full.";

/// Handle to one player's connection: the queue feeding the writer task, and
/// the reader task so teardown can cancel a blocked receive.
///
/// Dropping the handle is the one and only close path: the writer drains its
/// queue and shuts the stream down, and aborting the reader releases the read
/// half. Removal from the connection table is idempotent, so a connection can
/// never be closed twice.
struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
}

/// The game server: accept loop, connection table, and game actor in one.
pub struct Server {
    listener: TcpListener,
    state: GameState,
    connections: HashMap<PlayerId, Connection>,
    next_player_id: PlayerId,
    max_players: usize,
    event_tx: mpsc::UnboundedSender<GameEvent>,
    event_rx: mpsc::UnboundedReceiver<GameEvent>,
}

impl Server {
    pub async fn new(addr: &str, max_players: usize, max_questions: u32) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            state: GameState::new(max_questions),
            connections: HashMap::new(),
            next_player_id: 1,
            max_players,
            event_tx,
            event_rx,
        })
    }

    /// Address the listener actually bound, for callers that asked for port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop and the game actor until the game ends.
    ///
    /// Every registry and game-state mutation happens on this task; session
    /// tasks only forward intents. The loop exits once the game is over and
    /// every connection has been torn down.
    pub async fn run(&mut self) -> io::Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.accept_player(stream, addr),
                        Err(e) => warn!("Failed to accept a connection: {}", e),
                    }
                }
                event = self.event_rx.recv() => {
                    // The server holds its own sender, so the channel cannot
                    // close while we are running.
                    match event {
                        Some(event) => self.process(event),
                        None => break,
                    }
                }
            }
            if self.state.phase() == Phase::GameOver {
                info!("Game finished; leaving the accept loop");
                break;
            }
        }
        Ok(())
    }

    fn accept_player(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.connections.len() >= self.max_players {
            info!("Rejecting connection from {}: server is full", addr);
            tokio::spawn(async move {
                let mut stream = stream;
                let notice = Message::new(SERVER_NAME, SERVER_FULL);
                if let Err(e) = write_message(&mut stream, &notice).await {
                    debug!("Failed to notify rejected client {}: {}", addr, e);
                }
            });
            return;
        }

        let id = self.next_player_id;
        self.next_player_id += 1;
        info!("Player {} connected from {}", id, addr);

        let (read_half, write_half) = stream.into_split();
        let (outbound, outbox) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(id, read_half, self.event_tx.clone()));
        tokio::spawn(write_loop(id, write_half, outbox, self.event_tx.clone()));

        self.connections.insert(id, Connection { outbound, reader });
        self.process(GameEvent::PlayerJoined { id });
    }

    /// Applies one intent along with every follow-up it causes: a failed
    /// delivery counts as a departure, which may itself produce more sends.
    fn process(&mut self, event: GameEvent) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            for directive in self.state.handle(event) {
                self.execute(directive, &mut pending);
            }
        }
    }

    fn execute(&mut self, directive: Directive, pending: &mut VecDeque<GameEvent>) {
        match directive {
            Directive::Broadcast { sender, body } => {
                let message = Message::new(sender, body);
                // A dead recipient is dropped from the game; everyone else
                // still receives the message.
                for id in self.state.registry().ids() {
                    if !self.deliver(id, message.clone()) {
                        pending.push_back(GameEvent::PlayerLeft { id });
                    }
                }
            }
            Directive::Whisper { to, sender, body } => {
                if !self.deliver(to, Message::new(sender, body)) {
                    pending.push_back(GameEvent::PlayerLeft { id: to });
                }
            }
            Directive::Disconnect { id } => self.close_connection(id),
            Directive::Shutdown => {
                info!("Closing all connections");
                let ids: Vec<PlayerId> = self.connections.keys().copied().collect();
                for id in ids {
                    self.close_connection(id);
                }
            }
        }
    }

    /// Queues one message for a player. Returns false when the player's
    /// writer is gone, so the caller can treat them as departed.
    fn deliver(&self, id: PlayerId, message: Message) -> bool {
        match self.connections.get(&id) {
            Some(connection) => connection.outbound.send(message).is_ok(),
            None => false,
        }
    }

    fn close_connection(&mut self, id: PlayerId) {
        if let Some(connection) = self.connections.remove(&id) {
            connection.reader.abort();
            debug!("Closed connection for player {}", id);
        }
    }
}

/// Receive loop for one player: forwards every decoded message as an intent.
///
/// Any receive failure, a clean close included, is reported as a departure;
/// the distinction does not matter to the game.
async fn read_loop(
    id: PlayerId,
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<GameEvent>,
) {
    loop {
        match read_message(&mut reader).await {
            Ok(message) => {
                debug!("Player {} sent {:?}", id, message.body);
                let event = GameEvent::MessageReceived {
                    id,
                    username: message.username,
                    body: message.body,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    warn!("Receive failed for player {}: {}", id, e);
                }
                let _ = events.send(GameEvent::PlayerLeft { id });
                break;
            }
        }
    }
}

/// Send loop for one player: drains the outbound queue onto the socket.
///
/// Ends when the queue closes (connection teardown) or a write fails. A write
/// failure is reported as a departure right away; a half-open peer whose read
/// side never errors must not linger in the game. Either way the stream is
/// shut down once.
async fn write_loop(
    id: PlayerId,
    mut writer: OwnedWriteHalf,
    mut outbox: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<GameEvent>,
) {
    while let Some(message) = outbox.recv().await {
        if let Err(e) = write_message(&mut writer, &message).await {
            error!("Failed to send to player {}: {}", id, e);
            let _ = events.send(GameEvent::PlayerLeft { id });
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{ASK_PROMPT, HOST_PROMPT, WELCOME};

    fn fake_connection() -> (Connection, mpsc::UnboundedReceiver<Message>) {
        let (outbound, inbox) = mpsc::unbounded_channel();
        let connection = Connection {
            outbound,
            reader: tokio::spawn(async {}),
        };
        (connection, inbox)
    }

    fn drain(inbox: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Message> {
        let mut received = Vec::new();
        while let Ok(message) = inbox.try_recv() {
            received.push(message);
        }
        received
    }

    #[tokio::test]
    async fn broadcast_failure_is_isolated_to_the_dead_recipient() {
        let mut server = Server::new("127.0.0.1:0", 8, 1).await.unwrap();

        let (conn1, mut inbox1) = fake_connection();
        let (conn2, mut inbox2) = fake_connection();
        let (conn3, inbox3) = fake_connection();
        server.connections.insert(1, conn1);
        server.connections.insert(2, conn2);
        server.connections.insert(3, conn3);
        for id in 1..=3 {
            server.process(GameEvent::PlayerJoined { id });
        }

        // Player 3's writer dies; the next broadcast must reach the others
        // and remove only player 3.
        drop(inbox3);
        server.process(GameEvent::MessageReceived {
            id: 1,
            username: "alice".to_string(),
            body: "apple".to_string(),
        });
        server.process(GameEvent::MessageReceived {
            id: 2,
            username: "bob".to_string(),
            body: "Is it red?".to_string(),
        });

        let question = Message::new("bob", "Is it red?");
        assert!(drain(&mut inbox1).contains(&question));
        assert!(drain(&mut inbox2).contains(&question));
        assert_eq!(server.state.registry().ids(), vec![1, 2]);
        assert!(!server.connections.contains_key(&3));
    }

    #[tokio::test]
    async fn join_whispers_flow_through_the_connection_table() {
        let mut server = Server::new("127.0.0.1:0", 8, 1).await.unwrap();

        let (conn1, mut inbox1) = fake_connection();
        let (conn2, mut inbox2) = fake_connection();
        server.connections.insert(1, conn1);
        server.connections.insert(2, conn2);

        server.process(GameEvent::PlayerJoined { id: 1 });
        server.process(GameEvent::PlayerJoined { id: 2 });

        let to_host: Vec<String> = drain(&mut inbox1).into_iter().map(|m| m.body).collect();
        assert_eq!(to_host, vec![WELCOME.to_string(), HOST_PROMPT.to_string()]);
        assert!(drain(&mut inbox2)
            .iter()
            .any(|m| m.body == WELCOME && m.username == SERVER_NAME));
    }

    #[tokio::test]
    async fn quit_tears_the_connection_down_once() {
        let mut server = Server::new("127.0.0.1:0", 8, 1).await.unwrap();

        let (conn1, _inbox1) = fake_connection();
        server.connections.insert(1, conn1);
        server.process(GameEvent::PlayerJoined { id: 1 });

        server.process(GameEvent::MessageReceived {
            id: 1,
            username: "alice".to_string(),
            body: "quit".to_string(),
        });
        assert!(!server.connections.contains_key(&1));
        assert!(server.state.registry().is_empty());

        // A duplicate departure report must be a no-op.
        server.process(GameEvent::PlayerLeft { id: 1 });
        server.close_connection(1);
    }

    #[tokio::test]
    async fn game_over_drains_the_connection_table() {
        let mut server = Server::new("127.0.0.1:0", 8, 1).await.unwrap();

        let (conn1, mut inbox1) = fake_connection();
        let (conn2, _inbox2) = fake_connection();
        server.connections.insert(1, conn1);
        server.connections.insert(2, conn2);
        server.process(GameEvent::PlayerJoined { id: 1 });
        server.process(GameEvent::PlayerJoined { id: 2 });

        // The other player leaving mid-game ends the game for the survivor.
        server.process(GameEvent::PlayerLeft { id: 2 });

        assert_eq!(server.state.phase(), Phase::GameOver);
        assert!(server.connections.is_empty());
        let bodies: Vec<String> = drain(&mut inbox1).into_iter().map(|m| m.body).collect();
        assert!(bodies.iter().any(|b| b.starts_with("The game has ended.")));
        assert!(bodies.contains(&"Your score: 0".to_string()));
    }

    #[tokio::test]
    async fn question_flow_reaches_the_asker() {
        let mut server = Server::new("127.0.0.1:0", 8, 1).await.unwrap();

        let (conn1, _inbox1) = fake_connection();
        let (conn2, mut inbox2) = fake_connection();
        server.connections.insert(1, conn1);
        server.connections.insert(2, conn2);
        server.process(GameEvent::PlayerJoined { id: 1 });
        server.process(GameEvent::PlayerJoined { id: 2 });

        server.process(GameEvent::MessageReceived {
            id: 1,
            username: "alice".to_string(),
            body: "apple".to_string(),
        });

        assert!(drain(&mut inbox2).iter().any(|m| m.body == ASK_PROMPT));
    }
}
