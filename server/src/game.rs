//! Turn and phase logic for the secret-word guessing game
//!
//! The state machine is deliberately pure: it consumes one intent at a time
//! and returns the sends and closes the network layer should perform, without
//! doing any IO itself. All mutation happens on the single actor task that
//! owns the [`GameState`], so there is no locking anywhere in this module and
//! no way for two sessions to observe a half-finished phase transition.

use crate::registry::{PlayerId, Registry};
use log::{debug, info};
use shared::QUIT_COMMAND;

/// Sender name on every server-originated control message.
pub const SERVER_NAME: &str = "Server";

/// Roster size that triggers the start of the game.
pub const MIN_PLAYERS: usize = 2;

pub const WELCOME: &str = "Welcome to the secret word game! Once enough players have joined, take turns asking the host Yes/No questions about the secret word. Type 'quit' to leave.";
pub const HOST_PROMPT: &str = "You are the host. Pick your secret word.";
pub const GAME_STARTED: &str =
    "The game has started. Wait for your turn to ask a question about the secret word.";
pub const ASK_PROMPT: &str =
    "It is your turn to ask the host a Yes/No question about the secret word.";
pub const GUESS_PROMPT: &str = "It is time to make your guess for the secret word.";
pub const NOT_YOUR_TURN: &str = "It is not your turn yet. Please wait.";
pub const WRONG_GUESS: &str = "Wrong guess. Try again!";

pub fn round_winner_announcement(username: &str) -> String {
    format!("{} is the winner of this round!", username)
}

pub fn game_over_announcement(username: &str, score: u32) -> String {
    format!(
        "The game has ended.\n{} is the winner of the game with {} points!",
        username, score
    )
}

pub fn score_line(score: u32) -> String {
    format!("Your score: {}", score)
}

/// Where the game currently stands.
///
/// Round completion is not a resting state: it is evaluated inline when a
/// correct guess (or a departing host) ends the round, and lands on either
/// `AwaitingSecretWord` or `GameOver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForPlayers,
    AwaitingSecretWord,
    Asking,
    Guessing,
    GameOver,
}

/// One state-mutation request forwarded from a session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    PlayerJoined {
        id: PlayerId,
    },
    MessageReceived {
        id: PlayerId,
        username: String,
        body: String,
    },
    PlayerLeft {
        id: PlayerId,
    },
}

/// One send or close the network layer must carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Deliver to every registered player, in join order.
    Broadcast { sender: String, body: String },
    /// Deliver to exactly one player.
    Whisper {
        to: PlayerId,
        sender: String,
        body: String,
    },
    /// Close one player's connection.
    Disconnect { id: PlayerId },
    /// The game is over: close every remaining connection and stop.
    Shutdown,
}

fn whisper(to: PlayerId, body: impl Into<String>) -> Directive {
    Directive::Whisper {
        to,
        sender: SERVER_NAME.to_string(),
        body: body.into(),
    }
}

fn broadcast(sender: &str, body: impl Into<String>) -> Directive {
    Directive::Broadcast {
        sender: sender.to_string(),
        body: body.into(),
    }
}

/// Advances one seat from `current`, wrapping at the end of join order and
/// skipping `host`.
///
/// This is the single rotation rule shared by asker advancement, round setup,
/// and removal-triggered advancement. Returns `None` when the order holds no
/// eligible seat (unknown `current`, or nobody but the host left).
pub fn advance(current: PlayerId, host: PlayerId, order: &[PlayerId]) -> Option<PlayerId> {
    let pos = order.iter().position(|&id| id == current)?;
    let next = order[(pos + 1) % order.len()];
    if next != host {
        return Some(next);
    }
    let after_host = order[(pos + 2) % order.len()];
    if after_host == host {
        None
    } else {
        Some(after_host)
    }
}

/// The single process-wide game instance: phase, turn pointers, the secret
/// word, round counters, scores, and the player roster itself.
pub struct GameState {
    registry: Registry,
    phase: Phase,
    host: Option<PlayerId>,
    asker: Option<PlayerId>,
    secret_word: String,
    questions_asked: u32,
    max_questions: u32,
    /// Player with the highest score seen so far. Updated only on a strictly
    /// greater score, so the first player to reach a maximum keeps the lead.
    leading: Option<PlayerId>,
}

impl GameState {
    /// Creates the game in `WaitingForPlayers` with an empty roster.
    ///
    /// `max_questions` is the number of answered questions per round before
    /// guessing opens; a round could never finish at zero, so it is clamped
    /// to at least one.
    pub fn new(max_questions: u32) -> Self {
        Self {
            registry: Registry::new(),
            phase: Phase::WaitingForPlayers,
            host: None,
            asker: None,
            secret_word: String::new(),
            questions_asked: 0,
            max_questions: max_questions.max(1),
            leading: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Applies one intent and returns the directives it produced.
    pub fn handle(&mut self, event: GameEvent) -> Vec<Directive> {
        match event {
            GameEvent::PlayerJoined { id } => self.player_joined(id),
            GameEvent::MessageReceived { id, username, body } => {
                self.message_received(id, username, body)
            }
            GameEvent::PlayerLeft { id } => self.player_left(id),
        }
    }

    fn player_joined(&mut self, id: PlayerId) -> Vec<Directive> {
        self.registry.join(id);
        let mut out = vec![whisper(id, WELCOME)];

        // The first time the roster reaches two players, the game begins.
        // Later joiners are appended to the turn order but do not disturb the
        // round already in flight; rotation reaches them naturally.
        if self.phase == Phase::WaitingForPlayers && self.registry.count() >= MIN_PLAYERS {
            out.extend(self.start_game());
        }
        out
    }

    fn start_game(&mut self) -> Vec<Directive> {
        let Some(host) = self.registry.first() else {
            return Vec::new();
        };
        let order = self.registry.ids();
        let Some(asker) = advance(host, host, &order) else {
            return Vec::new();
        };

        self.host = Some(host);
        self.asker = Some(asker);
        self.phase = Phase::AwaitingSecretWord;
        info!(
            "Game starting: player {} hosts, player {} asks first",
            host, asker
        );

        let mut out = vec![whisper(host, HOST_PROMPT)];
        for player in self.registry.iter() {
            if player.id != host {
                out.push(whisper(player.id, GAME_STARTED));
            }
        }
        out
    }

    fn message_received(&mut self, id: PlayerId, username: String, body: String) -> Vec<Directive> {
        if !self.registry.contains(id) {
            // The message raced with this player's removal.
            return Vec::new();
        }
        if let Some(player) = self.registry.get_mut(id) {
            player.username = username.clone();
        }

        if body == QUIT_COMMAND {
            return self.player_left(id);
        }

        match self.phase {
            // Before the game starts this is a plain chat room.
            Phase::WaitingForPlayers => vec![broadcast(&username, body)],
            Phase::AwaitingSecretWord => self.secret_word_submitted(id, body),
            Phase::Asking => self.question_round_message(id, &username, body),
            Phase::Guessing => self.guess_submitted(id, &username, body),
            Phase::GameOver => Vec::new(),
        }
    }

    fn secret_word_submitted(&mut self, id: PlayerId, body: String) -> Vec<Directive> {
        if self.host != Some(id) {
            return vec![whisper(id, NOT_YOUR_TURN)];
        }

        // The host's message is the secret word; it is never broadcast.
        self.secret_word = body;
        self.questions_asked = 0;
        self.phase = Phase::Asking;
        info!("Player {} picked a secret word; asking begins", id);

        match self.asker {
            Some(asker) => vec![whisper(asker, ASK_PROMPT)],
            None => Vec::new(),
        }
    }

    fn question_round_message(
        &mut self,
        id: PlayerId,
        username: &str,
        body: String,
    ) -> Vec<Directive> {
        let is_host = self.host == Some(id);
        let is_asker = self.asker == Some(id);
        if !is_host && !is_asker {
            return vec![whisper(id, NOT_YOUR_TURN)];
        }

        let answers_question = is_host && (body == "y" || body == "n");
        let mut out = vec![broadcast(username, body)];
        if answers_question {
            out.extend(self.question_answered());
        }
        out
    }

    fn question_answered(&mut self) -> Vec<Directive> {
        self.questions_asked += 1;
        let (Some(host), Some(asker)) = (self.host, self.asker) else {
            return Vec::new();
        };

        let order = self.registry.ids();
        let Some(next_asker) = advance(asker, host, &order) else {
            return Vec::new();
        };
        self.asker = Some(next_asker);
        debug!(
            "Question {}/{} answered; asker is now player {}",
            self.questions_asked, self.max_questions, next_asker
        );

        if self.questions_asked >= self.max_questions {
            self.phase = Phase::Guessing;
            info!("Question limit reached; guessing is open");
            self.registry
                .iter()
                .filter(|p| Some(p.id) != self.host)
                .map(|p| whisper(p.id, GUESS_PROMPT))
                .collect()
        } else {
            vec![whisper(next_asker, ASK_PROMPT)]
        }
    }

    fn guess_submitted(&mut self, id: PlayerId, username: &str, body: String) -> Vec<Directive> {
        if self.host == Some(id) {
            // The host holds the answer and may not guess. Dropped without a
            // reply.
            debug!("Ignoring host message during guessing");
            return Vec::new();
        }

        if !body.eq_ignore_ascii_case(&self.secret_word) {
            return vec![whisper(id, WRONG_GUESS)];
        }

        let new_score = match self.registry.get_mut(id) {
            Some(player) => {
                player.score += 1;
                player.score
            }
            None => return Vec::new(),
        };
        let leading_score = self
            .leading
            .and_then(|leader| self.registry.get(leader))
            .map(|p| p.score)
            .unwrap_or(0);
        if new_score > leading_score {
            self.leading = Some(id);
        }
        info!("Player {} guessed the word (score {})", id, new_score);

        let mut out = vec![broadcast(SERVER_NAME, round_winner_announcement(username))];
        out.extend(self.complete_round());
        out
    }

    /// Round completion: hand hosting to the next joiner who has not hosted
    /// yet, or end the game once the last-joined player has hosted.
    fn complete_round(&mut self) -> Vec<Directive> {
        let Some(host) = self.host else {
            return self.end_game();
        };
        match self.registry.next(host) {
            Some(next_host) => self.begin_round(next_host),
            None => self.end_game(),
        }
    }

    fn begin_round(&mut self, new_host: PlayerId) -> Vec<Directive> {
        let order = self.registry.ids();
        // The asker keeps rotating from wherever it stood; a departed asker
        // restarts the rotation at the new host's seat.
        let from = self
            .asker
            .filter(|&a| self.registry.contains(a))
            .unwrap_or(new_host);
        let Some(asker) = advance(from, new_host, &order) else {
            return self.end_game();
        };

        self.host = Some(new_host);
        self.asker = Some(asker);
        self.secret_word.clear();
        self.questions_asked = 0;
        self.phase = Phase::AwaitingSecretWord;
        info!(
            "New round: player {} hosts, player {} asks first",
            new_host, asker
        );

        vec![whisper(new_host, HOST_PROMPT)]
    }

    fn end_game(&mut self) -> Vec<Directive> {
        self.phase = Phase::GameOver;
        let mut out = Vec::new();

        // With nobody left there is nothing to announce; an empty roster at
        // game end is a normal quiescent state, not a crash condition.
        let winner = self
            .leading
            .and_then(|leader| self.registry.get(leader))
            .or_else(|| {
                // The tracked leader may have left; fall back to the best
                // remaining score, earliest joiner on ties.
                self.registry
                    .iter()
                    .reduce(|best, player| if player.score > best.score { player } else { best })
            })
            .cloned();
        if let Some(winner) = winner {
            info!(
                "Game over: {} wins with {} points",
                winner.username, winner.score
            );
            let announcement = game_over_announcement(&winner.username, winner.score);
            for player in self.registry.iter() {
                out.push(whisper(player.id, announcement.clone()));
            }
            for player in self.registry.iter() {
                out.push(whisper(player.id, score_line(player.score)));
            }
        } else {
            info!("Game over with no players left");
        }

        self.registry.clear();
        self.host = None;
        self.asker = None;
        out.push(Directive::Shutdown);
        out
    }

    fn player_left(&mut self, id: PlayerId) -> Vec<Directive> {
        if !self.registry.contains(id) {
            // A quit and the disconnect it causes can both land here; the
            // second one is a no-op.
            return Vec::new();
        }

        let was_host = self.host == Some(id);
        let was_asker = self.asker == Some(id);
        let successor = self.registry.next(id);
        let order = self.registry.ids();

        // Close the leaver's connection exactly once, before any follow-up
        // messaging to the others.
        let mut out = vec![Directive::Disconnect { id }];

        // Rotation must step off the leaver before the entry disappears, so
        // the pointer never dangles on a removed player.
        if was_asker {
            if let Some(host) = self.host {
                self.asker = advance(id, host, &order).filter(|&a| a != id);
            }
        }
        self.registry.remove(id);

        if matches!(self.phase, Phase::WaitingForPlayers | Phase::GameOver) {
            return out;
        }
        if self.registry.count() < MIN_PLAYERS {
            // Not enough players to keep the game going.
            out.extend(self.end_game());
            return out;
        }
        if was_host {
            // The round cannot finish without its host; hosting passes on as
            // if the round had completed, without a winner.
            match successor {
                Some(next_host) => out.extend(self.begin_round(next_host)),
                None => out.extend(self.end_game()),
            }
            return out;
        }
        if was_asker && self.phase == Phase::Asking {
            if let Some(asker) = self.asker {
                out.push(whisper(asker, ASK_PROMPT));
            }
        }
        out
    }
}
