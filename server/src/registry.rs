//! Player roster management for the game server
//!
//! This module handles the server-side roster of connected players, including:
//! - Player lifecycle (join, leave, disconnect cleanup)
//! - Turn ordering: insertion order is turn order and never changes
//! - Score bookkeeping across rounds
//!
//! The registry performs no locking and no IO of its own. It is only ever
//! touched from the single game actor task, which serializes every mutation.

use log::info;

/// Stable identifier the network layer assigns to each connection.
pub type PlayerId = u32;

/// Represents one connected player and their game standing.
///
/// The transport handle itself (socket and outbound queue) is owned by the
/// network layer; the registry only tracks identity and score.
#[derive(Debug, Clone)]
pub struct Player {
    /// Unique player identifier assigned by the server
    pub id: PlayerId,
    /// Display name, refreshed from every inbound message
    pub username: String,
    /// Rounds won so far
    pub score: u32,
}

impl Player {
    /// Creates a new player with a placeholder name and no score.
    ///
    /// The wire protocol carries a username on every message rather than at
    /// connect time, so the placeholder stands until the first message
    /// arrives.
    fn new(id: PlayerId) -> Self {
        Self {
            id,
            username: format!("player{}", id),
            score: 0,
        }
    }
}

/// Ordered roster of all connected players.
///
/// Join order doubles as turn order: new players always append to the tail,
/// and removal from any position never reorders the survivors. Rotation and
/// broadcast both traverse this order.
#[derive(Debug, Default)]
pub struct Registry {
    players: Vec<Player>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            players: Vec::new(),
        }
    }

    /// Appends a new player with score 0 to the tail of the turn order.
    pub fn join(&mut self, id: PlayerId) {
        self.players.push(Player::new(id));
        info!("Player {} joined (roster size {})", id, self.players.len());
    }

    /// Removes a player from the roster.
    ///
    /// A missing id is a no-op: removal can race (a quit followed by the
    /// disconnect it causes) and the second attempt must not panic.
    pub fn remove(&mut self, id: PlayerId) {
        if let Some(pos) = self.players.iter().position(|p| p.id == id) {
            let player = self.players.remove(pos);
            info!("Player {} ({}) left the roster", player.id, player.username);
        }
    }

    /// Drops every player at once. Used when the game ends.
    pub fn clear(&mut self) {
        self.players.clear();
    }

    /// Returns the number of players currently in the roster.
    pub fn count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.iter().any(|p| p.id == id)
    }

    /// First player in join order, if any.
    pub fn first(&self) -> Option<PlayerId> {
        self.players.first().map(|p| p.id)
    }

    /// Successor of `id` in join order; `None` for the tail or an unknown id.
    pub fn next(&self, id: PlayerId) -> Option<PlayerId> {
        let pos = self.players.iter().position(|p| p.id == id)?;
        self.players.get(pos + 1).map(|p| p.id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Player ids in join order, for rotation and broadcast.
    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    /// Players in join order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_assigns_placeholder_name_and_zero_score() {
        let mut registry = Registry::new();
        registry.join(7);

        let player = registry.get(7).unwrap();
        assert_eq!(player.username, "player7");
        assert_eq!(player.score, 0);
    }

    #[test]
    fn traversal_order_equals_join_order() {
        let mut registry = Registry::new();
        for id in [3, 1, 4, 5, 9] {
            registry.join(id);
        }

        assert_eq!(registry.ids(), vec![3, 1, 4, 5, 9]);
        assert_eq!(registry.first(), Some(3));
    }

    #[test]
    fn interior_removal_preserves_relative_order() {
        let mut registry = Registry::new();
        for id in 1..=5 {
            registry.join(id);
        }

        registry.remove(3);

        assert_eq!(registry.ids(), vec![1, 2, 4, 5]);
        assert_eq!(registry.next(2), Some(4));
    }

    #[test]
    fn removal_of_unknown_id_is_a_noop() {
        let mut registry = Registry::new();
        registry.join(1);

        registry.remove(99);
        registry.remove(1);
        registry.remove(1);

        assert!(registry.is_empty());
    }

    #[test]
    fn next_walks_the_order_and_stops_at_the_tail() {
        let mut registry = Registry::new();
        for id in [10, 20, 30] {
            registry.join(id);
        }

        assert_eq!(registry.next(10), Some(20));
        assert_eq!(registry.next(20), Some(30));
        assert_eq!(registry.next(30), None);
        assert_eq!(registry.next(99), None);
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut registry = Registry::new();
        registry.join(1);

        let player = registry.get_mut(1).unwrap();
        player.username = "alice".to_string();
        player.score += 1;

        assert_eq!(registry.get(1).unwrap().username, "alice");
        assert_eq!(registry.get(1).unwrap().score, 1);
    }

    #[test]
    fn clear_empties_the_roster() {
        let mut registry = Registry::new();
        registry.join(1);
        registry.join(2);

        registry.clear();

        assert!(registry.is_empty());
        assert_eq!(registry.count(), 0);
        assert_eq!(registry.first(), None);
    }

    #[test]
    fn count_tracks_joins_and_removals() {
        let mut registry = Registry::new();
        assert_eq!(registry.count(), 0);

        registry.join(1);
        registry.join(2);
        assert_eq!(registry.count(), 2);

        registry.remove(1);
        assert_eq!(registry.count(), 1);
        assert!(!registry.contains(1));
        assert!(registry.contains(2));
    }
}
