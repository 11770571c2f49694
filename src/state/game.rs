//! Roster snapshots used to decide starts, round conclusions and winners.

use crate::{dao::models::PlayerEntity, dto::ws::PlayerState};

/// Point-in-time snapshot of every player in one game, ordered by join time.
///
/// The snapshot owns copies of the records; it may be stale as soon as it is
/// taken, so decisions based on it must be followed by conditional writes.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: Vec<PlayerEntity>,
}

impl Roster {
    /// Build a roster from an unordered scan result.
    pub fn new(mut players: Vec<PlayerEntity>) -> Self {
        players.sort_by(|a, b| {
            a.join_offset_ms
                .cmp(&b.join_offset_ms)
                .then_with(|| a.connection_id.cmp(&b.connection_id))
        });
        Self { players }
    }

    /// Every player, active or not.
    pub fn players(&self) -> &[PlayerEntity] {
        &self.players
    }

    /// Players still connected to the game.
    pub fn active(&self) -> impl Iterator<Item = &PlayerEntity> {
        self.players.iter().filter(|player| player.active)
    }

    /// Copies of the active players, for handing to concurrent tasks.
    pub fn active_players(&self) -> Vec<PlayerEntity> {
        self.active().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn all_inactive(&self) -> bool {
        self.active_count() == 0
    }

    /// Whether every active player answered `round`. Vacuously true without active players.
    pub fn all_active_responded(&self, round: u32) -> bool {
        self.active().all(|player| player.has_responded_to(round))
    }

    /// Active player with the strictly highest score; ties go to the earliest joiner.
    pub fn leader(&self) -> Option<&PlayerEntity> {
        self.active().fold(None, |best: Option<&PlayerEntity>, player| match best {
            Some(current) if current.points >= player.points => Some(current),
            _ => Some(player),
        })
    }

    /// Per-player summary broadcast after every roster or score change.
    pub fn player_states(&self) -> Vec<PlayerState> {
        self.players
            .iter()
            .map(|player| PlayerState {
                id: player.connection_id.clone(),
                name: player.name.clone(),
                icon: player.icon.clone(),
                score: player.points,
                active: player.active,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{config::GameSettings, dao::models::GameEntity};

    fn player(game: &GameEntity, id: &str, offset: u64, points: u32) -> PlayerEntity {
        let mut player = PlayerEntity::joining(
            id.into(),
            game,
            id.to_uppercase(),
            "horse".into(),
            Duration::from_secs(60),
        );
        player.join_offset_ms = offset;
        player.points = points;
        player
    }

    fn game() -> GameEntity {
        GameEntity::new_pending(&GameSettings::default())
    }

    #[test]
    fn roster_is_ordered_by_join_time() {
        let game = game();
        let roster = Roster::new(vec![
            player(&game, "c", 30, 0),
            player(&game, "a", 10, 0),
            player(&game, "b", 20, 0),
        ]);
        let ids = roster
            .players()
            .iter()
            .map(|p| p.connection_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn two_of_three_responded_is_not_complete() {
        let game = game();
        let mut a = player(&game, "a", 1, 0);
        let mut b = player(&game, "b", 2, 0);
        let mut c = player(&game, "c", 3, 0);
        for p in [&mut a, &mut b, &mut c] {
            p.round = 4;
        }
        a.responded = true;
        b.responded = true;

        let roster = Roster::new(vec![a, b, c.clone()]);
        assert!(!roster.all_active_responded(4));

        c.active = false;
        let roster = Roster::new(vec![roster.players()[0].clone(), roster.players()[1].clone(), c]);
        assert!(roster.all_active_responded(4));
    }

    #[test]
    fn responses_to_a_previous_round_do_not_count() {
        let game = game();
        let mut a = player(&game, "a", 1, 0);
        a.round = 3;
        a.responded = true;
        let roster = Roster::new(vec![a]);
        assert!(roster.all_active_responded(3));
        assert!(!roster.all_active_responded(4));
    }

    #[test]
    fn leader_ignores_inactive_players_and_prefers_earliest_on_ties() {
        let game = game();
        let mut gone = player(&game, "gone", 1, 900);
        gone.active = false;
        let roster = Roster::new(vec![
            gone,
            player(&game, "b", 2, 300),
            player(&game, "c", 3, 300),
            player(&game, "d", 4, 120),
        ]);

        assert_eq!(roster.leader().unwrap().connection_id, "b");
    }

    #[test]
    fn leader_of_empty_roster_is_none() {
        assert!(Roster::default().leader().is_none());
        assert!(Roster::default().all_inactive());
    }

    #[test]
    fn player_states_include_inactive_players() {
        let game = game();
        let mut gone = player(&game, "gone", 1, 40);
        gone.active = false;
        let roster = Roster::new(vec![gone, player(&game, "b", 2, 10)]);

        let states = roster.player_states();
        assert_eq!(states.len(), 2);
        assert!(!states[0].active);
        assert_eq!(states[0].score, 40);
        assert_eq!(states[1].name, "B");
    }
}
