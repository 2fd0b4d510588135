//! Ball possession: nearest player per frame, aggregated per team.
use nalgebra::Point2;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::PossessionConfig;
use crate::track::{BoundingBox, FrameTracks, Team, TrackId, TrackTable};
use crate::utils::{bbox_center, measure_distance};

pub struct PlayerBallAssigner {
    max_player_ball_distance: f32,
}

impl PlayerBallAssigner {
    pub fn new(config: &PossessionConfig) -> Self {
        PlayerBallAssigner {
            max_player_ball_distance: config.max_player_ball_distance,
        }
    }

    /// The player whose nearer bottom corner is closest to the ball center,
    /// if that distance is strictly under the assignment radius.
    pub fn assign_ball_to_player(&self, players: &FrameTracks, ball_bbox: &BoundingBox) -> Option<TrackId> {
        let ball = bbox_center(ball_bbox);
        let mut minimum_distance = f32::INFINITY;
        let mut assigned = None;

        for (id, player) in players {
            let bbox = &player.bbox;
            let left = measure_distance(&Point2::new(bbox.x1, bbox.y2), &ball);
            let right = measure_distance(&Point2::new(bbox.x2, bbox.y2), &ball);
            let distance = left.min(right);

            if distance < self.max_player_ball_distance && distance < minimum_distance {
                minimum_distance = distance;
                assigned = Some(*id);
            }
        }
        assigned
    }
}

/// Who held the ball in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Holder {
    pub player: TrackId,
    pub team: Option<Team>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Pass,
    Turnover,
}

/// The ball changing from one player to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BallTransfer {
    /// First frame the receiver holds the ball.
    pub frame: usize,
    pub from: TrackId,
    pub to: TrackId,
    pub team: Team,
    pub kind: TransferKind,
}

/// Per-frame possession for a whole match.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PossessionTimeline {
    /// Team in possession; `None` until the first assignment.
    pub teams: Vec<Option<Team>>,
    /// Player assigned in that very frame, without persistence.
    pub holders: Vec<Option<Holder>>,
}

impl PossessionTimeline {
    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Percentage of determined frames each team held the ball.
    pub fn possession_share(&self) -> BTreeMap<Team, f32> {
        let mut counts: BTreeMap<Team, usize> = BTreeMap::new();
        for team in self.teams.iter().flatten() {
            *counts.entry(*team).or_insert(0) += 1;
        }
        let total: usize = counts.values().sum();
        counts
            .into_iter()
            .map(|(team, n)| (team, n as f32 * 100.0 / total as f32))
            .collect()
    }

    /// Changes of holder between consecutive assignments whose teams are both known.
    pub fn ball_transfers(&self) -> Vec<BallTransfer> {
        let mut transfers = Vec::new();
        let mut last: Option<Holder> = None;
        for (frame, holder) in self.holders.iter().enumerate() {
            let Some(holder) = *holder else {
                continue;
            };
            if let Some(prev) = last {
                if prev.player != holder.player {
                    if let (Some(from_team), Some(to_team)) = (prev.team, holder.team) {
                        let kind = if from_team == to_team {
                            TransferKind::Pass
                        } else {
                            TransferKind::Turnover
                        };
                        transfers.push(BallTransfer {
                            frame,
                            from: prev.player,
                            to: holder.player,
                            team: to_team,
                            kind,
                        });
                    }
                }
            }
            last = Some(holder);
        }
        transfers
    }
}

/// Mark `has_ball` on each frame's nearest player and build the possession timeline.
///
/// Frames without a ball or without a player in range repeat the previous
/// frame's team.
pub fn assign_possession(table: &mut TrackTable, assigner: &PlayerBallAssigner) -> PossessionTimeline {
    let n = table.len();
    let mut timeline = PossessionTimeline {
        teams: Vec::with_capacity(n),
        holders: Vec::with_capacity(n),
    };

    for frame in 0..n {
        let previous = timeline.teams.last().copied().flatten();
        let ball = table.ball_bbox(frame);
        let players = &mut table.players[frame];
        let assigned = ball.and_then(|b| assigner.assign_ball_to_player(players, &b));

        match assigned.and_then(|id| players.get_mut(&id).map(|r| (id, r))) {
            Some((id, record)) => {
                record.has_ball = true;
                timeline.holders.push(Some(Holder {
                    player: id,
                    team: record.team,
                }));
                timeline.teams.push(record.team.or(previous));
            }
            None => {
                timeline.holders.push(None);
                timeline.teams.push(previous);
            }
        }
    }

    let assigned = timeline.holders.iter().filter(|h| h.is_some()).count();
    debug!("ball assigned in {} of {} frames", assigned, n);
    timeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{ObjectClass, TrackRecord, BALL_TRACK_ID};
    use approx::assert_relative_eq;

    fn assigner() -> PlayerBallAssigner {
        PlayerBallAssigner::new(&PossessionConfig::default())
    }

    /// Player box whose bottom-left corner sits at `(x, y)`.
    fn player(x: f32, y: f32, team: Team) -> TrackRecord {
        let mut r = TrackRecord::new(BoundingBox::new(x, y - 80.0, x + 30.0, y));
        r.team = Some(team);
        r
    }

    /// Ball box centered on `(x, y)`.
    fn ball(x: f32, y: f32) -> BoundingBox {
        BoundingBox::new(x - 5.0, y - 5.0, x + 5.0, y + 5.0)
    }

    #[test]
    fn test_nearest_corner_wins() {
        let mut players = FrameTracks::new();
        players.insert(1, player(100.0, 500.0, Team::One));
        players.insert(2, player(200.0, 500.0, Team::Two));
        // 10px right of player 2's bottom-left corner, 80px from player 1's.
        assert_eq!(assigner().assign_ball_to_player(&players, &ball(210.0, 500.0)), Some(2));
        // Just past player 1's bottom-right corner.
        assert_eq!(assigner().assign_ball_to_player(&players, &ball(135.0, 500.0)), Some(1));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut players = FrameTracks::new();
        players.insert(1, player(100.0, 500.0, Team::One));
        // Bottom-left corner is exactly 70px above the ball center.
        assert_eq!(assigner().assign_ball_to_player(&players, &ball(100.0, 570.0)), None);
        assert_eq!(assigner().assign_ball_to_player(&players, &ball(100.0, 569.0)), Some(1));
    }

    #[test]
    fn test_no_players_no_assignment() {
        assert_eq!(assigner().assign_ball_to_player(&FrameTracks::new(), &ball(0.0, 0.0)), None);
    }

    fn match_table() -> TrackTable {
        let mut table = TrackTable::with_frames(5);
        for f in 0..5 {
            table.players[f].insert(1, player(100.0, 500.0, Team::One));
            table.players[f].insert(2, player(400.0, 500.0, Team::Two));
            table.players[f].insert(3, player(700.0, 500.0, Team::Two));
        }
        table
    }

    #[test]
    fn test_possession_persists_through_gaps() {
        let mut table = match_table();
        table.ball[0].insert(BALL_TRACK_ID, TrackRecord::new(ball(1000.0, 100.0)));
        table.ball[1].insert(BALL_TRACK_ID, TrackRecord::new(ball(410.0, 500.0)));
        table.ball[2].insert(BALL_TRACK_ID, TrackRecord::new(ball(1000.0, 100.0)));
        // frame 3 has no ball at all
        table.ball[4].insert(BALL_TRACK_ID, TrackRecord::new(ball(105.0, 500.0)));

        let timeline = assign_possession(&mut table, &assigner());

        assert_eq!(
            timeline.teams,
            vec![None, Some(Team::Two), Some(Team::Two), Some(Team::Two), Some(Team::One)]
        );
        assert!(table.players[1][&2].has_ball);
        assert!(!table.players[1][&1].has_ball);
        assert!(table.players[4][&1].has_ball);
        assert_eq!(timeline.holders[3], None);
    }

    #[test]
    fn test_possession_share() {
        let timeline = PossessionTimeline {
            teams: vec![None, Some(Team::One), Some(Team::One), Some(Team::Two), Some(Team::One)],
            holders: vec![None; 5],
        };
        let share = timeline.possession_share();
        assert_relative_eq!(share[&Team::One], 75.0);
        assert_relative_eq!(share[&Team::Two], 25.0);
        assert!(PossessionTimeline::default().possession_share().is_empty());
    }

    #[test]
    fn test_ball_transfers() {
        let mut table = match_table();
        let spots = [(410.0, 500.0), (410.0, 500.0), (1000.0, 100.0), (710.0, 500.0), (105.0, 500.0)];
        for (f, (x, y)) in spots.iter().enumerate() {
            table.ball[f].insert(BALL_TRACK_ID, TrackRecord::new(ball(*x, *y)));
        }
        let timeline = assign_possession(&mut table, &assigner());
        let transfers = timeline.ball_transfers();

        assert_eq!(transfers.len(), 2);
        assert_eq!(
            transfers[0],
            BallTransfer {
                frame: 3,
                from: 2,
                to: 3,
                team: Team::Two,
                kind: TransferKind::Pass
            }
        );
        assert_eq!(transfers[1].kind, TransferKind::Turnover);
        assert_eq!(transfers[1].team, Team::One);
    }

    #[test]
    fn test_unteamed_holder_keeps_previous_team() {
        let mut table = TrackTable::with_frames(2);
        table.players[0].insert(1, player(100.0, 500.0, Team::Two));
        table.insert(ObjectClass::Player, 1, 9, BoundingBox::new(100.0, 420.0, 130.0, 500.0));
        for f in 0..2 {
            table.ball[f].insert(BALL_TRACK_ID, TrackRecord::new(ball(105.0, 500.0)));
        }
        let timeline = assign_possession(&mut table, &assigner());
        assert_eq!(timeline.teams, vec![Some(Team::Two), Some(Team::Two)]);
        assert_eq!(timeline.holders[1], Some(Holder { player: 9, team: None }));
    }
}
