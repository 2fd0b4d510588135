//! Match-level summary and per-frame export of a processed track table.
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::possession::{BallTransfer, PossessionTimeline};
use crate::track::{ObjectClass, Team, TrackId, TrackRecord, TrackTable};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSummary {
    pub id: TrackId,
    pub team: Option<Team>,
    /// Metres covered over the whole match.
    pub distance_m: f32,
    pub top_speed_kmh: f32,
    pub frames_with_ball: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchReport {
    pub frames: usize,
    /// Percent of determined frames, keyed by team label.
    pub possession_share: BTreeMap<Team, f32>,
    pub transfers: Vec<BallTransfer>,
    pub players: Vec<PlayerSummary>,
}

impl MatchReport {
    pub fn build(table: &TrackTable, timeline: &PossessionTimeline) -> Self {
        let mut players: BTreeMap<TrackId, PlayerSummary> = BTreeMap::new();
        for frame in &table.players {
            for (id, record) in frame {
                let summary = players.entry(*id).or_insert(PlayerSummary {
                    id: *id,
                    team: None,
                    distance_m: 0.0,
                    top_speed_kmh: 0.0,
                    frames_with_ball: 0,
                });
                if summary.team.is_none() {
                    summary.team = record.team;
                }
                if let Some(distance) = record.distance {
                    summary.distance_m = summary.distance_m.max(distance);
                }
                if let Some(speed) = record.speed {
                    summary.top_speed_kmh = summary.top_speed_kmh.max(speed);
                }
                if record.has_ball {
                    summary.frames_with_ball += 1;
                }
            }
        }

        MatchReport {
            frames: table.len(),
            possession_share: timeline.possession_share(),
            transfers: timeline.ball_transfers(),
            players: players.into_values().collect(),
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("report for {} players written to {:?}", self.players.len(), path);
        Ok(())
    }
}

/// One track record flattened together with its frame, class and identity.
#[derive(Serialize)]
struct FrameRow<'a> {
    frame: usize,
    class: ObjectClass,
    id: TrackId,
    #[serde(flatten)]
    record: &'a TrackRecord,
}

/// Export every record of every frame as a JSON array of rows, in frame order.
pub fn write_frame_rows(path: impl AsRef<Path>, table: &TrackTable) -> Result<()> {
    let path = path.as_ref();
    let mut rows = Vec::new();
    for frame in 0..table.len() {
        for class in ObjectClass::ALL {
            for (id, record) in &table.frames(class)[frame] {
                rows.push(FrameRow {
                    frame,
                    class,
                    id: *id,
                    record,
                });
            }
        }
    }
    fs::write(path, serde_json::to_string(&rows)?)?;
    info!("{} frame rows written to {:?}", rows.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::possession::Holder;
    use crate::track::{BoundingBox, BALL_TRACK_ID};
    use approx::assert_relative_eq;

    fn processed_table() -> (TrackTable, PossessionTimeline) {
        let mut table = TrackTable::with_frames(3);
        for f in 0..3 {
            let mut a = TrackRecord::new(BoundingBox::new(0.0, 0.0, 10.0, 20.0));
            a.team = Some(Team::One);
            a.speed = Some(10.0 + f as f32);
            a.distance = Some(f as f32 * 0.5);
            a.has_ball = f > 0;
            table.players[f].insert(4, a);

            let mut b = TrackRecord::new(BoundingBox::new(50.0, 0.0, 60.0, 20.0));
            b.team = Some(Team::Two);
            b.speed = Some(3.0);
            b.distance = Some(0.2);
            table.players[f].insert(7, b);
        }
        table.insert(ObjectClass::Ball, 1, BALL_TRACK_ID, BoundingBox::new(9.0, 18.0, 11.0, 20.0));

        let holder = Some(Holder {
            player: 4,
            team: Some(Team::One),
        });
        let timeline = PossessionTimeline {
            teams: vec![None, Some(Team::One), Some(Team::One)],
            holders: vec![None, holder, holder],
        };
        (table, timeline)
    }

    #[test]
    fn test_build_report() {
        let (table, timeline) = processed_table();
        let report = MatchReport::build(&table, &timeline);

        assert_eq!(report.frames, 3);
        assert_relative_eq!(report.possession_share[&Team::One], 100.0);
        assert!(report.transfers.is_empty());
        assert_eq!(report.players.len(), 2);

        let p4 = &report.players[0];
        assert_eq!(p4.id, 4);
        assert_eq!(p4.team, Some(Team::One));
        assert_relative_eq!(p4.distance_m, 1.0);
        assert_relative_eq!(p4.top_speed_kmh, 12.0);
        assert_eq!(p4.frames_with_ball, 2);

        assert_eq!(report.players[1].frames_with_ball, 0);
    }

    #[test]
    fn test_write_json() {
        let (table, timeline) = processed_table();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        MatchReport::build(&table, &timeline).write_json(&path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["frames"], 3);
        assert_eq!(value["possession_share"]["1"], 100.0);
        assert_eq!(value["players"][1]["team"], "2");
    }

    #[test]
    fn test_write_frame_rows() {
        let (table, _) = processed_table();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        write_frame_rows(&path, &table).unwrap();

        let rows: Vec<serde_json::Value> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0]["frame"], 0);
        assert_eq!(rows[0]["class"], "player");
        assert_eq!(rows[0]["id"], 4);
        assert_eq!(rows[0]["bbox"]["x2"], 10.0);
        assert_eq!(rows[4]["class"], "ball");
        assert_eq!(rows[4]["frame"], 1);
        assert_eq!(rows[5]["id"], 4);
        assert_eq!(rows[5]["has_ball"], true);
        assert_eq!(rows[6]["has_ball"], false);
    }
}
