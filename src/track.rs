use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::utils::{bbox_center, foot_position};

/// Track identity assigned by the external tracker.
pub type TrackId = u32;

/// The ball is always stored under this identity.
pub const BALL_TRACK_ID: TrackId = 1;

/// Axis-aligned box in pixel space, `x1 <= x2`, `y1 <= y2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        BoundingBox { x1, y1, x2, y2 }
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn from_array(v: [f32; 4]) -> Self {
        BoundingBox::new(v[0], v[1], v[2], v[3])
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Player,
    Referee,
    Ball,
}

impl ObjectClass {
    pub const ALL: [ObjectClass; 3] = [ObjectClass::Player, ObjectClass::Referee, ObjectClass::Ball];
}

/// Team label produced by the color classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
}

impl Team {
    /// Map a cluster index (0 or 1) onto a team label.
    pub fn from_cluster(index: usize) -> Self {
        if index == 0 {
            Team::One
        } else {
            Team::Two
        }
    }

    pub fn index(self) -> usize {
        match self {
            Team::One => 0,
            Team::Two => 1,
        }
    }
}

/// One object in one frame. Every field after `bbox` is written by a later
/// pipeline stage; `None` means the stage has not produced a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point2<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjusted_position: Option<Point2<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_position: Option<Point2<f32>>,
    /// Windowed speed in km/h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    /// Running distance in field units (metres).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
    /// BGR.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_color: Option<[f32; 3]>,
    #[serde(default)]
    pub has_ball: bool,
}

impl TrackRecord {
    pub fn new(bbox: BoundingBox) -> Self {
        TrackRecord {
            bbox,
            position: None,
            adjusted_position: None,
            field_position: None,
            speed: None,
            distance: None,
            team: None,
            team_color: None,
            has_ball: false,
        }
    }
}

pub type FrameTracks = BTreeMap<TrackId, TrackRecord>;

/// Per-class, per-frame track records shared by every pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackTable {
    pub players: Vec<FrameTracks>,
    pub referees: Vec<FrameTracks>,
    pub ball: Vec<FrameTracks>,
}

impl TrackTable {
    /// An empty table with `frames` frames for every class.
    pub fn with_frames(frames: usize) -> Self {
        TrackTable {
            players: vec![FrameTracks::new(); frames],
            referees: vec![FrameTracks::new(); frames],
            ball: vec![FrameTracks::new(); frames],
        }
    }

    /// Number of frames. Classes are kept at equal length.
    pub fn len(&self) -> usize {
        self.players.len().max(self.referees.len()).max(self.ball.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pad shorter class sequences with empty frames so every class has `len()` frames.
    pub fn normalize_len(&mut self) {
        let n = self.len();
        for class in ObjectClass::ALL {
            self.frames_mut(class).resize_with(n, FrameTracks::new);
        }
    }

    pub fn frames(&self, class: ObjectClass) -> &[FrameTracks] {
        match class {
            ObjectClass::Player => &self.players,
            ObjectClass::Referee => &self.referees,
            ObjectClass::Ball => &self.ball,
        }
    }

    pub fn frames_mut(&mut self, class: ObjectClass) -> &mut Vec<FrameTracks> {
        match class {
            ObjectClass::Player => &mut self.players,
            ObjectClass::Referee => &mut self.referees,
            ObjectClass::Ball => &mut self.ball,
        }
    }

    pub fn insert(&mut self, class: ObjectClass, frame: usize, id: TrackId, bbox: BoundingBox) {
        self.frames_mut(class)[frame].insert(id, TrackRecord::new(bbox));
    }

    /// Fill `position`: box center for the ball, foot position for everyone else.
    pub fn add_positions(&mut self) {
        for class in ObjectClass::ALL {
            for frame in self.frames_mut(class).iter_mut() {
                for record in frame.values_mut() {
                    let position = if class == ObjectClass::Ball {
                        bbox_center(&record.bbox)
                    } else {
                        foot_position(&record.bbox)
                    };
                    record.position = Some(position);
                }
            }
        }
    }

    /// The ball box of every frame, `None` where the ball was not detected.
    pub fn ball_boxes(&self) -> Vec<Option<BoundingBox>> {
        self.ball
            .iter()
            .map(|frame| frame.get(&BALL_TRACK_ID).map(|r| r.bbox))
            .collect()
    }

    /// Replace the ball track with `boxes`. Frames already holding a ball keep
    /// their derived fields when the box is unchanged.
    pub fn set_ball_boxes(&mut self, boxes: &[Option<BoundingBox>]) {
        for (frame, bbox) in self.ball.iter_mut().zip(boxes) {
            match bbox {
                Some(bbox) => {
                    let unchanged = frame.get(&BALL_TRACK_ID).is_some_and(|r| r.bbox == *bbox);
                    if !unchanged {
                        frame.insert(BALL_TRACK_ID, TrackRecord::new(*bbox));
                    }
                }
                None => {
                    frame.remove(&BALL_TRACK_ID);
                }
            }
        }
    }

    pub fn ball_bbox(&self, frame: usize) -> Option<BoundingBox> {
        self.ball.get(frame)?.get(&BALL_TRACK_ID).map(|r| r.bbox)
    }
}
