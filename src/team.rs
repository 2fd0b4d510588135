//! Jersey-color team classification.
//!
//! The model is fitted once on a sampled frame and then frozen. Per-track
//! answers are memoized in [`TeamAssigner`] so a player never switches team.
use opencv::{
    core::{self, Mat, Rect, Scalar, TermCriteria, Vec3b, CV_32F, CV_8UC3},
    imgproc,
    prelude::*,
};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::track::{BoundingBox, FrameTracks, Team, TrackId, TrackTable};

/// A color in OpenCV 8-bit Lab coordinates.
pub type Color = [f32; 3];

/// Two frozen team colors.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamColorModel {
    centers: [Color; 2],
    bgr: [[f32; 3]; 2],
}

impl TeamColorModel {
    /// Fit team colors from every player visible in `frame`.
    pub fn fit(frame: &Mat, players: &FrameTracks) -> Result<Self> {
        let mut colors = Vec::with_capacity(players.len());
        for record in players.values() {
            if let Some(color) = player_color(frame, &record.bbox)? {
                colors.push(color);
            }
        }
        if colors.len() < 2 {
            return Err(Error::TeamModel(format!(
                "need at least 2 player colors to fit, found {}",
                colors.len()
            )));
        }

        let samples = samples_mat(&colors)?;
        let (_, centers) = cluster(&samples, 10)?;
        info!("team colors fitted from {} players", colors.len());
        Self::from_centers([centers[0], centers[1]])
    }

    pub fn from_centers(centers: [Color; 2]) -> Result<Self> {
        let bgr = [lab_to_bgr(&centers[0])?, lab_to_bgr(&centers[1])?];
        Ok(TeamColorModel { centers, bgr })
    }

    pub fn centers(&self) -> &[Color; 2] {
        &self.centers
    }

    /// Team whose reference color is nearest to `color`.
    pub fn classify(&self, color: &Color) -> Team {
        let d0 = squared_distance(color, &self.centers[0]);
        let d1 = squared_distance(color, &self.centers[1]);
        if d1 < d0 {
            Team::Two
        } else {
            Team::One
        }
    }

    /// Display color (BGR) of `team`.
    pub fn team_color(&self, team: Team) -> [f32; 3] {
        self.bgr[team.index()]
    }
}

/// Per-track team memo, scoped to one run.
#[derive(Debug, Default)]
pub struct TeamAssigner {
    player_team: HashMap<TrackId, Team>,
}

impl TeamAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Team of track `id`, classifying it from `frame` the first time it is seen.
    ///
    /// Returns `None` when the box is too small to sample; the track is then
    /// retried on a later frame.
    pub fn player_team(
        &mut self,
        model: &TeamColorModel,
        frame: &Mat,
        bbox: &BoundingBox,
        id: TrackId,
    ) -> Result<Option<Team>> {
        if let Some(team) = self.player_team.get(&id) {
            return Ok(Some(*team));
        }
        let Some(color) = player_color(frame, bbox)? else {
            return Ok(None);
        };
        let team = model.classify(&color);
        self.player_team.insert(id, team);
        Ok(Some(team))
    }

    pub fn len(&self) -> usize {
        self.player_team.len()
    }

    pub fn is_empty(&self) -> bool {
        self.player_team.is_empty()
    }
}

/// Write `team` and `team_color` onto every player record.
pub fn assign_teams(
    table: &mut TrackTable,
    frames: &[Mat],
    model: &TeamColorModel,
    assigner: &mut TeamAssigner,
) -> Result<()> {
    for (frame_tracks, frame) in table.players.iter_mut().zip(frames) {
        for (id, record) in frame_tracks.iter_mut() {
            if let Some(team) = assigner.player_team(model, frame, &record.bbox, *id)? {
                record.team = Some(team);
                record.team_color = Some(model.team_color(team));
            }
        }
    }
    debug!("{} players assigned to teams", assigner.len());
    Ok(())
}

/// Dominant jersey color of the player in `bbox`.
///
/// The upper half of the box is split into two color clusters; the cluster
/// owning most of the four corner pixels is background, the other is the
/// jersey.
pub fn player_color(frame: &Mat, bbox: &BoundingBox) -> Result<Option<Color>> {
    let Some(crop) = upper_half(frame, bbox)? else {
        return Ok(None);
    };
    let mut lab = Mat::default();
    imgproc::cvt_color_def(&crop, &mut lab, imgproc::COLOR_BGR2Lab)?;

    let (rows, cols) = (lab.rows(), lab.cols());
    let mut pixels = Vec::with_capacity((rows * cols) as usize);
    for r in 0..rows {
        for c in 0..cols {
            let px = lab.at_2d::<Vec3b>(r, c)?;
            pixels.push([px[0] as f32, px[1] as f32, px[2] as f32]);
        }
    }

    let samples = samples_mat(&pixels)?;
    let (labels, centers) = cluster(&samples, 1)?;

    let corners = [0, cols - 1, (rows - 1) * cols, rows * cols - 1];
    let ones = corners.iter().filter(|&&i| labels[i as usize] == 1).count();
    let background = if ones > 2 { 1 } else { 0 };
    Ok(Some(centers[1 - background]))
}

fn upper_half(frame: &Mat, bbox: &BoundingBox) -> Result<Option<Mat>> {
    let x1 = (bbox.x1 as i32).clamp(0, frame.cols());
    let y1 = (bbox.y1 as i32).clamp(0, frame.rows());
    let x2 = (bbox.x2 as i32).clamp(0, frame.cols());
    let y2 = (bbox.y2 as i32).clamp(0, frame.rows());
    let width = x2 - x1;
    let height = (y2 - y1) / 2;
    if width < 2 || height < 2 {
        return Ok(None);
    }
    let roi = Mat::roi(frame, Rect::new(x1, y1, width, height))?;
    Ok(Some(roi.try_clone()?))
}

fn samples_mat(colors: &[Color]) -> Result<Mat> {
    let mut samples = Mat::new_rows_cols_with_default(colors.len() as i32, 3, CV_32F, Scalar::all(0.0))?;
    for (i, color) in colors.iter().enumerate() {
        for (c, v) in color.iter().enumerate() {
            *samples.at_2d_mut::<f32>(i as i32, c as i32)? = *v;
        }
    }
    Ok(samples)
}

/// Two-cluster k-means; returns the label of every row and both centers.
fn cluster(samples: &Mat, attempts: i32) -> Result<(Vec<i32>, [Color; 2])> {
    let mut labels = Mat::default();
    let mut centers = Mat::default();
    let criteria = TermCriteria::new(
        core::TermCriteria_Type::COUNT as i32 | core::TermCriteria_Type::EPS as i32,
        100,
        1e-4,
    )?;
    core::kmeans(
        samples,
        2,
        &mut labels,
        criteria,
        attempts,
        core::KMEANS_PP_CENTERS,
        &mut centers,
    )?;

    let mut out_labels = Vec::with_capacity(samples.rows() as usize);
    for i in 0..samples.rows() {
        out_labels.push(*labels.at::<i32>(i)?);
    }
    let mut out_centers = [[0.0f32; 3]; 2];
    for (k, center) in out_centers.iter_mut().enumerate() {
        for (c, v) in center.iter_mut().enumerate() {
            *v = *centers.at_2d::<f32>(k as i32, c as i32)?;
        }
    }
    Ok((out_labels, out_centers))
}

fn lab_to_bgr(color: &Color) -> Result<[f32; 3]> {
    let [l, a, b] = color.map(|v| v.round().clamp(0.0, 255.0) as f64);
    let lab = Mat::new_rows_cols_with_default(1, 1, CV_8UC3, Scalar::new(l, a, b, 0.0))?;
    let mut bgr = Mat::default();
    imgproc::cvt_color_def(&lab, &mut bgr, imgproc::COLOR_Lab2BGR)?;
    let px = bgr.at_2d::<Vec3b>(0, 0)?;
    Ok([px[0] as f32, px[1] as f32, px[2] as f32])
}

fn squared_distance(a: &Color, b: &Color) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
