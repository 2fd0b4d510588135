//! Stage ordering for one run over a whole video.
use opencv::core::Mat;
use tracing::{info, warn};

use crate::camera_motion::{adjust_positions, CameraMovementSource, Displacement};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::interpolation::interpolate_ball;
use crate::kinematics::SpeedAndDistanceEstimator;
use crate::perspective::ViewTransformer;
use crate::possession::{assign_possession, PlayerBallAssigner, PossessionTimeline};
use crate::team::{assign_teams, TeamAssigner, TeamColorModel};
use crate::track::TrackTable;

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: TrackTable,
    pub camera_movement: Vec<Displacement>,
    pub possession: PossessionTimeline,
}

pub struct Pipeline {
    config: Config,
    view_transformer: ViewTransformer,
    kinematics: SpeedAndDistanceEstimator,
    ball_assigner: PlayerBallAssigner,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let view_transformer = ViewTransformer::new(&config.perspective)?;
        let kinematics = SpeedAndDistanceEstimator::new(&config.kinematics);
        let ball_assigner = PlayerBallAssigner::new(&config.possession);
        Ok(Pipeline {
            config,
            view_transformer,
            kinematics,
            ball_assigner,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every stage in order over `frames` and their tracks.
    pub fn run<S: CameraMovementSource + ?Sized>(
        &self,
        frames: &[Mat],
        mut table: TrackTable,
        camera_source: &S,
    ) -> Result<PipelineOutput> {
        if frames.len() != table.len() {
            return Err(Error::FrameCountMismatch {
                frames: frames.len(),
                tracks: table.len(),
            });
        }

        interpolate_ball(&mut table);
        table.add_positions();

        let camera_movement = camera_source.camera_movement(frames)?;
        self.process_tracks(&mut table, &camera_movement);

        self.assign_teams(&mut table, frames)?;
        let possession = assign_possession(&mut table, &self.ball_assigner);

        info!("processed {} frames", table.len());
        Ok(PipelineOutput {
            table,
            camera_movement,
            possession,
        })
    }

    /// The frame-free stages: camera compensation, field projection and
    /// kinematics. Ball interpolation and raw positions must already be done.
    pub fn process_tracks(&self, table: &mut TrackTable, camera_movement: &[Displacement]) {
        adjust_positions(table, camera_movement, self.config.camera.compensation);
        self.view_transformer.add_field_positions(table);
        self.kinematics.add_speed_and_distance(table);
    }

    /// Fit team colors on the first frame with at least two players, then
    /// label every player record. Without a usable frame teams stay unset.
    fn assign_teams(&self, table: &mut TrackTable, frames: &[Mat]) -> Result<()> {
        let Some(sample) = table.players.iter().position(|players| players.len() >= 2) else {
            warn!("no frame with two players, skipping team assignment");
            return Ok(());
        };

        let model = match TeamColorModel::fit(&frames[sample], &table.players[sample]) {
            Ok(model) => model,
            Err(Error::TeamModel(reason)) => {
                warn!("skipping team assignment: {}", reason);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let mut assigner = TeamAssigner::new();
        assign_teams(table, frames, &model, &mut assigner)
    }
}
