//! Boundary to the external detector and multi-object tracker.
//!
//! Detection and identity assignment happen outside this crate. Their output,
//! a serialized [`TrackTable`] with boxes only, is what the pipeline starts
//! from.
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::track::TrackTable;

/// Anything that can provide the raw per-frame tracks of a video.
pub trait TrackSource {
    fn load(&self) -> Result<TrackTable>;
}

/// Track table persisted as JSON by a previous detector/tracker run.
pub struct JsonTrackCache {
    path: PathBuf,
}

impl JsonTrackCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonTrackCache { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, table: &TrackTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string(table)?)?;
        Ok(())
    }
}

impl TrackSource for JsonTrackCache {
    fn load(&self) -> Result<TrackTable> {
        let data = fs::read_to_string(&self.path)?;
        let mut table: TrackTable = serde_json::from_str(&data)?;
        table.normalize_len();
        info!("loaded {} frames of tracks from {:?}", table.len(), self.path);
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::track::{BoundingBox, ObjectClass, BALL_TRACK_ID};

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonTrackCache::new(dir.path().join("stubs/tracks.json"));
        let mut table = TrackTable::with_frames(3);
        table.insert(ObjectClass::Player, 0, 11, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        table.insert(ObjectClass::Ball, 2, BALL_TRACK_ID, BoundingBox::new(5.0, 6.0, 7.0, 8.0));
        cache.save(&table).unwrap();
        assert_eq!(cache.load().unwrap(), table);
    }

    #[test]
    fn test_short_class_sequences_are_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.json");
        fs::write(
            &path,
            r#"{"players":[{"4":{"bbox":{"x1":0,"y1":0,"x2":10,"y2":20}}},{}],"referees":[],"ball":[{}]}"#,
        )
        .unwrap();
        let table = JsonTrackCache::new(&path).load().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.referees.len(), 2);
        assert_eq!(table.ball.len(), 2);
        assert!(table.players[0].contains_key(&4));
    }

    #[test]
    fn test_missing_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonTrackCache::new(dir.path().join("absent.json"));
        assert!(matches!(cache.load(), Err(Error::Io(_))));
    }

    #[test]
    fn test_corrupt_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.json");
        fs::write(&path, "{ players: ").unwrap();
        assert!(matches!(JsonTrackCache::new(&path).load(), Err(Error::Json(_))));
    }
}
