//! Bounding-box geometry shared by the pipeline stages.
use nalgebra::{Point2, Vector2};

use crate::track::BoundingBox;

pub fn bbox_center(bbox: &BoundingBox) -> Point2<f32> {
    Point2::new((bbox.x1 + bbox.x2) / 2.0, (bbox.y1 + bbox.y2) / 2.0)
}

pub fn bbox_width(bbox: &BoundingBox) -> f32 {
    bbox.x2 - bbox.x1
}

/// Bottom-center of the box, where a standing figure touches the ground.
pub fn foot_position(bbox: &BoundingBox) -> Point2<f32> {
    Point2::new((bbox.x1 + bbox.x2) / 2.0, bbox.y2)
}

pub fn measure_distance(a: &Point2<f32>, b: &Point2<f32>) -> f32 {
    (a - b).norm()
}

/// Component-wise `a - b`.
pub fn measure_xy_distance(a: &Point2<f32>, b: &Point2<f32>) -> Vector2<f32> {
    a - b
}
