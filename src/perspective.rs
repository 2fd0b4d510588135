//! Pixel-to-field projection through a fixed court homography.
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};
use tracing::debug;

use crate::config::PerspectiveConfig;
use crate::error::{Error, Result};
use crate::track::{ObjectClass, TrackTable};

/// Maps adjusted pixel positions onto the field plane.
///
/// The homography is solved once from the four calibrated court corners and
/// is only trusted inside the quadrilateral they span.
#[derive(Debug, Clone)]
pub struct ViewTransformer {
    pixel_vertices: [Point2<f64>; 4],
    homography: Matrix3<f64>,
}

impl ViewTransformer {
    pub fn new(config: &PerspectiveConfig) -> Result<Self> {
        let pixel_vertices = config.pixel_vertices.map(|[x, y]| Point2::new(x as f64, y as f64));
        let (w, l) = (config.court_width as f64, config.court_length as f64);
        let target_vertices = [
            Point2::new(0.0, w),
            Point2::new(0.0, 0.0),
            Point2::new(l, 0.0),
            Point2::new(l, w),
        ];
        let homography = perspective_transform(&pixel_vertices, &target_vertices).ok_or_else(|| {
            Error::InvalidConfig("perspective.pixel_vertices do not span a quadrilateral".into())
        })?;
        Ok(ViewTransformer {
            pixel_vertices,
            homography,
        })
    }

    pub fn homography(&self) -> &Matrix3<f64> {
        &self.homography
    }

    /// Field coordinates of `point`, or `None` when it lies outside the court region.
    pub fn transform_point(&self, point: &Point2<f32>) -> Option<Point2<f32>> {
        let p = Point2::new(point.x as f64, point.y as f64);
        if !point_in_polygon(&p, &self.pixel_vertices) {
            return None;
        }
        let q = self.homography * Vector3::new(p.x, p.y, 1.0);
        if q.z.abs() < 1e-12 {
            return None;
        }
        Some(Point2::new((q.x / q.z) as f32, (q.y / q.z) as f32))
    }

    /// Project the adjusted position of every record of every class.
    pub fn add_field_positions(&self, table: &mut TrackTable) {
        let mut projected = 0usize;
        let mut outside = 0usize;
        for class in ObjectClass::ALL {
            for frame in table.frames_mut(class).iter_mut() {
                for record in frame.values_mut() {
                    let Some(adjusted) = record.adjusted_position else {
                        continue;
                    };
                    record.field_position = self.transform_point(&adjusted);
                    if record.field_position.is_some() {
                        projected += 1;
                    } else {
                        outside += 1;
                    }
                }
            }
        }
        debug!("projected {} positions, {} outside the court region", projected, outside);
    }
}

/// Solve the homography taking each `src[i]` onto `dst[i]`.
///
/// Returns `None` when the correspondences are degenerate (three collinear
/// points, repeated corners).
pub fn perspective_transform(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for i in 0..4 {
        let (x, y) = (src[i].x, src[i].y);
        let (u, v) = (dst[i].x, dst[i].y);

        // u * (h6 x + h7 y + 1) = h0 x + h1 y + h2
        a[(2 * i, 0)] = x;
        a[(2 * i, 1)] = y;
        a[(2 * i, 2)] = 1.0;
        a[(2 * i, 6)] = -u * x;
        a[(2 * i, 7)] = -u * y;
        b[2 * i] = u;

        // v * (h6 x + h7 y + 1) = h3 x + h4 y + h5
        a[(2 * i + 1, 3)] = x;
        a[(2 * i + 1, 4)] = y;
        a[(2 * i + 1, 5)] = 1.0;
        a[(2 * i + 1, 6)] = -v * x;
        a[(2 * i + 1, 7)] = -v * y;
        b[2 * i + 1] = v;
    }

    let h = a.lu().solve(&b)?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0))
}

/// Inside-or-on-boundary test for a simple polygon.
pub fn point_in_polygon(p: &Point2<f64>, polygon: &[Point2<f64>]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];

        if on_segment(p, &a, &b) {
            return true;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

fn on_segment(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > 1e-9 * (1.0 + (b - a).norm()) {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{BoundingBox, TrackRecord};
    use approx::assert_relative_eq;

    fn default_transformer() -> ViewTransformer {
        ViewTransformer::new(&PerspectiveConfig::default()).unwrap()
    }

    #[test]
    fn test_corners_map_to_court_rectangle() {
        let cfg = PerspectiveConfig::default();
        let vt = default_transformer();
        let expected = [
            (0.0, cfg.court_width),
            (0.0, 0.0),
            (cfg.court_length, 0.0),
            (cfg.court_length, cfg.court_width),
        ];
        for ([x, y], (u, v)) in cfg.pixel_vertices.iter().zip(expected) {
            let field = vt.transform_point(&Point2::new(*x, *y)).unwrap();
            assert_relative_eq!(field.x, u, epsilon = 1e-3);
            assert_relative_eq!(field.y, v, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_point_outside_court_is_unprojected() {
        let vt = default_transformer();
        assert!(vt.transform_point(&Point2::new(5.0, 5.0)).is_none());
        assert!(vt.transform_point(&Point2::new(1900.0, 1000.0)).is_none());
    }

    #[test]
    fn test_interior_point_lands_inside_rectangle() {
        let cfg = PerspectiveConfig::default();
        let vt = default_transformer();
        let field = vt.transform_point(&Point2::new(900.0, 600.0)).unwrap();
        assert!(field.x > 0.0 && field.x < cfg.court_length);
        assert!(field.y > 0.0 && field.y < cfg.court_width);
    }

    #[test]
    fn test_identity_square() {
        let sq = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        let h = perspective_transform(&sq, &sq).unwrap();
        assert_relative_eq!(h, Matrix3::identity(), epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_vertices_rejected() {
        let cfg = PerspectiveConfig {
            pixel_vertices: [[0.0, 0.0], [10.0, 0.0], [20.0, 0.0], [30.0, 0.0]],
            ..PerspectiveConfig::default()
        };
        assert!(matches!(ViewTransformer::new(&cfg), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_point_in_polygon_boundary_is_inside() {
        let sq = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        assert!(point_in_polygon(&Point2::new(5.0, 5.0), &sq));
        assert!(point_in_polygon(&Point2::new(10.0, 5.0), &sq));
        assert!(point_in_polygon(&Point2::new(0.0, 0.0), &sq));
        assert!(!point_in_polygon(&Point2::new(10.5, 5.0), &sq));
    }

    #[test]
    fn test_add_field_positions_skips_records_without_adjusted_position() {
        let vt = default_transformer();
        let mut table = TrackTable::with_frames(1);
        let mut inside = TrackRecord::new(BoundingBox::new(880.0, 500.0, 920.0, 600.0));
        inside.adjusted_position = Some(Point2::new(900.0, 600.0));
        let mut outside = inside.clone();
        outside.adjusted_position = Some(Point2::new(5.0, 5.0));
        let bare = TrackRecord::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        table.players[0].insert(1, inside);
        table.players[0].insert(2, outside);
        table.players[0].insert(3, bare);

        vt.add_field_positions(&mut table);

        assert!(table.players[0][&1].field_position.is_some());
        assert!(table.players[0][&2].field_position.is_none());
        assert!(table.players[0][&3].field_position.is_none());
    }
}
