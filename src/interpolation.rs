//! Gap filling for the ball trajectory.
//!
//! The detector misses the ball in many frames (occlusion, motion blur). The
//! gaps are filled in pixel space, before any camera or perspective
//! adjustment, so later stages see a complete trajectory.
use tracing::debug;

use crate::track::{BoundingBox, TrackTable};

/// Fill every `None` in `boxes`.
///
/// Interior gaps are interpolated linearly per coordinate between the nearest
/// known boxes on either side. A leading gap takes the first known box and a
/// trailing gap the last one. With no known box at all the input is returned
/// unchanged.
pub fn interpolate_boxes(boxes: &[Option<BoundingBox>]) -> Vec<Option<BoundingBox>> {
    let known: Vec<(usize, BoundingBox)> = boxes
        .iter()
        .enumerate()
        .filter_map(|(i, b)| b.map(|b| (i, b)))
        .collect();

    let (Some(&(first_idx, first_box)), Some(&(last_idx, last_box))) = (known.first(), known.last())
    else {
        return boxes.to_vec();
    };

    let mut out = boxes.to_vec();
    for slot in &mut out[..first_idx] {
        *slot = Some(first_box);
    }
    for slot in &mut out[last_idx + 1..] {
        *slot = Some(last_box);
    }

    for pair in known.windows(2) {
        let (a, box_a) = pair[0];
        let (b, box_b) = pair[1];
        if b - a < 2 {
            continue;
        }
        let span = (b - a) as f32;
        let from = box_a.as_array();
        let to = box_b.as_array();
        for (offset, slot) in out[a + 1..b].iter_mut().enumerate() {
            let t = (offset + 1) as f32 / span;
            let coords: [f32; 4] = std::array::from_fn(|k| from[k] + t * (to[k] - from[k]));
            *slot = Some(BoundingBox::from_array(coords));
        }
    }

    out
}

/// Complete the ball track of `table` in place.
pub fn interpolate_ball(table: &mut TrackTable) {
    let boxes = table.ball_boxes();
    let missing = boxes.iter().filter(|b| b.is_none()).count();
    if missing == boxes.len() {
        debug!("ball never detected, nothing to interpolate");
        return;
    }
    let filled = interpolate_boxes(&boxes);
    table.set_ball_boxes(&filled);
    debug!("filled {} of {} ball frames", missing, boxes.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::BALL_TRACK_ID;
    use approx::assert_relative_eq;

    fn bb(v: f32) -> BoundingBox {
        BoundingBox::new(v, v + 1.0, v + 10.0, v + 20.0)
    }

    #[test]
    fn test_gap_free_sequence_is_unchanged() {
        let boxes: Vec<_> = (0..6).map(|i| Some(bb(i as f32 * 3.0))).collect();
        assert_eq!(interpolate_boxes(&boxes), boxes);
    }

    #[test]
    fn test_interior_gap_is_linear() {
        // Known at frames 2 and 6, missing 3..=5.
        let a = BoundingBox::new(100.0, 200.0, 110.0, 210.0);
        let b = BoundingBox::new(140.0, 160.0, 150.0, 190.0);
        let mut boxes = vec![None; 10];
        boxes[2] = Some(a);
        boxes[6] = Some(b);

        let out = interpolate_boxes(&boxes);
        for f in 3..=5 {
            let t = (f - 2) as f32 / 4.0;
            let got = out[f].unwrap().as_array();
            let from = a.as_array();
            let to = b.as_array();
            for k in 0..4 {
                assert_relative_eq!(got[k], from[k] + t * (to[k] - from[k]), epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_leading_gap_takes_first_known() {
        let a = bb(50.0);
        let boxes = vec![None, None, None, Some(a), Some(bb(60.0))];
        let out = interpolate_boxes(&boxes);
        for slot in &out[..3] {
            assert_eq!(*slot, Some(a));
        }
    }

    #[test]
    fn test_trailing_gap_takes_last_known() {
        let z = bb(80.0);
        let boxes = vec![Some(bb(70.0)), Some(z), None, None];
        let out = interpolate_boxes(&boxes);
        assert_eq!(out[2], Some(z));
        assert_eq!(out[3], Some(z));
    }

    #[test]
    fn test_all_missing_stays_missing() {
        let boxes = vec![None; 4];
        assert_eq!(interpolate_boxes(&boxes), boxes);
    }

    #[test]
    fn test_interpolation_is_idempotent() {
        let mut boxes = vec![None; 8];
        boxes[1] = Some(bb(0.0));
        boxes[5] = Some(bb(40.0));
        let once = interpolate_boxes(&boxes);
        assert_eq!(interpolate_boxes(&once), once);
    }

    #[test]
    fn test_interpolate_ball_writes_table() {
        let mut table = TrackTable::with_frames(5);
        table.set_ball_boxes(&[Some(bb(0.0)), None, None, None, Some(bb(40.0))]);
        interpolate_ball(&mut table);
        assert!(table.ball.iter().all(|f| f.contains_key(&BALL_TRACK_ID)));
        assert_relative_eq!(table.ball_bbox(2).unwrap().x1, 20.0);
    }
}
