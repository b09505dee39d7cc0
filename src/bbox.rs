//! Bounding box normalization across annotators.

/// Average scale factor of the reference annotator. Boxes are normalized to this scale.
pub const DEFAULT_TARGET_SCALE: f64 = 0.7429;

/// A box as `[x, y, w, h]` in pixel space, `x`/`y` being the top left corner.
pub type Bbox = [f64; 4];

/// Rescale a box drawn by an annotator with `source_scale` to `target_scale`.
///
/// The box center is kept and the half extents are multiplied by `target_scale / source_scale`.
/// Each edge is then clipped to `[0, dim - 1]`, so a box near the border can end up asymmetric
/// around its original center.
pub fn scale_xywh(bbox: Bbox, dim: usize, source_scale: f64, target_scale: f64) -> Bbox {
    let max = dim.saturating_sub(1) as f64;

    let half_w = bbox[2] / 2.0 / source_scale * target_scale;
    let half_h = bbox[3] / 2.0 / source_scale * target_scale;
    let center_x = bbox[0] + bbox[2] / 2.0;
    let center_y = bbox[1] + bbox[3] / 2.0;

    let left = (center_x - half_w).max(0.0);
    let right = (center_x + half_w).min(max);
    let top = (center_y - half_h).max(0.0);
    let bottom = (center_y + half_h).min(max);

    [left, top, right - left, bottom - top]
}

/// Integer pixel box around a circle, truncating corners toward zero.
pub fn circle_to_xywh(x: f64, y: f64, r: f64) -> Bbox {
    let left = (x - r).trunc();
    let top = (y - r).trunc();
    let right = (x + r).trunc();
    let bottom = (y + r).trunc();

    [left, top, right - left, bottom - top]
}

/// Area of an `[x, y, w, h]` box.
pub fn area(bbox: &Bbox) -> f64 {
    bbox[2] * bbox[3]
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;

    fn assert_close(a: Bbox, b: Bbox) {
        for i in 0..4 {
            assert!((a[i] - b[i]).abs() < 1.0e-9, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_same_scale_is_identity() {
        let bbox = [100.0, 200.0, 40.0, 30.0];
        for &s in &[0.5, 0.7429, 1.0, 1.3] {
            assert_close(scale_xywh(bbox, 600, s, s), bbox);
        }
    }

    #[test]
    fn test_rescale_keeps_center() {
        let bbox = [100.0, 100.0, 40.0, 20.0];
        let scaled = scale_xywh(bbox, 600, 1.0, 0.5);
        assert_close(scaled, [110.0, 105.0, 20.0, 10.0]);
    }

    #[test]
    fn test_clipping_to_image_bounds() {
        // Center at (10, 590), grows to a half extent of 40 in both directions.
        let bbox = [0.0, 580.0, 20.0, 20.0];
        let scaled = scale_xywh(bbox, 600, 0.25, 1.0);

        assert_eq!(scaled[0], 0.0);
        assert_eq!(scaled[1], 550.0);
        assert_eq!(scaled[0] + scaled[2], 50.0);
        assert_eq!(scaled[1] + scaled[3], 599.0);
    }

    #[test]
    fn test_identity_clips_oversized_box() {
        let bbox = [-5.0, 10.0, 700.0, 20.0];
        let scaled = scale_xywh(bbox, 600, 0.8, 0.8);
        assert_eq!(scaled[0], 0.0);
        assert_eq!(scaled[0] + scaled[2], 599.0);
        assert_close([scaled[1], scaled[3], 0.0, 0.0], [10.0, 20.0, 0.0, 0.0]);
    }

    #[test]
    fn test_circle_to_xywh() {
        assert_eq!(circle_to_xywh(300.5, 200.2, 10.4), [290.0, 189.0, 20.0, 21.0]);
        assert_eq!(area(&[0.0, 0.0, 3.0, 4.0]), 12.0);
    }
}
