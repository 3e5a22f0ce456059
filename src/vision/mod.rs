//! Cone vision adapter.
//!
//! Converts candidate cone detections (pixel-space bounding boxes plus
//! area) into a selected target with heading and distance estimates. Image
//! processing and camera calibration live outside this crate; this module
//! only consumes the detection list.

/// One candidate cone detection as produced by the upstream vision node.
/// Only the pixel offset from image center and the bounding-box area are
/// used; the remaining fields are carried through but unused here.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConeDetection {
    /// Horizontal pixel offset from image center. Positive is right of
    /// center.
    pub x_pixel_offset: f64,
    pub area_pixels: f64,
    /// Unused vertical offset, carried for interface completeness.
    pub y_pixel_offset: f64,
    /// Unused depth estimate, carried for interface completeness.
    pub depth: f64,
}

/// Camera intrinsics needed to convert a pixel offset into a heading angle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraIntrinsics {
    pub horz_fov_rad: f64,
    pub horz_pixels: f64,
}

impl CameraIntrinsics {
    /// Effective focal length in pixels, derived from the horizontal field
    /// of view.
    fn focal_length_px(&self) -> f64 {
        (self.horz_pixels / 2.0) / (self.horz_fov_rad / 2.0).tan()
    }
}

/// Reference calibration point: `3900` px of bounding-box area observed at
/// `3` m of range.
const REFERENCE_AREA_PX: f64 = 3900.0;
const REFERENCE_DISTANCE_M: f64 = 3.0;

/// Selects the first detection whose area qualifies at `min_area`. Order
/// within the list is input-defined and preserved; this never reorders.
pub fn select(detections: &[ConeDetection], min_area: f64) -> Option<ConeDetection> {
    detections.iter().copied().find(|d| d.area_pixels >= min_area)
}

/// Heading to a detection, in radians. Positive is "turn right".
pub fn heading(detection: &ConeDetection, intrinsics: &CameraIntrinsics) -> f64 {
    detection.x_pixel_offset.atan2(intrinsics.focal_length_px())
}

/// Distance estimate to a detection, in meters, calibrated against the
/// reference area/distance pair.
pub fn distance(detection: &ConeDetection) -> f64 {
    REFERENCE_DISTANCE_M * (REFERENCE_AREA_PX / detection.area_pixels).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn detection(x: f64, area: f64) -> ConeDetection {
        ConeDetection { x_pixel_offset: x, area_pixels: area, y_pixel_offset: 0.0, depth: 0.0 }
    }

    #[test]
    fn select_picks_first_qualifying_detection() {
        let detections = [detection(0.0, 50.0), detection(10.0, 150.0), detection(20.0, 500.0)];
        let picked = select(&detections, 100.0).unwrap();
        assert_relative_eq!(picked.x_pixel_offset, 10.0);
    }

    #[test]
    fn select_boundary_is_inclusive() {
        let detections = [detection(5.0, 400.0)];
        assert!(select(&detections, 400.0).is_some());
    }

    #[test]
    fn select_returns_none_when_nothing_qualifies() {
        let detections = [detection(0.0, 10.0)];
        assert!(select(&detections, 100.0).is_none());
    }

    #[test]
    fn distance_matches_reference_calibration() {
        let d = detection(0.0, REFERENCE_AREA_PX);
        assert_relative_eq!(distance(&d), REFERENCE_DISTANCE_M, epsilon = 1e-9);
    }

    #[test]
    fn distance_algebraic_law() {
        // distance(area) * sqrt(area / 3900) == 3, within epsilon.
        for area in [100.0, 400.0, 900.0, 3900.0, 10_000.0] {
            let d = detection(0.0, area);
            assert_relative_eq!(
                distance(&d) * (area / REFERENCE_AREA_PX).sqrt(),
                REFERENCE_DISTANCE_M,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn scenario_distance_and_heading_example() {
        // §8 scenario 2: x_offset=64px, area=400, horz_fov=70deg, horz_pixels=640.
        let intrinsics = CameraIntrinsics { horz_fov_rad: 70f64.to_radians(), horz_pixels: 640.0 };
        let d = detection(64.0, 400.0);
        assert_relative_eq!(distance(&d), 9.3675, epsilon = 1e-3);
        assert_relative_eq!(heading(&d, &intrinsics), 0.139, epsilon = 1e-3);
    }

    #[test]
    fn heading_sign_convention() {
        let intrinsics = CameraIntrinsics { horz_fov_rad: 70f64.to_radians(), horz_pixels: 640.0 };
        assert!(heading(&detection(50.0, 400.0), &intrinsics) > 0.0);
        assert!(heading(&detection(-50.0, 400.0), &intrinsics) < 0.0);
        assert_relative_eq!(heading(&detection(0.0, 400.0), &intrinsics), 0.0, epsilon = 1e-9);
    }
}
