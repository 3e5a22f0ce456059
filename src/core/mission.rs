// core/mission.rs

// Mission model: the ordered waypoint list plus the `current_seq` index the
// autopilot is navigating towards, and the `NXYY`-encoded altitude metadata
// decode described in the external interface. `current_seq` is authoritative
// on the autopilot side; the core only requests changes to it through the
// autopilot bridge.

use super::pose::Point2;

/// Waypoint as received over the wire: geodetic or map-frame position with
/// the `z` field overloaded to carry cone/cruise-speed metadata.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Waypoint {
    pub x_lat: f64,
    pub y_long: f64,
    pub z_alt: f64,
}

impl Waypoint {
    pub fn new(x_lat: f64, y_long: f64, z_alt: f64) -> Self {
        Waypoint { x_lat, y_long, z_alt }
    }

    pub fn point(&self) -> Point2 {
        Point2 { x: self.x_lat, y: self.y_long }
    }

    /// Decodes the `NXYY` altitude encoding into the triple the core
    /// actually reasons about.
    pub fn meta(&self) -> WaypointMeta {
        decode(self.z_alt)
    }
}

/// Decoded waypoint metadata: cone flag, whether it is the last cone in the
/// mission, nominal cruise-speed factor, and minimum-speed-toward-cone
/// factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaypointMeta {
    pub is_cone: bool,
    pub is_last_cone: bool,
    pub cruise_factor: f64,
    pub cone_min_speed_factor: f64,
}

/// Decodes a raw `z` altitude field into `(is_cone, is_last_cone,
/// cruise_factor, cone_min_speed_factor)`.
///
/// `N` (thousands digit) selects 0 = plain, 1 = cone, 2 = final cone.
/// `X` (hundreds digit) is the cruise-speed factor, 0 meaning 100%.
/// `YY` (tens+units) is the min-speed-toward-cone percentage.
pub fn decode(z: f64) -> WaypointMeta {
    let code = z.max(0.0) as u32;
    let n = code / 1000;
    let x = (code / 100) % 10;
    let yy = code % 100;

    WaypointMeta {
        is_cone: n >= 1,
        is_last_cone: n >= 2,
        cruise_factor: if x == 0 { 1.0 } else { x as f64 * 0.1 },
        cone_min_speed_factor: yy as f64 * 0.01,
    }
}

/// Encodes a waypoint metadata triple back into the `NXYY` altitude field.
/// Exists primarily so the decode/encode round trip is testable; the core
/// never needs to emit waypoints itself.
pub fn encode(is_cone: bool, is_last_cone: bool, cruise_factor: f64, cone_min_speed_factor: f64) -> f64 {
    let n = if is_last_cone { 2 } else if is_cone { 1 } else { 0 };
    let x = if cruise_factor >= 1.0 {
        0
    } else {
        (cruise_factor * 10.0).round() as u32
    };
    let yy = (cone_min_speed_factor * 100.0).round() as u32;
    (n * 1000 + x * 100 + yy) as f64
}

/// Ordered waypoint list plus the autopilot's authoritative current index.
#[derive(Clone, Debug, Default)]
pub struct Mission {
    pub waypoints: Vec<Waypoint>,
    pub current_seq: usize,
}

impl Mission {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Mission { waypoints, current_seq: 0 }
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.waypoints.len().checked_sub(1)
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    /// `current_cruise_speed` for waypoint `i` given the mission's nominal
    /// `normal_speed`.
    pub fn cruise_speed(&self, index: usize, normal_speed: f64) -> Option<f64> {
        self.get(index).map(|wp| normal_speed * wp.meta().cruise_factor)
    }

    /// Rewrites a map-frame waypoint list so every point is relative to
    /// waypoint 0 (`ADJUST_WAYPOINTS`). Z is copied unchanged; no rotational
    /// correction is applied, matching the documented upstream behavior.
    pub fn adjust_relative_to_origin(waypoints: &[Waypoint]) -> Vec<Waypoint> {
        let Some(origin) = waypoints.first().copied() else {
            return Vec::new();
        };
        waypoints
            .iter()
            .map(|wp| Waypoint {
                x_lat: wp.x_lat - origin.x_lat,
                y_long: wp.y_long - origin.y_long,
                z_alt: wp.z_alt,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn decode_plain_waypoint() {
        let meta = decode(0.0);
        assert!(!meta.is_cone);
        assert!(!meta.is_last_cone);
        assert_relative_eq!(meta.cruise_factor, 1.0);
        assert_relative_eq!(meta.cone_min_speed_factor, 0.0);
    }

    #[test]
    fn decode_cone_waypoint_example() {
        // 1030: cone, 100% cruise, 30% min-speed-toward-cone.
        let meta = decode(1030.0);
        assert!(meta.is_cone);
        assert!(!meta.is_last_cone);
        assert_relative_eq!(meta.cruise_factor, 1.0);
        assert_relative_eq!(meta.cone_min_speed_factor, 0.30);
    }

    #[test]
    fn decode_final_cone_waypoint() {
        let meta = decode(2000.0);
        assert!(meta.is_cone);
        assert!(meta.is_last_cone);
    }

    #[test]
    fn decode_cruise_factor_digit() {
        let meta = decode(1512.0); // cone, 50% cruise, 12% min speed
        assert_relative_eq!(meta.cruise_factor, 0.5);
        assert_relative_eq!(meta.cone_min_speed_factor, 0.12);
    }

    #[rstest::rstest]
    #[case(false, false, 1.0, 0.0)]
    #[case(true, false, 1.0, 0.30)]
    #[case(true, true, 0.5, 0.12)]
    #[case(true, false, 0.1, 0.99)]
    fn decode_encode_round_trip(
        #[case] is_cone: bool,
        #[case] is_last_cone: bool,
        #[case] cruise_factor: f64,
        #[case] cone_min_speed_factor: f64,
    ) {
        let z = encode(is_cone, is_last_cone, cruise_factor, cone_min_speed_factor);
        let meta = decode(z);
        assert_eq!(meta.is_cone, is_cone);
        assert_eq!(meta.is_last_cone, is_last_cone);
        assert_relative_eq!(meta.cruise_factor, cruise_factor, epsilon = 1e-9);
        assert_relative_eq!(meta.cone_min_speed_factor, cone_min_speed_factor, epsilon = 1e-9);
    }

    #[test]
    fn adjust_waypoints_relative_to_origin() {
        let wps = vec![
            Waypoint::new(10.0, 20.0, 1030.0),
            Waypoint::new(12.0, 21.0, 0.0),
        ];
        let adjusted = Mission::adjust_relative_to_origin(&wps);
        assert_relative_eq!(adjusted[0].x_lat, 0.0);
        assert_relative_eq!(adjusted[0].y_long, 0.0);
        assert_relative_eq!(adjusted[1].x_lat, 2.0);
        assert_relative_eq!(adjusted[1].y_long, 1.0);
        assert_relative_eq!(adjusted[0].z_alt, 1030.0);
    }

    #[test]
    fn adjust_waypoints_empty_list() {
        assert!(Mission::adjust_relative_to_origin(&[]).is_empty());
    }

    #[test]
    fn cruise_speed_uses_decoded_factor() {
        let mission = Mission::new(vec![Waypoint::new(0.0, 0.0, 1030.0)]);
        assert_relative_eq!(mission.cruise_speed(0, 2.0).unwrap(), 2.0);
    }
}
