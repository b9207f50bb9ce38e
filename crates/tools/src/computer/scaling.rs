//! Mapping between API-space and device-space coordinates.

use proto::ToolError;
use serde::Serialize;

/// Screen size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn aspect_ratio(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// A standard resolution API-space coordinates are reduced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingTarget {
    pub name: &'static str,
    pub aspect: &'static str,
    pub resolution: Resolution,
}

// Sizes above XGA/WXGA degrade model accuracy, larger screens are reduced to these.
pub const MAX_SCALING_TARGETS: [ScalingTarget; 3] = [
    ScalingTarget {
        name: "XGA",
        aspect: "4:3",
        resolution: Resolution::new(1024, 768),
    },
    ScalingTarget {
        name: "WXGA",
        aspect: "16:10",
        resolution: Resolution::new(1280, 800),
    },
    ScalingTarget {
        name: "FWXGA",
        aspect: "~16:9",
        resolution: Resolution::new(1366, 768),
    },
];

// Not every "16:9" panel is exactly 16:9.
const ASPECT_TOLERANCE: f64 = 0.02;

/// First target matching the native aspect ratio that is narrower than the screen.
pub fn find_target(native: Resolution) -> Option<&'static ScalingTarget> {
    if native.width == 0 || native.height == 0 {
        return None;
    }
    let ratio = native.aspect_ratio();
    MAX_SCALING_TARGETS.iter().find(|target| {
        (target.resolution.aspect_ratio() - ratio).abs() < ASPECT_TOLERANCE
            && target.resolution.width < native.width
    })
}

/// Converts coordinates between API space and device space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaler {
    native: Resolution,
    target: Option<Resolution>,
}

impl Scaler {
    /// Scaler for `native`; identity when disabled or no target matches.
    pub fn new(native: Resolution, enabled: bool) -> Self {
        let target = if enabled {
            find_target(native).map(|t| t.resolution)
        } else {
            None
        };
        Self { native, target }
    }

    pub fn native(&self) -> Resolution {
        self.native
    }

    /// Resolution the agent sees.
    pub fn api_resolution(&self) -> Resolution {
        self.target.unwrap_or(self.native)
    }

    /// Returns `true` when API space differs from device space.
    pub fn is_scaling(&self) -> bool {
        self.target.is_some()
    }

    fn factors(&self) -> Option<(f64, f64)> {
        self.target.map(|target| {
            (
                f64::from(target.width) / f64::from(self.native.width),
                f64::from(target.height) / f64::from(self.native.height),
            )
        })
    }

    /// Scales an API-space point up to device space.
    pub fn api_to_device(&self, x: u32, y: u32) -> Result<(u32, u32), ToolError> {
        if x > self.native.width || y > self.native.height {
            return Err(ToolError::invalid(format!(
                "Coordinates {x}, {y} are out of bounds"
            )));
        }
        Ok(match self.factors() {
            Some((fx, fy)) => (scale(x, 1.0 / fx), scale(y, 1.0 / fy)),
            None => (x, y),
        })
    }

    /// Scales a device-space point down to API space.
    pub fn device_to_api(&self, x: u32, y: u32) -> (u32, u32) {
        match self.factors() {
            Some((fx, fy)) => (scale(x, fx), scale(y, fy)),
            None => (x, y),
        }
    }
}

fn scale(value: u32, factor: f64) -> u32 {
    (f64::from(value) * factor).round() as u32
}

#[cfg(test)]
mod tests {
    use proto::ErrorKind;

    use super::*;

    #[test]
    fn picks_target_by_aspect_ratio() {
        let target = find_target(Resolution::new(1920, 1080)).expect("16:9 target");
        assert_eq!(target.name, "FWXGA");
        let target = find_target(Resolution::new(2560, 1600)).expect("16:10 target");
        assert_eq!(target.name, "WXGA");
        let target = find_target(Resolution::new(2048, 1536)).expect("4:3 target");
        assert_eq!(target.name, "XGA");
    }

    #[test]
    fn no_target_for_small_or_unusual_screens() {
        assert!(find_target(Resolution::new(1024, 768)).is_none());
        assert!(find_target(Resolution::new(1280, 1024)).is_none());
        assert!(find_target(Resolution::new(0, 0)).is_none());
    }

    #[test]
    fn disabled_scaler_is_identity() {
        let scaler = Scaler::new(Resolution::new(1920, 1080), false);
        assert!(!scaler.is_scaling());
        assert_eq!(scaler.api_resolution(), Resolution::new(1920, 1080));
        assert_eq!(scaler.api_to_device(100, 200).unwrap(), (100, 200));
        assert_eq!(scaler.device_to_api(100, 200), (100, 200));
    }

    #[test]
    fn exact_half_scale_maps_both_ways() {
        let scaler = Scaler::new(Resolution::new(2048, 1536), true);
        assert_eq!(scaler.api_resolution(), Resolution::new(1024, 768));
        assert_eq!(scaler.api_to_device(100, 200).unwrap(), (200, 400));
        assert_eq!(scaler.device_to_api(200, 400), (100, 200));
        assert_eq!(scaler.device_to_api(2048, 1536), (1024, 768));
    }

    #[test]
    fn round_trip_stays_within_one_unit() {
        for native in [
            Resolution::new(1920, 1080),
            Resolution::new(2560, 1600),
            Resolution::new(2880, 1800),
            Resolution::new(1600, 1200),
        ] {
            let scaler = Scaler::new(native, true);
            assert!(scaler.is_scaling(), "{native:?} should scale");
            let api = scaler.api_resolution();
            for x in (0..=api.width).step_by(3) {
                for y in (0..=api.height).step_by(7) {
                    let (dx, dy) = scaler.api_to_device(x, y).expect("in bounds");
                    let (ax, ay) = scaler.device_to_api(dx, dy);
                    assert!(ax.abs_diff(x) <= 1, "x {x} -> {dx} -> {ax}");
                    assert!(ay.abs_diff(y) <= 1, "y {y} -> {dy} -> {ay}");
                }
            }
        }
    }

    #[test]
    fn coordinates_beyond_native_bounds_are_rejected() {
        let scaler = Scaler::new(Resolution::new(1920, 1080), true);
        let err = scaler.api_to_device(1921, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("out of bounds"));
        assert!(scaler.api_to_device(10, 1081).is_err());

        let identity = Scaler::new(Resolution::new(800, 600), true);
        assert!(identity.api_to_device(801, 0).is_err());
    }
}
