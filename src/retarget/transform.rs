//! Capture-space to world-space coordinate transforms

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::tracking::landmark::LandmarkPoint;

/// Affine mapping from normalized capture coordinates to a host's world space.
///
/// Capture space has x right, y down (both 0..1) and z towards the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoordinateTransform {
    /// Y-up, centered: `((x - 0.5) * s, (0.5 - y) * s, -z * s)`
    YUp { scale: f32 },
    /// Z-up with depth on Y: `((x - 0.5) * 3s, z * 2s, (1 - y) * 2s)`
    ZUp { scale: f32 },
    /// Engine units, centered, y kept downwards: `((x - 0.5) * s, (y - 0.5) * s, -z * s)`
    Unreal { scale: f32 },
}

impl Default for CoordinateTransform {
    fn default() -> Self {
        Self::YUp { scale: 3.0 }
    }
}

impl CoordinateTransform {
    pub fn scale(&self) -> f32 {
        match *self {
            Self::YUp { scale } | Self::ZUp { scale } | Self::Unreal { scale } => scale,
        }
    }

    /// Map a normalized point to world space
    pub fn apply(&self, x: f32, y: f32, z: f32) -> Vec3 {
        match *self {
            Self::YUp { scale } => Vec3::new((x - 0.5) * scale, (0.5 - y) * scale, -z * scale),
            Self::ZUp { scale } => Vec3::new(
                (x - 0.5) * 3.0 * scale,
                z * 2.0 * scale,
                (1.0 - y) * 2.0 * scale,
            ),
            Self::Unreal { scale } => {
                Vec3::new((x - 0.5) * scale, (y - 0.5) * scale, -z * scale)
            }
        }
    }

    pub fn to_world(&self, point: &LandmarkPoint) -> Vec3 {
        self.apply(point.x, point.y, point.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert!(a.abs_diff_eq(b, 1e-5), "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_y_up_shoulder_and_elbow() {
        let t = CoordinateTransform::YUp { scale: 3.0 };
        assert_vec_eq(t.apply(0.4, 0.3, 0.1), Vec3::new(-0.3, 0.6, -0.3));
        assert_vec_eq(t.apply(0.5, 0.5, 0.2), Vec3::new(0.0, 0.0, -0.6));
    }

    #[test]
    fn test_z_up() {
        let t = CoordinateTransform::ZUp { scale: 1.5 };
        assert_vec_eq(t.apply(0.5, 1.0, 0.0), Vec3::ZERO);
        assert_vec_eq(t.apply(1.0, 0.0, 0.5), Vec3::new(2.25, 1.5, 3.0));
    }

    #[test]
    fn test_unreal() {
        let t = CoordinateTransform::Unreal { scale: 200.0 };
        assert_vec_eq(t.apply(0.25, 0.75, 0.1), Vec3::new(-50.0, 50.0, -20.0));
    }

    #[test]
    fn test_parse_tagged() {
        let t: CoordinateTransform = toml::from_str("kind = \"z_up\"\nscale = 2.0").unwrap();
        assert_eq!(t, CoordinateTransform::ZUp { scale: 2.0 });
        assert_eq!(t.scale(), 2.0);
    }
}
