//! Camera framing and the six preset preview poses.

use glam::{DMat4, DVec3};

/// Vertical field of view, in degrees.
pub const VIEW_ANGLE_DEG: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: DVec3,
    pub focal: DVec3,
    pub up: DVec3,
    pub near: f64,
    pub far: f64,
}

/// Axis-aligned bounds of the model being framed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl Bounds {
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Longest extent along any axis.
    pub fn max_dim(&self) -> f64 {
        (self.max - self.min).max_element()
    }

    fn corners(&self) -> [DVec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            DVec3::new(a.x, a.y, a.z),
            DVec3::new(b.x, a.y, a.z),
            DVec3::new(a.x, b.y, a.z),
            DVec3::new(b.x, b.y, a.z),
            DVec3::new(a.x, a.y, b.z),
            DVec3::new(b.x, a.y, b.z),
            DVec3::new(a.x, b.y, b.z),
            DVec3::new(b.x, b.y, b.z),
        ]
    }
}

impl Camera {
    /// Frame `bounds` looking down -Z with +Y up, far enough back that the
    /// bounding sphere fits the view angle.
    pub fn framing(bounds: &Bounds) -> Self {
        let center = bounds.center();
        let diagonal = (bounds.max - bounds.min).length();
        let radius = if diagonal == 0.0 { 1.0 } else { diagonal * 0.5 };
        let distance = radius / (VIEW_ANGLE_DEG.to_radians() * 0.5).sin();
        let mut camera = Self {
            position: center + DVec3::Z * distance,
            focal: center,
            up: DVec3::Y,
            near: 0.01,
            far: 1000.0,
        };
        camera.reset_clipping_range(bounds);
        camera
    }

    /// Unit vector from the focal point towards the camera.
    pub fn view(&self) -> DVec3 {
        (self.position - self.focal).normalize_or_zero()
    }

    /// Fit near and far planes tightly around `bounds`.
    pub fn reset_clipping_range(&mut self, bounds: &Bounds) {
        let forward = -self.view();
        let (mut near, mut far) = bounds
            .corners()
            .iter()
            .map(|c| (*c - self.position).dot(forward))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| {
                (lo.min(d), hi.max(d))
            });
        if !far.is_finite() || far <= 0.0 {
            near = 0.01;
            far = 1.0;
        }
        far *= 1.01;
        near = (near * 0.99).max(far * 0.001);
        self.near = near;
        self.far = far;
    }

    pub fn view_matrix(&self) -> DMat4 {
        DMat4::look_at_rh(self.position, self.focal, self.up)
    }

    pub fn projection_matrix(&self, aspect: f64) -> DMat4 {
        DMat4::perspective_rh(VIEW_ANGLE_DEG.to_radians(), aspect, self.near, self.far)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub name: &'static str,
    pub camera: Camera,
}

pub const POSE_NAMES: [&str; 6] = [
    "front",
    "back-top-right",
    "left",
    "front-bot-left",
    "back-bot-left",
    "bottom",
];

/// The six preview poses for `bounds`, in output order.
pub fn preset_poses(bounds: &Bounds) -> Vec<Pose> {
    let base = Camera::framing(bounds);
    let focal = base.focal;
    let view = base.view();
    let right = view.cross(base.up).normalize_or_zero();
    let actual_up = right.cross(view).normalize_or_zero();
    let max_dim = bounds.max_dim();
    let d = if max_dim > 0.0 { 2.0 * max_dim } else { 1.0 };

    let placements = [
        (base.position, actual_up),
        (focal + d * (-view + actual_up + right).normalize(), actual_up),
        (focal - d * right, actual_up),
        (focal + d * (view - actual_up - right).normalize(), actual_up),
        (focal + d * (-view - actual_up - right).normalize(), actual_up),
        (focal - d * actual_up, -view),
    ];

    POSE_NAMES
        .iter()
        .zip(placements)
        .map(|(name, (position, up))| {
            let mut camera = Camera {
                position,
                focal,
                up,
                near: base.near,
                far: base.far,
            };
            camera.reset_clipping_range(bounds);
            Pose { name, camera }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Bounds {
        Bounds {
            min: DVec3::new(-1.0, -2.0, 0.0),
            max: DVec3::new(3.0, 2.0, 1.0),
        }
    }

    #[test]
    fn test_first_pose_is_default_framing() {
        let bounds = unit_box();
        let framing = Camera::framing(&bounds);
        let front = preset_poses(&bounds)[0].camera;
        assert!(front.position.abs_diff_eq(framing.position, 1e-9));
        assert!(front.focal.abs_diff_eq(framing.focal, 1e-9));
        assert!(front.up.abs_diff_eq(framing.up, 1e-9));
    }

    #[test]
    fn test_pose_order_and_distances() {
        let bounds = unit_box();
        let poses = preset_poses(&bounds);
        let names: Vec<_> = poses.iter().map(|p| p.name).collect();
        assert_eq!(names, POSE_NAMES.to_vec());

        let d = 2.0 * bounds.max_dim();
        for pose in &poses[1..] {
            let dist = (pose.camera.position - pose.camera.focal).length();
            assert!((dist - d).abs() < 1e-9, "{} at {}", pose.name, dist);
        }
        // Left looks along +X, bottom looks up +Y with -view as up
        assert!(poses[2].camera.position.abs_diff_eq(bounds.center() + DVec3::X * d, 1e-9));
        assert!(poses[5].camera.position.abs_diff_eq(bounds.center() - DVec3::Y * d, 1e-9));
        assert!(poses[5].camera.up.abs_diff_eq(-DVec3::Z, 1e-9));
    }

    #[test]
    fn test_clipping_range_encloses_bounds() {
        let bounds = unit_box();
        for pose in preset_poses(&bounds) {
            let cam = pose.camera;
            assert!(cam.near > 0.0 && cam.near < cam.far);
            let center_depth = (bounds.center() - cam.position).length();
            assert!(cam.near < center_depth && center_depth < cam.far);
        }
    }

    #[test]
    fn test_degenerate_bounds_still_frame() {
        let point = Bounds {
            min: DVec3::splat(5.0),
            max: DVec3::splat(5.0),
        };
        let poses = preset_poses(&point);
        assert_eq!(poses.len(), 6);
        assert!(poses.iter().all(|p| p.camera.position.is_finite()));
    }
}
