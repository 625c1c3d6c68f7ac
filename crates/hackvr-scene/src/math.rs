//! Transform math and rotation conventions.
//!
//! Coordinate system: right-handed, `+X` right, `+Y` up, `+Z` forward.
//!
//! The object transform chain in world coordinates is
//!
//! ```text
//! T_world(O) = T_world(P) ∘ Translate(pos) ∘ R_track ∘ R_local ∘ Scale(scale)
//! ```
//!
//! where `∘` means the left operand is applied after the right operand on a
//! column vector: `(A ∘ B)·v = A·(B·v)`.
//!
//! Euler angles are degrees, intrinsic, applied roll → tilt → pan, with axes
//! defined by effect:
//!
//! - pan about local up, positive turns right;
//! - tilt about local left (−right), positive looks up;
//! - roll about local forward, positive tilts the head right.
//!
//! Rotations are converted to quaternions on receipt and stored that way, so
//! blending never passes through Euler space. Near `tilt = ±90°` the
//! shortest-arc tie-break is whatever `glam`'s `slerp` picks.

use glam::{Mat4, Quat, Vec3};

use hackvr_protocol::Euler;

/// Local forward in this crate's conventions.
pub const FORWARD: Vec3 = Vec3::Z;

/// Local up.
pub const UP: Vec3 = Vec3::Y;

/// Convert a wire Euler rotation to a quaternion.
pub fn euler_to_quat(euler: Euler) -> Quat {
    let pan = euler.pan.to_radians();
    let tilt = euler.tilt.to_radians();
    let roll = euler.roll.to_radians();
    // Intrinsic roll → tilt → pan composes left-to-right as pan ∘ tilt ∘ roll.
    // Positive pan turns right, which is a positive rotation about +Y taking
    // +Z toward +X; positive tilt rotates about −X; positive roll about −Z.
    Quat::from_rotation_y(pan) * Quat::from_rotation_x(-tilt) * Quat::from_rotation_z(-roll)
}

/// The committed (non-animated) local transform of an object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub pos: Vec3,
    pub rot: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        pos: Vec3::ZERO,
        rot: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Local matrix with a tracking rotation layered between the translation
    /// and the local rotation.
    pub fn to_matrix(&self, track: Quat) -> Mat4 {
        Mat4::from_translation(self.pos)
            * Mat4::from_quat(track)
            * Mat4::from_quat(self.rot)
            * Mat4::from_scale(self.scale)
    }

    /// Decompose a matrix back into a transform. Shear introduced by
    /// non-uniform ancestor scales is folded into the rotation/scale pair as
    /// `glam` sees fit.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rot, pos) = matrix.to_scale_rotation_translation();
        Self { pos, rot, scale }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Shortest-arc spherical interpolation between two rotations.
pub fn slerp(from: Quat, to: Quat, s: f32) -> Quat {
    // Negating one endpoint when the dot is negative keeps the arc short.
    let to = if from.dot(to) < 0.0 { -to } else { to };
    from.slerp(to, s)
}

/// Rotation about local up aiming local forward at a point on the horizontal
/// plane. Returns identity when the target sits on the up axis.
pub fn plane_aim(target_local: Vec3) -> Quat {
    let flat = Vec3::new(target_local.x, 0.0, target_local.z);
    if flat.length_squared() < 1e-12 {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_y(target_local.x.atan2(target_local.z))
}

/// Rotation turning local forward straight at a point while trying to keep
/// local up. When the target direction is within a fraction of a degree of
/// the up axis the up hint falls back to local forward.
pub fn focus_aim(target_local: Vec3) -> Quat {
    if target_local.length_squared() < 1e-12 {
        return Quat::IDENTITY;
    }
    let forward = target_local.normalize();
    let up_hint = if forward.dot(UP).abs() > 0.999 {
        FORWARD
    } else {
        UP
    };
    let right = up_hint.cross(forward).normalize();
    let up = forward.cross(right);
    Quat::from_mat3(&glam::Mat3::from_cols(right, up, forward))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{a:?} != {b:?}");
    }

    #[test]
    fn pan_positive_turns_right() {
        let q = euler_to_quat(Euler::new(90.0, 0.0, 0.0));
        assert_vec_eq(q * FORWARD, Vec3::X);
    }

    #[test]
    fn tilt_positive_looks_up() {
        let q = euler_to_quat(Euler::new(0.0, 90.0, 0.0));
        assert_vec_eq(q * FORWARD, Vec3::Y);
    }

    #[test]
    fn roll_positive_tilts_head_right() {
        let q = euler_to_quat(Euler::new(0.0, 0.0, 90.0));
        assert_vec_eq(q * UP, Vec3::X);
        assert_vec_eq(q * FORWARD, FORWARD);
    }

    #[test]
    fn euler_order_is_roll_tilt_pan() {
        // Roll first, then tilt, then pan: with pan=90 and tilt=90 the
        // forward axis must end where pan carries the tilted vector.
        let q = euler_to_quat(Euler::new(90.0, 90.0, 0.0));
        let tilted = euler_to_quat(Euler::new(0.0, 90.0, 0.0)) * FORWARD;
        let panned = euler_to_quat(Euler::new(90.0, 0.0, 0.0)) * tilted;
        assert_vec_eq(q * FORWARD, panned);
    }

    #[test]
    fn transform_matrix_round_trip() {
        let t = Transform {
            pos: Vec3::new(1.0, 2.0, 3.0),
            rot: euler_to_quat(Euler::new(45.0, 10.0, 5.0)),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };
        let back = Transform::from_matrix(t.to_matrix(Quat::IDENTITY));
        assert_vec_eq(back.pos, t.pos);
        assert_vec_eq(back.scale, t.scale);
        assert!(back.rot.dot(t.rot).abs() > 0.9999);
    }

    #[test]
    fn slerp_takes_shortest_arc() {
        let a = Quat::from_rotation_y(0.1);
        let b = -Quat::from_rotation_y(0.2);
        let mid = slerp(a, b, 0.5);
        let expected = Quat::from_rotation_y(0.15);
        assert!(mid.dot(expected).abs() > 0.9999);
    }

    #[test]
    fn slerp_endpoints_exact() {
        let a = Quat::from_rotation_y(0.3);
        let b = Quat::from_rotation_x(1.2);
        assert!(slerp(a, b, 0.0).dot(a).abs() > 0.99999);
        assert!(slerp(a, b, 1.0).dot(b).abs() > 0.99999);
    }

    #[test]
    fn plane_aim_points_at_flat_target() {
        let q = plane_aim(Vec3::new(5.0, 3.0, 0.0));
        let fwd = q * FORWARD;
        assert_vec_eq(fwd, Vec3::X);
    }

    #[test]
    fn plane_aim_above_is_identity() {
        assert_eq!(plane_aim(Vec3::new(0.0, 10.0, 0.0)), Quat::IDENTITY);
    }

    #[test]
    fn focus_aim_points_at_target() {
        let target = Vec3::new(1.0, 1.0, 1.0);
        let q = focus_aim(target);
        assert_vec_eq(q * FORWARD, target.normalize());
    }

    #[test]
    fn focus_aim_near_up_does_not_collapse() {
        let q = focus_aim(Vec3::new(0.0, 5.0, 0.0));
        assert_vec_eq(q * FORWARD, Vec3::Y);
        assert!(q.is_finite());
    }
}
