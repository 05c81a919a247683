//! Rotation helpers on rows of state arrays.
//!
//! Quaternions are stored `xyzw` in state arrays, the order of the simulator
//! root state, and converted to [`UnitQuaternion`] on use.
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use ndarray::ArrayView1;
use rand::Rng;
use std::f32::consts::PI;

/// Quaternion from an `xyzw` slice.
pub fn quat_from_xyzw(q: ArrayView1<f32>) -> UnitQuaternion<f32> {
    UnitQuaternion::from_quaternion(Quaternion::new(q[3], q[0], q[1], q[2]))
}

/// `xyzw` coefficients of a quaternion.
pub fn quat_to_xyzw(q: &UnitQuaternion<f32>) -> [f32; 4] {
    [q.i, q.j, q.k, q.w]
}

/// Rotates `v` by `q`.
pub fn quat_rotate(q: &UnitQuaternion<f32>, v: [f32; 3]) -> [f32; 3] {
    let r = q * Vector3::from(v);
    [r.x, r.y, r.z]
}

/// Rotates `v` by the inverse of `q`, from world frame to body frame.
pub fn quat_rotate_inverse(q: &UnitQuaternion<f32>, v: [f32; 3]) -> [f32; 3] {
    let r = q.inverse_transform_vector(&Vector3::from(v));
    [r.x, r.y, r.z]
}

/// Heading of the body x axis in the world xy plane.
pub fn heading(q: &UnitQuaternion<f32>) -> f32 {
    let forward = quat_rotate(q, [1.0, 0.0, 0.0]);
    forward[1].atan2(forward[0])
}

/// Rotates `v` about the world z axis by the heading of `q`.
pub fn quat_apply_yaw(q: &UnitQuaternion<f32>, v: [f32; 3]) -> [f32; 3] {
    let yaw = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), heading(q));
    quat_rotate(&yaw, v)
}

/// Wraps an angle to `(-pi, pi]`.
pub fn wrap_to_pi(a: f32) -> f32 {
    let w = (a + PI).rem_euclid(2.0 * PI) - PI;
    if w == -PI {
        PI
    } else {
        w
    }
}

/// Roll, pitch and yaw of `q`, each wrapped to `(-pi, pi]`.
///
/// The argument of the pitch arcsine is clamped to `[-1, 1]`.
pub fn euler_from_quat(q: &UnitQuaternion<f32>) -> [f32; 3] {
    let (x, y, z, w) = (q.i, q.j, q.k, q.w);
    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
    [wrap_to_pi(roll), wrap_to_pi(pitch), wrap_to_pi(yaw)]
}

/// Uniform sample in `[lo, hi)`.
pub fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: f32, hi: f32) -> f32 {
    lo + (hi - lo) * rng.gen::<f32>()
}

/// Uniform sample in a `[min, max]` range.
pub fn uniform_in<R: Rng + ?Sized>(rng: &mut R, range: [f32; 2]) -> f32 {
    uniform(rng, range[0], range[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::aview1;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_wrap_to_pi() {
        assert_relative_eq!(wrap_to_pi(0.5), 0.5);
        assert_relative_eq!(wrap_to_pi(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-5);
        assert_relative_eq!(wrap_to_pi(-3.0 * PI / 2.0), PI / 2.0, epsilon = 1e-5);
        assert_relative_eq!(wrap_to_pi(PI), PI);
        assert_relative_eq!(wrap_to_pi(-PI), PI);
    }

    #[test]
    fn test_yaw_rotation() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let xyzw = quat_to_xyzw(&q);
        let q = quat_from_xyzw(aview1(&xyzw));

        assert_relative_eq!(heading(&q), FRAC_PI_2, epsilon = 1e-6);
        let v = quat_rotate_inverse(&q, [0.0, 1.0, 0.0]);
        assert_relative_eq!(v[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(v[1], 0.0, epsilon = 1e-6);

        let e = euler_from_quat(&q);
        assert_relative_eq!(e[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(e[1], 0.0, epsilon = 1e-6);
        assert_relative_eq!(e[2], FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn test_apply_yaw_ignores_pitch() {
        let q = UnitQuaternion::from_euler_angles(0.0, 0.4, FRAC_PI_2);
        let v = quat_apply_yaw(&q, [1.0, 0.0, 0.0]);
        assert_relative_eq!(v[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(v[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(v[2], 0.0, epsilon = 1e-6);
    }
}
