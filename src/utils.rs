// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! contains useful type definitions and conversion functions.
use nalgebra::{Point3, Quaternion, UnitQuaternion};

/// converts roll, pitch and yaw angles (static x-y-z convention) to a unit quaternion
pub fn rpy_to_quaternion(rpy: &[f64; 3]) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2])
}

/// converts a quaternion given as \[x, y, z, w\] to a unit quaternion.
///
/// The input is normalized, so slightly denormalized values coming from text or the wire are fine.
pub fn array_to_quaternion(array: &[f64; 4]) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(Quaternion::new(array[3], array[0], array[1], array[2]))
}

/// converts a unit quaternion to an array in \[x, y, z, w\] order
pub fn quaternion_to_array(quaternion: &UnitQuaternion<f64>) -> [f64; 4] {
    let coords = quaternion.quaternion().coords;
    [coords.x, coords.y, coords.z, coords.w]
}

/// converts a point to an \[x, y, z\] array
pub fn point_to_array(point: &Point3<f64>) -> [f64; 3] {
    [point.x, point.y, point.z]
}

#[cfg(test)]
mod test {
    use crate::utils::{array_to_quaternion, quaternion_to_array, rpy_to_quaternion};
    use std::f64::consts::PI;

    fn slice_compare(a: &[f64], b: &[f64], thresh: f64) {
        for i in 0..a.len() {
            float_compare(a[i], b[i], thresh);
        }
    }

    fn float_compare(a: f64, b: f64, thresh: f64) {
        assert!((a - b).abs() < thresh, "{} != {}", a, b);
    }

    #[test]
    fn zero_rpy_is_identity() {
        let q = quaternion_to_array(&rpy_to_quaternion(&[0., 0., 0.]));
        slice_compare(&q, &[0., 0., 0., 1.], 1e-12);
    }

    #[test]
    fn yaw_only_rotation() {
        let q = quaternion_to_array(&rpy_to_quaternion(&[0., 0., PI / 2.]));
        let half = f64::sqrt(0.5);
        slice_compare(&q, &[0., 0., half, half], 1e-12);
    }

    #[test]
    fn quaternion_array_order_is_xyzw() {
        let grasp = [
            0.347709304721,
            -0.646715871525,
            0.298597553716,
            0.609669026475,
        ];
        let q = array_to_quaternion(&grasp);
        slice_compare(&quaternion_to_array(&q), &grasp, 1e-9);
    }

    #[test]
    fn denormalized_input_is_normalized() {
        let q = array_to_quaternion(&[0., 0., 0., 2.]);
        slice_compare(&quaternion_to_array(&q), &[0., 0., 0., 1.], 1e-12);
    }
}
