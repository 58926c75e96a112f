// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the Pose and WaypointSequence value types.

use crate::exception::{PickPlaceException, PickPlaceResult};
use crate::utils::{array_to_quaternion, point_to_array, quaternion_to_array};
use nalgebra::{Point3, UnitQuaternion};
use std::fmt;

/// 6-DoF pose of the end-effector or of an object.
///
/// Poses are plain values. Deriving a waypoint always creates a new pose,
/// the source pose stays untouched.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Pose {
    /// Position. Unit: \[m\]
    pub position: Point3<f64>,
    /// Orientation as unit quaternion.
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn new(position: Point3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Pose {
            position,
            orientation,
        }
    }

    /// Creates a pose from a position \[x, y, z\] and a quaternion \[x, y, z, w\].
    pub fn from_arrays(position: &[f64; 3], orientation: &[f64; 4]) -> Self {
        Pose {
            position: Point3::new(position[0], position[1], position[2]),
            orientation: array_to_quaternion(orientation),
        }
    }

    /// Returns position \[x, y, z\] and quaternion \[x, y, z, w\].
    pub fn to_arrays(&self) -> ([f64; 3], [f64; 4]) {
        (
            point_to_array(&self.position),
            quaternion_to_array(&self.orientation),
        )
    }

    /// Returns a new pose at `position` with the orientation of `self`.
    pub fn with_position(&self, position: Point3<f64>) -> Pose {
        Pose {
            position,
            orientation: self.orientation,
        }
    }

    /// Returns a new pose with the position of `self` and the given orientation.
    pub fn with_orientation(&self, orientation: UnitQuaternion<f64>) -> Pose {
        Pose {
            position: self.position,
            orientation,
        }
    }

    /// Returns a new pose which only differs from `self` in its height.
    pub fn with_z(&self, z: f64) -> Pose {
        self.with_position(Point3::new(self.position.x, self.position.y, z))
    }
}

impl Default for Pose {
    fn default() -> Self {
        Pose::new(Point3::origin(), UnitQuaternion::identity())
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (p, q) = self.to_arrays();
        write!(
            f,
            "position: [{:.4}, {:.4}, {:.4}] orientation: [{:.4}, {:.4}, {:.4}, {:.4}]",
            p[0], p[1], p[2], q[0], q[1], q[2], q[3]
        )
    }
}

/// Ordered list of poses the end-effector passes through.
///
/// The first pose is the start of the Cartesian path, every further pose a target.
/// A sequence always holds at least two poses.
#[derive(Debug, Clone, PartialEq)]
pub struct WaypointSequence {
    poses: Vec<Pose>,
}

impl WaypointSequence {
    /// Creates a sequence starting at `start` and passing through `targets` in order.
    /// # Errors
    /// * [`InvalidArgument`](`crate::exception::PickPlaceException::InvalidArgument`) if `targets` is empty.
    pub fn new(start: Pose, targets: Vec<Pose>) -> PickPlaceResult<Self> {
        if targets.is_empty() {
            return Err(PickPlaceException::InvalidArgument {
                message: "a waypoint sequence needs at least one target".to_string(),
            });
        }
        let mut poses = Vec::with_capacity(targets.len() + 1);
        poses.push(start);
        poses.extend(targets);
        Ok(WaypointSequence { poses })
    }

    /// Pose the path starts at.
    pub fn start(&self) -> &Pose {
        &self.poses[0]
    }

    /// Last pose of the path.
    pub fn goal(&self) -> &Pose {
        &self.poses[self.poses.len() - 1]
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pose> {
        self.poses.iter()
    }
}

impl std::ops::Index<usize> for WaypointSequence {
    type Output = Pose;

    fn index(&self, index: usize) -> &Pose {
        &self.poses[index]
    }
}

/// Provides the currently observed end-effector pose.
pub trait PoseSource {
    /// Queries the current end-effector pose. Blocks until the pose is known.
    fn current_pose(&mut self) -> PickPlaceResult<Pose>;
}
