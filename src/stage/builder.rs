// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the waypoint generation for every stage.

use crate::exception::PickPlaceResult;
use crate::pose::{Pose, WaypointSequence};
use crate::stage::StageId;
use crate::task_config::TaskConfig;
use crate::utils::array_to_quaternion;
use nalgebra::{Point3, UnitQuaternion};

/// Grasp orientation of the hand as \[x, y, z, w\], fingers pointing down onto the table.
pub const HAND_PICK_ORIENTATION: [f64; 4] = [
    0.347709304721,
    -0.646715871525,
    0.298597553716,
    0.609669026475,
];

/// Height above the cube the hand approaches first. Unit: \[m\]
pub const APPROACH_HEIGHT: f64 = 0.6;
/// Heights above the cube the hand descends through. Unit: \[m\]
pub const DESCEND_HEIGHTS: [f64; 3] = [0.5, 0.4, 0.15];
/// Heights above the cube the hand lifts through. Unit: \[m\]
pub const LIFT_HEIGHTS: [f64; 4] = [0.3, 0.4, 0.5, 0.7];
/// Height above the table the cube is carried at. Unit: \[m\]
pub const TRANSPORT_HEIGHT: f64 = 0.7;
/// Heights above the table the hand descends through into the bucket. Unit: \[m\]
pub const BUCKET_DESCEND_HEIGHTS: [f64; 2] = [0.6, 0.5];
/// Heights above the table the hand retracts through out of the bucket. Unit: \[m\]
pub const RETRACT_HEIGHTS: [f64; 2] = [0.6, 0.7];

/// Turns the current end-effector pose and the task configuration into the waypoints of a stage.
///
/// The builder holds no state besides the grasp orientation, identical input always produces
/// identical output. Every sequence starts with the current pose.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StageBuilder {
    grasp_orientation: UnitQuaternion<f64>,
}

impl Default for StageBuilder {
    fn default() -> Self {
        StageBuilder::new(array_to_quaternion(&HAND_PICK_ORIENTATION))
    }
}

impl StageBuilder {
    pub fn new(grasp_orientation: UnitQuaternion<f64>) -> Self {
        StageBuilder { grasp_orientation }
    }

    pub fn grasp_orientation(&self) -> UnitQuaternion<f64> {
        self.grasp_orientation
    }

    /// Builds the waypoint sequence of `stage`.
    ///
    /// Gripper stages and [`Idle`](`StageId::Idle`) do not move the hand. For them the sequence
    /// holds the current pose twice.
    ///
    /// # Arguments
    /// * `stage` - Stage to build the waypoints for.
    /// * `current` - End-effector pose observed right before the stage.
    /// * `config` - Task configuration.
    /// # Errors
    /// * [`ConfigurationError`](`crate::exception::PickPlaceException::ConfigurationError`) if the stage addresses a cube
    /// the configuration does not contain.
    pub fn build(
        &self,
        stage: StageId,
        current: &Pose,
        config: &TaskConfig,
    ) -> PickPlaceResult<WaypointSequence> {
        let targets = match stage {
            StageId::Orient => vec![current.with_orientation(self.grasp_orientation)],
            StageId::ApproachAbove { cube } => {
                let cube = config.cube(cube)?;
                vec![self.grasp_at(cube.x, cube.y, cube.z + APPROACH_HEIGHT)]
            }
            StageId::DescendToCube { cube } => {
                let cube = config.cube(cube)?;
                self.column(cube.x, cube.y, cube.z, &DESCEND_HEIGHTS)
            }
            StageId::LiftFromCube { cube } => {
                // straight up from where the hand grasped, not from the nominal cube position
                let cube = config.cube(cube)?;
                self.column(current.position.x, current.position.y, cube.z, &LIFT_HEIGHTS)
            }
            StageId::TransportAboveBucket => {
                let bucket = config.bucket();
                vec![self.grasp_at(bucket.x, bucket.y, bucket.z + TRANSPORT_HEIGHT)]
            }
            StageId::DescendIntoBucket => {
                let bucket = config.bucket();
                self.column(bucket.x, bucket.y, bucket.z, &BUCKET_DESCEND_HEIGHTS)
            }
            StageId::RetractFromBucket => self.column(
                current.position.x,
                current.position.y,
                config.bucket().z,
                &RETRACT_HEIGHTS,
            ),
            StageId::CloseGripper | StageId::OpenGripper | StageId::Idle => vec![*current],
        };
        WaypointSequence::new(*current, targets)
    }

    fn grasp_at(&self, x: f64, y: f64, z: f64) -> Pose {
        Pose::new(Point3::new(x, y, z), self.grasp_orientation)
    }

    fn column(&self, x: f64, y: f64, base: f64, heights: &[f64]) -> Vec<Pose> {
        heights
            .iter()
            .map(|height| self.grasp_at(x, y, base + height))
            .collect()
    }
}
