// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the stage table of the pick-and-place task.
//!
//! A task always runs through the same stages in the same order:
//! ```text
//! Orient -> ApproachAbove -> DescendToCube -> CloseGripper -> LiftFromCube
//!        -> TransportAboveBucket -> DescendIntoBucket -> OpenGripper
//!        -> RetractFromBucket -> Idle
//! ```
//! Each [`Stage`] tells the orchestrator what to do (move, actuate the gripper or hold), which
//! planned fraction it accepts and how long to let the robot settle afterwards. The waypoints of
//! a motion stage are produced by the [`StageBuilder`] right before the stage runs.

use crate::task_config::TaskConfig;
use std::fmt;
use std::time::Duration;

pub mod builder;

pub use builder::StageBuilder;

/// Number of stages of a pick-and-place task including the terminal [`StageId::Idle`].
pub const STAGE_COUNT: usize = 10;

/// Identifies a stage of the task. Stages that address a cube carry the index of that cube.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StageId {
    /// Rotates the wrist into the grasp orientation without translating.
    Orient,
    /// Moves high above the cube.
    ApproachAbove { cube: usize },
    /// Descends onto the cube in three steps.
    DescendToCube { cube: usize },
    CloseGripper,
    /// Lifts the grasped cube straight up in four steps.
    LiftFromCube { cube: usize },
    TransportAboveBucket,
    /// Lowers the cube into the bucket in two steps.
    DescendIntoBucket,
    OpenGripper,
    /// Moves straight up out of the bucket in two steps.
    RetractFromBucket,
    /// Terminal stage, the task holds until shutdown.
    Idle,
}

impl StageId {
    /// All stages of a task picking `cube`, in execution order.
    pub fn sequence(cube: usize) -> [StageId; STAGE_COUNT] {
        [
            StageId::Orient,
            StageId::ApproachAbove { cube },
            StageId::DescendToCube { cube },
            StageId::CloseGripper,
            StageId::LiftFromCube { cube },
            StageId::TransportAboveBucket,
            StageId::DescendIntoBucket,
            StageId::OpenGripper,
            StageId::RetractFromBucket,
            StageId::Idle,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            StageId::Orient => "orient",
            StageId::ApproachAbove { .. } => "approach_above",
            StageId::DescendToCube { .. } => "descend_to_cube",
            StageId::CloseGripper => "close_gripper",
            StageId::LiftFromCube { .. } => "lift_from_cube",
            StageId::TransportAboveBucket => "transport_above_bucket",
            StageId::DescendIntoBucket => "descend_into_bucket",
            StageId::OpenGripper => "open_gripper",
            StageId::RetractFromBucket => "retract_from_bucket",
            StageId::Idle => "idle",
        }
    }

    /// Index of the cube the stage addresses, if any.
    pub fn cube(&self) -> Option<usize> {
        match self {
            StageId::ApproachAbove { cube }
            | StageId::DescendToCube { cube }
            | StageId::LiftFromCube { cube } => Some(*cube),
            _ => None,
        }
    }

    pub fn is_gripper_stage(&self) -> bool {
        matches!(self, StageId::CloseGripper | StageId::OpenGripper)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cube() {
            Some(cube) => write!(f, "{}(cube{})", self.name(), cube),
            None => write!(f, "{}", self.name()),
        }
    }
}

/// What the orchestrator does when a stage is current.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum StageAction {
    /// Plan the waypoints of the stage and execute the resulting trajectory.
    Move,
    /// Drive the gripper to the given fraction (0 = open, 1 = closed).
    Actuate { fraction: f64 },
    /// Do nothing, used by the terminal stage.
    Hold,
}

/// One phase of the task and its settle policy.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Stage {
    pub id: StageId,
    pub action: StageAction,
    /// Plans reaching less than this fraction of the requested path abort the task.
    pub min_acceptable_fraction: f64,
    /// Wait after the stage's motion or actuation before the next stage queries the pose.
    pub settle_delay: Duration,
    /// Extra time the planned trajectory stays on display before it is executed.
    pub visualize_pause: Duration,
}

impl Stage {
    fn motion(id: StageId, min_acceptable_fraction: f64, settle_delay: Duration) -> Self {
        Stage {
            id,
            action: StageAction::Move,
            min_acceptable_fraction,
            settle_delay,
            visualize_pause: Duration::from_secs(0),
        }
    }

    fn gripper(id: StageId, fraction: f64, settle_delay: Duration) -> Self {
        Stage {
            id,
            action: StageAction::Actuate { fraction },
            min_acceptable_fraction: 0.,
            settle_delay,
            visualize_pause: Duration::from_secs(0),
        }
    }

    fn with_visualize_pause(mut self, pause: Duration) -> Self {
        self.visualize_pause = pause;
        self
    }
}

/// Builds the stage table of a task picking `cube`.
///
/// The table is not validated against the configuration here, the
/// [`StageBuilder`] rejects cube indices the configuration does not know.
pub fn task_stages(cube: usize, config: &TaskConfig) -> Vec<Stage> {
    let min = config.min_plan_fraction();
    let preview = Duration::from_secs(2);
    let second = Duration::from_secs(1);
    StageId::sequence(cube)
        .iter()
        .map(|id| match id {
            StageId::Orient => Stage::motion(*id, min, second).with_visualize_pause(preview),
            StageId::ApproachAbove { .. } => {
                Stage::motion(*id, min, Duration::from_secs(2)).with_visualize_pause(preview)
            }
            StageId::CloseGripper => Stage::gripper(
                *id,
                config.gripper_close_fraction(),
                Duration::from_secs(5),
            ),
            StageId::OpenGripper => Stage::gripper(
                *id,
                config.gripper_open_fraction(),
                Duration::from_secs(0),
            ),
            StageId::Idle => Stage {
                id: *id,
                action: StageAction::Hold,
                min_acceptable_fraction: 0.,
                settle_delay: Duration::from_secs(0),
                visualize_pause: Duration::from_secs(0),
            },
            _ => Stage::motion(*id, min, second),
        })
        .collect()
}
