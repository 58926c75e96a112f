// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the interface of the Cartesian path planning service.

use crate::exception::PickPlaceResult;
use crate::pose::WaypointSequence;

/// Maximum Cartesian distance between two consecutive points of a planned path. Unit: \[m\]
pub const DEFAULT_MAX_STEP: f64 = 0.01;
/// Joint-space jump threshold of the planner, 0 disables the check.
pub const DEFAULT_JUMP_THRESHOLD: f64 = 0.0;

/// Opaque reference to a trajectory held by the planning service.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TrajectoryHandle(pub u32);

/// Outcome of a Cartesian planning request.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PlanResult {
    pub trajectory: TrajectoryHandle,
    /// Part of the requested path the planner could satisfy, within \[0, 1\].
    pub fraction: f64,
}

impl PlanResult {
    /// Returns true if at least `min_fraction` of the path was planned.
    /// A NaN fraction never meets a threshold.
    pub fn meets(&self, min_fraction: f64) -> bool {
        self.fraction >= min_fraction
    }
}

/// Interpolation parameters passed along with every planning request.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PlanningParameters {
    pub max_step: f64,
    pub jump_threshold: f64,
}

impl Default for PlanningParameters {
    fn default() -> Self {
        PlanningParameters {
            max_step: DEFAULT_MAX_STEP,
            jump_threshold: DEFAULT_JUMP_THRESHOLD,
        }
    }
}

/// Goal tolerances and effort of the planning service, applied once before the task starts.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PlannerSettings {
    /// Unit: \[m\]
    pub goal_tolerance: f64,
    /// Unit: \[rad\]
    pub orientation_tolerance: f64,
    /// Unit: \[rad\]
    pub joint_tolerance: f64,
    pub planning_attempts: u32,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        PlannerSettings {
            goal_tolerance: 0.01,
            orientation_tolerance: 0.01,
            joint_tolerance: 0.01,
            planning_attempts: 100,
        }
    }
}

/// Computes joint trajectories following Cartesian waypoints.
pub trait CartesianPlanner {
    /// Applies tolerances and effort settings to all following requests.
    fn configure(&mut self, settings: &PlannerSettings) -> PickPlaceResult<()>;

    /// Plans a path through `waypoints`. Blocks until the planning service answers.
    ///
    /// # Arguments
    /// * `waypoints` - Poses to pass through, starting at the current pose.
    /// * `max_step` - Maximum Cartesian distance between interpolated points. \[m\]
    /// * `jump_threshold` - Maximum allowed joint-space jump, 0 disables the check.
    fn compute_cartesian_path(
        &mut self,
        waypoints: &WaypointSequence,
        max_step: f64,
        jump_threshold: f64,
    ) -> PickPlaceResult<PlanResult>;
}
