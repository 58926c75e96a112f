// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the pickplace::MotionExecutor type.

use crate::context::{Pause, TaskContext};
use crate::exception::PickPlaceResult;
use crate::planner::TrajectoryHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Time the display gets to pick up a trajectory before it is published.
pub const DEFAULT_DISPLAY_DELAY: Duration = Duration::from_millis(500);

/// Result of executing a trajectory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Aborted,
}

/// Service executing planned trajectories on the robot.
pub trait TrajectoryExecution {
    /// Executes `trajectory`.
    ///
    /// # Arguments
    /// * `trajectory` - Trajectory returned by the planner.
    /// * `wait` - Block until the robot reports the end of the motion.
    /// # Return
    /// True if the trajectory completed, false if the service reports a failure.
    fn execute_trajectory(&mut self, trajectory: &TrajectoryHandle, wait: bool)
        -> PickPlaceResult<bool>;
}

/// Receives planned trajectories for visualization. Delivery is best effort.
pub trait TrajectoryDisplay {
    /// Publishes `trajectory` together with the current robot state as its start.
    fn display_trajectory(&mut self, trajectory: &TrajectoryHandle) -> PickPlaceResult<()>;
}

/// Shows a trajectory and then executes it, blocking until the robot is done.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MotionExecutor {
    display_delay: Duration,
}

impl Default for MotionExecutor {
    fn default() -> Self {
        MotionExecutor::new(DEFAULT_DISPLAY_DELAY)
    }
}

impl MotionExecutor {
    pub fn new(display_delay: Duration) -> Self {
        MotionExecutor { display_delay }
    }

    /// Executes `trajectory` synchronously.
    ///
    /// The trajectory is published to the display first. A failing display is logged and
    /// otherwise ignored. Once the execution service returns, the robot has reached the end of
    /// the trajectory or stopped.
    ///
    /// # Arguments
    /// * `context` - Task context providing the execution service and the display.
    /// * `trajectory` - Trajectory to execute.
    /// * `visualize_pause` - Time the trajectory stays on display before the robot moves.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::PickPlaceException::NetworkException`) if the execution service cannot be reached.
    /// * [`Interrupted`](`crate::exception::PickPlaceException::Interrupted`) if a shutdown was requested before the motion started.
    pub fn execute<B, P>(
        &self,
        context: &mut TaskContext<B, P>,
        trajectory: &TrajectoryHandle,
        visualize_pause: Duration,
    ) -> PickPlaceResult<ExecutionOutcome>
    where
        B: TrajectoryExecution + TrajectoryDisplay,
        P: Pause,
    {
        context.wait(self.display_delay)?;
        if let Err(e) = context.bridge_mut().display_trajectory(trajectory) {
            warn!("could not display trajectory {}: {}", trajectory.0, e);
        }
        context.wait(visualize_pause)?;
        debug!("executing trajectory {}", trajectory.0);
        let completed = context
            .bridge_mut()
            .execute_trajectory(trajectory, true)?;
        context.check_shutdown()?;
        if completed {
            info!("trajectory {} completed", trajectory.0);
            Ok(ExecutionOutcome::Completed)
        } else {
            warn!("trajectory {} did not complete", trajectory.0);
            Ok(ExecutionOutcome::Aborted)
        }
    }
}
