// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//!  Contains the pickplace::GripperController type.

use crate::context::{Pause, TaskContext};
use crate::exception::{PickPlaceException, PickPlaceResult};
use crate::gripper::joint_state::now_stamp;
use std::time::Duration;
use tracing::{debug, info};

pub mod joint_state;

pub use joint_state::JointState;

/// Number of finger joints at the end of the joint state.
pub const GRIPPER_JOINTS: usize = 3;
/// How often every gripper command is sent.
pub const COMMAND_REPETITIONS: usize = 3;
/// Rate at which repeated gripper commands are sent. Unit: \[Hz\]
pub const COMMAND_RATE: f64 = 10.;

/// Stream of joint state snapshots of the robot.
pub trait JointStateSource {
    /// Waits for the next joint state and returns the most recent one.
    fn wait_for_joint_state(&mut self) -> PickPlaceResult<JointState>;
}

/// Channel accepting joint position commands.
pub trait JointCommandSink {
    /// Sends a joint position command. Delivery is not acknowledged.
    fn publish_joint_command(&mut self, command: &JointState) -> PickPlaceResult<()>;
}

/// Drives the finger joints by republishing the current joint state with modified fingers.
///
/// There is no feedback whether the fingers reached their target. Every command is therefore
/// sent several times at a fixed rate, and the caller waits a settle delay afterwards.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GripperController {
    gripper_joints: usize,
    repetitions: usize,
    period: Duration,
}

impl Default for GripperController {
    fn default() -> Self {
        GripperController {
            gripper_joints: GRIPPER_JOINTS,
            repetitions: COMMAND_REPETITIONS,
            period: Duration::from_secs_f64(1. / COMMAND_RATE),
        }
    }
}

impl GripperController {
    /// # Arguments
    /// * `gripper_joints` - Number of finger joints at the end of the joint state.
    /// * `repetitions` - How often each command is sent.
    /// * `rate` - Rate of the repeated commands. \[Hz\]
    /// # Errors
    /// * [`InvalidArgument`](`crate::exception::PickPlaceException::InvalidArgument`) if `rate` is not positive and finite.
    pub fn new(gripper_joints: usize, repetitions: usize, rate: f64) -> PickPlaceResult<Self> {
        if !(rate.is_finite() && rate > 0.) {
            return Err(PickPlaceException::InvalidArgument {
                message: format!("gripper command rate must be positive but is {}", rate),
            });
        }
        Ok(GripperController {
            gripper_joints,
            repetitions,
            period: Duration::from_secs_f64(1. / rate),
        })
    }

    /// Moves the fingers to `fraction`.
    ///
    /// Reads the current joint state, overwrites the finger joints with `fraction` and publishes
    /// the result repeatedly.
    /// # Arguments
    /// * `context` - Task context providing the joint state stream and the command channel.
    /// * `fraction` - Target of the fingers, 0 is fully open and 1 fully closed.
    /// # Errors
    /// * [`InvalidArgument`](`crate::exception::PickPlaceException::InvalidArgument`) if `fraction` is not within \[0, 1\].
    /// * [`CommandException`](`crate::exception::PickPlaceException::CommandException`) if the joint state has too few joints.
    /// * [`NetworkException`](`crate::exception::PickPlaceException::NetworkException`) if the joint state cannot be received.
    /// * [`Interrupted`](`crate::exception::PickPlaceException::Interrupted`) if a shutdown was requested.
    pub fn actuate<B, P>(&self, context: &mut TaskContext<B, P>, fraction: f64) -> PickPlaceResult<()>
    where
        B: JointStateSource + JointCommandSink,
        P: Pause,
    {
        if !(0. ..=1.).contains(&fraction) {
            return Err(PickPlaceException::InvalidArgument {
                message: format!("gripper fraction must be within [0, 1] but is {}", fraction),
            });
        }
        context.check_shutdown()?;
        let current = context.bridge_mut().wait_for_joint_state()?;
        context.check_shutdown()?;
        let mut command =
            current.with_trailing_positions(self.gripper_joints, fraction, now_stamp())?;
        for i in 0..self.repetitions {
            command.stamp = now_stamp();
            context.bridge_mut().publish_joint_command(&command)?;
            debug!("published gripper command {}/{}", i + 1, self.repetitions);
            context.wait(self.period)?;
        }
        info!("gripper commanded to {:.3}", fraction);
        Ok(())
    }
}
