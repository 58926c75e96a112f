// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the pickplace::JointState type.

use crate::exception::{PickPlaceException, PickPlaceResult};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Snapshot of all joint positions of the robot, including the finger joints.
#[derive(Debug, Clone, PartialEq)]
pub struct JointState {
    /// Joint positions in the order of the robot description. Unit: \[rad\] or \[m\]
    pub position: Vec<f64>,

    /// Time since the UNIX epoch at which the snapshot was taken or the command was sent.
    pub stamp: Duration,
}

impl JointState {
    pub fn new(position: Vec<f64>, stamp: Duration) -> Self {
        JointState { position, stamp }
    }

    /// Returns a copy of this state with the last `count` positions set to `value` and the
    /// given stamp.
    /// # Errors
    /// * [`CommandException`](`crate::exception::PickPlaceException::CommandException`) if the state has fewer than `count` joints.
    pub fn with_trailing_positions(
        &self,
        count: usize,
        value: f64,
        stamp: Duration,
    ) -> PickPlaceResult<JointState> {
        if self.position.len() < count {
            return Err(PickPlaceException::CommandException {
                message: format!(
                    "joint state has {} joints but {} gripper joints are expected",
                    self.position.len(),
                    count
                ),
            });
        }
        let mut position = self.position.clone();
        let first = position.len() - count;
        for joint in position[first..].iter_mut() {
            *joint = value;
        }
        Ok(JointState { position, stamp })
    }
}

/// Current wall clock time as duration since the UNIX epoch.
pub fn now_stamp() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
