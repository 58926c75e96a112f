// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Wire types of the motion bridge protocol.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::exception::{PickPlaceException, PickPlaceResult};
use crate::gripper::JointState;
use crate::network::MessageCommand;
use crate::pose::Pose;
use crate::scene::SceneObject;
use std::convert::TryFrom;
use std::time::Duration;

pub static BRIDGE_VERSION: u16 = 1;
pub static COMMAND_PORT: u16 = 1337;

/// Maximum number of joints a joint state packet can carry.
pub const MAX_JOINTS: usize = 16;

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq)]
#[repr(u32)]
pub enum BridgeCommandEnum {
    Connect,
    GetCurrentPose,
    ConfigurePlanner,
    ComputeCartesianPath,
    DisplayTrajectory,
    ExecuteTrajectory,
    GetKnownObjects,
    AddBox,
    RemoveObject,
}

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
pub enum Status {
    Success,
    Fail,
    Rejected,
    Aborted,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct BridgeCommandHeader {
    pub command: BridgeCommandEnum,
    pub command_id: u32,
    /// Length of the whole message including this header.
    pub size: u32,
}

impl BridgeCommandHeader {
    pub fn new(command: BridgeCommandEnum, command_id: u32, size: u32) -> BridgeCommandHeader {
        BridgeCommandHeader {
            command,
            command_id,
            size,
        }
    }
}

impl MessageCommand for BridgeCommandHeader {
    fn get_command_message_id(&self) -> u32 {
        self.command_id
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Request<T> {
    pub header: BridgeCommandHeader,
    pub request: T,
}

impl<T: Serialize> Request<T> {
    /// Wraps `request` into a message whose header carries the encoded message length.
    pub fn new(command: BridgeCommandEnum, command_id: u32, request: T) -> PickPlaceResult<Self> {
        let mut message = Request {
            header: BridgeCommandHeader::new(command, command_id, 0),
            request,
        };
        message.header.size = bincode::serialized_size(&message)? as u32;
        Ok(message)
    }
}

impl<T> MessageCommand for Request<T> {
    fn get_command_message_id(&self) -> u32 {
        self.header.get_command_message_id()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Response<T> {
    pub header: BridgeCommandHeader,
    pub status: Status,
    pub response: T,
}

impl<T: Serialize> Response<T> {
    pub fn new(command: BridgeCommandEnum, command_id: u32, status: Status, response: T) -> PickPlaceResult<Self> {
        let mut message = Response {
            header: BridgeCommandHeader::new(command, command_id, 0),
            status,
            response,
        };
        message.header.size = bincode::serialized_size(&message)? as u32;
        Ok(message)
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct ConnectRequest {
    pub version: u16,
    pub udp_port: u16,
}

impl ConnectRequest {
    pub fn new(udp_port: u16) -> Self {
        ConnectRequest {
            version: BRIDGE_VERSION,
            udp_port,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectResponse {
    pub version: u16,
    /// Port on which the bridge accepts joint commands.
    pub command_udp_port: u16,
    pub planning_frame: String,
    pub end_effector_link: String,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct PoseIntern {
    pub position: [f64; 3],
    /// x, y, z, w
    pub orientation: [f64; 4],
}

impl From<PoseIntern> for Pose {
    fn from(pose: PoseIntern) -> Self {
        Pose::from_arrays(&pose.position, &pose.orientation)
    }
}

impl From<&Pose> for PoseIntern {
    fn from(pose: &Pose) -> Self {
        let (position, orientation) = pose.to_arrays();
        PoseIntern {
            position,
            orientation,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct PlannerSettingsRequest {
    pub goal_tolerance: f64,
    pub orientation_tolerance: f64,
    pub joint_tolerance: f64,
    pub planning_attempts: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CartesianPathRequest {
    pub waypoints: Vec<PoseIntern>,
    pub max_step: f64,
    pub jump_threshold: f64,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct CartesianPathResponse {
    pub trajectory_id: u32,
    pub fraction: f64,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct DisplayTrajectoryRequest {
    pub trajectory_id: u32,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct ExecuteTrajectoryRequest {
    pub trajectory_id: u32,
    pub wait: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KnownObjectsResponse {
    pub names: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AddBoxRequest {
    pub name: String,
    pub frame_id: String,
    pub pose: PoseIntern,
    pub size: [f64; 3],
}

impl From<&SceneObject> for AddBoxRequest {
    fn from(object: &SceneObject) -> Self {
        AddBoxRequest {
            name: object.name.clone(),
            frame_id: object.frame_id.clone(),
            pose: PoseIntern::from(&object.pose),
            size: object.size,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemoveObjectRequest {
    pub name: String,
}

/// Joint state packet exchanged over UDP in both directions.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct JointStateIntern {
    pub message_id: u64,
    pub stamp_nanos: u64,
    /// Number of valid entries in `position`.
    pub len: u32,
    pub position: [f64; MAX_JOINTS],
}

impl JointStateIntern {
    /// # Errors
    /// * [`InvalidArgument`](`crate::exception::PickPlaceException::InvalidArgument`) if the state has more than [`MAX_JOINTS`] joints.
    pub fn from_joint_state(message_id: u64, state: &JointState) -> PickPlaceResult<Self> {
        if state.position.len() > MAX_JOINTS {
            return Err(PickPlaceException::InvalidArgument {
                message: format!(
                    "joint state has {} joints but at most {} can be sent",
                    state.position.len(),
                    MAX_JOINTS
                ),
            });
        }
        let mut position = [0.; MAX_JOINTS];
        position[..state.position.len()].copy_from_slice(&state.position);
        Ok(JointStateIntern {
            message_id,
            stamp_nanos: state.stamp.as_nanos() as u64,
            len: state.position.len() as u32,
            position,
        })
    }
}

impl TryFrom<JointStateIntern> for JointState {
    type Error = PickPlaceException;

    /// # Errors
    /// * [`NetworkException`](`crate::exception::PickPlaceException::NetworkException`) if the packet claims more than [`MAX_JOINTS`] joints.
    fn try_from(state: JointStateIntern) -> PickPlaceResult<Self> {
        let len = state.len as usize;
        if len > MAX_JOINTS {
            return Err(PickPlaceException::NetworkException {
                message: format!(
                    "joint state packet claims {} joints but carries at most {}",
                    len, MAX_JOINTS
                ),
            });
        }
        Ok(JointState::new(
            state.position[..len].to_vec(),
            Duration::from_nanos(state.stamp_nanos),
        ))
    }
}
