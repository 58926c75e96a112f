// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! # pick-place-rs
//! pick-place-rs sequences a robot arm through picking one cube from a table and dropping it
//! into a bucket. Planning, execution, visualization and the planning scene are provided by a
//! motion bridge the library talks to over TCP and UDP.
//!
//! **ALWAYS HAVE THE USER STOP BUTTON AT
//! HAND WHILE THE ROBOT IS MOVING!**
//!
//! ## Design
//! A task is a fixed table of stages:
//!
//! Orient → ApproachAbove → DescendToCube → CloseGripper → LiftFromCube →
//! TransportAboveBucket → DescendIntoBucket → OpenGripper → RetractFromBucket → Idle
//!
//! For every motion stage the [`PickPlaceOrchestrator`] queries the current end-effector pose,
//! lets the [`StageBuilder`] turn it into Cartesian waypoints, asks the planner for a
//! trajectory, rejects plans which cover less than the configured fraction of the path and
//! executes the rest through the [`MotionExecutor`]. Gripper stages are handled by the
//! [`GripperController`]. Any failure aborts the task in the stage it occurred in.
//!
//! Everything the orchestrator talks to is hidden behind the traits collected in
//! [`RobotBridge`]. [`MotionBridge`] implements them for a real robot and [`SimulatedRobot`]
//! for dry runs.
//!
//! # Example:
//!```no_run
//! use std::time::Duration;
//! use pickplace::{
//!     MotionBridge, PickPlaceOrchestrator, PickPlaceResult, PlannerSettings, ShutdownFlag,
//!     TaskConfig, TaskContext, COMMAND_PORT,
//! };
//! fn main() -> PickPlaceResult<()> {
//!     let config = TaskConfig::from_file("task.yaml")?;
//!     let shutdown = ShutdownFlag::with_signal_handlers()?;
//!     let bridge = MotionBridge::new("localhost", COMMAND_PORT, Duration::from_secs(1), shutdown.clone())?;
//!     let mut orchestrator = PickPlaceOrchestrator::new(config, 0)?;
//!     let mut context = TaskContext::new(bridge, shutdown);
//!     let state = orchestrator.execute(&mut context, &PlannerSettings::default())?;
//!     println!("task ended {}", state);
//!     Ok(())
//! }
//! ```
//!
//! The task configuration holds the table height, the shared orientation of cubes and bucket,
//! the cube positions and the bucket position:
//! ```yaml
//! cube_bucket_orientRPY: [0.0, 0.0, 0.0]
//! bucket_XYZ: [0.6, -0.3, 0.0]
//! cube_num: 1
//! cube0_XYZ: [0.4, 0.2, 0.0]
//! ```
//! The z values are replaced by the table height.

pub mod bridge;
pub mod context;
pub mod exception;
pub mod executor;
pub mod gripper;
mod network;
pub mod orchestrator;
pub mod planner;
pub mod pose;
pub mod scene;
pub mod shutdown;
pub mod sim;
pub mod stage;
pub mod task_config;
pub mod utils;

pub use bridge::{MotionBridge, COMMAND_PORT};
pub use context::{Pause, RobotBridge, TaskContext, ThreadPause};
pub use exception::{PickPlaceException, PickPlaceResult};
pub use executor::{ExecutionOutcome, MotionExecutor, TrajectoryDisplay, TrajectoryExecution};
pub use gripper::{GripperController, JointCommandSink, JointState, JointStateSource};
pub use orchestrator::{PickPlaceOrchestrator, TaskState};
pub use planner::{
    CartesianPlanner, PlanResult, PlannerSettings, PlanningParameters, TrajectoryHandle,
};
pub use pose::{Pose, PoseSource, WaypointSequence};
pub use scene::{prepare_scene, PlanningScene, SceneObject};
pub use shutdown::ShutdownFlag;
pub use sim::SimulatedRobot;
pub use stage::{Stage, StageAction, StageBuilder, StageId};
pub use task_config::TaskConfig;
pub use utils::*;
