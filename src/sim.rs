// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the pickplace::SimulatedRobot type.
//!
//! The simulated robot answers every request of the task in process. Planning always reaches the
//! last waypoint unless a shortfall is injected, execution teleports the end effector to the goal
//! of the trajectory and joint commands are applied to the joint state immediately.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use nalgebra::Point3;
use tracing::debug;

use crate::exception::{create_command_exception, PickPlaceResult};
use crate::executor::{TrajectoryDisplay, TrajectoryExecution};
use crate::gripper::joint_state::now_stamp;
use crate::gripper::{JointCommandSink, JointState, JointStateSource};
use crate::planner::{CartesianPlanner, PlanResult, PlannerSettings, TrajectoryHandle};
use crate::pose::{Pose, PoseSource, WaypointSequence};
use crate::scene::{PlanningScene, SceneObject};
use crate::utils::array_to_quaternion;

/// Arm joints followed by three finger joints.
pub const SIMULATED_JOINTS: usize = 9;

/// End effector pose the simulated robot starts in.
pub fn home_pose() -> Pose {
    Pose::new(
        Point3::new(0.3, 0.0, 1.3),
        array_to_quaternion(&[0., 0., 0., 1.]),
    )
}

/// Deterministic in-process robot.
#[derive(Debug, Clone)]
pub struct SimulatedRobot {
    pose: Pose,
    joint_state: JointState,
    settings: Option<PlannerSettings>,
    trajectories: HashMap<u32, Pose>,
    next_trajectory: u32,
    fraction_overrides: HashMap<usize, f64>,
    failing_executions: Vec<usize>,
    planned: Vec<WaypointSequence>,
    executed: Vec<TrajectoryHandle>,
    displayed: Vec<TrajectoryHandle>,
    joint_commands: Vec<JointState>,
    scene: BTreeMap<String, SceneObject>,
}

impl Default for SimulatedRobot {
    fn default() -> Self {
        SimulatedRobot::new(home_pose())
    }
}

impl SimulatedRobot {
    pub fn new(pose: Pose) -> Self {
        SimulatedRobot {
            pose,
            joint_state: JointState::new(vec![0.; SIMULATED_JOINTS], Duration::from_secs(0)),
            settings: None,
            trajectories: HashMap::new(),
            next_trajectory: 1,
            fraction_overrides: HashMap::new(),
            failing_executions: Vec::new(),
            planned: Vec::new(),
            executed: Vec::new(),
            displayed: Vec::new(),
            joint_commands: Vec::new(),
            scene: BTreeMap::new(),
        }
    }

    /// Makes the planning request with the given zero-based index report `fraction`.
    pub fn with_plan_fraction(mut self, request: usize, fraction: f64) -> Self {
        self.fraction_overrides.insert(request, fraction);
        self
    }

    /// Makes the execution request with the given zero-based index fail.
    pub fn with_failing_execution(mut self, request: usize) -> Self {
        self.failing_executions.push(request);
        self
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn joint_state(&self) -> &JointState {
        &self.joint_state
    }

    pub fn settings(&self) -> Option<&PlannerSettings> {
        self.settings.as_ref()
    }

    /// Every waypoint sequence passed to the planner, in call order.
    pub fn planned(&self) -> &[WaypointSequence] {
        &self.planned
    }

    pub fn executed(&self) -> &[TrajectoryHandle] {
        &self.executed
    }

    pub fn displayed(&self) -> &[TrajectoryHandle] {
        &self.displayed
    }

    pub fn joint_commands(&self) -> &[JointState] {
        &self.joint_commands
    }

    pub fn scene_objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.scene.values()
    }
}

impl PoseSource for SimulatedRobot {
    fn current_pose(&mut self) -> PickPlaceResult<Pose> {
        Ok(self.pose)
    }
}

impl CartesianPlanner for SimulatedRobot {
    fn configure(&mut self, settings: &PlannerSettings) -> PickPlaceResult<()> {
        self.settings = Some(*settings);
        Ok(())
    }

    fn compute_cartesian_path(
        &mut self,
        waypoints: &WaypointSequence,
        _max_step: f64,
        _jump_threshold: f64,
    ) -> PickPlaceResult<PlanResult> {
        let request = self.planned.len();
        let fraction = self
            .fraction_overrides
            .get(&request)
            .copied()
            .unwrap_or(1.);
        let trajectory = TrajectoryHandle(self.next_trajectory);
        self.next_trajectory += 1;
        self.trajectories.insert(trajectory.0, *waypoints.goal());
        self.planned.push(waypoints.clone());
        debug!(
            "simulated plan {} through {} waypoints, fraction {}",
            trajectory.0,
            waypoints.len(),
            fraction
        );
        Ok(PlanResult {
            trajectory,
            fraction,
        })
    }
}

impl TrajectoryDisplay for SimulatedRobot {
    fn display_trajectory(&mut self, trajectory: &TrajectoryHandle) -> PickPlaceResult<()> {
        self.displayed.push(*trajectory);
        Ok(())
    }
}

impl TrajectoryExecution for SimulatedRobot {
    fn execute_trajectory(
        &mut self,
        trajectory: &TrajectoryHandle,
        _wait: bool,
    ) -> PickPlaceResult<bool> {
        let request = self.executed.len();
        self.executed.push(*trajectory);
        let goal = *self
            .trajectories
            .get(&trajectory.0)
            .ok_or_else(|| create_command_exception("simulated robot: unknown trajectory"))?;
        if self.failing_executions.contains(&request) {
            debug!("simulated execution of trajectory {} fails", trajectory.0);
            return Ok(false);
        }
        self.pose = goal;
        Ok(true)
    }
}

impl JointStateSource for SimulatedRobot {
    fn wait_for_joint_state(&mut self) -> PickPlaceResult<JointState> {
        self.joint_state.stamp = now_stamp();
        Ok(self.joint_state.clone())
    }
}

impl JointCommandSink for SimulatedRobot {
    fn publish_joint_command(&mut self, command: &JointState) -> PickPlaceResult<()> {
        if command.position.len() != self.joint_state.position.len() {
            return Err(create_command_exception(
                "simulated robot: joint command has the wrong number of joints",
            ));
        }
        self.joint_state = command.clone();
        self.joint_commands.push(command.clone());
        Ok(())
    }
}

impl PlanningScene for SimulatedRobot {
    fn known_objects(&mut self) -> PickPlaceResult<Vec<String>> {
        Ok(self.scene.keys().cloned().collect())
    }

    fn remove_object(&mut self, name: &str) -> PickPlaceResult<()> {
        self.scene.remove(name);
        Ok(())
    }

    fn add_box(&mut self, object: &SceneObject) -> PickPlaceResult<()> {
        self.scene.insert(object.name.clone(), object.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::executor::TrajectoryExecution;
    use crate::gripper::{JointCommandSink, JointStateSource};
    use crate::planner::CartesianPlanner;
    use crate::pose::{PoseSource, WaypointSequence};
    use crate::scene::prepare_scene;
    use crate::sim::{home_pose, SimulatedRobot, SIMULATED_JOINTS};
    use crate::task_config::TaskConfig;

    #[test]
    fn execution_reaches_goal() {
        let mut robot = SimulatedRobot::default();
        let start = robot.current_pose().unwrap();
        let waypoints =
            WaypointSequence::new(start, vec![start.with_z(1.0), start.with_z(0.9)]).unwrap();
        let plan = robot.compute_cartesian_path(&waypoints, 0.01, 0.).unwrap();
        assert_eq!(plan.fraction, 1.);
        assert!(robot.execute_trajectory(&plan.trajectory, true).unwrap());
        assert_eq!(robot.current_pose().unwrap().position.z, 0.9);
    }

    #[test]
    fn injected_faults() {
        let mut robot = SimulatedRobot::default()
            .with_plan_fraction(1, 0.4)
            .with_failing_execution(0);
        let start = robot.current_pose().unwrap();
        let waypoints = WaypointSequence::new(start, vec![start.with_z(1.0)]).unwrap();
        let first = robot.compute_cartesian_path(&waypoints, 0.01, 0.).unwrap();
        let second = robot.compute_cartesian_path(&waypoints, 0.01, 0.).unwrap();
        assert_eq!(first.fraction, 1.);
        assert_eq!(second.fraction, 0.4);
        assert!(!robot.execute_trajectory(&first.trajectory, true).unwrap());
        assert_eq!(*robot.pose(), home_pose());
    }

    #[test]
    fn joint_commands_update_state() {
        let mut robot = SimulatedRobot::default();
        let state = robot.wait_for_joint_state().unwrap();
        assert_eq!(state.position.len(), SIMULATED_JOINTS);
        let command = state
            .with_trailing_positions(3, 0.7, state.stamp)
            .unwrap();
        robot.publish_joint_command(&command).unwrap();
        assert_eq!(robot.joint_state().position[SIMULATED_JOINTS - 1], 0.7);
        assert_eq!(robot.joint_commands().len(), 1);
    }

    #[test]
    fn scene_is_replaced() {
        let mut robot = SimulatedRobot::default();
        let config = TaskConfig::new(0.75, [0.; 3], vec![[0.4, 0.2], [0.1, 0.1]], [0.6, -0.3]);
        prepare_scene(&mut robot, &config).unwrap();
        let smaller = TaskConfig::new(0.75, [0.; 3], vec![[0.4, 0.2]], [0.6, -0.3]);
        prepare_scene(&mut robot, &smaller).unwrap();
        let names: Vec<&str> = robot.scene_objects().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["bucket", "cube0"]);
    }
}
