// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the pickplace::PickPlaceOrchestrator type.

use std::fmt;
use std::time::Duration;

use tracing::{error, info};

use crate::context::{Pause, RobotBridge, TaskContext};
use crate::exception::{create_configuration_error, PickPlaceException, PickPlaceResult};
use crate::executor::{ExecutionOutcome, MotionExecutor};
use crate::gripper::GripperController;
use crate::planner::{PlannerSettings, PlanningParameters};
use crate::scene::prepare_scene;
use crate::stage::{task_stages, Stage, StageAction, StageBuilder, StageId};
use crate::task_config::TaskConfig;

/// Interval at which an idle task checks for a shutdown request.
const HOLD_POLL: Duration = Duration::from_millis(100);

/// Where a task stands.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TaskState {
    /// The stage runs on the next [`step`](`PickPlaceOrchestrator::step`).
    Active(StageId),
    /// Every stage completed. The robot holds its pose until shutdown.
    Idle,
    /// The task ended in `stage` and issues no further commands.
    Aborted { stage: StageId },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Active(_))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Active(stage) => write!(f, "active in {}", stage),
            TaskState::Idle => write!(f, "idle"),
            TaskState::Aborted { stage } => write!(f, "aborted in {}", stage),
        }
    }
}

/// Sequences the stages of one pick-and-place task.
///
/// Every stage queries the current pose, builds its waypoints, plans them and executes the plan.
/// Gripper stages actuate the fingers instead. A stage that fails in any way aborts the task,
/// there is no retry.
///
/// # Example
/// ```no_run
/// use pickplace::{PickPlaceOrchestrator, ShutdownFlag, SimulatedRobot, TaskConfig, TaskContext, TaskState};
///
/// let config = TaskConfig::new(0.75, [0.; 3], vec![[0.4, 0.2]], [0.6, -0.3]);
/// let mut orchestrator = PickPlaceOrchestrator::new(config, 0).unwrap();
/// let mut context = TaskContext::new(SimulatedRobot::default(), ShutdownFlag::new());
/// assert_eq!(orchestrator.run(&mut context), TaskState::Idle);
/// ```
pub struct PickPlaceOrchestrator {
    config: TaskConfig,
    stages: Vec<Stage>,
    cursor: usize,
    state: TaskState,
    builder: StageBuilder,
    executor: MotionExecutor,
    gripper: GripperController,
    parameters: PlanningParameters,
    visited: Vec<StageId>,
    failure: Option<PickPlaceException>,
}

impl PickPlaceOrchestrator {
    /// Creates a task picking `cube` and dropping it into the bucket.
    /// # Errors
    /// * [`ConfigurationError`](`crate::exception::PickPlaceException::ConfigurationError`) if the configuration
    /// has no cubes or `cube` is not one of them.
    pub fn new(config: TaskConfig, cube: usize) -> PickPlaceResult<Self> {
        if config.cube_num() == 0 {
            return Err(create_configuration_error(
                "the task configuration does not contain any cube",
            ));
        }
        config.cube(cube)?;
        let stages = task_stages(cube, &config);
        let state = TaskState::Active(stages[0].id);
        Ok(PickPlaceOrchestrator {
            config,
            stages,
            cursor: 0,
            state,
            builder: StageBuilder::default(),
            executor: MotionExecutor::default(),
            gripper: GripperController::default(),
            parameters: PlanningParameters::default(),
            visited: Vec::new(),
            failure: None,
        })
    }

    pub fn with_builder(mut self, builder: StageBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_executor(mut self, executor: MotionExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_gripper(mut self, gripper: GripperController) -> Self {
        self.gripper = gripper;
        self
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Stages in the order they were started, including the stage the task aborted in.
    pub fn visited(&self) -> &[StageId] {
        &self.visited
    }

    /// Error which aborted the task.
    pub fn failure(&self) -> Option<&PickPlaceException> {
        self.failure.as_ref()
    }

    /// Runs the current stage and moves to the next state.
    ///
    /// In a terminal state nothing happens and the state is returned unchanged.
    pub fn step<B: RobotBridge, P: Pause>(&mut self, context: &mut TaskContext<B, P>) -> TaskState {
        if self.state.is_terminal() {
            return self.state;
        }
        let stage = self.stages[self.cursor];
        self.visited.push(stage.id);
        info!("stage {} started", stage.id);
        match self.run_stage(&stage, context) {
            Ok(()) => self.advance(),
            Err(e) => {
                error!("task aborted in stage {}: {}", stage.id, e);
                self.failure = Some(e);
                self.state = TaskState::Aborted { stage: stage.id };
            }
        }
        self.state
    }

    /// Steps until the task is [`Idle`](`TaskState::Idle`) or [`Aborted`](`TaskState::Aborted`).
    pub fn run<B: RobotBridge, P: Pause>(&mut self, context: &mut TaskContext<B, P>) -> TaskState {
        while !self.state.is_terminal() {
            self.step(context);
        }
        self.state
    }

    /// Configures the planner, replaces the planning scene, runs every stage and holds an idle
    /// task until shutdown.
    ///
    /// # Return
    /// The final state. A task aborted in one of its stages is not an error, its cause is
    /// available through [`failure`](`Self::failure`).
    /// # Errors
    /// * [`NetworkException`](`crate::exception::PickPlaceException::NetworkException`) if the planner or the scene cannot be reached.
    /// * [`CommandException`](`crate::exception::PickPlaceException::CommandException`) if the planner rejects `settings` or the scene rejects an object.
    /// In both cases no stage was started.
    pub fn execute<B: RobotBridge, P: Pause>(
        &mut self,
        context: &mut TaskContext<B, P>,
        settings: &PlannerSettings,
    ) -> PickPlaceResult<TaskState> {
        context.bridge_mut().configure(settings)?;
        prepare_scene(context.bridge_mut(), &self.config)?;
        let state = self.run(context);
        match state {
            TaskState::Idle => {
                self.hold(context);
            }
            _ => {
                if let Some(failure) = &self.failure {
                    error!("{}: {}", state, failure);
                }
            }
        }
        Ok(state)
    }

    /// Keeps an idle task alive until a shutdown is requested. Nothing is sent to the robot.
    ///
    /// Returns immediately if the task is not idle.
    pub fn hold<B, P: Pause>(&self, context: &mut TaskContext<B, P>) -> TaskState {
        if self.state != TaskState::Idle {
            return self.state;
        }
        info!("task complete, holding until shutdown");
        while context.wait(HOLD_POLL).is_ok() {}
        info!("shutdown requested while idle");
        self.state
    }

    fn run_stage<B: RobotBridge, P: Pause>(
        &self,
        stage: &Stage,
        context: &mut TaskContext<B, P>,
    ) -> PickPlaceResult<()> {
        context.check_shutdown()?;
        match stage.action {
            StageAction::Move => {
                let current = context.bridge_mut().current_pose()?;
                let waypoints = self.builder.build(stage.id, &current, &self.config)?;
                let plan = context.bridge_mut().compute_cartesian_path(
                    &waypoints,
                    self.parameters.max_step,
                    self.parameters.jump_threshold,
                )?;
                context.check_shutdown()?;
                if !plan.meets(stage.min_acceptable_fraction) {
                    return Err(PickPlaceException::PlanningShortfall {
                        stage: stage.id,
                        fraction: plan.fraction,
                        required: stage.min_acceptable_fraction,
                    });
                }
                info!(
                    "stage {} planned {:.1}% of the path",
                    stage.id,
                    plan.fraction * 100.
                );
                match self
                    .executor
                    .execute(context, &plan.trajectory, stage.visualize_pause)?
                {
                    ExecutionOutcome::Completed => {}
                    ExecutionOutcome::Aborted => {
                        return Err(PickPlaceException::ExecutionFailure { stage: stage.id })
                    }
                }
            }
            StageAction::Actuate { fraction } => self.gripper.actuate(context, fraction)?,
            StageAction::Hold => {}
        }
        context.wait(stage.settle_delay)
    }

    fn advance(&mut self) {
        self.cursor += 1;
        let next = self.stages[self.cursor];
        if next.action == StageAction::Hold {
            self.visited.push(next.id);
            self.state = TaskState::Idle;
        } else {
            self.state = TaskState::Active(next.id);
        }
    }
}
