// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the [`TaskContext`] which owns everything a task talks to.
//!
//! The context is created when a task starts and dropped when it ends. It bundles the robot
//! bridge (planning, execution, display, joint states and scene), the pause policy used for
//! settle delays and the shutdown flag.

use crate::exception::PickPlaceResult;
use crate::executor::{TrajectoryDisplay, TrajectoryExecution};
use crate::gripper::{JointCommandSink, JointStateSource};
use crate::planner::CartesianPlanner;
use crate::pose::PoseSource;
use crate::scene::PlanningScene;
use crate::shutdown::ShutdownFlag;
use std::time::Duration;

/// Longest uninterrupted sleep, the shutdown flag is checked in between.
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Everything the orchestrator needs from the robot side.
pub trait RobotBridge:
    PoseSource
    + CartesianPlanner
    + TrajectoryExecution
    + TrajectoryDisplay
    + JointStateSource
    + JointCommandSink
    + PlanningScene
{
}

impl<T> RobotBridge for T where
    T: PoseSource
        + CartesianPlanner
        + TrajectoryExecution
        + TrajectoryDisplay
        + JointStateSource
        + JointCommandSink
        + PlanningScene
{
}

/// Lets time pass.
pub trait Pause {
    fn pause(&mut self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Default, Copy, Clone)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Explicit replacement for process-wide node, publisher and subscriber handles.
pub struct TaskContext<B, P = ThreadPause> {
    bridge: B,
    pause: P,
    shutdown: ShutdownFlag,
}

impl<B> TaskContext<B, ThreadPause> {
    pub fn new(bridge: B, shutdown: ShutdownFlag) -> Self {
        TaskContext::with_pause(bridge, ThreadPause, shutdown)
    }
}

impl<B, P: Pause> TaskContext<B, P> {
    pub fn with_pause(bridge: B, pause: P, shutdown: ShutdownFlag) -> Self {
        TaskContext {
            bridge,
            pause,
            shutdown,
        }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    pub fn pause_policy(&self) -> &P {
        &self.pause
    }

    /// Returns an error if a shutdown was requested.
    pub fn check_shutdown(&self) -> PickPlaceResult<()> {
        self.shutdown.check()
    }

    /// Waits for `duration` and checks the shutdown flag at least every 50 ms.
    /// # Errors
    /// * [`Interrupted`](`crate::exception::PickPlaceException::Interrupted`) if a shutdown was requested before or while waiting.
    pub fn wait(&mut self, duration: Duration) -> PickPlaceResult<()> {
        self.check_shutdown()?;
        let mut remaining = duration;
        while remaining > Duration::from_secs(0) {
            let slice = remaining.min(PAUSE_SLICE);
            self.pause.pause(slice);
            remaining -= slice;
            self.check_shutdown()?;
        }
        Ok(())
    }

    /// Gives back the bridge, closing the task's handles.
    pub fn into_bridge(self) -> B {
        self.bridge
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::context::{Pause, TaskContext};
    use crate::exception::PickPlaceException;
    use crate::shutdown::ShutdownFlag;
    use std::time::Duration;

    /// Records instead of sleeping. Optionally raises a shutdown flag once a total is reached.
    #[derive(Default)]
    pub(crate) struct RecordingPause {
        pub total: Duration,
        pub trigger: Option<(Duration, ShutdownFlag)>,
    }

    impl Pause for RecordingPause {
        fn pause(&mut self, duration: Duration) {
            self.total += duration;
            if let Some((after, flag)) = &self.trigger {
                if self.total >= *after {
                    flag.request();
                }
            }
        }
    }

    #[test]
    fn wait_accumulates_slices() {
        let mut context = TaskContext::with_pause((), RecordingPause::default(), ShutdownFlag::new());
        context.wait(Duration::from_millis(125)).unwrap();
        assert_eq!(context.pause_policy().total, Duration::from_millis(125));
    }

    #[test]
    fn wait_stops_on_shutdown() {
        let flag = ShutdownFlag::new();
        let pause = RecordingPause {
            total: Duration::from_secs(0),
            trigger: Some((Duration::from_millis(100), flag.clone())),
        };
        let mut context = TaskContext::with_pause((), pause, flag);
        match context.wait(Duration::from_secs(5)) {
            Err(PickPlaceException::Interrupted) => {}
            other => panic!("expected interruption but found {:?}", other),
        }
        assert_eq!(context.pause_policy().total, Duration::from_millis(100));
    }
}
