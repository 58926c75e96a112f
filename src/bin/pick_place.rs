// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later
use clap::Parser;
use pickplace::{
    MotionBridge, PickPlaceException, PickPlaceOrchestrator, PickPlaceResult, PlannerSettings,
    RobotBridge, ShutdownFlag, SimulatedRobot, TaskConfig, TaskContext, TaskState,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Picks a cube from the table and drops it into the bucket.
///
/// Exits with 0 once the task completed and a shutdown was requested, 1 for an invalid
/// configuration, 2 if the task aborted in one of its stages and 3 if it could not be started.
#[derive(Parser, Debug)]
#[clap(author, version, name = "pick_place")]
struct CommandLineArguments {
    /// Task configuration (YAML, TOML or JSON)
    pub config: PathBuf,
    /// IP-Address or hostname of the motion bridge
    #[clap(long, default_value = "localhost")]
    pub host: String,
    /// TCP command port of the motion bridge
    #[clap(long, default_value = "1337")]
    pub port: u16,
    /// Index of the cube to pick
    #[clap(long, default_value = "0")]
    pub cube: usize,
    /// Run against a simulated robot instead of the motion bridge
    #[clap(long)]
    pub simulate: bool,
    /// Longest wait for a joint state in seconds
    #[clap(long, default_value = "1.0")]
    pub joint_state_timeout: f64,
}

fn main() {
    let args: CommandLineArguments = CommandLineArguments::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let code = match run(&args) {
        Ok(TaskState::Idle) => 0,
        Ok(_) => 2,
        Err(
            e @ PickPlaceException::ConfigurationError { .. }
            | e @ PickPlaceException::InvalidArgument { .. },
        ) => {
            error!("{}", e);
            1
        }
        Err(e) => {
            error!("task could not be started: {}", e);
            3
        }
    };
    std::process::exit(code);
}

fn run(args: &CommandLineArguments) -> PickPlaceResult<TaskState> {
    let config = TaskConfig::from_file(&args.config)?;
    let orchestrator = PickPlaceOrchestrator::new(config, args.cube)?;
    let shutdown = ShutdownFlag::with_signal_handlers()?;
    if args.simulate {
        info!("running against the simulated robot");
        execute(SimulatedRobot::default(), orchestrator, shutdown)
    } else {
        if !(args.joint_state_timeout.is_finite() && args.joint_state_timeout > 0.) {
            return Err(PickPlaceException::InvalidArgument {
                message: format!(
                    "joint state timeout must be positive but is {}",
                    args.joint_state_timeout
                ),
            });
        }
        let bridge = MotionBridge::new(
            args.host.as_str(),
            args.port,
            Duration::from_secs_f64(args.joint_state_timeout),
            shutdown.clone(),
        )?;
        execute(bridge, orchestrator, shutdown)
    }
}

fn execute<B: RobotBridge>(
    bridge: B,
    mut orchestrator: PickPlaceOrchestrator,
    shutdown: ShutdownFlag,
) -> PickPlaceResult<TaskState> {
    let mut context = TaskContext::new(bridge, shutdown);
    orchestrator.execute(&mut context, &PlannerSettings::default())
}
