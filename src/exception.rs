// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains exception and Result definitions
use crate::stage::StageId;
use thiserror::Error;

/// Represents all kind of errors which can end a pick-and-place task.
#[derive(Error, Debug)]
pub enum PickPlaceException {
    /// ConfigurationError is returned if task parameters are missing or malformed.
    /// No stage is attempted when the configuration is rejected.
    #[error("configuration error: {message}")]
    ConfigurationError { message: String },

    /// PlanningShortfall is returned if the planner could only satisfy a part of the requested
    /// Cartesian path and that part is below the threshold of the stage.
    #[error("planning shortfall in stage {stage}: achieved fraction {fraction:.3} but {required:.3} is required")]
    PlanningShortfall {
        /// Stage which was planned.
        stage: StageId,
        /// Fraction reported by the planner.
        fraction: f64,
        /// Minimum fraction accepted by the stage.
        required: f64,
    },

    /// ExecutionFailure is returned if the execution service reports that a trajectory
    /// did not complete.
    #[error("execution of stage {stage} did not complete")]
    ExecutionFailure { stage: StageId },

    /// InvalidArgument is returned if a precondition of an operation is violated.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// IncompatibleVersionException is returned if the motion bridge does not support this version of the client.
    #[error("Incompatible library version: bridge has version {server_version:?} and pick-place-rs has {library_version:?}")]
    IncompatibleLibraryVersionError {
        /// Bridge protocol version.
        server_version: u16,
        /// pick-place-rs protocol version.
        library_version: u16,
    },

    /// NetworkException is returned if a connection to the bridge cannot be established, or when a timeout occurs.
    #[error("{message:?}")]
    NetworkException { message: String },

    /// CommandException is returned if the bridge rejects or fails a command.
    #[error("{message:?}")]
    CommandException { message: String },

    /// Interrupted is returned when a shutdown was requested while the task was waiting.
    #[error("task interrupted by shutdown request")]
    Interrupted,
}

/// creates a CommandException from a static string slice
pub(crate) fn create_command_exception(message: &'static str) -> PickPlaceException {
    PickPlaceException::CommandException {
        message: message.to_string(),
    }
}

/// creates a ConfigurationError from anything printable
pub(crate) fn create_configuration_error<T: ToString>(message: T) -> PickPlaceException {
    PickPlaceException::ConfigurationError {
        message: message.to_string(),
    }
}

impl From<::config::ConfigError> for PickPlaceException {
    fn from(error: ::config::ConfigError) -> Self {
        create_configuration_error(error)
    }
}

impl From<bincode::Error> for PickPlaceException {
    fn from(error: bincode::Error) -> Self {
        PickPlaceException::NetworkException {
            message: format!("malformed bridge message: {}", error),
        }
    }
}

/// Result type which can have PickPlaceException as Error
pub type PickPlaceResult<T> = Result<T, PickPlaceException>;
