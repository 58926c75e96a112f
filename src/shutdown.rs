// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the cooperative shutdown flag checked at every suspension point of a task.

use crate::exception::{PickPlaceException, PickPlaceResult};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static SIGNAL_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_: libc::c_int) {
    SIGNAL_RECEIVED.store(true, Ordering::SeqCst);
}

/// Shared flag telling a running task to stop.
///
/// Clones observe the same flag. A flag created with
/// [`with_signal_handlers`](`Self::with_signal_handlers`) is also raised by SIGINT and SIGTERM.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    requested: Arc<AtomicBool>,
    watch_signals: bool,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        ShutdownFlag::default()
    }

    /// Installs handlers for SIGINT and SIGTERM and returns a flag raised by them.
    /// # Errors
    /// * [`CommandException`](`crate::exception::PickPlaceException::CommandException`) if a handler cannot be installed.
    pub fn with_signal_handlers() -> PickPlaceResult<Self> {
        let action = SigAction::new(
            SigHandler::Handler(handle_signal),
            SaFlags::empty(),
            SigSet::empty(),
        );
        for signal in [Signal::SIGINT, Signal::SIGTERM].iter() {
            // the handler only stores to an atomic, which is async-signal-safe
            unsafe { sigaction(*signal, &action) }.map_err(|e| {
                PickPlaceException::CommandException {
                    message: format!("cannot install handler for {:?}: {}", signal, e),
                }
            })?;
        }
        Ok(ShutdownFlag {
            requested: Arc::new(AtomicBool::new(false)),
            watch_signals: true,
        })
    }

    /// Raises the flag.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
            || (self.watch_signals && SIGNAL_RECEIVED.load(Ordering::SeqCst))
    }

    /// Returns [`Interrupted`](`crate::exception::PickPlaceException::Interrupted`) if the flag is raised.
    pub fn check(&self) -> PickPlaceResult<()> {
        if self.is_requested() {
            Err(PickPlaceException::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::exception::PickPlaceException;
    use crate::shutdown::ShutdownFlag;

    #[test]
    fn clones_share_the_flag() {
        let flag = ShutdownFlag::new();
        let observer = flag.clone();
        assert!(observer.check().is_ok());
        flag.request();
        assert!(observer.is_requested());
        match observer.check() {
            Err(PickPlaceException::Interrupted) => {}
            other => panic!("expected interruption but found {:?}", other),
        }
    }
}
