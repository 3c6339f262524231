//! SIGINT handling for the bootstrap.
//!
//! The handler only stores to an atomic flag. Long-running steps poll
//! [`Interrupt::check`] at their suspension points and unwind with
//! [`BootstrapError::Interrupted`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::signal::SIGINT;
use signal_hook::flag;
use tracing::debug;

use crate::errors::BootstrapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    /// Registers process signal handlers on first install.
    System,
    /// Never touches process signal state; triggered by hand.
    Detached,
    /// Installation always fails.
    #[cfg(any(test, feature = "test-support"))]
    Unavailable,
}

/// Shared interruption flag.
#[derive(Debug, Clone)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    installed: Arc<AtomicBool>,
    registration: Registration,
}

impl Interrupt {
    /// Flag backed by the process SIGINT handler once installed.
    pub fn system() -> Self {
        Self::with_registration(Registration::System)
    }

    /// Flag that is only set through [`Interrupt::trigger`].
    pub fn detached() -> Self {
        Self::with_registration(Registration::Detached)
    }

    /// Flag whose handler installation fails.
    #[cfg(any(test, feature = "test-support"))]
    pub fn unavailable() -> Self {
        Self::with_registration(Registration::Unavailable)
    }

    fn with_registration(registration: Registration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            installed: Arc::new(AtomicBool::new(false)),
            registration,
        }
    }

    /// Install the SIGINT handler. Idempotent.
    ///
    /// Every SIGINT only sets the flag. Repeated interrupts never terminate the
    /// process from the handler, so reporting and cleanup still run; the engine
    /// wait loop kills a child that outlives its grace period.
    pub fn install(&self) -> Result<(), BootstrapError> {
        match self.registration {
            Registration::System => {}
            Registration::Detached => return Ok(()),
            #[cfg(any(test, feature = "test-support"))]
            Registration::Unavailable => {
                return Err(BootstrapError::SignalInstall(std::io::Error::other(
                    "signal handlers unavailable",
                )));
            }
        }
        if self.installed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        flag::register(SIGINT, Arc::clone(&self.flag)).map_err(BootstrapError::SignalInstall)?;
        debug!("signal handler installed");
        Ok(())
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with [`BootstrapError::Interrupted`] once the flag is set.
    pub fn check(&self) -> Result<(), BootstrapError> {
        if self.is_set() {
            return Err(BootstrapError::Interrupted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_flag_trips_on_trigger() {
        let interrupt = Interrupt::detached();
        interrupt.install().expect("install");
        assert!(interrupt.check().is_ok());

        interrupt.clone().trigger();
        assert!(matches!(
            interrupt.check(),
            Err(BootstrapError::Interrupted)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn sigint_sets_installed_flag() {
        use nix::sys::signal::{Signal, raise};

        let interrupt = Interrupt::system();
        interrupt.install().expect("install");
        interrupt.install().expect("second install is a no-op");
        assert!(!interrupt.is_set());

        raise(Signal::SIGINT).expect("raise SIGINT");
        assert!(interrupt.is_set());

        // A repeated interrupt leaves the process running with the flag set.
        raise(Signal::SIGINT).expect("raise SIGINT again");
        assert!(interrupt.is_set());
        assert!(matches!(
            interrupt.check(),
            Err(BootstrapError::Interrupted)
        ));
    }
}
