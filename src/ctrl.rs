//! Running the simulator off the main thread.
//!
//! [`SimController`] owns a [`Simulator`] and hands it to a worker
//! thread for the duration of a run, so a frontend can keep servicing
//! input and pause requests while the machine executes. While a run is
//! in flight the simulator is inaccessible; once the run finishes (or
//! [`SimController::pause`] is called), the simulator comes back and
//! can be inspected again.
//!
//! ```no_run
//! use lc3_forge::ctrl::SimController;
//! use lc3_forge::sim::Simulator;
//!
//! let mut ctrl = SimController::new(Simulator::new(Default::default()));
//! ctrl.execute(
//!     |sim| sim.run(),
//!     |pause| println!("stopped: {pause:?}")
//! ).unwrap();
//!
//! // ... later, from the UI thread:
//! let sim = ctrl.pause().unwrap();
//! println!("paused at x{:04X}", sim.pc);
//! ```

use std::borrow::Cow;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crossbeam_channel as cbc;

use crate::sim::{Simulator, MCR};

/// How long [`SimController::pause`] waits between latch clears while
/// the worker thread winds down.
const PAUSE_RETRY: Duration = Duration::from_millis(10);

/// Errors from operations that need an idle simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErr {
    /// The simulator is currently running on the worker thread.
    NotAvailable,
    /// A previous run panicked, taking the simulator with it.
    Poisoned
}
impl std::fmt::Display for ExecErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAvailable => f.write_str("simulator is currently running"),
            Self::Poisoned     => f.write_str("simulator was lost to a panicked run"),
        }
    }
}
impl std::error::Error for ExecErr {}
impl crate::err::Error for ExecErr {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            Self::NotAvailable => Some("pause the simulator or wait for it to finish".into()),
            Self::Poisoned     => None,
        }
    }
}

enum SimState {
    Idle(Box<Simulator>),
    Running {
        mcr: MCR,
        handle: cbc::Receiver<Box<Simulator>>
    },
    Poison
}

/// Owns a [`Simulator`] and runs it on a worker thread.
///
/// See the [module docs](self) for usage.
pub struct SimController {
    state: SimState
}
impl SimController {
    /// Creates a controller owning the given simulator.
    pub fn new(sim: Simulator) -> Self {
        Self { state: SimState::Idle(Box::new(sim)) }
    }

    /// Reclaims the simulator if the worker thread has finished.
    fn update_state(&mut self) {
        if let SimState::Running { handle, .. } = &self.state {
            match handle.try_recv() {
                Ok(sim) => self.state = SimState::Idle(sim),
                Err(cbc::TryRecvError::Empty) => {},
                Err(cbc::TryRecvError::Disconnected) => self.state = SimState::Poison,
            }
        }
    }

    /// Whether a run is currently in flight.
    pub fn is_running(&mut self) -> bool {
        self.update_state();
        matches!(self.state, SimState::Running { .. })
    }

    /// The simulator, if it is not currently running.
    pub fn simulator(&mut self) -> Result<&mut Simulator, ExecErr> {
        self.update_state();
        match &mut self.state {
            SimState::Idle(sim) => Ok(sim),
            SimState::Running { .. } => Err(ExecErr::NotAvailable),
            SimState::Poison => Err(ExecErr::Poisoned),
        }
    }

    /// Hands the simulator to a worker thread and runs `exec` on it.
    ///
    /// Once `exec` returns, the simulator is handed back to the
    /// controller and `close` is called with the result. `close` runs
    /// on the worker thread, so it is typically a channel send or an
    /// event notification, not UI work.
    pub fn execute<R, F, C>(&mut self, exec: F, close: C) -> Result<(), ExecErr>
    where
        R: Send + 'static,
        F: FnOnce(&mut Simulator) -> R + Send + 'static,
        C: FnOnce(R) + Send + 'static
    {
        self.update_state();
        if !matches!(self.state, SimState::Idle(_)) {
            return self.simulator().map(|_| ());
        }
        let SimState::Idle(mut sim) = std::mem::replace(&mut self.state, SimState::Poison) else {
            unreachable!("state was checked to be idle");
        };

        let mcr = sim.mcr();
        let (send, recv) = cbc::bounded(1);
        thread::spawn(move || {
            let result = exec(&mut sim);
            // hand the simulator back before reporting completion
            let _ = send.send(sim);
            close(result);
        });

        self.state = SimState::Running { mcr, handle: recv };
        Ok(())
    }

    /// Pauses any in-flight run and blocks until the simulator is back.
    ///
    /// The run latch is cleared repeatedly while waiting, so a pause
    /// request cannot be lost to a run that is still starting up.
    pub fn pause(&mut self) -> Result<&mut Simulator, ExecErr> {
        if let SimState::Running { mcr, handle } = &self.state {
            loop {
                mcr.store(false, Ordering::Release);
                match handle.recv_timeout(PAUSE_RETRY) {
                    Ok(sim) => {
                        self.state = SimState::Idle(sim);
                        break;
                    },
                    Err(cbc::RecvTimeoutError::Timeout) => continue,
                    Err(cbc::RecvTimeoutError::Disconnected) => {
                        self.state = SimState::Poison;
                        break;
                    },
                }
            }
        }
        self.simulator()
    }
}
impl std::fmt::Debug for SimController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            SimState::Idle(_) => "idle",
            SimState::Running { .. } => "running",
            SimState::Poison => "poisoned",
        };
        f.debug_struct("SimController")
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel as cbc;

    use crate::asm::assemble;
    use crate::ast::reg_consts::R0;
    use crate::parse::parse_ast;
    use crate::sim::{PauseCondition, SimFlags, Simulator};

    use super::{ExecErr, SimController};

    fn controller_with(src: &str) -> SimController {
        let obj = assemble(parse_ast(src).unwrap()).unwrap();
        let mut sim = Simulator::new(SimFlags::default());
        sim.load_obj_file(&obj).unwrap();
        SimController::new(sim)
    }

    #[test]
    fn test_run_to_completion() {
        let mut ctrl = controller_with("
            .orig x3000
                AND R0, R0, #0
                ADD R0, R0, #3
                HALT
            .end
        ");

        let (send, recv) = cbc::bounded(1);
        ctrl.execute(
            |sim| sim.run(),
            move |pause| { let _ = send.send(pause); }
        ).unwrap();

        assert_eq!(recv.recv().unwrap().unwrap(), PauseCondition::Halt);
        // the close callback fires after the simulator is handed back
        let sim = ctrl.simulator().unwrap();
        assert_eq!(sim.reg_file[R0], 3);
    }

    #[test]
    fn test_pause_in_flight_run() {
        let mut ctrl = controller_with("
            .orig x3000
            SPIN: BR SPIN
            .end
        ");

        let (send, recv) = cbc::bounded(1);
        ctrl.execute(
            |sim| sim.run(),
            move |pause| { let _ = send.send(pause); }
        ).unwrap();
        // the spin loop never finishes on its own
        assert_eq!(ctrl.simulator().unwrap_err(), ExecErr::NotAvailable);

        let sim = ctrl.pause().unwrap();
        assert_eq!(sim.pc, 0x3000);
        assert_eq!(recv.recv().unwrap().unwrap(), PauseCondition::MCROff);
        assert!(!ctrl.is_running());
    }

    #[test]
    fn test_panicked_run_poisons() {
        let mut ctrl = controller_with("
            .orig x3000
                HALT
            .end
        ");
        ctrl.execute(|_| panic!("lost to the void"), |()| {}).unwrap();

        let err = loop {
            match ctrl.simulator() {
                Ok(_) => panic!("simulator should not come back"),
                Err(ExecErr::NotAvailable) => std::thread::yield_now(),
                Err(e) => break e,
            }
        };
        assert_eq!(err, ExecErr::Poisoned);
    }
}
