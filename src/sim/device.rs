//! External devices connected to the simulator.
//!
//! Devices are reached two ways: through memory-mapped I/O in the
//! device register page, and through interrupts polled once per
//! instruction cycle.
//!
//! The core types here are:
//! - [`ExternalDevice`]: the interface devices implement
//! - [`DeviceHandler`]: the hub owning the machine's devices
//! - [`BufferedKeyboard`], [`BufferedDisplay`]: keyboard/display over
//!   shared memory buffers
//! - [`TimerDevice`]: an instruction-count timer that fires interrupts

mod timer;

use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockWriteGuard, TryLockError};

pub use timer::TimerDevice;

pub(super) const KBSR: u16 = 0xFE00;
pub(super) const KBDR: u16 = 0xFE02;
pub(super) const DSR:  u16 = 0xFE04;
pub(super) const DDR:  u16 = 0xFE06;

/// Keyboard interrupt vector.
pub const KB_INTV: u8 = 0x80;
/// Keyboard interrupt priority.
pub const KB_INTP: u8 = 0b100;

/// An interrupt signal raised by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupt {
    vect: u8,
    priority: u8
}
impl Interrupt {
    /// Creates an interrupt with the given vector and priority.
    /// Priorities above 7 are clamped to 7.
    pub fn vectored(vect: u8, priority: u8) -> Self {
        Self { vect, priority: priority.min(7) }
    }

    /// The interrupt vector (an index into the interrupt vector table).
    pub fn vect(&self) -> u8 {
        self.vect
    }
    /// The priority (0-7) of this interrupt.
    pub fn priority(&self) -> u8 {
        self.priority
    }
}

/// A device accessible via memory-mapped I/O and interrupts.
pub trait ExternalDevice: Send + Sync + 'static {
    /// Reads the data at the given memory-mapped address,
    /// returning `None` if this device does not serve that address.
    ///
    /// `effectful` distinguishes a real machine read (which may consume
    /// input) from a debugger peek (which must not).
    fn io_read(&mut self, addr: u16, effectful: bool) -> Option<u16>;

    /// Writes data to the given memory-mapped address,
    /// returning whether the write was accepted.
    fn io_write(&mut self, addr: u16, data: u16) -> bool;

    /// Resets the device to its initial state.
    fn io_reset(&mut self);

    /// Called once per instruction cycle to check whether this device
    /// wants to raise an interrupt.
    fn poll_interrupt(&mut self) -> Option<Interrupt>;
}

fn try_write_recover<T>(lock: &RwLock<T>) -> Option<RwLockWriteGuard<'_, T>> {
    match lock.try_write() {
        Ok(g) => Some(g),
        Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

/// Keyboard device reading from a shared input buffer.
///
/// The buffer can be handed to another thread (or held by a frontend)
/// which pushes keystrokes into it. `KBSR` reports whether input is
/// pending, and reading `KBDR` consumes one byte.
#[derive(Debug, Default, Clone)]
pub struct BufferedKeyboard {
    buffer: Arc<RwLock<VecDeque<u8>>>,
    interrupts_enabled: bool
}
impl BufferedKeyboard {
    /// Creates a keyboard wrapping the given buffer.
    pub fn new(buffer: Arc<RwLock<VecDeque<u8>>>) -> Self {
        Self { buffer, interrupts_enabled: false }
    }

    /// The shared input buffer.
    pub fn get_buffer(&self) -> &Arc<RwLock<VecDeque<u8>>> {
        &self.buffer
    }

    fn try_input(&self) -> Option<RwLockWriteGuard<'_, VecDeque<u8>>> {
        try_write_recover(&self.buffer)
    }
    fn ready(&self) -> bool {
        self.try_input().is_some_and(|buf| !buf.is_empty())
    }
}
impl ExternalDevice for BufferedKeyboard {
    fn io_read(&mut self, addr: u16, effectful: bool) -> Option<u16> {
        match addr {
            KBSR => Some(u16::from(self.ready()) << 15 | u16::from(self.interrupts_enabled) << 14),
            KBDR if effectful => self.try_input()?.pop_front().map(u16::from),
            KBDR => self.try_input()?.front().copied().map(u16::from),
            _ => None
        }
    }

    fn io_write(&mut self, addr: u16, data: u16) -> bool {
        match addr {
            KBSR => {
                // only the interrupt-enable bit is writable
                self.interrupts_enabled = (data >> 14) & 1 != 0;
                true
            },
            _ => false
        }
    }

    fn io_reset(&mut self) {
        self.interrupts_enabled = false;
        if let Some(mut buf) = self.try_input() {
            buf.clear();
        }
    }

    fn poll_interrupt(&mut self) -> Option<Interrupt> {
        match self.ready() && self.interrupts_enabled {
            true  => Some(Interrupt::vectored(KB_INTV, KB_INTP)),
            false => None,
        }
    }
}

/// Display device writing to a shared output buffer.
///
/// The display is always ready (`DSR` bit 15 set), and every byte
/// written to `DDR` is appended to the buffer.
#[derive(Debug, Default, Clone)]
pub struct BufferedDisplay {
    buffer: Arc<RwLock<Vec<u8>>>
}
impl BufferedDisplay {
    /// Creates a display wrapping the given buffer.
    pub fn new(buffer: Arc<RwLock<Vec<u8>>>) -> Self {
        Self { buffer }
    }

    /// The shared output buffer.
    pub fn get_buffer(&self) -> &Arc<RwLock<Vec<u8>>> {
        &self.buffer
    }
}
impl ExternalDevice for BufferedDisplay {
    fn io_read(&mut self, addr: u16, _effectful: bool) -> Option<u16> {
        match addr {
            DSR => Some(1 << 15),
            _ => None
        }
    }

    fn io_write(&mut self, addr: u16, data: u16) -> bool {
        match addr {
            DDR => match try_write_recover(&self.buffer) {
                Some(mut buf) => {
                    buf.push(data as u8);
                    true
                },
                None => false,
            },
            _ => false
        }
    }

    fn io_reset(&mut self) {
        if let Some(mut buf) = try_write_recover(&self.buffer) {
            buf.clear();
        }
    }

    fn poll_interrupt(&mut self) -> Option<Interrupt> {
        None
    }
}

/// The hub for the machine's external devices.
///
/// Reads and writes in the device register page are dispatched here,
/// and the simulator polls this once per instruction cycle for pending
/// interrupts.
#[derive(Debug, Default)]
pub struct DeviceHandler {
    /// The keyboard.
    pub keyboard: BufferedKeyboard,
    /// The display.
    pub display: BufferedDisplay,
    /// The timer.
    pub timer: TimerDevice
}
impl DeviceHandler {
    /// Creates a handler with default devices.
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn io_read(&mut self, addr: u16, effectful: bool) -> Option<u16> {
        match addr {
            KBSR | KBDR => self.keyboard.io_read(addr, effectful),
            DSR  | DDR  => self.display.io_read(addr, effectful),
            _ => None
        }
    }

    pub(super) fn io_write(&mut self, addr: u16, data: u16) -> bool {
        match addr {
            KBSR | KBDR => self.keyboard.io_write(addr, data),
            DSR  | DDR  => self.display.io_write(addr, data),
            _ => false
        }
    }

    pub(super) fn io_reset(&mut self) {
        self.keyboard.io_reset();
        self.display.io_reset();
        self.timer.io_reset();
    }

    /// Polls every device, returning the highest-priority pending
    /// interrupt (keyboard wins ties).
    pub(super) fn poll_interrupt(&mut self) -> Option<Interrupt> {
        let kb = self.keyboard.poll_interrupt();
        let tm = self.timer.poll_interrupt();
        match (kb, tm) {
            (Some(a), Some(b)) => Some(if b.priority() > a.priority() { b } else { a }),
            (a, b) => a.or(b),
        }
    }
}
