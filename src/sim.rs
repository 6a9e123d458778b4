//! Simulating and executing assembled programs.
//!
//! This module is focused on executing fully assembled code
//! (i.e., [`ObjectFile`]s).
//!
//! It consists of:
//! - [`Simulator`]: the struct that simulates assembled code
//! - [`mem`]: memory and register storage
//! - [`device`]: external devices, memory-mapped I/O, and interrupts
//! - [`debug`]: breakpoints
//! - [`frame`]: the call frame stack
//! - [`observer`]: tracking which memory locations changed
//!
//! # Usage
//!
//! To simulate a program, instantiate a simulator and load an object
//! file into it:
//!
//! ```
//! use lc3_forge::parse::parse_ast;
//! use lc3_forge::asm::assemble;
//! use lc3_forge::sim::{PauseCondition, Simulator};
//! use lc3_forge::ast::reg_consts::R0;
//!
//! let src = "
//!     .orig x3000
//!         AND R0, R0, #0
//!         ADD R0, R0, #3
//!         HALT
//!     .end
//! ";
//! let obj = assemble(parse_ast(src).unwrap()).unwrap();
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_obj_file(&obj).unwrap();
//! assert_eq!(sim.run().unwrap(), PauseCondition::Halt);
//! assert_eq!(sim.reg_file[R0], 3);
//! ```
//!
//! # Execution
//!
//! Beyond [`Simulator::run`] (which runs until something pauses the
//! machine), there are:
//! - [`Simulator::step_in`], [`Simulator::step_over`], [`Simulator::step_out`]:
//!   stepwise debugging
//! - [`Simulator::run_while`]: programmatic execution with a custom
//!   stop condition
//! - [`Simulator::run_until_halt`]: running with breakpoints disabled
//!
//! Every run method returns the [`PauseCondition`] explaining why the
//! machine stopped. While running, clearing the [`MCR`] from another
//! thread pauses the machine at the next instruction boundary.

pub mod debug;
pub mod device;
pub mod frame;
pub mod mem;
pub mod observer;

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::asm::ObjectFile;
use crate::ast::reg_consts::{R6, R7};
use crate::ast::sim::SimInstr;
use crate::ast::ImmOrReg;

use self::debug::Breakpoint;
use self::device::{DeviceHandler, Interrupt};
use self::frame::{FrameStack, FrameType};
use self::mem::{MachineInitStrategy, Mem, RegFile};
use self::observer::ChangeObserver;

/// Start of user program space.
const USER_START: u16 = 0x3000;
/// Start of the memory-mapped I/O page.
const IO_START: u16 = 0xFE00;
/// Memory-mapped address of the PSR.
const PSR_ADDR: u16 = 0xFFFC;
/// Memory-mapped address of the MCR.
const MCR_ADDR: u16 = 0xFFFE;
/// Start of the trap vector table.
const TRAP_TABLE: u16 = 0x0000;
/// Start of the interrupt vector table.
const INT_TABLE: u16 = 0x0100;
/// The trap vector the simulator virtualizes as a halt.
const HALT_VECT: u8 = 0x25;

/// The run latch. While the machine runs, this is set; clearing it
/// (from any thread) pauses execution at the next instruction boundary.
pub type MCR = Arc<AtomicBool>;

/// Errors that can occur during simulation.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SimErr {
    /// The fetched word has the reserved opcode (`0b1101`).
    IllegalOpcode,
    /// The fetched word sets bits its opcode requires to be clear.
    InvalidInstrFormat,
    /// `RTI` was executed in user mode.
    PrivilegeViolation,
    /// A user-mode access touched an address outside user space.
    AccessViolation(u16),
    /// A `TRAP` was dispatched to a vector without a handler.
    FatalTrap(u8),
    /// The loaded object file still has unresolved external labels.
    UnresolvedExternal(String),
}
impl std::fmt::Display for SimErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IllegalOpcode          => f.write_str("illegal opcode"),
            Self::InvalidInstrFormat     => f.write_str("invalid instruction"),
            Self::PrivilegeViolation     => f.write_str("privilege violation"),
            Self::AccessViolation(addr)  => write!(f, "access violation at x{addr:04X}"),
            Self::FatalTrap(vect)        => write!(f, "no trap handler for vector x{vect:02X}"),
            Self::UnresolvedExternal(lb) => write!(f, "object file has unresolved external label {lb}"),
        }
    }
}
impl std::error::Error for SimErr {}
impl crate::err::Error for SimErr {
    fn help(&self) -> Option<Cow<str>> {
        let msg = match self {
            Self::IllegalOpcode          => "opcode 0b1101 is reserved and cannot be executed",
            Self::InvalidInstrFormat     => "the word at the PC does not decode to a valid instruction",
            Self::PrivilegeViolation     => "RTI can only be executed in supervisor mode",
            Self::AccessViolation(_)     => "user programs can only access memory between x3000 and xFDFF",
            Self::FatalTrap(_)           => "only trap vectors with an installed handler can be called",
            Self::UnresolvedExternal(_)  => "link this object file against one that defines the label",
        };
        Some(msg.into())
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseCondition {
    /// The machine executed `HALT`.
    Halt,
    /// The run latch was cleared externally (a pause request).
    MCROff,
    /// A breakpoint was hit.
    Breakpoint,
    /// The run's stop condition was met.
    Tripwire
}

/// Configuration flags for the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimFlags {
    /// How memory and registers are filled on (re)initialization.
    pub machine_init: MachineInitStrategy,
    /// Skip privilege checks: user code may execute `RTI` and touch
    /// any address.
    pub ignore_privilege: bool,
    /// On a fault (fatal trap, access or privilege violation), leave
    /// the run latch set so the machine can be inspected and resumed.
    /// When unset, a fault also halts the machine.
    pub pause_on_fatal_trap: bool
}

/// The processor status register.
///
/// Layout: bit 15 clear means supervisor mode, bits 10-8 are the
/// priority, bits 2-0 are the condition codes (n, z, p).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PSR(u16);
impl PSR {
    const MASK: u16 = 0x8707;

    /// A PSR for a fresh machine: user mode, priority 0, `z` set.
    pub fn new() -> Self {
        PSR(0x8002)
    }

    /// The raw PSR word.
    pub fn get(&self) -> u16 {
        self.0
    }
    /// Whether the machine is in supervisor mode.
    pub fn privileged(&self) -> bool {
        self.0 & 0x8000 == 0
    }
    /// The current priority (0-7).
    pub fn priority(&self) -> u8 {
        ((self.0 >> 8) & 0b111) as u8
    }
    /// The condition codes as a 3-bit `nzp` value.
    pub fn cc(&self) -> u8 {
        (self.0 & 0b111) as u8
    }

    pub(crate) fn set(&mut self, value: u16) {
        self.0 = value & Self::MASK;
    }
    fn set_privileged(&mut self, privileged: bool) {
        match privileged {
            true  => self.0 &= !0x8000,
            false => self.0 |= 0x8000,
        }
    }
    fn set_priority(&mut self, priority: u8) {
        self.0 = (self.0 & !0x0700) | (u16::from(priority & 0b111) << 8);
    }
    fn set_cc(&mut self, result: u16) {
        let cc = match result as i16 {
            n if n < 0  => 0b100,
            0           => 0b010,
            _           => 0b001,
        };
        self.0 = (self.0 & !0b111) | cc;
    }
}
impl Default for PSR {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled operating system image, shared by every simulator.
fn os_obj_file() -> &'static ObjectFile {
    static OS: OnceLock<ObjectFile> = OnceLock::new();
    OS.get_or_init(|| {
        let src = include_str!("os.asm");
        let ast = crate::parse::parse_ast(src)
            .unwrap_or_else(|e| panic!("OS image failed to parse: {e}"));
        crate::asm::assemble(ast)
            .unwrap_or_else(|e| panic!("OS image failed to assemble: {e}"))
    })
}

/// The LC-3 machine.
///
/// See the [module docs](self) for an overview of execution and
/// debugging. State fields (`mem`, `reg_file`, `pc`, the frame stack,
/// breakpoints) are public; the PSR and MCR are reached through
/// [`Simulator::psr`] and [`Simulator::mcr`].
pub struct Simulator {
    /// The memory. Direct indexing bypasses access checks and I/O;
    /// use [`Simulator::read_mem`]/[`Simulator::write_mem`] for
    /// machine-visible accesses.
    pub mem: Mem,
    /// The register file.
    pub reg_file: RegFile,
    /// The program counter.
    pub pc: u16,
    psr: PSR,
    /// The stack pointer of the inactive mode (swapped with R6 on
    /// privilege transitions).
    saved_sp: u16,
    mcr: MCR,
    /// The machine's external devices.
    pub devices: DeviceHandler,
    /// Records memory writes for frontends.
    pub observer: ChangeObserver,
    /// The active call frames.
    pub frame_stack: FrameStack,
    /// Conditions that pause a run.
    pub breakpoints: HashSet<Breakpoint>,
    /// Configuration flags.
    pub flags: SimFlags,
    /// Trap vectors with a handler installed by the OS.
    valid_traps: HashSet<u8>,
    hit_breakpoint: bool,
    hit_halt: bool
}

impl Simulator {
    /// Creates a fresh machine with the OS loaded.
    pub fn new(flags: SimFlags) -> Self {
        let mut filler = flags.machine_init.generator();
        let mut sim = Simulator {
            mem: Mem::new(&mut filler),
            reg_file: RegFile::new(&mut filler),
            pc: USER_START,
            psr: PSR::new(),
            saved_sp: USER_START,
            mcr: Arc::new(AtomicBool::new(false)),
            devices: DeviceHandler::new(),
            observer: ChangeObserver::new(),
            frame_stack: FrameStack::new(),
            breakpoints: HashSet::new(),
            flags,
            valid_traps: HashSet::new(),
            hit_breakpoint: false,
            hit_halt: false
        };
        sim.load_os();
        sim
    }

    fn load_os(&mut self) {
        for (addr, word) in os_obj_file().addr_iter() {
            if let Some(val) = word {
                self.mem[addr] = val;
                if (TRAP_TABLE..INT_TABLE).contains(&addr) {
                    self.valid_traps.insert(addr as u8);
                }
            }
        }
    }

    /// Reinitializes the machine: memory and registers are refilled
    /// per [`SimFlags::machine_init`], the OS is reloaded, devices are
    /// reset, and the PC returns to `x3000`.
    ///
    /// Breakpoints and flags are kept.
    pub fn reset(&mut self) {
        let mut filler = self.flags.machine_init.generator();
        self.mem = Mem::new(&mut filler);
        self.reg_file = RegFile::new(&mut filler);
        self.pc = USER_START;
        self.psr = PSR::new();
        self.saved_sp = USER_START;
        self.mcr.store(false, Ordering::Release);
        self.devices.io_reset();
        self.observer.clear();
        self.frame_stack.clear();
        self.valid_traps.clear();
        self.hit_breakpoint = false;
        self.hit_halt = false;
        self.load_os();
    }

    /// Loads an object file into memory.
    ///
    /// This fails if the object file still has unresolved external
    /// labels (it must be linked first). Written addresses are recorded
    /// in the observer; the PC is left at `x3000`.
    pub fn load_obj_file(&mut self, obj: &ObjectFile) -> Result<(), SimErr> {
        if let Some(name) = obj.unresolved_externals().next() {
            return Err(SimErr::UnresolvedExternal(name.to_string()));
        }
        for (addr, word) in obj.addr_iter() {
            if let Some(val) = word {
                self.mem[addr] = val;
                self.observer.set_mem_changed(addr);
            }
        }
        Ok(())
    }

    /// The processor status register.
    pub fn psr(&self) -> PSR {
        self.psr
    }
    /// Overwrites the processor status register.
    pub fn set_psr(&mut self, value: u16) {
        self.psr.set(value);
    }
    /// A handle to the run latch. Clearing it from another thread
    /// pauses a running machine at the next instruction boundary.
    pub fn mcr(&self) -> MCR {
        Arc::clone(&self.mcr)
    }
    /// Whether the last run stopped at a breakpoint.
    pub fn hit_breakpoint(&self) -> bool {
        self.hit_breakpoint
    }

    /* MEMORY */

    fn check_access(&self, addr: u16) -> Result<(), SimErr> {
        let user_ok = (USER_START..IO_START).contains(&addr);
        if !user_ok && !self.psr.privileged() && !self.flags.ignore_privilege {
            return Err(SimErr::AccessViolation(addr));
        }
        Ok(())
    }

    /// Reads an address as the machine would: access-checked,
    /// dispatching I/O-page addresses to the devices (consuming input).
    pub fn read_mem(&mut self, addr: u16) -> Result<u16, SimErr> {
        self.check_access(addr)?;
        Ok(self.read_unchecked(addr, true))
    }

    /// Writes an address as the machine would: access-checked,
    /// dispatching I/O-page addresses to the devices.
    pub fn write_mem(&mut self, addr: u16, value: u16) -> Result<(), SimErr> {
        self.check_access(addr)?;
        self.write_unchecked(addr, value);
        Ok(())
    }

    /// Reads an address for a debugger: no access checks, and device
    /// reads are side-effect free (peeking `KBDR` does not consume).
    pub fn peek_mem(&mut self, addr: u16) -> u16 {
        self.read_unchecked(addr, false)
    }

    /// Writes an address for a debugger: no access checks. The write
    /// is recorded in the observer.
    pub fn poke_mem(&mut self, addr: u16, value: u16) {
        self.write_unchecked(addr, value);
    }

    fn read_unchecked(&mut self, addr: u16, effectful: bool) -> u16 {
        if addr >= IO_START {
            return match addr {
                PSR_ADDR => self.psr.get(),
                MCR_ADDR => u16::from(self.mcr.load(Ordering::Relaxed)) << 15,
                // unmapped I/O addresses read as 0
                _ => self.devices.io_read(addr, effectful).unwrap_or(0),
            };
        }
        self.mem[addr]
    }

    fn write_unchecked(&mut self, addr: u16, value: u16) {
        if addr >= IO_START {
            match addr {
                PSR_ADDR => self.psr.set(value),
                MCR_ADDR => self.mcr.store(value & 0x8000 != 0, Ordering::Release),
                _ => { self.devices.io_write(addr, value); },
            }
            return;
        }
        self.mem[addr] = value;
        self.observer.set_mem_changed(addr);
    }

    /* EXECUTION */

    /// Executes a single instruction.
    ///
    /// On a fault, the PC is rewound to the faulting instruction
    /// before the error is returned.
    pub fn step_in(&mut self) -> Result<(), SimErr> {
        self.step()
    }

    /// Runs until something pauses the machine
    /// (halt, pause request, breakpoint, or fault).
    pub fn run(&mut self) -> Result<PauseCondition, SimErr> {
        self.run_while_inner(|_| true, true)
    }

    /// Runs like [`Simulator::run`], but ignores breakpoints.
    pub fn run_until_halt(&mut self) -> Result<PauseCondition, SimErr> {
        self.run_while_inner(|_| true, false)
    }

    /// Runs while the tripwire returns `true`, also stopping on halts,
    /// pause requests, and breakpoints.
    ///
    /// At least one instruction is always executed. This means a
    /// breakpoint at the current PC does not immediately re-pause
    /// a resumed machine.
    pub fn run_while(&mut self, tripwire: impl FnMut(&mut Simulator) -> bool) -> Result<PauseCondition, SimErr> {
        self.run_while_inner(tripwire, true)
    }

    /// Executes one instruction, then (if that instruction called a
    /// subroutine or trap) runs until the call returns.
    pub fn step_over(&mut self) -> Result<PauseCondition, SimErr> {
        let depth = self.frame_stack.len();
        self.run_while(move |sim| sim.frame_stack.len() > depth)
    }

    /// Runs until the current subroutine returns to its caller.
    ///
    /// Outside of any subroutine, this behaves like [`Simulator::run`].
    pub fn step_out(&mut self) -> Result<PauseCondition, SimErr> {
        match self.frame_stack.len() {
            0 => self.run(),
            depth => self.run_while(move |sim| sim.frame_stack.len() >= depth),
        }
    }

    fn run_while_inner(
        &mut self,
        mut tripwire: impl FnMut(&mut Simulator) -> bool,
        use_breakpoints: bool
    ) -> Result<PauseCondition, SimErr> {
        self.hit_breakpoint = false;
        self.hit_halt = false;
        self.mcr.store(true, Ordering::Release);

        // the first iteration always executes, so pausing at a
        // breakpoint does not wedge the machine there forever
        let mut first = Some(());
        loop {
            if !self.mcr.load(Ordering::Acquire) {
                return Ok(match self.hit_halt {
                    true  => PauseCondition::Halt,
                    false => PauseCondition::MCROff,
                });
            }
            if first.take().is_none() {
                if !tripwire(self) {
                    self.mcr.store(false, Ordering::Release);
                    return Ok(PauseCondition::Tripwire);
                }
                if use_breakpoints && self.breakpoints.iter().any(|bp| bp.check(self)) {
                    self.hit_breakpoint = true;
                    self.mcr.store(false, Ordering::Release);
                    return Ok(PauseCondition::Breakpoint);
                }
            }
            self.step()?;
        }
    }

    fn step(&mut self) -> Result<(), SimErr> {
        self.hit_halt = false;
        let instr_addr = self.pc;

        if let Err(e) = self.step_inner(instr_addr) {
            // leave the PC on the faulting instruction
            self.pc = instr_addr;
            if !self.flags.pause_on_fatal_trap {
                self.mcr.store(false, Ordering::Release);
            }
            return Err(e);
        }

        // devices are polled once per executed instruction;
        // a machine that just halted no longer takes interrupts
        if !self.hit_halt {
            if let Some(int) = self.devices.poll_interrupt() {
                if int.priority() > self.psr.priority() {
                    self.handle_interrupt(int)?;
                }
            }
        }
        Ok(())
    }

    fn step_inner(&mut self, instr_addr: u16) -> Result<(), SimErr> {
        let word = self.read_mem(self.pc)?;
        let instr = SimInstr::decode(word)?;
        self.pc = self.pc.wrapping_add(1);

        match instr {
            SimInstr::Br(cc, off) => {
                if cc & self.psr.cc() != 0 {
                    self.pc = self.pc.wrapping_add(off.get() as u16);
                }
            },
            SimInstr::Add(dr, sr1, sr2) => {
                let v2 = match sr2 {
                    ImmOrReg::Imm(imm) => imm.get() as u16,
                    ImmOrReg::Reg(r)   => self.reg_file[r],
                };
                let result = self.reg_file[sr1].wrapping_add(v2);
                self.reg_file[dr] = result;
                self.psr.set_cc(result);
            },
            SimInstr::And(dr, sr1, sr2) => {
                let v2 = match sr2 {
                    ImmOrReg::Imm(imm) => imm.get() as u16,
                    ImmOrReg::Reg(r)   => self.reg_file[r],
                };
                let result = self.reg_file[sr1] & v2;
                self.reg_file[dr] = result;
                self.psr.set_cc(result);
            },
            SimInstr::Not(dr, sr) => {
                let result = !self.reg_file[sr];
                self.reg_file[dr] = result;
                self.psr.set_cc(result);
            },
            SimInstr::Ld(dr, off) => {
                let ea = self.pc.wrapping_add(off.get() as u16);
                let result = self.read_mem(ea)?;
                self.reg_file[dr] = result;
                self.psr.set_cc(result);
            },
            SimInstr::Ldi(dr, off) => {
                let ind = self.pc.wrapping_add(off.get() as u16);
                let ea = self.read_mem(ind)?;
                let result = self.read_mem(ea)?;
                self.reg_file[dr] = result;
                self.psr.set_cc(result);
            },
            SimInstr::Ldr(dr, br, off) => {
                let ea = self.reg_file[br].wrapping_add(off.get() as u16);
                let result = self.read_mem(ea)?;
                self.reg_file[dr] = result;
                self.psr.set_cc(result);
            },
            SimInstr::Lea(dr, off) => {
                // LEA does not set condition codes
                self.reg_file[dr] = self.pc.wrapping_add(off.get() as u16);
            },
            SimInstr::St(sr, off) => {
                let ea = self.pc.wrapping_add(off.get() as u16);
                self.write_mem(ea, self.reg_file[sr])?;
            },
            SimInstr::Sti(sr, off) => {
                let ind = self.pc.wrapping_add(off.get() as u16);
                let ea = self.read_mem(ind)?;
                self.write_mem(ea, self.reg_file[sr])?;
            },
            SimInstr::Str(sr, br, off) => {
                let ea = self.reg_file[br].wrapping_add(off.get() as u16);
                self.write_mem(ea, self.reg_file[sr])?;
            },
            SimInstr::Jmp(br) => {
                self.pc = self.reg_file[br];
                // RET unwinds the current frame
                if br == R7 {
                    self.frame_stack.pop_frame();
                }
            },
            SimInstr::Jsr(target) => {
                let callee = match target {
                    ImmOrReg::Imm(off) => self.pc.wrapping_add(off.get() as u16),
                    ImmOrReg::Reg(br)  => self.reg_file[br],
                };
                self.reg_file[R7] = self.pc;
                self.pc = callee;
                self.frame_stack.push_frame(instr_addr, callee, FrameType::Subroutine);
            },
            SimInstr::Rti => {
                if !self.psr.privileged() && !self.flags.ignore_privilege {
                    return Err(SimErr::PrivilegeViolation);
                }
                let sp = self.reg_file[R6];
                let pc = self.read_mem(sp)?;
                let psr = self.read_mem(sp.wrapping_add(1))?;
                self.reg_file[R6] = sp.wrapping_add(2);

                self.pc = pc;
                self.psr.set(psr);
                if !self.psr.privileged() {
                    // back to user mode: restore the user stack pointer
                    std::mem::swap(&mut self.saved_sp, &mut self.reg_file[R6]);
                }
                self.frame_stack.pop_frame();
            },
            SimInstr::Trap(vect) => {
                self.handle_trap(vect.get() as u8, instr_addr)?;
            },
        }
        Ok(())
    }

    fn handle_trap(&mut self, vect: u8, instr_addr: u16) -> Result<(), SimErr> {
        if vect == HALT_VECT {
            // virtualized: stop the machine, leaving the PC on the
            // HALT so that resuming immediately re-halts
            self.pc = instr_addr;
            self.hit_halt = true;
            self.mcr.store(false, Ordering::Release);
            return Ok(());
        }
        if !self.valid_traps.contains(&vect) {
            return Err(SimErr::FatalTrap(vect));
        }
        self.enter_routine(TRAP_TABLE.wrapping_add(u16::from(vect)), FrameType::Trap, None, instr_addr)
    }

    fn handle_interrupt(&mut self, int: Interrupt) -> Result<(), SimErr> {
        let caller = self.pc;
        self.enter_routine(
            INT_TABLE.wrapping_add(u16::from(int.vect())),
            FrameType::Interrupt,
            Some(int.priority()),
            caller
        )
    }

    /// Dispatches control to a trap or interrupt service routine:
    /// switch to the supervisor stack, push PSR and PC, and jump
    /// through the vector table.
    fn enter_routine(
        &mut self,
        table_addr: u16,
        frame_type: FrameType,
        new_priority: Option<u8>,
        caller: u16
    ) -> Result<(), SimErr> {
        let target = self.mem[table_addr];
        let old_psr = self.psr.get();

        if !self.psr.privileged() {
            std::mem::swap(&mut self.saved_sp, &mut self.reg_file[R6]);
        }
        self.psr.set_privileged(true);
        if let Some(priority) = new_priority {
            self.psr.set_priority(priority);
        }

        let sp = self.reg_file[R6].wrapping_sub(2);
        self.write_mem(sp.wrapping_add(1), old_psr)?;
        self.write_mem(sp, self.pc)?;
        self.reg_file[R6] = sp;

        self.pc = target;
        self.frame_stack.push_frame(caller, target, frame_type);
        Ok(())
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("pc", &self.pc)
            .field("psr", &self.psr)
            .field("frame_stack", &self.frame_stack)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use crate::asm::{assemble, ObjectFile};
    use crate::ast::reg_consts::{R0, R1, R5};
    use crate::parse::parse_ast;

    use super::debug::Breakpoint;
    use super::{PauseCondition, SimErr, SimFlags, Simulator};

    fn asm(src: &str) -> ObjectFile {
        assemble(parse_ast(src).unwrap()).unwrap()
    }
    fn sim_with(src: &str) -> Simulator {
        let mut sim = Simulator::new(SimFlags::default());
        sim.load_obj_file(&asm(src)).unwrap();
        sim
    }

    #[test]
    fn test_arith_and_cc() {
        let mut sim = sim_with("
            .orig x3000
                AND R0, R0, #0
                ADD R0, R0, #5
                NOT R1, R0
                ADD R1, R1, #1
                ADD R1, R1, R0
                HALT
            .end
        ");

        assert_eq!(sim.run().unwrap(), PauseCondition::Halt);
        assert_eq!(sim.reg_file[R0], 5);
        // R1 = -R0 + R0 = 0
        assert_eq!(sim.reg_file[R1], 0);
        assert_eq!(sim.psr().cc(), 0b010);
    }

    #[test]
    fn test_countdown_loop() {
        let mut sim = sim_with("
            .orig x3000
                AND R0, R0, #0
                ADD R0, R0, #10
            LOOP:
                ADD R0, R0, #-1
                BRp LOOP
                HALT
            .end
        ");

        assert_eq!(sim.run().unwrap(), PauseCondition::Halt);
        assert_eq!(sim.reg_file[R0], 0);
    }

    #[test]
    fn test_loads_and_stores() {
        let mut sim = sim_with("
            .orig x3000
                LD R0, VAL
                ST R0, SLOT
                LDI R1, SLOT_PTR
                LEA R5, VAL
                HALT
            VAL: .fill x0042
            SLOT: .blkw 1
            SLOT_PTR: .fill SLOT
            .end
        ");

        assert_eq!(sim.run().unwrap(), PauseCondition::Halt);
        assert_eq!(sim.reg_file[R0], 0x42);
        assert_eq!(sim.reg_file[R1], 0x42);
        assert_eq!(sim.mem[0x3006], 0x42);
        assert_eq!(sim.reg_file[R5], 0x3005);
        // the ST was observed
        assert!(sim.observer.take_mem_changes().any(|a| a == 0x3006));
    }

    #[test]
    fn test_halt_leaves_pc_and_rehalts() {
        let mut sim = sim_with("
            .orig x3000
                AND R0, R0, #0
                HALT
            .end
        ");

        assert_eq!(sim.run().unwrap(), PauseCondition::Halt);
        assert_eq!(sim.pc, 0x3001);
        assert!(!sim.mcr().load(Ordering::Acquire));

        // resuming executes HALT again and stops immediately after it
        assert_eq!(sim.run().unwrap(), PauseCondition::Halt);
        assert_eq!(sim.pc, 0x3001);
    }

    #[test]
    fn test_breakpoint_does_not_wedge() {
        let mut sim = sim_with("
            .orig x3000
                AND R0, R0, #0
                ADD R0, R0, #1
                ADD R0, R0, #1
                HALT
            .end
        ");
        sim.breakpoints.insert(Breakpoint::PC(0x3002));

        assert_eq!(sim.run().unwrap(), PauseCondition::Breakpoint);
        assert!(sim.hit_breakpoint());
        assert_eq!(sim.pc, 0x3002);
        assert_eq!(sim.reg_file[R0], 1);

        // resuming from the breakpoint runs through to the halt
        assert_eq!(sim.run().unwrap(), PauseCondition::Halt);
        assert_eq!(sim.reg_file[R0], 2);
    }

    #[test]
    fn test_run_until_halt_skips_breakpoints() {
        let mut sim = sim_with("
            .orig x3000
                AND R0, R0, #0
                ADD R0, R0, #1
                HALT
            .end
        ");
        sim.breakpoints.insert(Breakpoint::PC(0x3001));

        assert_eq!(sim.run_until_halt().unwrap(), PauseCondition::Halt);
        assert_eq!(sim.reg_file[R0], 1);
    }

    #[test]
    fn test_reg_breakpoint() {
        use super::debug::Comparator;

        let mut sim = sim_with("
            .orig x3000
                AND R0, R0, #0
            LOOP:
                ADD R0, R0, #1
                BR LOOP
            .end
        ");
        sim.breakpoints.insert(Breakpoint::Reg { reg: R0, value: Comparator::Eq(7) });

        assert_eq!(sim.run().unwrap(), PauseCondition::Breakpoint);
        assert_eq!(sim.reg_file[R0], 7);
    }

    #[test]
    fn test_step_over_and_out() {
        let mut sim = sim_with("
            .orig x3000
                JSR DOUBLE
                ADD R1, R0, #0
                HALT
            DOUBLE:
                ADD R0, R0, R0
                RET
            .end
        ");
        sim.reg_file[R0] = 21;

        // step_over runs the whole subroutine
        assert_eq!(sim.step_over().unwrap(), PauseCondition::Tripwire);
        assert_eq!(sim.pc, 0x3001);
        assert_eq!(sim.reg_file[R0], 42);

        // step into the next call, then step_out
        let mut sim = sim_with("
            .orig x3000
                JSR DOUBLE
                HALT
            DOUBLE:
                ADD R0, R0, R0
                RET
            .end
        ");
        sim.reg_file[R0] = 3;
        sim.step_in().unwrap();
        assert_eq!(sim.pc, 0x3002);
        assert_eq!(sim.frame_stack.len(), 1);

        assert_eq!(sim.step_out().unwrap(), PauseCondition::Tripwire);
        assert_eq!(sim.pc, 0x3001);
        assert_eq!(sim.frame_stack.len(), 0);
    }

    #[test]
    fn test_puts_output() {
        let mut sim = sim_with(r#"
            .orig x3000
                LEA R0, MSG
                PUTS
                HALT
            MSG: .stringz "ok"
            .end
        "#);

        assert_eq!(sim.run().unwrap(), PauseCondition::Halt);
        let out = sim.devices.display.get_buffer().read().unwrap();
        assert_eq!(&**out, b"ok");
    }

    #[test]
    fn test_getc_consumes_input() {
        let mut sim = sim_with("
            .orig x3000
                GETC
                ADD R1, R0, #0
                GETC
                HALT
            .end
        ");
        sim.devices.keyboard.get_buffer().write().unwrap().extend(*b"hi");

        assert_eq!(sim.run().unwrap(), PauseCondition::Halt);
        assert_eq!(sim.reg_file[R1], u16::from(b'h'));
        assert_eq!(sim.reg_file[R0], u16::from(b'i'));
    }

    #[test]
    fn test_fatal_trap() {
        let mut sim = sim_with("
            .orig x3000
                TRAP x4F
            .end
        ");

        assert_eq!(sim.run().unwrap_err(), SimErr::FatalTrap(0x4F));
        // PC rewound to the faulting instruction, machine stopped
        assert_eq!(sim.pc, 0x3000);
        assert!(!sim.mcr().load(Ordering::Acquire));
    }

    #[test]
    fn test_pause_on_fatal_trap_keeps_latch() {
        let mut sim = Simulator::new(SimFlags { pause_on_fatal_trap: true, ..Default::default() });
        sim.load_obj_file(&asm("
            .orig x3000
                TRAP x4F
            .end
        ")).unwrap();

        assert_eq!(sim.run().unwrap_err(), SimErr::FatalTrap(0x4F));
        assert_eq!(sim.pc, 0x3000);
        assert!(sim.mcr().load(Ordering::Acquire));
    }

    #[test]
    fn test_privilege_violation() {
        let mut sim = sim_with("
            .orig x3000
                RTI
            .end
        ");
        assert_eq!(sim.run().unwrap_err(), SimErr::PrivilegeViolation);

        // user code cannot touch system space either
        let mut sim = sim_with("
            .orig x3000
                LDI R0, OS_PTR
                HALT
            OS_PTR: .fill x0020
            .end
        ");
        assert_eq!(sim.run().unwrap_err(), SimErr::AccessViolation(0x0020));
    }

    #[test]
    fn test_ignore_privilege() {
        let mut sim = Simulator::new(SimFlags { ignore_privilege: true, ..Default::default() });
        sim.load_obj_file(&asm("
            .orig x3000
                LDI R0, OS_PTR
                HALT
            OS_PTR: .fill x0020
            .end
        ")).unwrap();

        assert_eq!(sim.run().unwrap(), PauseCondition::Halt);
        // the GETC handler's address from the trap table
        assert_ne!(sim.reg_file[R0], 0);
    }

    #[test]
    fn test_pause_from_other_thread() {
        let mut sim = sim_with("
            .orig x3000
            SPIN: BR SPIN
            .end
        ");

        let mcr = sim.mcr();
        let handle = std::thread::spawn(move || {
            let pause = sim.run();
            (sim, pause)
        });

        // wait for the run to start, then request a pause
        while !mcr.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
        mcr.store(false, Ordering::Release);

        let (sim, pause) = handle.join().unwrap();
        assert_eq!(pause.unwrap(), PauseCondition::MCROff);
        assert_eq!(sim.pc, 0x3000);
    }

    #[test]
    fn test_timer_interrupt_schedule() {
        let mut sim = sim_with("
            .orig x0181
                .fill ISR
            .end
            .orig x0200
            ISR:
                ADD R5, R5, #1
                RTI
            .end
            .orig x3000
                AND R5, R5, #0
                ADD R0, R0, #1
                ADD R0, R0, #1
                ADD R0, R0, #1
                ADD R0, R0, #1
                ADD R0, R0, #1
                ADD R0, R0, #1
                ADD R0, R0, #1
                ADD R0, R0, #1
                ADD R0, R0, #1
                ADD R0, R0, #1
                ADD R0, R0, #1
                ADD R0, R0, #1
                HALT
            .end
        ");
        sim.devices.timer.set_exact(5);
        sim.devices.timer.reload();
        sim.devices.timer.enabled = true;

        assert_eq!(sim.run().unwrap(), PauseCondition::Halt);
        // fires on the 5th, 10th, and 15th executed instruction
        // (each service routine itself executes 2 instructions)
        assert_eq!(sim.reg_file[R5], 3);
        assert_eq!(sim.reg_file[R0], 12);
    }

    #[test]
    fn test_reset_clears_program() {
        let mut sim = sim_with("
            .orig x3000
                AND R0, R0, #0
                ADD R0, R0, #7
                HALT
            .end
        ");
        sim.run().unwrap();
        assert_eq!(sim.reg_file[R0], 7);

        sim.reset();
        assert_eq!(sim.pc, 0x3000);
        assert_eq!(sim.reg_file[R0], 0);
        assert_eq!(sim.mem[0x3000], 0);
        // the OS is back in place
        assert_ne!(sim.mem[0x0020], 0);
    }

    #[test]
    fn test_unresolved_external_rejected() {
        let obj = asm("
            .external LIB
            .orig x3000
                .fill LIB
            .end
        ");
        let mut sim = Simulator::new(SimFlags::default());
        assert_eq!(
            sim.load_obj_file(&obj).unwrap_err(),
            SimErr::UnresolvedExternal("LIB".to_string())
        );
    }
}
