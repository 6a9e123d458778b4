//! The high-level facade tying the toolchain together.
//!
//! [`Engine`] wraps the assembler, linker, simulator, and execution
//! controller behind one object suited for driving a debugger frontend:
//! content goes in and out as strings and [`ObjectFile`]s (the caller
//! does any file I/O), execution happens on a worker thread with a
//! completion callback, and machine state is queried and edited by
//! name and address.
//!
//! ```no_run
//! use lc3_forge::engine::{Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig::default());
//! let obj = engine.assemble_debug("
//!     .orig x3000
//!         AND R0, R0, #0
//!         HALT
//!     .end
//! ").unwrap();
//! engine.load_object_file(obj).unwrap();
//!
//! engine.set_breakpoint(0x3001);
//! engine.run(|pause| println!("stopped: {pause:?}")).unwrap();
//! ```

use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLock};

use crate::asm::{self, ObjectFile, SymbolTable};
use crate::ast::sim::SimInstr;
use crate::ast::Reg;
use crate::ctrl::{ExecErr, SimController};
use crate::err::ErrSpan;
use crate::parse::{parse_ast_with, ParseOpts};
use crate::sim::debug::Breakpoint;
use crate::sim::mem::MachineInitStrategy;
use crate::sim::{PauseCondition, SimErr, SimFlags, Simulator};

/// Configuration for the [`Engine`].
///
/// The machine-facing fields mirror [`SimFlags`]; `liberal_asm` and
/// `run_until_halt` are facade-level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    /// Assemble with the liberal grammar, where operands may be
    /// separated by whitespace alone.
    pub liberal_asm: bool,
    /// Skip the simulator's privilege checks.
    pub ignore_privilege: bool,
    /// On a fault, keep the machine resumable instead of halting it.
    pub pause_on_fatal_trap: bool,
    /// Make [`Engine::run`] ignore breakpoints.
    pub run_until_halt: bool,
    /// How memory and registers are filled on (re)initialization.
    pub machine_init: MachineInitStrategy
}
impl EngineConfig {
    fn sim_flags(&self) -> SimFlags {
        SimFlags {
            machine_init: self.machine_init,
            ignore_privilege: self.ignore_privilege,
            pause_on_fatal_trap: self.pause_on_fatal_trap
        }
    }
    fn parse_opts(&self) -> ParseOpts {
        ParseOpts { liberal: self.liberal_asm }
    }
}

/// Errors produced by [`Engine`] operations.
///
/// The toolchain variants wrap the underlying phase's error; the rest
/// are facade-level misuses.
#[derive(Debug, PartialEq, Clone)]
pub enum EngineErr {
    /// Assembly source failed to parse.
    Parse(crate::parse::ParseErr),
    /// Assembly failed.
    Asm(crate::asm::AsmErr),
    /// `.bin` conversion failed.
    Bin(crate::asm::bin::BinErr),
    /// Linking failed.
    Link(crate::link::LinkErr),
    /// An object file could not be loaded into the machine.
    Load(SimErr),
    /// An unknown register name was queried.
    InvalidRegister(String),
    /// A timer priority outside 0-7 was set.
    InvalidPriority(u8),
    /// A timer reload range with `min > max` was set.
    InvalidRange(u32, u32),
    /// The machine is running on the worker thread.
    SimBusy,
    /// A previous run panicked, taking the machine with it.
    SimPoisoned
}
impl std::fmt::Display for EngineErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(e) => e.fmt(f),
            Self::Asm(e)   => e.fmt(f),
            Self::Bin(e)   => e.fmt(f),
            Self::Link(e)  => e.fmt(f),
            Self::Load(e)  => e.fmt(f),
            Self::InvalidRegister(name)  => write!(f, "unknown register {name:?}"),
            Self::InvalidPriority(prio)  => write!(f, "invalid timer priority {prio}"),
            Self::InvalidRange(min, max) => write!(f, "invalid timer range [{min}, {max}]"),
            Self::SimBusy      => f.write_str("simulator is currently running"),
            Self::SimPoisoned  => f.write_str("simulator was lost to a panicked run"),
        }
    }
}
impl std::error::Error for EngineErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Asm(e)   => Some(e),
            Self::Bin(e)   => Some(e),
            Self::Link(e)  => Some(e),
            Self::Load(e)  => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for EngineErr {
    fn span(&self) -> Option<ErrSpan> {
        match self {
            Self::Parse(e) => crate::err::Error::span(e),
            Self::Asm(e)   => crate::err::Error::span(e),
            Self::Bin(e)   => crate::err::Error::span(e),
            _ => None
        }
    }
    fn help(&self) -> Option<Cow<str>> {
        match self {
            Self::Parse(e) => crate::err::Error::help(e),
            Self::Asm(e)   => crate::err::Error::help(e),
            Self::Bin(e)   => crate::err::Error::help(e),
            Self::Link(e)  => crate::err::Error::help(e),
            Self::Load(e)  => crate::err::Error::help(e),
            Self::InvalidRegister(_)  => Some("valid names are r0-r7, pc, psr, and mcr".into()),
            Self::InvalidPriority(_)  => Some("priorities range from 0 to 7".into()),
            Self::InvalidRange(_, _)  => Some("the range minimum cannot exceed its maximum".into()),
            Self::SimBusy             => Some("pause the simulator or wait for it to finish".into()),
            Self::SimPoisoned         => None,
        }
    }
}
impl From<crate::parse::ParseErr> for EngineErr {
    fn from(e: crate::parse::ParseErr) -> Self { Self::Parse(e) }
}
impl From<crate::asm::AsmErr> for EngineErr {
    fn from(e: crate::asm::AsmErr) -> Self { Self::Asm(e) }
}
impl From<crate::asm::bin::BinErr> for EngineErr {
    fn from(e: crate::asm::bin::BinErr) -> Self { Self::Bin(e) }
}
impl From<crate::link::LinkErr> for EngineErr {
    fn from(e: crate::link::LinkErr) -> Self { Self::Link(e) }
}
impl From<ExecErr> for EngineErr {
    fn from(e: ExecErr) -> Self {
        match e {
            ExecErr::NotAvailable => Self::SimBusy,
            ExecErr::Poisoned     => Self::SimPoisoned,
        }
    }
}

/// One machine, one toolchain, one debugger session.
///
/// See the [module docs](self) for an overview.
#[derive(Debug)]
pub struct Engine {
    ctrl: SimController,
    config: EngineConfig,
    /// The currently loaded program, kept for its symbol table.
    obj: Option<ObjectFile>,
    input: Arc<RwLock<VecDeque<u8>>>,
    output: Arc<RwLock<Vec<u8>>>
}

fn recover<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(g) => g,
        Err(e) => e.into_inner(),
    }
}

impl Engine {
    /// Creates an engine with a fresh machine.
    pub fn new(config: EngineConfig) -> Self {
        let sim = Simulator::new(config.sim_flags());
        let input = Arc::clone(sim.devices.keyboard.get_buffer());
        let output = Arc::clone(sim.devices.display.get_buffer());
        Self {
            ctrl: SimController::new(sim),
            config,
            obj: None,
            input,
            output
        }
    }

    /// The current configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
    /// Replaces the configuration, updating the machine's flags.
    ///
    /// The new init strategy applies on the next reinitialization.
    pub fn set_config(&mut self, config: EngineConfig) -> Result<(), EngineErr> {
        let sim = self.ctrl.simulator()?;
        sim.flags = config.sim_flags();
        self.config = config;
        Ok(())
    }

    fn simulator(&mut self) -> Result<&mut Simulator, EngineErr> {
        self.ctrl.simulator().map_err(EngineErr::from)
    }

    /* TOOLCHAIN */

    /// Assembles a source file into an object file (without debug symbols).
    pub fn assemble(&self, src: &str) -> Result<ObjectFile, EngineErr> {
        let ast = parse_ast_with(src, self.config.parse_opts())?;
        Ok(asm::assemble(ast)?)
    }

    /// Assembles a source file into an object file with debug symbols,
    /// enabling source-level views after loading.
    pub fn assemble_debug(&self, src: &str) -> Result<ObjectFile, EngineErr> {
        let ast = parse_ast_with(src, self.config.parse_opts())?;
        Ok(asm::assemble_debug(ast, src)?)
    }

    /// Converts a raw `.bin` listing (one 16-bit binary word per line,
    /// first line is the origin) into an object file.
    pub fn convert_bin(&self, src: &str) -> Result<ObjectFile, EngineErr> {
        Ok(asm::bin::convert_bin(src)?)
    }

    /// Links object files into one, requiring every external label to
    /// be resolved.
    pub fn link(&self, objs: impl IntoIterator<Item = ObjectFile>) -> Result<ObjectFile, EngineErr> {
        Ok(crate::link::link_complete(objs)?)
    }

    /* MACHINE LIFECYCLE */

    /// Loads a program into a reinitialized machine.
    ///
    /// This resets run state, installs the object file's symbols, and
    /// clears all breakpoints.
    pub fn load_object_file(&mut self, obj: ObjectFile) -> Result<(), EngineErr> {
        let sim = self.ctrl.simulator()?;
        sim.reset();
        sim.load_obj_file(&obj).map_err(EngineErr::Load)?;
        sim.breakpoints.clear();
        self.obj = Some(obj);
        Ok(())
    }

    fn reset_with(&mut self, strategy: MachineInitStrategy) -> Result<(), EngineErr> {
        let obj = self.obj.take();
        let sim = self.ctrl.simulator()?;
        sim.flags.machine_init = strategy;
        sim.reset();
        if let Some(obj) = &obj {
            sim.load_obj_file(obj).map_err(EngineErr::Load)?;
        }
        self.obj = obj;
        Ok(())
    }

    /// Wipes the machine to a zeroed state and reloads the current
    /// program (if any).
    pub fn reinitialize_machine(&mut self) -> Result<(), EngineErr> {
        self.reset_with(MachineInitStrategy::Known { value: 0 })
    }

    /// Wipes the machine to a randomized state and reloads the current
    /// program (if any).
    pub fn randomize_machine(&mut self, seed: Option<u64>) -> Result<(), EngineErr> {
        let strategy = match seed {
            Some(seed) => MachineInitStrategy::Seeded { seed },
            None => MachineInitStrategy::Unseeded,
        };
        self.reset_with(strategy)
    }

    /// Restarts the machine with its configured init strategy and
    /// reloads the current program (if any).
    pub fn restart_machine(&mut self) -> Result<(), EngineErr> {
        self.reset_with(self.config.machine_init)
    }

    /* EXECUTION */

    /// Runs the machine on the worker thread, calling `done` with the
    /// outcome once it stops.
    ///
    /// Honors [`EngineConfig::run_until_halt`].
    pub fn run(
        &mut self,
        done: impl FnOnce(Result<PauseCondition, SimErr>) + Send + 'static
    ) -> Result<(), EngineErr> {
        let until_halt = self.config.run_until_halt;
        self.ctrl.execute(
            move |sim| match until_halt {
                true  => sim.run_until_halt(),
                false => sim.run(),
            },
            done
        )?;
        Ok(())
    }

    /// Executes one instruction on the worker thread.
    pub fn step_in(
        &mut self,
        done: impl FnOnce(Result<(), SimErr>) + Send + 'static
    ) -> Result<(), EngineErr> {
        self.ctrl.execute(|sim| sim.step_in(), done)?;
        Ok(())
    }

    /// Steps over the next instruction (running any call it makes to
    /// completion) on the worker thread.
    pub fn step_over(
        &mut self,
        done: impl FnOnce(Result<PauseCondition, SimErr>) + Send + 'static
    ) -> Result<(), EngineErr> {
        self.ctrl.execute(|sim| sim.step_over(), done)?;
        Ok(())
    }

    /// Runs until the current subroutine returns, on the worker thread.
    pub fn step_out(
        &mut self,
        done: impl FnOnce(Result<PauseCondition, SimErr>) + Send + 'static
    ) -> Result<(), EngineErr> {
        self.ctrl.execute(|sim| sim.step_out(), done)?;
        Ok(())
    }

    /// Pauses any in-flight run, blocking until the machine is back.
    pub fn pause(&mut self) -> Result<(), EngineErr> {
        self.ctrl.pause()?;
        Ok(())
    }

    /// Whether a run is currently in flight.
    pub fn is_sim_running(&mut self) -> bool {
        self.ctrl.is_running()
    }

    /// Whether the last run stopped at a breakpoint.
    pub fn did_hit_breakpoint(&mut self) -> bool {
        self.ctrl.simulator().map_or(false, |sim| sim.hit_breakpoint())
    }

    /// The current subroutine call depth.
    pub fn frame_number(&mut self) -> u64 {
        self.ctrl.simulator().map_or(0, |sim| sim.frame_stack.len())
    }

    /* STATE ACCESS */

    /// Reads a register by name (`r0`-`r7`, `pc`, `psr`, `mcr`).
    pub fn get_reg_value(&mut self, name: &str) -> Result<u16, EngineErr> {
        let reg = Self::named_reg(name)?;
        let sim = self.simulator()?;
        Ok(match reg {
            NamedReg::Gpr(r) => sim.reg_file[r],
            NamedReg::Pc  => sim.pc,
            NamedReg::Psr => sim.psr().get(),
            NamedReg::Mcr => u16::from(sim.mcr().load(Ordering::Relaxed)) << 15,
        })
    }

    /// Writes a register by name (`r0`-`r7`, `pc`, `psr`, `mcr`).
    pub fn set_reg_value(&mut self, name: &str, value: u16) -> Result<(), EngineErr> {
        let reg = Self::named_reg(name)?;
        let sim = self.simulator()?;
        match reg {
            NamedReg::Gpr(r) => sim.reg_file[r] = value,
            NamedReg::Pc  => sim.pc = value,
            NamedReg::Psr => sim.set_psr(value),
            NamedReg::Mcr => sim.mcr().store(value & 0x8000 != 0, Ordering::Release),
        }
        Ok(())
    }

    fn named_reg(name: &str) -> Result<NamedReg, EngineErr> {
        match &*name.to_lowercase() {
            "pc"  => Ok(NamedReg::Pc),
            "psr" => Ok(NamedReg::Psr),
            "mcr" => Ok(NamedReg::Mcr),
            lower => match lower.strip_prefix('r').and_then(|n| n.parse::<u8>().ok()) {
                Some(n) if n < 8 => Ok(NamedReg::Gpr(Reg(n))),
                _ => Err(EngineErr::InvalidRegister(name.to_string())),
            }
        }
    }

    /// Reads a memory location without disturbing the machine
    /// (device reads do not consume input).
    pub fn get_mem_value(&mut self, addr: u16) -> Result<u16, EngineErr> {
        Ok(self.simulator()?.peek_mem(addr))
    }

    /// Writes a memory location directly.
    pub fn set_mem_value(&mut self, addr: u16, value: u16) -> Result<(), EngineErr> {
        self.simulator()?.poke_mem(addr, value);
        Ok(())
    }

    /// The source line that assembled to this address, if the loaded
    /// program has debug symbols for it; otherwise a disassembly of
    /// the word currently there.
    pub fn get_mem_line(&mut self, addr: u16) -> Result<String, EngineErr> {
        if let Some(obj) = &self.obj {
            let sym = obj.symbol_table();
            if let (Some(line), Some(info)) = (sym.rev_lookup_line(addr), sym.source_info()) {
                if let Some(span) = info.line_span(line) {
                    return Ok(info.source()[span].trim().to_string());
                }
            }
        }

        let word = self.simulator()?.peek_mem(addr);
        Ok(match SimInstr::decode(word) {
            Ok(instr) => instr.to_string(),
            Err(_) => format!(".fill x{word:04X}"),
        })
    }

    /// Re-assembles one statement into the given address.
    ///
    /// The statement is assembled in isolation, so it cannot reference
    /// labels. It may span multiple words (e.g. `.stringz`).
    pub fn set_mem_line(&mut self, addr: u16, line: &str) -> Result<(), EngineErr> {
        let src = format!(".orig x{addr:04X}\n{line}\n.end");
        let ast = parse_ast_with(&src, self.config.parse_opts())?;
        let obj = asm::assemble(ast)?;

        let sim = self.simulator()?;
        for (a, word) in obj.addr_iter() {
            if let Some(word) = word {
                sim.poke_mem(a, word);
            }
        }
        Ok(())
    }

    /// The loaded program's symbol table.
    pub fn symbol_table(&self) -> Option<&SymbolTable> {
        self.obj.as_ref().map(|obj| obj.symbol_table())
    }

    /// Where a label appears in the loaded program's source, as
    /// `(start line, start col, end line, end col)`.
    ///
    /// Requires the program to have been assembled with debug symbols.
    pub fn get_label_source_range(&self, label: &str) -> Option<(usize, usize, usize, usize)> {
        let sym = self.symbol_table()?;
        let range = sym.get_label_source(label)?;
        let info = sym.source_info()?;

        let (sl, sc) = info.get_pos_pair(range.start);
        let (el, ec) = info.get_pos_pair(range.end);
        Some((sl, sc, el, ec))
    }

    /// The source range of the line that assembled to this address, as
    /// `(start line, start col, end line, end col)`.
    pub fn get_addr_source_range(&self, addr: u16) -> Option<(usize, usize, usize, usize)> {
        let sym = self.symbol_table()?;
        let line = sym.rev_lookup_line(addr)?;
        let info = sym.source_info()?;
        let span = info.line_span(line)?;

        let (sl, sc) = info.get_pos_pair(span.start);
        let (el, ec) = info.get_pos_pair(span.end);
        Some((sl, sc, el, ec))
    }

    /// Drains the set of memory addresses written since the last call,
    /// in ascending order.
    pub fn take_mem_changes(&mut self) -> Vec<u16> {
        self.ctrl.simulator()
            .map(|sim| sim.observer.take_mem_changes().collect())
            .unwrap_or_default()
    }

    /* BREAKPOINTS */

    /// Adds a breakpoint at an address, returning whether it was newly
    /// added. Fails (returns `false`) while the machine is running.
    pub fn set_breakpoint(&mut self, addr: u16) -> bool {
        self.ctrl.simulator()
            .map_or(false, |sim| sim.breakpoints.insert(Breakpoint::PC(addr)))
    }

    /// Removes the breakpoint at an address, returning whether one was
    /// there. Fails (returns `false`) while the machine is running.
    pub fn remove_breakpoint(&mut self, addr: u16) -> bool {
        self.ctrl.simulator()
            .map_or(false, |sim| sim.breakpoints.remove(&Breakpoint::PC(addr)))
    }

    /// The addresses of all PC breakpoints, in ascending order.
    pub fn breakpoints(&mut self) -> Vec<u16> {
        let mut addrs: Vec<_> = self.ctrl.simulator()
            .map(|sim| {
                sim.breakpoints.iter()
                    .filter_map(|bp| match bp {
                        Breakpoint::PC(addr) => Some(*addr),
                        _ => None
                    })
                    .collect()
            })
            .unwrap_or_default();
        addrs.sort_unstable();
        addrs
    }

    /* CONSOLE */

    /// Appends one character to the keyboard input buffer.
    ///
    /// Works while the machine is running.
    pub fn add_input(&mut self, ch: u8) {
        recover(&self.input).push_back(ch);
    }

    /// Discards all pending keyboard input.
    pub fn clear_input(&mut self) {
        recover(&self.input).clear();
    }

    /// Drains the display output accumulated since the last call.
    ///
    /// Works while the machine is running; calling twice in a row
    /// returns an empty string the second time.
    pub fn get_and_clear_output(&mut self) -> String {
        let bytes = std::mem::take(&mut *recover(&self.output));
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Discards all accumulated display output.
    pub fn clear_output(&mut self) {
        recover(&self.output).clear();
    }

    /* TIMER */

    /// The machine's timer device.
    pub fn timer(&mut self) -> Result<&mut crate::sim::device::TimerDevice, EngineErr> {
        Ok(&mut self.simulator()?.devices.timer)
    }

    /// Sets the timer's interrupt priority, validating it is 0-7.
    pub fn set_timer_priority(&mut self, priority: u8) -> Result<(), EngineErr> {
        if priority > 7 {
            return Err(EngineErr::InvalidPriority(priority));
        }
        self.simulator()?.devices.timer.priority = priority;
        Ok(())
    }

    /// Sets the timer's reload range, validating `min <= max`.
    pub fn set_timer_range(&mut self, min: u32, max: u32) -> Result<(), EngineErr> {
        if min > max {
            return Err(EngineErr::InvalidRange(min, max));
        }
        self.simulator()?.devices.timer.set_range(min, max);
        Ok(())
    }
}
impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

enum NamedReg {
    Gpr(Reg),
    Pc,
    Psr,
    Mcr
}

#[cfg(test)]
mod tests {
    use crossbeam_channel as cbc;

    use crate::sim::PauseCondition;

    use super::{Engine, EngineConfig, EngineErr};

    fn run_blocking(engine: &mut Engine) -> PauseCondition {
        let (send, recv) = cbc::bounded(1);
        engine.run(move |res| { let _ = send.send(res); }).unwrap();
        recv.recv().unwrap().unwrap()
    }

    #[test]
    fn test_assemble_load_run() {
        let mut engine = Engine::default();
        let obj = engine.assemble(r#"
            .orig x3000
                LEA R0, MSG
                PUTS
                HALT
            MSG: .stringz "hello"
            .end
        "#).unwrap();
        engine.load_object_file(obj).unwrap();

        assert_eq!(run_blocking(&mut engine), PauseCondition::Halt);
        assert_eq!(engine.get_and_clear_output(), "hello");
        // drained on read
        assert_eq!(engine.get_and_clear_output(), "");
    }

    #[test]
    fn test_input_reaches_program() {
        let mut engine = Engine::default();
        let obj = engine.assemble("
            .orig x3000
                GETC
                HALT
            .end
        ").unwrap();
        engine.load_object_file(obj).unwrap();
        engine.add_input(b'q');

        assert_eq!(run_blocking(&mut engine), PauseCondition::Halt);
        assert_eq!(engine.get_reg_value("r0").unwrap(), u16::from(b'q'));
    }

    #[test]
    fn test_registers_by_name() {
        let mut engine = Engine::default();
        engine.set_reg_value("r3", 0x1234).unwrap();
        assert_eq!(engine.get_reg_value("R3").unwrap(), 0x1234);

        engine.set_reg_value("pc", 0x4000).unwrap();
        assert_eq!(engine.get_reg_value("pc").unwrap(), 0x4000);

        assert_eq!(
            engine.get_reg_value("r8").unwrap_err(),
            EngineErr::InvalidRegister("r8".to_string())
        );
        assert!(matches!(
            engine.get_reg_value("cpsr").unwrap_err(),
            EngineErr::InvalidRegister(_)
        ));
    }

    #[test]
    fn test_breakpoints_and_frames() {
        let mut engine = Engine::default();
        let obj = engine.assemble("
            .orig x3000
                JSR SUB
                HALT
            SUB:
                ADD R0, R0, #1
                RET
            .end
        ").unwrap();
        engine.load_object_file(obj).unwrap();

        assert!(engine.set_breakpoint(0x3002));
        assert!(!engine.set_breakpoint(0x3002));

        assert_eq!(run_blocking(&mut engine), PauseCondition::Breakpoint);
        assert!(engine.did_hit_breakpoint());
        assert_eq!(engine.get_reg_value("pc").unwrap(), 0x3002);
        assert_eq!(engine.frame_number(), 1);

        assert_eq!(engine.breakpoints(), vec![0x3002]);
        assert!(engine.remove_breakpoint(0x3002));
        assert!(!engine.remove_breakpoint(0x3002));
    }

    #[test]
    fn test_run_until_halt_skips_breakpoints() {
        let mut engine = Engine::new(EngineConfig {
            run_until_halt: true,
            ..Default::default()
        });
        let obj = engine.assemble("
            .orig x3000
                AND R0, R0, #0
                ADD R0, R0, #2
                HALT
            .end
        ").unwrap();
        engine.load_object_file(obj).unwrap();
        engine.set_breakpoint(0x3001);

        assert_eq!(run_blocking(&mut engine), PauseCondition::Halt);
        assert_eq!(engine.get_reg_value("r0").unwrap(), 2);
    }

    #[test]
    fn test_mem_line_views() {
        let mut engine = Engine::default();
        let obj = engine.assemble_debug("
            .orig x3000
                ADD R1, R1, #7
                HALT
            .end
        ").unwrap();
        engine.load_object_file(obj).unwrap();

        // known line comes from the source
        assert_eq!(engine.get_mem_line(0x3000).unwrap(), "ADD R1, R1, #7");
        // unknown lines fall back to disassembly
        engine.set_mem_value(0x4000, 0x1025);
        assert_eq!(engine.get_mem_line(0x4000).unwrap(), "ADD R0, R0, #5");

        engine.set_mem_line(0x4001, "NOT R2, R3").unwrap();
        assert_eq!(engine.get_mem_value(0x4001).unwrap(), 0x94FF);
        // a statement referencing a label cannot assemble in isolation
        assert!(engine.set_mem_line(0x4002, "BR SOMEWHERE").is_err());
    }

    #[test]
    fn test_source_ranges() {
        let mut engine = Engine::default();
        let src = "\
.orig x3000
LOOP: ADD R0, R0, #-1
    BRp LOOP
    HALT
.end
";
        let obj = engine.assemble_debug(src).unwrap();
        engine.load_object_file(obj).unwrap();

        let (sl, sc, el, ec) = engine.get_label_source_range("LOOP").unwrap();
        assert_eq!((sl, sc, el, ec), (1, 0, 1, 4));

        let (sl, _, el, _) = engine.get_addr_source_range(0x3001).unwrap();
        assert_eq!((sl, el), (2, 2));
    }

    #[test]
    fn test_reinitialize_reloads_program() {
        let mut engine = Engine::default();
        let obj = engine.assemble("
            .orig x3000
                AND R0, R0, #0
                ADD R0, R0, #9
                HALT
            .end
        ").unwrap();
        engine.load_object_file(obj).unwrap();

        run_blocking(&mut engine);
        assert_eq!(engine.get_reg_value("r0").unwrap(), 9);

        engine.reinitialize_machine().unwrap();
        assert_eq!(engine.get_reg_value("r0").unwrap(), 0);
        assert_eq!(engine.get_reg_value("pc").unwrap(), 0x3000);
        // the program survives reinitialization
        run_blocking(&mut engine);
        assert_eq!(engine.get_reg_value("r0").unwrap(), 9);
    }

    #[test]
    fn test_timer_validation() {
        let mut engine = Engine::default();
        assert_eq!(
            engine.set_timer_priority(8).unwrap_err(),
            EngineErr::InvalidPriority(8)
        );
        engine.set_timer_priority(6).unwrap();
        assert_eq!(engine.timer().unwrap().priority, 6);

        assert_eq!(
            engine.set_timer_range(10, 2).unwrap_err(),
            EngineErr::InvalidRange(10, 2)
        );
        engine.set_timer_range(2, 10).unwrap();
        assert_eq!(engine.timer().unwrap().get_range(), (2, 10));
    }
}
