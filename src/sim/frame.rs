//! The call frame stack.
//!
//! The simulator pushes a [`Frame`] whenever control transfers into a
//! subroutine, trap, or interrupt service routine, and pops it when the
//! matching return executes. The current depth drives the debugger's
//! step-over and step-out operations.

/// What kind of call produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// A `JSR`/`JSRR` call.
    Subroutine,
    /// A `TRAP` dispatch.
    Trap,
    /// An interrupt (or fault) dispatch.
    Interrupt
}

/// One entry of the frame stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Address of the instruction that made the call
    /// (for interrupts, the instruction that was about to execute).
    pub caller_addr: u16,
    /// Address control transferred to.
    pub callee_addr: u16,
    /// What kind of call this was.
    pub frame_type: FrameType
}

/// The stack of currently active call frames.
#[derive(Debug, Default)]
pub struct FrameStack {
    frames: Vec<Frame>
}
impl FrameStack {
    /// Creates an empty frame stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently active frames, outermost first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// The current call depth (0 when no subroutine is active).
    pub fn len(&self) -> u64 {
        self.frames.len() as u64
    }

    /// Whether no call is currently active.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(super) fn push_frame(&mut self, caller_addr: u16, callee_addr: u16, frame_type: FrameType) {
        self.frames.push(Frame { caller_addr, callee_addr, frame_type });
    }

    /// Pops the top frame. Unbalanced returns (a `RET` with no matching
    /// call) simply leave the stack empty.
    pub(super) fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub(super) fn clear(&mut self) {
        self.frames.clear();
    }
}
