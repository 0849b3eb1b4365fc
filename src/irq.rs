use core::sync::atomic::{AtomicBool, Ordering};

/// External interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    /// External interrupt 0
    Eint0,
    /// External interrupt 1
    Eint1,
}

/// One-bit latches set by the external interrupt handlers.
///
/// The handlers call [`raise`](Self::raise); whoever cares about the event
/// consumes it with [`take`](Self::take). The monitor only carries a reference
/// so that board code can reach the latches from the console's context.
#[derive(Debug, Default)]
pub struct InterruptLatches {
    eint0: AtomicBool,
    eint1: AtomicBool,
}

impl InterruptLatches {
    /// All latches clear. Usable in a `static`.
    pub const fn new() -> Self {
        Self {
            eint0: AtomicBool::new(false),
            eint1: AtomicBool::new(false),
        }
    }

    fn latch(&self, line: Line) -> &AtomicBool {
        match line {
            Line::Eint0 => &self.eint0,
            Line::Eint1 => &self.eint1,
        }
    }

    /// Record an event. Called from the interrupt handler.
    pub fn raise(&self, line: Line) {
        self.latch(line).store(true, Ordering::Release);
    }

    /// Whether an event is pending.
    pub fn is_raised(&self, line: Line) -> bool {
        self.latch(line).load(Ordering::Acquire)
    }

    /// Consume a pending event, clearing the latch in the same operation.
    pub fn take(&self, line: Line) -> bool {
        self.latch(line).swap(false, Ordering::AcqRel)
    }
}
