use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cooperative pause request shared between an interpreter and whoever
/// wants to stop it: a signal handler, a scheduler, another thread.
///
/// The interpreter only ever reads the token, once before each instruction.
/// [`PauseToken::pause`] is a release store and the interpreter's check is an
/// acquire load, so writes made before calling `pause` are visible to the
/// interpreter by the time it stops. A pause never interrupts an instruction,
/// and it does not reach into a blocked host callback.
///
/// Clones share the same flag, so one token can pause several interpreters.
#[derive(Debug, Clone, Default)]
pub struct PauseToken {
    requested: Arc<AtomicBool>,
}

impl PauseToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the interpreter to stop at the next instruction boundary.
    pub fn pause(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Withdraw a pause request. Execution does not resume until the
    /// interpreter is run again.
    pub fn unpause(&self) {
        self.requested.store(false, Ordering::Release);
    }

    #[inline(always)]
    pub fn is_paused(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}
