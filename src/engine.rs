use tracing::trace;

use crate::config::Config;
use crate::control::PauseToken;
use crate::error::{Error, Result};
use crate::host::{Chunk, Host};
use crate::loops::{LBRACKET, LoopTable, RBRACKET};
use crate::tape::Tape;

const LESS: u8 = b'<';
const GREATER: u8 = b'>';
const MINUS: u8 = b'-';
const PLUS: u8 = b'+';
const DOT: u8 = b'.';
const COMMA: u8 = b',';

/// Why a run handed control back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The end-of-program instruction was reached. The program counter stays on it.
    Halted,
    /// Manual mode only: the next instruction is outside the supplied chunk.
    ChunkExhausted,
    /// A pause request was seen between two instructions.
    Paused,
    /// The step budget given to `run_for` is used up.
    StepLimit,
}

/// Fetch-decode-execute state: the tape, the loop table and where execution is.
///
/// `current_loop` is the innermost loop whose body is executing. Together with
/// [`LoopTable::enclosing`] it stands in for a runtime loop stack.
/// `loop_hint` is the pair the next `[` is expected to resolve to; lookups start walking there.
#[derive(Debug)]
pub(crate) struct Engine {
    pub(crate) tape: Tape,
    pub(crate) loops: LoopTable,
    pub(crate) pc: usize,
    pub(crate) steps: u64,
    current_loop: Option<usize>,
    loop_hint: usize,
}

impl Engine {
    pub(crate) fn new(tape: Tape, loops: LoopTable) -> Self {
        Self {
            tape,
            loops,
            pc: 0,
            steps: 0,
            current_loop: None,
            loop_hint: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.tape.clear();
        self.pc = 0;
        self.steps = 0;
        self.current_loop = None;
        self.loop_hint = 0;
    }

    /// Execute instructions starting at the current program counter.
    ///
    /// `pause` is checked before every instruction, so a request that is
    /// already set stops the run before anything executes. On error the tape
    /// and program counter are left as of the last completed instruction.
    pub(crate) fn run<'p, H: Host<'p> + ?Sized>(
        &mut self,
        mut chunk: Chunk<'p>,
        host: &mut H,
        config: &Config,
        pause: &PauseToken,
        budget: Option<u64>,
    ) -> Result<Status> {
        let mut executed: u64 = 0;

        loop {
            if pause.is_paused() {
                return Ok(Status::Paused);
            }
            if budget.is_some_and(|limit| executed >= limit) {
                return Ok(Status::StepLimit);
            }

            let op = match chunk.fetch(self.pc) {
                Some(op) => op,
                None if config.continuous => {
                    let pc = self.pc;
                    chunk = host
                        .next_chunk(pc)
                        .filter(|next| next.contains(pc))
                        .ok_or(Error::UnknownChunk { position: pc })?;
                    continue;
                }
                None => return Ok(Status::ChunkExhausted),
            };
            if op == config.eof {
                return Ok(Status::Halted);
            }

            self.execute(op, host)?;
            executed += 1;
            self.steps += 1;
        }
    }

    #[inline(always)]
    fn execute<'p, H: Host<'p> + ?Sized>(&mut self, op: u8, host: &mut H) -> Result<()> {
        match op {
            GREATER => self.tape.move_right(),
            LESS => self.tape.move_left(),
            PLUS => self.tape.increment(),
            MINUS => self.tape.decrement(),
            DOT => host.output(self.tape.read()),
            COMMA => {
                if let Some(value) = host.input() {
                    self.tape.write(value);
                }
            }
            LBRACKET => return self.enter_loop(),
            RBRACKET => return self.exit_loop(),
            _ => {} // no-op
        }
        self.pc += 1;
        Ok(())
    }

    fn enter_loop(&mut self) -> Result<()> {
        let position = self.pc;
        let index = self
            .loops
            .find_start(self.loop_hint, position + 1)
            .ok_or_else(|| self.missing(position))?;

        if self.tape.read() == 0 {
            self.pc = self.loops.end(index);
            self.loop_hint = self.loops.after(index);
            trace!(from = position, to = self.pc, "skip loop");
        } else {
            self.current_loop = Some(index);
            self.loop_hint = index;
            self.pc += 1;
        }
        Ok(())
    }

    fn exit_loop(&mut self) -> Result<()> {
        let position = self.pc;
        let index = match self.current_loop {
            Some(i) if self.loops.end(i) == position + 1 => i,
            _ => self
                .loops
                .find_end(position + 1)
                .ok_or_else(|| self.missing(position))?,
        };

        if self.tape.read() != 0 {
            self.pc = self.loops.start(index);
            self.current_loop = Some(index);
            self.loop_hint = index;
            trace!(from = position, to = self.pc, "repeat loop");
        } else {
            self.current_loop = self.loops.enclosing(index);
            self.loop_hint = self.loops.after(index);
            self.pc += 1;
        }
        Ok(())
    }

    /// The error for a bracket at `position` that has no pair in the table.
    fn missing(&self, position: usize) -> Error {
        match self.loops.capacity() {
            0 => Error::LoopCapacityExceeded {
                position,
                capacity: 0,
            },
            _ => Error::LoopNotIndexed { position },
        }
    }
}
