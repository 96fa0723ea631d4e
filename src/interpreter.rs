use tracing::{debug, warn};

use crate::config::Config;
use crate::control::PauseToken;
use crate::engine::{Engine, Status};
use crate::error::{Error, Result};
use crate::host::{Chunk, Host};
use crate::loops::LoopTable;
use crate::tape::Tape;

/// Lifecycle of an [`Interpreter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created, or `init` failed. Only `init` and `clean_up` are allowed.
    Uninitialized,
    /// Tape and loop table exist; nothing is executing.
    Ready,
    /// Inside a `run` call.
    Running,
    /// The last run stopped on a pause request. Another `run` resumes it.
    Paused,
    /// `clean_up` released everything. No further operations are valid.
    Terminated,
}

/// A chunked, resumable interpreter for the eight-instruction tape language.
///
/// Programs are never held in memory as a whole. `init` streams the program
/// once from the host to build the loop table; execution then consumes chunks
/// either supplied to [`Interpreter::run`] or, in continuous mode, pulled from
/// the host as needed.
///
/// ```
/// use ebf::{Chunk, Config, Interpreter, SliceSource, Status};
///
/// let program = b"++[>+++<-]>\0";
/// let mut interp = Interpreter::new(SliceSource::new(program, 4));
/// interp.init(Config::default(), None, 8).unwrap();
/// let status = interp.run(Chunk::borrowed(0, &program[..4])).unwrap();
/// assert_eq!(status, Status::Halted);
/// assert_eq!(interp.tape().unwrap().cells()[1], 6);
/// ```
pub struct Interpreter<H> {
    host: H,
    config: Config,
    engine: Option<Engine>,
    state: State,
    processing: bool,
    pause: PauseToken,
}

impl<H> Interpreter<H> {
    /// An uninitialized interpreter that talks to `host`.
    pub fn new(host: H) -> Self {
        Self::with_pause_token(host, PauseToken::new())
    }

    /// Like [`Interpreter::new`], but observing an existing pause token, so
    /// several interpreters can be paused together.
    pub fn with_pause_token(host: H, pause: PauseToken) -> Self {
        Self {
            host,
            config: Config::default(),
            engine: None,
            state: State::Uninitialized,
            processing: false,
            pause,
        }
    }

    /// Allocate the tape and loop table and run the loop-table build pass.
    ///
    /// `buffer` is used as the tape when given (its contents are kept);
    /// otherwise a zero-filled tape of `len` cells is allocated. If anything
    /// fails the interpreter stays uninitialized and whatever was allocated
    /// is released.
    pub fn init<'p>(&mut self, config: Config, buffer: Option<Vec<u8>>, len: usize) -> Result<()>
    where
        H: Host<'p>,
    {
        if self.state != State::Uninitialized {
            return Err(self.invalid("init"));
        }

        let built = match buffer {
            Some(buffer) => Tape::from_buffer(buffer, len, config.wrap_data_pointer),
            None => Tape::new(len, config.wrap_data_pointer),
        }
        .and_then(|tape| {
            let loops = LoopTable::build(config.max_loops, &mut self.host, config.eof)?;
            Ok(Engine::new(tape, loops))
        });

        match built {
            Ok(engine) => {
                debug!(
                    tape_len = len,
                    loops = engine.loops.len(),
                    continuous = config.continuous,
                    "interpreter initialized"
                );
                self.config = config;
                self.engine = Some(engine);
                self.state = State::Ready;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "interpreter initialization failed");
                Err(err)
            }
        }
    }

    /// Execute from the current program counter, starting with `chunk`.
    ///
    /// Returns when the program ends, when a pause request is seen, or, in
    /// manual mode, when the next instruction is outside the chunk. The
    /// program counter is left on the next instruction to execute, so the
    /// caller resumes by supplying a chunk that covers it.
    pub fn run<'p>(&mut self, chunk: Chunk<'p>) -> Result<Status>
    where
        H: Host<'p>,
    {
        self.execute(chunk, None)
    }

    /// Like [`Interpreter::run`], but stop after at most `max_steps`
    /// instructions with [`Status::StepLimit`].
    pub fn run_for<'p>(&mut self, chunk: Chunk<'p>, max_steps: u64) -> Result<Status>
    where
        H: Host<'p>,
    {
        self.execute(chunk, Some(max_steps))
    }

    fn execute<'p>(&mut self, chunk: Chunk<'p>, budget: Option<u64>) -> Result<Status>
    where
        H: Host<'p>,
    {
        if !self.is_valid() {
            return Err(self.invalid("run"));
        }
        if self.processing {
            return Err(Error::WouldBlock);
        }
        if chunk.is_empty() {
            return Err(Error::EmptyChunk {
                start: chunk.start(),
            });
        }
        let Some(engine) = self.engine.as_mut() else {
            return Err(self.invalid("run"));
        };

        self.processing = true;
        let result = engine.run(chunk, &mut self.host, &self.config, &self.pause, budget);
        // Left set if a host callback panics: the instance may be mid-instruction.
        self.processing = false;

        self.state = match result {
            Ok(Status::Paused) => State::Paused,
            _ => State::Ready,
        };
        if let Ok(status) = result {
            debug!(?status, pc = engine.pc, steps = engine.steps, "run returned");
        }
        result
    }

    /// Request a pause at the next instruction boundary. Also reachable from
    /// other threads through [`Interpreter::pause_token`].
    pub fn pause(&self) {
        self.pause.pause();
    }

    /// Withdraw a pause request. Call `run` again to resume.
    pub fn unpause(&self) {
        self.pause.unpause();
    }

    pub fn pause_token(&self) -> PauseToken {
        self.pause.clone()
    }

    /// Zero the tape and rewind to the first instruction, keeping all allocations.
    pub fn reset(&mut self) -> Result<()> {
        if self.processing {
            return Err(Error::WouldBlock);
        }
        let Some(engine) = self.engine.as_mut() else {
            return Err(self.invalid("reset"));
        };
        engine.reset();
        self.state = State::Ready;
        debug!("interpreter reset");
        Ok(())
    }

    /// Release the tape and loop table. The interpreter cannot be used afterwards.
    pub fn clean_up(&mut self) -> Result<()> {
        if self.processing {
            return Err(Error::WouldBlock);
        }
        if self.state == State::Terminated {
            return Err(self.invalid("clean_up"));
        }
        self.engine = None;
        self.state = State::Terminated;
        debug!("interpreter cleaned up");
        Ok(())
    }

    /// Absolute index of the next instruction to execute.
    pub fn program_counter(&self) -> usize {
        self.engine.as_ref().map_or(0, |engine| engine.pc)
    }

    /// Instructions executed since `init` or the last `reset`.
    pub fn steps(&self) -> u64 {
        self.engine.as_ref().map_or(0, |engine| engine.steps)
    }

    pub fn is_valid(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn state(&self) -> State {
        if self.processing {
            State::Running
        } else {
            self.state
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tape(&self) -> Option<&Tape> {
        self.engine.as_ref().map(|engine| &engine.tape)
    }

    pub fn loop_table(&self) -> Option<&LoopTable> {
        self.engine.as_ref().map(|engine| &engine.loops)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::Invalid {
            operation,
            state: self.state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SliceSource;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    /// Serves a program and records everything written by `.`.
    struct Recording<'p> {
        source: SliceSource<'p>,
        output: Vec<u8>,
    }

    impl<'p> Recording<'p> {
        fn new(program: &'p [u8], chunk_len: usize) -> Self {
            Self {
                source: SliceSource::new(program, chunk_len),
                output: Vec::new(),
            }
        }
    }

    impl<'p> Host<'p> for Recording<'p> {
        fn output(&mut self, byte: u8) {
            self.output.push(byte);
        }

        fn next_chunk(&mut self, position: usize) -> Option<Chunk<'p>> {
            self.source.next_chunk(position)
        }
    }

    fn manual(max_loops: usize) -> Config {
        Config {
            eof: 0,
            wrap_data_pointer: false,
            continuous: false,
            max_loops,
        }
    }

    #[test]
    fn test_end_to_end() {
        let program = b">+++.<";
        let mut interp = Interpreter::new(Recording::new(program, 64));
        interp.init(manual(4), None, 4).unwrap();
        assert_eq!(interp.state(), State::Ready);

        let status = interp.run(Chunk::borrowed(0, program)).unwrap();
        assert_eq!(status, Status::ChunkExhausted);
        assert_eq!(interp.host().output, vec![3]);
        let tape = interp.tape().unwrap();
        assert_eq!(tape.cells(), &[0, 3, 0, 0]);
        assert_eq!(tape.position(), 0);
        assert!(!interp.is_processing());
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let mut whole = Interpreter::new(());
        whole.init(manual(0), None, 2).unwrap();
        whole.run(Chunk::borrowed(0, b"++")).unwrap();

        let mut split = Interpreter::new(());
        split.init(manual(0), None, 2).unwrap();
        assert_eq!(split.run(Chunk::borrowed(0, b"+")).unwrap(), Status::ChunkExhausted);
        assert_eq!(split.program_counter(), 1);
        assert_eq!(split.run(Chunk::borrowed(1, b"+")).unwrap(), Status::ChunkExhausted);

        assert_eq!(whole.tape(), split.tape());
        assert_eq!(split.program_counter(), 2);
    }

    #[test]
    fn test_chunk_not_covering_pc_returns_immediately() {
        let mut interp = Interpreter::new(());
        interp.init(manual(0), None, 1).unwrap();
        assert_eq!(interp.run(Chunk::borrowed(5, b"+")).unwrap(), Status::ChunkExhausted);
        assert_eq!(interp.program_counter(), 0);
        assert_eq!(interp.steps(), 0);
    }

    #[test]
    fn test_zero_capacity_rejects_loops() {
        let mut interp = Interpreter::new(SliceSource::new(b"+[-]", 64));
        let err = interp.init(manual(0), None, 4).unwrap_err();
        assert_eq!(err, Error::LoopCapacityExceeded { position: 1, capacity: 0 });
        assert_eq!(interp.state(), State::Uninitialized);
        assert!(!interp.is_valid());
    }

    #[test]
    fn test_unmatched_close_fails_init() {
        let mut interp = Interpreter::new(SliceSource::new(b"]", 64));
        let err = interp.init(manual(4), None, 4).unwrap_err();
        assert_eq!(err, Error::UnmatchedBracket { position: 0, bracket: ']' });
        assert!(!interp.is_valid());
        // A failed init can be retried once the program is fixed.
        *interp.host_mut() = SliceSource::new(b"[]", 64);
        interp.init(manual(4), None, 4).unwrap();
        assert!(interp.is_valid());
    }

    #[test]
    fn test_tape_errors() {
        let mut interp = Interpreter::new(());
        assert_eq!(interp.init(manual(0), None, 0), Err(Error::ZeroLengthTape));
        assert_eq!(
            interp.init(manual(0), Some(vec![1]), 2),
            Err(Error::BufferTooShort { len: 1, required: 2 })
        );
        interp.init(manual(0), Some(vec![9, 9, 9]), 3).unwrap();
        assert_eq!(interp.tape().unwrap().cells(), &[9, 9, 9]);
    }

    #[test]
    fn test_allocation_failure_leaves_uninitialized() {
        let mut interp = Interpreter::new(());
        let err = interp.init(manual(0), None, usize::MAX).unwrap_err();
        assert!(matches!(err, Error::Allocation { .. }));
        let err = interp.init(manual(usize::MAX / 4), None, 4).unwrap_err();
        assert!(matches!(err, Error::Allocation { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Resource);
        assert!(!interp.is_valid());
        assert_eq!(interp.state(), State::Uninitialized);
    }

    #[test]
    fn test_wrapping_data_pointer() {
        let program = b"<+";
        let mut interp = Interpreter::new(SliceSource::new(program, 64));
        let config = Config {
            wrap_data_pointer: true,
            ..manual(0)
        };
        interp.init(config, None, 3).unwrap();
        interp.run(Chunk::borrowed(0, program)).unwrap();
        let tape = interp.tape().unwrap();
        assert_eq!(tape.cells(), &[0, 0, 1]);
        assert_eq!(tape.position(), 2);
    }

    #[test]
    fn test_loops_without_chunk_source() {
        // Nothing to scan at init, so the brackets met later have no table entries.
        let mut interp = Interpreter::new(());
        interp.init(manual(8), None, 1).unwrap();
        let err = interp.run(Chunk::borrowed(0, b"+[-]")).unwrap_err();
        assert_eq!(err, Error::LoopNotIndexed { position: 1 });
        assert_eq!(interp.program_counter(), 1);
    }

    #[test]
    fn test_pause_before_run() {
        let program = b"+++";
        let mut interp = Interpreter::new(());
        interp.init(manual(0), None, 1).unwrap();
        interp.run_for(Chunk::borrowed(0, program), 1).unwrap();
        assert_eq!(interp.program_counter(), 1);

        interp.pause();
        let status = interp.run(Chunk::borrowed(0, program)).unwrap();
        assert_eq!(status, Status::Paused);
        assert_eq!(interp.state(), State::Paused);
        assert!(!interp.is_processing());
        assert_eq!(interp.program_counter(), 1);
        assert_eq!(interp.tape().unwrap().read(), 1);

        // Clearing the request does not resume by itself.
        interp.unpause();
        assert_eq!(interp.program_counter(), 1);
        assert_eq!(interp.run(Chunk::borrowed(0, program)).unwrap(), Status::ChunkExhausted);
        assert_eq!(interp.tape().unwrap().read(), 3);
        assert_eq!(interp.state(), State::Ready);
    }

    /// Pauses through a shared token after a number of output bytes.
    struct PauseAfter<'p> {
        source: SliceSource<'p>,
        token: PauseToken,
        remaining: usize,
    }

    impl<'p> Host<'p> for PauseAfter<'p> {
        fn output(&mut self, _byte: u8) {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.token.pause();
            }
        }

        fn next_chunk(&mut self, position: usize) -> Option<Chunk<'p>> {
            self.source.next_chunk(position)
        }
    }

    #[test]
    fn test_pause_from_collaborator_stops_at_boundary() {
        let program = b"+.+.+.+.\0";
        let token = PauseToken::new();
        let host = PauseAfter {
            source: SliceSource::new(program, 3),
            token: token.clone(),
            remaining: 2,
        };
        let mut interp = Interpreter::with_pause_token(host, token.clone());
        interp.init(Config::default(), None, 1).unwrap();

        let status = interp.run(Chunk::borrowed(0, &program[..3])).unwrap();
        assert_eq!(status, Status::Paused);
        // The second '.' completed, nothing after it ran.
        assert_eq!(interp.program_counter(), 4);
        assert_eq!(interp.tape().unwrap().read(), 2);

        token.unpause();
        interp.host_mut().remaining = usize::MAX;
        let status = interp.run(Chunk::borrowed(3, &program[3..6])).unwrap();
        assert_eq!(status, Status::Halted);
        assert_eq!(interp.tape().unwrap().read(), 4);
        assert_eq!(interp.program_counter(), 8);
    }

    #[test]
    fn test_continuous_loop_across_chunks() {
        let program = b"+++[>++<-]>.\0";
        let mut interp = Interpreter::new(Recording::new(program, 2));
        interp.init(Config::default(), None, 2).unwrap();
        let status = interp.run(Chunk::borrowed(0, &program[..2])).unwrap();
        assert_eq!(status, Status::Halted);
        assert_eq!(interp.host().output, vec![6]);
        assert_eq!(interp.loop_table().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_chunk() {
        // The source ends without an end-of-program marker.
        let program = b"++";
        let mut interp = Interpreter::new(SliceSource::new(program, 1));
        interp.init(Config::default(), None, 1).unwrap();
        let err = interp.run(Chunk::borrowed(0, &program[..1])).unwrap_err();
        assert_eq!(err, Error::UnknownChunk { position: 2 });
        assert_eq!(interp.tape().unwrap().read(), 2);
        assert!(!interp.is_processing());
        assert_eq!(interp.state(), State::Ready);
    }

    #[test]
    fn test_empty_chunk_rejected() {
        let mut interp = Interpreter::new(());
        interp.init(manual(0), None, 1).unwrap();
        assert_eq!(
            interp.run(Chunk::borrowed(3, b"")),
            Err(Error::EmptyChunk { start: 3 })
        );
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut interp = Interpreter::new(());
        assert_eq!(
            interp.run(Chunk::borrowed(0, b"+")),
            Err(Error::Invalid { operation: "run", state: State::Uninitialized })
        );
        assert!(matches!(interp.reset(), Err(Error::Invalid { .. })));

        interp.init(manual(0), None, 1).unwrap();
        assert_eq!(
            interp.init(manual(0), None, 1),
            Err(Error::Invalid { operation: "init", state: State::Ready })
        );

        interp.clean_up().unwrap();
        assert_eq!(interp.state(), State::Terminated);
        assert!(!interp.is_valid());
        assert!(interp.tape().is_none());
        assert_eq!(
            interp.run(Chunk::borrowed(0, b"+")),
            Err(Error::Invalid { operation: "run", state: State::Terminated })
        );
        assert!(matches!(interp.init(manual(0), None, 1), Err(Error::Invalid { .. })));
        assert!(matches!(interp.clean_up(), Err(Error::Invalid { .. })));
    }

    #[test]
    fn test_reset() {
        let program = b"+>++[-]";
        let mut interp = Interpreter::new(SliceSource::new(program, 64));
        interp.init(manual(2), None, 3).unwrap();
        interp.run(Chunk::borrowed(0, program)).unwrap();
        assert_eq!(interp.steps(), 9);

        interp.reset().unwrap();
        assert_eq!(interp.program_counter(), 0);
        assert_eq!(interp.steps(), 0);
        assert_eq!(interp.tape().unwrap().cells(), &[0, 0, 0]);
        assert_eq!(interp.state(), State::Ready);
        // The loop table survives a reset.
        assert_eq!(interp.loop_table().unwrap().len(), 1);

        interp.run(Chunk::borrowed(0, program)).unwrap();
        assert_eq!(interp.tape().unwrap().cells(), &[1, 0, 0]);
    }

    struct Exploding;

    impl<'p> Host<'p> for Exploding {
        fn output(&mut self, _byte: u8) {
            panic!("output device failed");
        }
    }

    #[test]
    fn test_reentry_after_panicking_collaborator() {
        let mut interp = Interpreter::new(Exploding);
        interp.init(manual(0), None, 1).unwrap();
        let unwound = catch_unwind(AssertUnwindSafe(|| interp.run(Chunk::borrowed(0, b"+.+"))));
        assert!(unwound.is_err());

        assert!(interp.is_processing());
        assert_eq!(interp.state(), State::Running);
        assert_eq!(interp.run(Chunk::borrowed(0, b"+.+")), Err(Error::WouldBlock));
        assert_eq!(interp.reset(), Err(Error::WouldBlock));
        assert_eq!(interp.clean_up(), Err(Error::WouldBlock));
    }

    #[test]
    fn test_borrowed_host() {
        let program = b"+.\0";
        let mut recording = Recording::new(program, 64);
        {
            let mut interp = Interpreter::new(&mut recording);
            interp.init(Config::default(), None, 1).unwrap();
            interp.run(Chunk::borrowed(0, program)).unwrap();
        }
        assert_eq!(recording.output, vec![1]);
    }
}
