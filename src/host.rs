use std::borrow::Cow;

/// A window of instructions covering `start..start + len()` in absolute
/// program-counter terms.
///
/// Chunks either borrow the caller's buffer or own bytes read on demand
/// (see [`crate::source::FileSource`]). The interpreter never keeps a chunk
/// beyond the `run` call it was handed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'p> {
    start: usize,
    instructions: Cow<'p, [u8]>,
}

impl Chunk<'static> {
    pub fn owned(start: usize, instructions: Vec<u8>) -> Self {
        Self {
            start,
            instructions: Cow::Owned(instructions),
        }
    }
}

impl<'p> Chunk<'p> {
    pub fn borrowed(start: usize, instructions: &'p [u8]) -> Self {
        Self {
            start,
            instructions: Cow::Borrowed(instructions),
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last program-counter value this chunk covers.
    pub fn end(&self) -> usize {
        self.start + self.instructions.len()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn contains(&self, pc: usize) -> bool {
        pc >= self.start && pc < self.end()
    }

    /// The instruction at absolute position `pc`, if this chunk covers it.
    #[inline(always)]
    pub fn fetch(&self, pc: usize) -> Option<u8> {
        pc.checked_sub(self.start)
            .and_then(|offset| self.instructions.get(offset).copied())
    }

    pub fn instructions(&self) -> &[u8] {
        &self.instructions
    }
}

/// The collaborators an interpreter calls out to while it runs.
///
/// Every method has a default that stands for "not provided": output is
/// discarded, input leaves the current cell untouched, and no further chunks
/// are available. `()` is the host with no collaborators at all.
///
/// All three are called synchronously from inside the fetch-execute loop, so
/// a pause request cannot take effect while one of them is blocked.
pub trait Host<'p> {
    /// Called for every `.` with the value of the current cell.
    fn output(&mut self, byte: u8) {
        let _ = byte;
    }

    /// Called for every `,`. `None` leaves the current cell unchanged.
    fn input(&mut self) -> Option<u8> {
        None
    }

    /// Supply instructions starting at (or covering) `position`.
    ///
    /// Used by the loop-table build pass and, in continuous mode, whenever
    /// execution runs off the end of the current chunk. `None` or an empty
    /// chunk ends the stream.
    fn next_chunk(&mut self, position: usize) -> Option<Chunk<'p>> {
        let _ = position;
        None
    }
}

impl<'p> Host<'p> for () {}

impl<'p, H: Host<'p> + ?Sized> Host<'p> for &mut H {
    fn output(&mut self, byte: u8) {
        (**self).output(byte)
    }

    fn input(&mut self) -> Option<u8> {
        (**self).input()
    }

    fn next_chunk(&mut self, position: usize) -> Option<Chunk<'p>> {
        (**self).next_chunk(position)
    }
}

/// Serves an in-memory program in windows of at most `chunk_len` bytes.
#[derive(Debug, Clone)]
pub struct SliceSource<'p> {
    program: &'p [u8],
    chunk_len: usize,
}

impl<'p> SliceSource<'p> {
    pub fn new(program: &'p [u8], chunk_len: usize) -> Self {
        Self {
            program,
            chunk_len: chunk_len.max(1),
        }
    }

    /// The window starting at `position`, or `None` past the end of the program.
    pub fn chunk_at(&self, position: usize) -> Option<Chunk<'p>> {
        if position >= self.program.len() {
            return None;
        }
        let end = (position + self.chunk_len).min(self.program.len());
        Some(Chunk::borrowed(position, &self.program[position..end]))
    }
}

impl<'p> Host<'p> for SliceSource<'p> {
    fn next_chunk(&mut self, position: usize) -> Option<Chunk<'p>> {
        self.chunk_at(position)
    }
}
