use tracing::debug;

use crate::error::{Error, Result};
use crate::host::{Chunk, Host};

pub(crate) const LBRACKET: u8 = b'[';
pub(crate) const RBRACKET: u8 = b']';

/// Precomputed bracket matches for a whole program.
///
/// The table is a flat run of `capacity * 2` slots holding `(start, end)`
/// pairs, one per `[` in program order. `start` is the instruction index just
/// after the `[` and `end` the index just after its matching `]`. Both are
/// stored as `position + 1`, so a zero slot means "not filled yet".
///
/// Pairs are appended in order of their `[`, which keeps the start column
/// strictly increasing. Alongside each pair the build pass records its
/// enclosing pair and the index the next sibling will get, so every runtime
/// jump is a table read plus at most a short walk from the last resolved pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopTable {
    slots: Vec<usize>,
    links: Vec<Link>,
    filled: usize,
    /// Innermost pair still missing its end while building.
    open: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    parent: Option<usize>,
    /// First pair whose `[` comes after this pair's `]`.
    after: usize,
}

impl LoopTable {
    /// An empty table with room for `capacity` bracket pairs.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let len = capacity
            .checked_mul(2)
            .ok_or(Error::Allocation { bytes: usize::MAX })?;
        let mut slots = Vec::new();
        slots.try_reserve_exact(len).map_err(|_| Error::Allocation {
            bytes: len.saturating_mul(size_of::<usize>()),
        })?;
        slots.resize(len, 0);
        let mut links = Vec::new();
        links.try_reserve_exact(capacity).map_err(|_| Error::Allocation {
            bytes: capacity.saturating_mul(size_of::<Link>()),
        })?;
        Ok(Self {
            slots,
            links,
            filled: 0,
            open: None,
        })
    }

    /// Run the one-time forward pass over every instruction `host` can supply,
    /// matching brackets as they stream past.
    ///
    /// The stream ends at the `eof` instruction, or when the host has no chunk
    /// covering the next position.
    pub fn build<'p, H: Host<'p> + ?Sized>(capacity: usize, host: &mut H, eof: u8) -> Result<Self> {
        let mut table = Self::with_capacity(capacity)?;
        let mut chunk: Option<Chunk<'p>> = None;
        let mut pc = 0;

        loop {
            let op = match chunk.as_ref().and_then(|c| c.fetch(pc)) {
                Some(op) => op,
                None => match host.next_chunk(pc) {
                    Some(next) if next.contains(pc) => {
                        chunk = Some(next);
                        continue;
                    }
                    _ => break,
                },
            };
            if op == eof {
                break;
            }
            match op {
                LBRACKET => table.open(pc)?,
                RBRACKET => table.close(pc)?,
                _ => {}
            }
            pc += 1;
        }

        table.finish()?;
        debug!(pairs = table.len(), instructions = pc, capacity, "loop table built");
        Ok(table)
    }

    /// Record a `[` at `position` in the next free pair.
    pub(crate) fn open(&mut self, position: usize) -> Result<()> {
        if self.filled == self.capacity() {
            return Err(Error::LoopCapacityExceeded {
                position,
                capacity: self.capacity(),
            });
        }
        let index = self.filled;
        self.slots[index * 2] = position + 1;
        self.links.push(Link {
            parent: self.open,
            after: 0,
        });
        self.filled += 1;
        self.open = Some(index);
        Ok(())
    }

    /// Record a `]` at `position` against the innermost pair still missing its end.
    pub(crate) fn close(&mut self, position: usize) -> Result<()> {
        let index = self.open.ok_or(Error::UnmatchedBracket {
            position,
            bracket: ']',
        })?;
        self.slots[index * 2 + 1] = position + 1;
        self.links[index].after = self.filled;
        self.open = self.links[index].parent;
        Ok(())
    }

    /// Reports the outermost `[` left open, if any.
    fn finish(&self) -> Result<()> {
        let Some(mut index) = self.open else {
            return Ok(());
        };
        while let Some(parent) = self.links[index].parent {
            index = parent;
        }
        Err(Error::UnmatchedBracket {
            position: self.slots[index * 2] - 1,
            bracket: '[',
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len() / 2
    }

    /// Number of pairs recorded.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Instruction index just after the `[` of pair `index`.
    #[inline(always)]
    pub fn start(&self, index: usize) -> usize {
        self.slots[index * 2]
    }

    /// Instruction index just after the `]` of pair `index`.
    #[inline(always)]
    pub fn end(&self, index: usize) -> usize {
        self.slots[index * 2 + 1]
    }

    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.slots[..self.filled * 2]
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
    }

    /// Find the pair whose start is `start`, walking from pair `hint`.
    ///
    /// Loops are usually entered in program order or re-entered in place, so
    /// the walk is normally zero or one step long.
    pub(crate) fn find_start(&self, hint: usize, start: usize) -> Option<usize> {
        if self.filled == 0 {
            return None;
        }
        let mut i = hint.min(self.filled - 1);
        while self.start(i) < start && i + 1 < self.filled {
            i += 1;
        }
        while self.start(i) > start && i > 0 {
            i -= 1;
        }
        (self.start(i) == start).then_some(i)
    }

    /// Find the pair whose end is `end`. Only needed when the loop cursor does
    /// not already point at it.
    pub(crate) fn find_end(&self, end: usize) -> Option<usize> {
        (0..self.filled).rev().find(|&i| self.end(i) == end)
    }

    /// The innermost pair enclosing pair `index`.
    #[inline(always)]
    pub(crate) fn enclosing(&self, index: usize) -> Option<usize> {
        self.links[index].parent
    }

    /// The pair that follows pair `index` once its loop is done, i.e. the
    /// next `[` that can be reached after its `]`.
    #[inline(always)]
    pub(crate) fn after(&self, index: usize) -> usize {
        self.links[index].after
    }
}
