use crate::error::{Error, Result};

/// The data tape: a fixed-length byte buffer addressed by a single movable position.
///
/// The position always stays inside `[0, len - 1]`. Cell arithmetic wraps modulo 256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tape {
    cells: Vec<u8>,
    position: usize,
    wrap: bool,
}

impl Tape {
    /// Allocate a zero-filled tape of `len` cells.
    pub fn new(len: usize, wrap: bool) -> Result<Self> {
        if len == 0 {
            return Err(Error::ZeroLengthTape);
        }
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(len)
            .map_err(|_| Error::Allocation { bytes: len })?;
        cells.resize(len, 0);
        Ok(Self {
            cells,
            position: 0,
            wrap,
        })
    }

    /// Use a caller-supplied buffer as the tape. Its contents are kept;
    /// anything past `len` is dropped.
    pub fn from_buffer(mut buffer: Vec<u8>, len: usize, wrap: bool) -> Result<Self> {
        if len == 0 {
            return Err(Error::ZeroLengthTape);
        }
        if buffer.len() < len {
            return Err(Error::BufferTooShort {
                len: buffer.len(),
                required: len,
            });
        }
        buffer.truncate(len);
        Ok(Self {
            cells: buffer,
            position: 0,
            wrap,
        })
    }

    #[inline(always)]
    pub fn move_right(&mut self) {
        if self.position + 1 < self.cells.len() {
            self.position += 1;
        } else if self.wrap {
            self.position = 0;
        }
    }

    #[inline(always)]
    pub fn move_left(&mut self) {
        if self.position > 0 {
            self.position -= 1;
        } else if self.wrap {
            self.position = self.cells.len() - 1;
        }
    }

    #[inline(always)]
    pub fn increment(&mut self) {
        let cell = &mut self.cells[self.position];
        *cell = cell.wrapping_add(1);
    }

    #[inline(always)]
    pub fn decrement(&mut self) {
        let cell = &mut self.cells[self.position];
        *cell = cell.wrapping_sub(1);
    }

    #[inline(always)]
    pub fn read(&self) -> u8 {
        self.cells[self.position]
    }

    #[inline(always)]
    pub fn write(&mut self, value: u8) {
        self.cells[self.position] = value;
    }

    /// Zero every cell and return to the first one.
    pub fn clear(&mut self) {
        self.cells.fill(0);
        self.position = 0;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<u8> {
        self.cells
    }
}
