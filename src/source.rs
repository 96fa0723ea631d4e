use std::io::{self, Read, Seek, SeekFrom};

use tracing::error;

use crate::host::{Chunk, Host};

/// Reads a program from any seekable reader, one fixed-size window at a time.
///
/// Only the requested window is ever held in memory. At end of input a
/// one-byte chunk containing the end-of-program marker is produced, so
/// programs stored without one still terminate cleanly. Read errors are
/// logged and end the stream.
#[derive(Debug)]
pub struct FileSource<R> {
    reader: R,
    chunk_len: usize,
    eof: u8,
}

impl<R: Read + Seek> FileSource<R> {
    pub fn new(reader: R, chunk_len: usize, eof: u8) -> Self {
        Self {
            reader,
            chunk_len: chunk_len.max(1),
            eof,
        }
    }

    /// Read the window starting at `position`.
    ///
    /// Returns the terminator chunk exactly at end of input and `None` past it.
    pub fn read_chunk(&mut self, position: usize) -> io::Result<Option<Chunk<'static>>> {
        let len = self.reader.seek(SeekFrom::End(0))?;
        let position_u64 = position as u64;
        if position_u64 > len {
            return Ok(None);
        }
        if position_u64 == len {
            return Ok(Some(Chunk::owned(position, vec![self.eof])));
        }

        self.reader.seek(SeekFrom::Start(position_u64))?;
        let want = (len - position_u64).min(self.chunk_len as u64) as usize;
        let mut buf = vec![0u8; want];
        self.reader.read_exact(&mut buf)?;
        Ok(Some(Chunk::owned(position, buf)))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<'p, R: Read + Seek> Host<'p> for FileSource<R> {
    fn next_chunk(&mut self, position: usize) -> Option<Chunk<'p>> {
        match self.read_chunk(position) {
            Ok(chunk) => chunk,
            Err(err) => {
                error!(position, error = %err, "failed to read program chunk");
                None
            }
        }
    }
}
