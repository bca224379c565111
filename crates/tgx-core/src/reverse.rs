//! Reverse line reader for append-only record logs.
//!
//! Lines are produced last-to-first while only one fixed-size window of the
//! file is held in memory. A line that straddles two windows is stitched back
//! together before it is emitted, and bytes are decoded only once a whole line
//! is known, so multi-byte UTF-8 sequences never get split.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
};

use tracing::debug;

use crate::{errors::Error, Result};

pub const DEFAULT_BUFFER_SIZE: usize = 8192;

const NEWLINE: u8 = b'\n';

/// Iterator over the lines of a file in reverse physical order.
///
/// Each instance scans from the end of the file; there is no resumable cursor.
/// The file handle is released when the iterator is dropped.
pub struct ReverseLines {
    file: File,
    file_size: u64,
    remaining: u64,
    buf: Vec<u8>,
    // Leading fragment of the last window read; its start may live in an earlier window.
    segment: Option<Vec<u8>>,
    // Complete lines of the current window in forward order; `pop()` yields the latest.
    ready: Vec<Vec<u8>>,
    finished: bool,
}

impl ReverseLines {
    pub fn open(path: impl AsRef<Path>, buffer_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if buffer_size == 0 {
            return Err(Error::InvalidArgument(
                "reverse reader buffer size must be at least 1 byte".to_string(),
            ));
        }

        let mut file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let file_size = file.seek(SeekFrom::End(0))?;
        debug!(path = %path.display(), file_size, buffer_size, "reverse scan started");

        Ok(Self {
            file,
            file_size,
            remaining: file_size,
            buf: vec![0; buffer_size],
            segment: None,
            ready: Vec::new(),
            finished: false,
        })
    }

    /// Read the next window toward the start of the file and split it into lines.
    fn read_window(&mut self) -> Result<()> {
        let window = self.remaining.min(self.buf.len() as u64) as usize;
        let start = self.remaining - window as u64;
        self.file.seek(SeekFrom::Start(start))?;
        self.file.read_exact(&mut self.buf[..window])?;

        let mut data = &self.buf[..window];
        // Only the window touching EOF may carry the file's trailing newline.
        if self.remaining == self.file_size && data.last() == Some(&NEWLINE) {
            data = &data[..data.len() - 1];
        }
        self.remaining = start;

        let mut pieces = data.split(|&b| b == NEWLINE);
        let mut head = pieces.next().unwrap_or_default().to_vec();
        self.ready.extend(pieces.map(<[u8]>::to_vec));

        if let Some(tail) = self.segment.take() {
            match self.ready.last_mut() {
                Some(last) => last.extend_from_slice(&tail),
                None => head.extend_from_slice(&tail),
            }
        }
        self.segment = Some(head);

        debug!(start, window, lines = self.ready.len(), "reverse window read");
        Ok(())
    }

    fn fail(&mut self, err: Error) -> Option<Result<String>> {
        self.finished = true;
        self.ready.clear();
        self.segment = None;
        Some(Err(err))
    }
}

impl Iterator for ReverseLines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.ready.pop() {
                return match decode(line) {
                    Ok(s) => Some(Ok(s)),
                    Err(e) => self.fail(e),
                };
            }
            if self.finished {
                return None;
            }
            if self.remaining == 0 {
                // The file's first line has no newline before it.
                self.finished = true;
                return self.segment.take().map(decode);
            }
            if let Err(e) = self.read_window() {
                return self.fail(e);
            }
        }
    }
}

/// Open `path` and iterate its lines last-to-first with the default buffer.
pub fn reverse_lines(path: impl AsRef<Path>) -> Result<ReverseLines> {
    ReverseLines::open(path, DEFAULT_BUFFER_SIZE)
}

fn decode(line: Vec<u8>) -> Result<String> {
    String::from_utf8(line).map_err(|e| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line is not valid UTF-8: {e}"),
        ))
    })
}
