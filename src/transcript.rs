// Copyright 2023 SST39SF Programmer Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Session transcript
//!
//! Append-only hex/ASCII record of every byte that crosses the serial line.
//! Sent bytes render in the left column, received bytes in the right, both
//! in 8-byte groups with an ASCII gutter. Bytes drained from the input
//! buffer appear between `Discarded:` (or `Discarded on exit:`) and
//! `End discard.` banners.
//!
//! One buffer per direction, each holding at most one group. At most one of
//! the two may be non-empty at any instant: when traffic switches direction,
//! the pending buffer is flushed first. That ordering rule is what makes the
//! transcript a faithful serialisation of the conversation.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

/// Bytes per rendered group.
const GROUP: usize = 8;
/// Column where received-byte groups start.
const RECV_COLUMN: usize = 40;

pub struct Transcript {
    out: Option<Box<dyn Write>>,
    sent: Vec<u8>,
    received: Vec<u8>,
}

impl Transcript {
    /// Create (or truncate) the transcript file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Transcript> {
        let file = File::create(path)?;
        Ok(Transcript::with_writer(Box::new(BufWriter::new(file))))
    }

    /// Record the transcript into an arbitrary writer.
    pub fn with_writer(out: Box<dyn Write>) -> Transcript {
        Transcript {
            out: Some(out),
            sent: Vec::with_capacity(GROUP),
            received: Vec::with_capacity(GROUP),
        }
    }

    /// Record bytes the host sent.
    pub fn note_sent(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &byte in bytes {
            if !self.received.is_empty() {
                self.flush_received()?;
            }
            self.sent.push(byte);
            if self.sent.len() == GROUP {
                self.flush_sent()?;
            }
        }
        Ok(())
    }

    /// Record bytes the host received.
    pub fn note_received(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &byte in bytes {
            if !self.sent.is_empty() {
                self.flush_sent()?;
            }
            self.received.push(byte);
            if self.received.len() == GROUP {
                self.flush_received()?;
            }
        }
        Ok(())
    }

    /// Record bytes drained from the input buffer without being consumed.
    pub fn note_discarded(&mut self, bytes: &[u8], exiting: bool) -> io::Result<()> {
        self.flush()?;
        let banner = if exiting {
            "Discarded on exit:"
        } else {
            "Discarded:"
        };
        writeln!(self.writer()?, "{}", banner)?;
        for chunk in bytes.chunks(GROUP) {
            let line = render_group(chunk);
            writeln!(self.writer()?, "{}", line)?;
        }
        writeln!(self.writer()?, "End discard.")?;
        Ok(())
    }

    /// Write out whichever direction buffer is pending (at most one is).
    pub fn flush(&mut self) -> io::Result<()> {
        debug_assert!(self.sent.is_empty() || self.received.is_empty());
        if !self.sent.is_empty() {
            self.flush_sent()?;
        }
        if !self.received.is_empty() {
            self.flush_received()?;
        }
        Ok(())
    }

    /// Flush pending bytes and release the underlying file.
    pub fn close(&mut self) -> io::Result<()> {
        self.flush()?;
        if let Some(mut out) = self.out.take() {
            out.flush()?;
        }
        Ok(())
    }

    fn flush_sent(&mut self) -> io::Result<()> {
        let line = render_group(&self.sent);
        self.sent.clear();
        writeln!(self.writer()?, "{}", line)
    }

    fn flush_received(&mut self) -> io::Result<()> {
        let line = render_group(&self.received);
        self.received.clear();
        writeln!(self.writer()?, "{:indent$}{}", "", line, indent = RECV_COLUMN)
    }

    fn writer(&mut self) -> io::Result<&mut dyn Write> {
        match self.out {
            Some(ref mut out) => Ok(out.as_mut()),
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "transcript already closed",
            )),
        }
    }
}

impl Drop for Transcript {
    fn drop(&mut self) {
        // Buffered bytes must survive even an error exit.
        let _ = self.close();
    }
}

fn render_group(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(GROUP * 3);
    let mut ascii = String::with_capacity(GROUP);
    for (i, &byte) in bytes.iter().enumerate() {
        if i > 0 {
            hex.push(' ');
        }
        hex.push_str(&format!("{:02X}", byte));
        ascii.push(if (0x20..0x7F).contains(&byte) {
            byte as char
        } else {
            '.'
        });
    }
    format!("{:<23}  |{:<8}|", hex, ascii)
}
