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

//! # Serial link
//!
//! Blocking byte I/O over an open serial port, with every successful read,
//! write and discard mirrored into the session [`Transcript`] before control
//! returns to the caller.
//!
//! The same link is reused across operations that each need a locally
//! different read timeout, so timeout changes go through a LIFO stack:
//! [`Link::with_read_timeout`] installs an override and restores the
//! previous value on every exit path. The stack is empty outside any
//! override scope.

use std::{io, time::Duration};

use serial::SerialPort;

use crate::{
    constants::{NORMAL_TIMEOUT, NUL},
    error::{Error, Result},
    transcript::Transcript,
};

/// Read timeout used while draining stale input.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(1);

pub struct Link<P> {
    port: P,
    transcript: Transcript,
    read_timeout: Duration,
    saved_timeouts: Vec<Duration>,
}

impl<P> Link<P>
where
    P: SerialPort,
{
    /// Wrap an already opened and configured port.
    pub fn new(mut port: P, transcript: Transcript) -> Result<Link<P>> {
        port.set_timeout(NORMAL_TIMEOUT)?;

        Ok(Link {
            port,
            transcript,
            read_timeout: NORMAL_TIMEOUT,
            saved_timeouts: Vec::new(),
        })
    }

    /// Write all of `bytes` synchronously.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        self.transcript.note_sent(bytes)?;

        Ok(())
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_all(&[byte])
    }

    /// Write the ASCII bytes of `text` followed by a single NUL.
    pub fn write_nul_terminated(&mut self, text: &str) -> Result<()> {
        debug_assert!(text.is_ascii());

        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(NUL);

        self.write_all(&bytes)
    }

    /// Read one byte, blocking up to the current read timeout.
    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = self.raw_read_byte()?;
        self.transcript.note_received(&[byte])?;

        Ok(byte)
    }

    /// Read until `buffer` is filled exactly.
    ///
    /// Bytes received before a timeout fires are still recorded in the
    /// transcript.
    pub fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buffer.len() {
            match self.port.read(&mut buffer[filled..]) {
                Ok(0) => {
                    self.transcript.note_received(&buffer[..filled])?;
                    return Err(eof_error().into());
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    self.transcript.note_received(&buffer[..filled])?;
                    return Err(Error::Timeout("serial read".into()));
                }
                Err(e) => {
                    self.transcript.note_received(&buffer[..filled])?;
                    return Err(e.into());
                }
            }
        }
        self.transcript.note_received(buffer)?;

        Ok(())
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout)?;
        self.read_timeout = timeout;

        Ok(())
    }

    /// Save the current read timeout and install `timeout` in its place.
    pub fn push_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        let previous = self.read_timeout;
        self.set_read_timeout(timeout)?;
        self.saved_timeouts.push(previous);

        Ok(())
    }

    /// Restore the most recently saved read timeout.
    pub fn pop_read_timeout(&mut self) -> Result<()> {
        let previous = self
            .saved_timeouts
            .pop()
            .ok_or_else(|| Error::Invariant("read-timeout stack underflow".into()))?;

        self.set_read_timeout(previous)
    }

    /// Run `operation` with `timeout` installed, restoring the previous
    /// timeout on every exit path.
    pub fn with_read_timeout<T, F>(&mut self, timeout: Duration, operation: F) -> Result<T>
    where
        F: FnOnce(&mut Link<P>) -> Result<T>,
    {
        self.push_read_timeout(timeout)?;
        let result = operation(self);
        let restored = self.pop_read_timeout();

        match result {
            Ok(value) => restored.map(|_| value),
            Err(e) => Err(e),
        }
    }

    /// Depth of the saved-timeout stack. Zero outside any override scope.
    pub fn timeout_depth(&self) -> usize {
        self.saved_timeouts.len()
    }

    /// Drain any buffered unread bytes, recording them as discarded.
    pub fn discard_input(&mut self, exiting: bool) -> Result<()> {
        self.push_read_timeout(DRAIN_TIMEOUT)?;

        let mut drained = Vec::new();
        let result = loop {
            let mut byte = [0u8; 1];
            match self.port.read(&mut byte) {
                Ok(0) => break Ok(()),
                Ok(_) => drained.push(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break Ok(()),
                Err(e) => break Err(Error::from(e)),
            }
        };

        let restored = self.pop_read_timeout();
        self.transcript.note_discarded(&drained, exiting)?;

        result.and(restored)
    }

    /// Final cleanup: give in-flight transmissions time to land, drain
    /// them, and close the transcript.
    pub fn cleanup_for_exit(mut self) -> Result<()> {
        #[cfg(not(test))]
        std::thread::sleep(Duration::from_millis(50));

        self.discard_input(true)?;
        self.transcript.close()?;

        Ok(())
    }

    fn raw_read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Err(eof_error().into()),
            Ok(_) => Ok(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                Err(Error::Timeout("serial read".into()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn eof_error() -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "serial port returned end of file",
    )
}
