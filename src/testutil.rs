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

//! Test doubles: a scripted serial port that replays a device's side of a
//! dialogue, and a shared buffer for capturing transcript output.

use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, Read, Write},
    rc::Rc,
    time::Duration,
};

use serial::SerialPort;

/// One scripted event on the mock port's input side.
#[derive(Debug, Clone, Copy)]
pub enum Event {
    Byte(u8),
    /// One read that times out. Reads past the end of the script also
    /// time out, so this is only needed mid-script.
    Timeout,
}

/// Builder for the device's side of a dialogue.
pub struct Script(Vec<Event>);

impl Script {
    pub fn new() -> Script {
        Script(Vec::new())
    }

    /// The device transmits `bytes`.
    pub fn recv(mut self, bytes: &[u8]) -> Script {
        self.0.extend(bytes.iter().map(|&b| Event::Byte(b)));
        self
    }

    /// The line goes quiet for one read.
    pub fn silence(mut self) -> Script {
        self.0.push(Event::Timeout);
        self
    }

    /// Consume the script, returning the port and a handle onto every byte
    /// the host writes to it.
    pub fn into_port(self) -> (MockPort, Rc<RefCell<Vec<u8>>>) {
        let written = Rc::new(RefCell::new(Vec::new()));
        let port = MockPort {
            events: self.0.into(),
            written: Rc::clone(&written),
            timeout: Duration::from_millis(0),
        };
        (port, written)
    }
}

pub struct MockPort {
    events: VecDeque<Event>,
    written: Rc<RefCell<Vec<u8>>>,
    timeout: Duration,
}

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "scripted timeout")
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.events.pop_front() {
            Some(Event::Byte(byte)) => {
                buf[0] = byte;
                Ok(1)
            }
            Some(Event::Timeout) | None => Err(timed_out()),
        }
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialPort for MockPort {
    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> serial::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn configure(&mut self, _settings: &serial::PortSettings) -> serial::Result<()> {
        Ok(())
    }

    fn reconfigure(
        &mut self,
        _setup: &dyn Fn(&mut dyn serial::SerialPortSettings) -> serial::Result<()>,
    ) -> serial::Result<()> {
        Ok(())
    }

    fn set_rts(&mut self, _level: bool) -> serial::Result<()> {
        Ok(())
    }

    fn set_dtr(&mut self, _level: bool) -> serial::Result<()> {
        Ok(())
    }

    fn read_cts(&mut self) -> serial::Result<bool> {
        unreachable!()
    }

    fn read_dsr(&mut self) -> serial::Result<bool> {
        unreachable!()
    }

    fn read_ri(&mut self) -> serial::Result<bool> {
        unreachable!()
    }

    fn read_cd(&mut self) -> serial::Result<bool> {
        unreachable!()
    }
}

/// An `io::Write` whose contents remain inspectable after the writer has
/// been moved into a [`crate::Transcript`].
#[derive(Clone)]
pub struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    pub fn new() -> SharedBuf {
        SharedBuf(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
