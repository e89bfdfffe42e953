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

//! # SST39SF programmer interface library
//!
//! Host side of an Arduino-based programmer for SST39SF-family parallel NOR
//! flash chips. The microcontroller speaks a framed, acknowledgement
//! oriented protocol over 115200 8-N-1 serial; this crate drives it:
//! whole-chip erase, straight binary writes starting at address 0, and
//! multi-file programming at arbitrary addresses planned into 4096-byte
//! sector images.
//!
//! The entry point is [`Programmer`], generic over any
//! [`serial::SerialPort`]. Every byte that crosses the line is mirrored
//! into a [`Transcript`] for post-mortem inspection.
//!
//! # Protocol sketch
//!
//! After reset the device broadcasts `WAITING\0` once per second until the
//! host acknowledges it ([`Programmer::bootstrap`]). Commands are
//! NUL-terminated ASCII strings answered with ACK (`0x06`) or NAK (`0x15`)
//! plus a NUL-terminated diagnostic. Sector contents are confirmed by
//! echo-verification: the device repeats back what it received and the
//! host accepts or rejects the echo.

use std::fmt;

use serial::SerialPort;

#[rustfmt::skip]
pub mod constants;
pub mod plan;
pub mod ports;
pub mod util;

mod error;
mod link;
mod transcript;

pub use self::error::{Error, Result};
pub use self::link::Link;
pub use self::transcript::Transcript;

#[cfg(test)]
pub(crate) mod testutil;

use crate::constants::{
    ACK, CMD_DONE, CMD_ERASE_CHIP, CMD_PROGRAM_SECTOR, CONFIRM_PROMPT, EXTENDED_TIMEOUT,
    MAX_NAK_MESSAGE, NAK, NORMAL_TIMEOUT, NUL, NUM_RETRIES, SECTOR_COUNT, SECTOR_SIZE, WAITING,
};

/// Phase the protocol currently expects the device to be in.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SessionState {
    /// Port is open, handshake not yet attempted.
    Uninitialized,
    /// Waiting for the device's `WAITING\0` broadcast.
    Bootstrapping,
    /// Device is ready for the next command.
    Idle,
    /// A command frame is out, its ACK not yet in.
    AwaitingAck,
    /// Sector index or data sent, echo not yet verified.
    AwaitingEcho,
    /// Device is programming or erasing flash.
    AwaitingCompletion,
    /// `DONE` acknowledged, session over.
    Terminated,
}

/// A connected SST39SF programmer.
pub struct Programmer<P> {
    link: Link<P>,
    state: SessionState,
}

impl<P> Programmer<P>
where
    P: SerialPort,
{
    /// Wrap an already opened and configured port.
    ///
    /// The device is not contacted yet; call [`Programmer::bootstrap`]
    /// before issuing any command.
    pub fn new(port: P, transcript: Transcript) -> Result<Self> {
        Ok(Programmer {
            link: Link::new(port, transcript)?,
            state: SessionState::Uninitialized,
        })
    }

    /// Returns the current protocol phase.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Complete the initial handshake, leaving the device idle.
    ///
    /// The device transmits `WAITING\0` once per second after reset. Its
    /// first transmissions are known to drop characters, so the host
    /// settles for a second, discards whatever arrived, and then hunts for
    /// the first `W`. Bytes received before it are kept for diagnostics
    /// only.
    pub fn bootstrap(&mut self) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            return Err(Error::Invariant(format!(
                "bootstrap attempted in state {:?}",
                self.state
            )));
        }
        self.state = SessionState::Bootstrapping;

        log::debug!("waiting for the device broadcast");
        #[cfg(not(test))]
        std::thread::sleep(std::time::Duration::from_millis(1000));
        self.link.discard_input(false)?;
        self.link.set_read_timeout(NORMAL_TIMEOUT)?;

        let mut prelude = Vec::new();
        let mut candidate = Vec::new();
        loop {
            let byte = match self.link.read_byte() {
                Ok(byte) => byte,
                Err(Error::Timeout(_)) => {
                    return Err(bootstrap_failure(&prelude, &candidate, "the line went silent"));
                }
                Err(e) => return Err(e),
            };

            if candidate.is_empty() && byte != b'W' {
                prelude.push(byte);
            } else {
                candidate.push(byte);
            }

            if candidate.len() == WAITING.len() || prelude.len() == WAITING.len() || byte == NUL {
                break;
            }
        }

        if candidate != WAITING {
            return Err(bootstrap_failure(
                &prelude,
                &candidate,
                "device did not announce itself",
            ));
        }

        self.link.write_byte(ACK)?;
        // The device may already have queued a repeat broadcast; let it
        // land and throw it away.
        #[cfg(not(test))]
        std::thread::sleep(std::time::Duration::from_millis(50));
        self.link.discard_input(false)?;

        self.state = SessionState::Idle;
        log::debug!("handshake complete, device is idle");

        Ok(())
    }

    /// Send a NUL-terminated ASCII command and collect its ACK, retrying
    /// on NAK up to [`NUM_RETRIES`] times.
    ///
    /// Any response byte other than ACK or NAK, and any timeout, is
    /// unrecoverable and fails immediately.
    pub fn send_command(&mut self, command: &str) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(Error::Invariant(format!(
                "command `{}` issued in state {:?}",
                command, self.state
            )));
        }

        log::debug!("sending command `{}`", command);
        self.state = SessionState::AwaitingAck;

        let result = self.link.with_read_timeout(NORMAL_TIMEOUT, |link| {
            for attempt in 1..=NUM_RETRIES + 1 {
                link.write_nul_terminated(command)?;
                match link.read_byte()? {
                    ACK => return Ok(()),
                    NAK => {
                        let message = read_nak_payload(link)?;
                        log::warn!(
                            "device rejected `{}` (attempt {}): {}",
                            command,
                            attempt,
                            message
                        );
                    }
                    other => return Err(Error::UnexpectedResponse(other)),
                }
            }

            Err(Error::RetriesExhausted {
                operation: format!("command `{}`", command),
                attempts: NUM_RETRIES + 1,
            })
        });

        if result.is_ok() {
            self.state = SessionState::Idle;
        }
        result
    }

    /// Wait for the terminal ACK of a long-running device operation.
    ///
    /// `extended` selects [`EXTENDED_TIMEOUT`] for operations that keep the
    /// device busy programming flash cells.
    pub fn wait_for_completion(&mut self, operation: &str, extended: bool) -> Result<()> {
        let timeout = if extended {
            EXTENDED_TIMEOUT
        } else {
            NORMAL_TIMEOUT
        };
        self.state = SessionState::AwaitingCompletion;

        let result = self.link.with_read_timeout(timeout, |link| {
            match link.read_byte() {
                Ok(ACK) => Ok(()),
                Ok(NAK) => {
                    let message = read_nak_payload(link)?;
                    Err(Error::Device(format!("{} failed: {}", operation, message)))
                }
                Ok(other) => Err(Error::UnexpectedResponse(other)),
                Err(Error::Timeout(_)) => {
                    Err(Error::Timeout(format!("{} completion", operation)))
                }
                Err(e) => Err(e),
            }
        });

        if result.is_ok() {
            self.state = SessionState::Idle;
        }
        result
    }

    /// Program one 4096-byte sector.
    ///
    /// Both the sector index and the sector body are echo-verified: the
    /// device repeats back what it received, and the host answers ACK on a
    /// match or NAK to request a retransmission, bounded by
    /// [`NUM_RETRIES`].
    pub fn program_sector(&mut self, index: u16, image: &[u8]) -> Result<()> {
        if image.len() != SECTOR_SIZE {
            return Err(Error::Invariant(format!(
                "sector image must be exactly {} bytes, got {}",
                SECTOR_SIZE,
                image.len()
            )));
        }
        if index >= SECTOR_COUNT {
            return Err(Error::Invariant(format!(
                "sector index {} out of range (chip has {} sectors)",
                index, SECTOR_COUNT
            )));
        }

        log::debug!("programming sector #{}", index);
        self.send_command(CMD_PROGRAM_SECTOR)?;

        self.state = SessionState::AwaitingEcho;
        self.link.with_read_timeout(NORMAL_TIMEOUT, |link| {
            exchange_sector_index(link, index)?;
            exchange_sector_body(link, index, image)
        })?;

        self.wait_for_completion("sector programming", true)
    }

    /// Drive the chip-erase dialogue.
    ///
    /// The device answers the command with a `CONFIRM?\0` prompt; `confirm`
    /// supplies the operator's decision. Returns `false` when the operator
    /// declined, in which case the device is back to idle and nothing was
    /// erased.
    pub fn erase_chip<F>(&mut self, mut confirm: F) -> Result<bool>
    where
        F: FnMut() -> bool,
    {
        self.send_command(CMD_ERASE_CHIP)?;

        let mut prompt = [0u8; CONFIRM_PROMPT.len()];
        self.link
            .with_read_timeout(NORMAL_TIMEOUT, |link| link.read_exact(&mut prompt))?;
        if &prompt[..] != CONFIRM_PROMPT {
            return Err(Error::UnexpectedReply {
                expected: "erase confirmation prompt".into(),
                received: hex_string(&prompt),
            });
        }

        if !confirm() {
            self.link.write_byte(NAK)?;
            log::info!("chip erase declined by operator");
            return Ok(false);
        }

        self.link.write_byte(ACK)?;
        self.wait_for_completion("chip erase", false)?;

        Ok(true)
    }

    /// Send the terminal `DONE`, moving the device into its halt state.
    pub fn finish(&mut self) -> Result<()> {
        self.send_command(CMD_DONE)?;
        self.state = SessionState::Terminated;

        Ok(())
    }

    /// Release the port: absorb in-flight transmissions, record them as
    /// discarded, and flush the transcript. Runs on failure paths too.
    pub fn cleanup_for_exit(self) -> Result<()> {
        self.link.cleanup_for_exit()
    }
}

impl<P> fmt::Debug for Programmer<P>
where
    P: SerialPort,
{
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Programmer")
            .field("state", &self.state)
            .field("link", &())
            .finish()
    }
}

/// Exchange the 2-byte little-endian sector index with echo verification.
///
/// A device NAK here means it has dropped back to idle; unlike an echo
/// mismatch, that cannot be retried.
fn exchange_sector_index<P>(link: &mut Link<P>, index: u16) -> Result<()>
where
    P: SerialPort,
{
    for _ in 1..=NUM_RETRIES + 1 {
        link.write_all(&index.to_le_bytes())?;
        match link.read_byte()? {
            ACK => {}
            NAK => {
                let message = read_nak_payload(link)?;
                return Err(Error::Device(format!(
                    "sector index {} rejected: {}",
                    index, message
                )));
            }
            other => return Err(Error::UnexpectedResponse(other)),
        }

        let mut echo = [0u8; 2];
        link.read_exact(&mut echo)?;
        if u16::from_le_bytes(echo) == index {
            link.write_byte(ACK)?;
            return Ok(());
        }

        log::warn!(
            "sector index echo mismatch: sent {}, device echoed {}",
            index,
            u16::from_le_bytes(echo)
        );
        link.write_byte(NAK)?;
    }

    Err(Error::RetriesExhausted {
        operation: format!("sector {} index exchange", index),
        attempts: NUM_RETRIES + 1,
    })
}

/// Transmit the sector body and verify the device's 4096-byte echo.
fn exchange_sector_body<P>(link: &mut Link<P>, index: u16, image: &[u8]) -> Result<()>
where
    P: SerialPort,
{
    for _ in 1..=NUM_RETRIES + 1 {
        link.write_all(image)?;

        let mut echo = vec![0u8; image.len()];
        link.read_exact(&mut echo)?;
        if echo == image {
            link.write_byte(ACK)?;
            return Ok(());
        }

        log::warn!("sector {} data echo mismatch, retransmitting", index);
        link.write_byte(NAK)?;
    }

    Err(Error::RetriesExhausted {
        operation: format!("sector {} data exchange", index),
        attempts: NUM_RETRIES + 1,
    })
}

/// Read the NUL-terminated diagnostic that follows a device NAK.
///
/// The cap defends against a misbehaving device streaming an unterminated
/// payload.
fn read_nak_payload<P>(link: &mut Link<P>) -> Result<String>
where
    P: SerialPort,
{
    let mut payload = Vec::new();
    loop {
        let byte = link.read_byte()?;
        if byte == NUL {
            break;
        }
        payload.push(byte);
        if payload.len() == MAX_NAK_MESSAGE - 1 {
            log::warn!("NAK diagnostic exceeded {} bytes, truncating", MAX_NAK_MESSAGE);
            break;
        }
    }

    Ok(String::from_utf8_lossy(&payload).into_owned())
}

fn bootstrap_failure(prelude: &[u8], candidate: &[u8], reason: &str) -> Error {
    Error::Bootstrap(format!(
        "{} (bytes before first `W`: [{}], candidate message: [{}])",
        reason,
        hex_string(prelude),
        hex_string(candidate),
    ))
}

pub(crate) fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Serial port settings the programmer firmware expects.
pub fn port_settings() -> serial::PortSettings {
    serial::PortSettings {
        baud_rate: serial::BaudRate::Baud115200,
        char_size: serial::CharSize::Bits8,
        parity: serial::Parity::ParityNone,
        stop_bits: serial::StopBits::Stop1,
        flow_control: serial::FlowControl::FlowNone,
    }
}

#[cfg(test)]
pub mod test {
    use std::{cell::RefCell, io, rc::Rc};

    use super::*;
    use crate::testutil::{MockPort, Script};

    fn programmer_with(script: Script) -> (Programmer<MockPort>, Rc<RefCell<Vec<u8>>>) {
        let (port, written) = script.into_port();
        let transcript = Transcript::with_writer(Box::new(io::sink()));
        (Programmer::new(port, transcript).unwrap(), written)
    }

    fn idle_programmer(script: Script) -> (Programmer<MockPort>, Rc<RefCell<Vec<u8>>>) {
        let (mut programmer, written) = programmer_with(script);
        programmer.state = SessionState::Idle;
        (programmer, written)
    }

    fn nak_with(script: Script, message: &str) -> Script {
        script.recv(&[NAK]).recv(message.as_bytes()).recv(&[NUL])
    }

    #[test]
    fn test_hex_string() {
        assert_eq!(hex_string(&[0x57, 0x41, 0x00]), "57 41 00");
        assert_eq!(hex_string(&[]), "");
    }

    #[test]
    fn test_bootstrap_happy_path() {
        // S1: the broadcast arrives clean.
        let script = Script::new().silence().recv(b"WAITING\0");
        let (mut programmer, written) = programmer_with(script);

        programmer.bootstrap().unwrap();

        assert_eq!(*written.borrow(), [ACK]);
        assert_eq!(programmer.state(), SessionState::Idle);
        assert_eq!(programmer.link.timeout_depth(), 0);
    }

    #[test]
    fn test_bootstrap_garbage_then_message() {
        // S2: two corrupt bytes precede the broadcast.
        let script = Script::new()
            .silence()
            .recv(&[0xFF, 0xA5])
            .recv(b"WAITING\0");
        let (mut programmer, written) = programmer_with(script);

        programmer.bootstrap().unwrap();
        assert_eq!(*written.borrow(), [ACK]);
    }

    #[test]
    fn test_bootstrap_reports_both_buffers_on_failure() {
        let script = Script::new().silence().recv(&[0x01, 0x02]).recv(b"WAIT");
        let (mut programmer, written) = programmer_with(script);

        match programmer.bootstrap() {
            Err(Error::Bootstrap(message)) => {
                assert!(message.contains("01 02"));
                assert!(message.contains("57 41 49 54"));
            }
            other => panic!("expected bootstrap failure, got {:?}", other),
        }
        assert!(written.borrow().is_empty());
        assert_eq!(programmer.link.timeout_depth(), 0);
    }

    #[test]
    fn test_bootstrap_gives_up_when_first_w_never_arrives() {
        let script = Script::new().silence().recv(&[0xDE; 8]).recv(b"WAITING\0");
        let (mut programmer, _written) = programmer_with(script);

        assert!(matches!(programmer.bootstrap(), Err(Error::Bootstrap(_))));
    }

    #[test]
    fn test_bootstrap_stops_on_stray_nul() {
        let script = Script::new().silence().recv(b"WAI\0");
        let (mut programmer, _written) = programmer_with(script);

        assert!(matches!(programmer.bootstrap(), Err(Error::Bootstrap(_))));
    }

    #[test]
    fn test_send_command_succeeds_within_allowed_retries() {
        let mut script = Script::new();
        for _ in 0..NUM_RETRIES {
            script = nak_with(script, "checksum error");
        }
        script = script.recv(&[ACK]);
        let (mut programmer, written) = idle_programmer(script);

        programmer.send_command("DONE").unwrap();

        let mut expected = Vec::new();
        for _ in 0..NUM_RETRIES + 1 {
            expected.extend_from_slice(b"DONE\0");
        }
        assert_eq!(*written.borrow(), expected);
        assert_eq!(programmer.link.timeout_depth(), 0);
    }

    #[test]
    fn test_send_command_fails_past_allowed_retries() {
        let mut script = Script::new();
        for _ in 0..NUM_RETRIES + 1 {
            script = nak_with(script, "checksum error");
        }
        let (mut programmer, _written) = idle_programmer(script);

        assert!(matches!(
            programmer.send_command("DONE"),
            Err(Error::RetriesExhausted { .. })
        ));
        assert_eq!(programmer.link.timeout_depth(), 0);
    }

    #[test]
    fn test_send_command_fails_fast_on_unexpected_byte() {
        let script = Script::new().recv(&[0x37]);
        let (mut programmer, written) = idle_programmer(script);

        assert!(matches!(
            programmer.send_command("DONE"),
            Err(Error::UnexpectedResponse(0x37))
        ));
        // No retry after an out-of-contract byte.
        assert_eq!(*written.borrow(), b"DONE\0");
    }

    #[test]
    fn test_send_command_fails_fast_on_timeout() {
        let (mut programmer, written) = idle_programmer(Script::new());

        assert!(matches!(
            programmer.send_command("DONE"),
            Err(Error::Timeout(_))
        ));
        assert_eq!(*written.borrow(), b"DONE\0");
        assert_eq!(programmer.link.timeout_depth(), 0);
    }

    #[test]
    fn test_send_command_requires_idle_session() {
        let (mut programmer, _written) = programmer_with(Script::new());

        assert!(matches!(
            programmer.send_command("DONE"),
            Err(Error::Invariant(_))
        ));
    }

    #[test]
    fn test_nak_payload_is_capped() {
        // An unterminated diagnostic stops at the cap; the ACK that
        // follows must still be readable by the retry.
        let payload = vec![b'A'; MAX_NAK_MESSAGE - 1];
        let script = Script::new().recv(&[NAK]).recv(&payload).recv(&[ACK]);
        let (mut programmer, _written) = idle_programmer(script);

        programmer.send_command("DONE").unwrap();
    }

    #[test]
    fn test_program_sector_happy_path() {
        // S3, sector 5.
        let image = [0xAAu8; SECTOR_SIZE];
        let script = Script::new()
            .recv(&[ACK])
            .recv(&[ACK])
            .recv(&[0x05, 0x00])
            .recv(&image)
            .recv(&[ACK]);
        let (mut programmer, written) = idle_programmer(script);

        programmer.program_sector(5, &image).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"PROGRAMSECTOR\0");
        expected.extend_from_slice(&[0x05, 0x00]);
        expected.push(ACK);
        expected.extend_from_slice(&image);
        expected.push(ACK);
        assert_eq!(*written.borrow(), expected);
        assert_eq!(programmer.state(), SessionState::Idle);
        assert_eq!(programmer.link.timeout_depth(), 0);
    }

    #[test]
    fn test_index_echo_mismatch_recovers_with_one_nak() {
        let image = [0x42u8; SECTOR_SIZE];
        let script = Script::new()
            .recv(&[ACK])
            .recv(&[ACK])
            .recv(&[0x06, 0x00]) // wrong echo
            .recv(&[ACK])
            .recv(&[0x05, 0x00]) // correct echo on retry
            .recv(&image)
            .recv(&[ACK]);
        let (mut programmer, written) = idle_programmer(script);

        programmer.program_sector(5, &image).unwrap();

        let naks = written.borrow().iter().filter(|&&b| b == NAK).count();
        assert_eq!(naks, 1);
    }

    #[test]
    fn test_index_echo_retries_exhaust() {
        let mut script = Script::new().recv(&[ACK]);
        for _ in 0..NUM_RETRIES + 1 {
            script = script.recv(&[ACK]).recv(&[0xEE, 0x00]);
        }
        let image = [0u8; SECTOR_SIZE];
        let (mut programmer, written) = idle_programmer(script);

        assert!(matches!(
            programmer.program_sector(5, &image),
            Err(Error::RetriesExhausted { .. })
        ));
        let naks = written.borrow().iter().filter(|&&b| b == NAK).count();
        assert_eq!(naks as u32, NUM_RETRIES + 1);
        assert_eq!(programmer.link.timeout_depth(), 0);
    }

    #[test]
    fn test_device_nak_on_index_aborts() {
        let script = nak_with(Script::new().recv(&[ACK]), "index out of range");
        let image = [0u8; SECTOR_SIZE];
        let (mut programmer, _written) = idle_programmer(script);

        match programmer.program_sector(63, &image) {
            Err(Error::Device(message)) => assert!(message.contains("index out of range")),
            other => panic!("expected device error, got {:?}", other),
        }
    }

    #[test]
    fn test_body_echo_mismatch_recovers() {
        let image = [0x11u8; SECTOR_SIZE];
        let mut corrupted = image;
        corrupted[100] = 0x99;
        let script = Script::new()
            .recv(&[ACK])
            .recv(&[ACK])
            .recv(&[0x00, 0x00])
            .recv(&corrupted)
            .recv(&image)
            .recv(&[ACK]);
        let (mut programmer, written) = idle_programmer(script);

        programmer.program_sector(0, &image).unwrap();

        let naks = written.borrow().iter().filter(|&&b| b == NAK).count();
        assert_eq!(naks, 1);
    }

    #[test]
    fn test_program_sector_rejects_short_image() {
        let (mut programmer, written) = idle_programmer(Script::new());

        assert!(matches!(
            programmer.program_sector(0, &[0u8; 100]),
            Err(Error::Invariant(_))
        ));
        assert!(written.borrow().is_empty());
    }

    #[test]
    fn test_program_sector_rejects_out_of_range_index() {
        let (mut programmer, written) = idle_programmer(Script::new());

        assert!(matches!(
            programmer.program_sector(SECTOR_COUNT, &[0u8; SECTOR_SIZE]),
            Err(Error::Invariant(_))
        ));
        assert!(written.borrow().is_empty());
    }

    #[test]
    fn test_wait_for_completion_reports_device_failure() {
        let script = nak_with(Script::new(), "write verify failed");
        let (mut programmer, _written) = idle_programmer(script);

        match programmer.wait_for_completion("sector programming", true) {
            Err(Error::Device(message)) => {
                assert!(message.contains("sector programming"));
                assert!(message.contains("write verify failed"));
            }
            other => panic!("expected device error, got {:?}", other),
        }
        assert_eq!(programmer.link.timeout_depth(), 0);
    }

    #[test]
    fn test_wait_for_completion_labels_timeouts() {
        let (mut programmer, _written) = idle_programmer(Script::new());

        match programmer.wait_for_completion("chip erase", false) {
            Err(Error::Timeout(label)) => assert!(label.contains("chip erase")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_erase_chip_declined() {
        // S4: the operator answers `n`; nothing is erased.
        let script = Script::new().recv(&[ACK]).recv(CONFIRM_PROMPT);
        let (mut programmer, written) = idle_programmer(script);

        let erased = programmer.erase_chip(|| false).unwrap();

        assert!(!erased);
        let mut expected = Vec::new();
        expected.extend_from_slice(b"ERASECHIP\0");
        expected.push(NAK);
        assert_eq!(*written.borrow(), expected);
        assert_eq!(programmer.state(), SessionState::Idle);
    }

    #[test]
    fn test_erase_chip_accepted() {
        let script = Script::new()
            .recv(&[ACK])
            .recv(CONFIRM_PROMPT)
            .recv(&[ACK]);
        let (mut programmer, written) = idle_programmer(script);

        let erased = programmer.erase_chip(|| true).unwrap();

        assert!(erased);
        let mut expected = Vec::new();
        expected.extend_from_slice(b"ERASECHIP\0");
        expected.push(ACK);
        assert_eq!(*written.borrow(), expected);
    }

    #[test]
    fn test_erase_chip_rejects_malformed_prompt() {
        let script = Script::new().recv(&[ACK]).recv(b"COMFIRM?\0");
        let (mut programmer, _written) = idle_programmer(script);

        assert!(matches!(
            programmer.erase_chip(|| true),
            Err(Error::UnexpectedReply { .. })
        ));
        assert_eq!(programmer.link.timeout_depth(), 0);
    }

    #[test]
    fn test_finish_terminates_the_session() {
        let script = Script::new().recv(&[ACK]);
        let (mut programmer, written) = idle_programmer(script);

        programmer.finish().unwrap();

        assert_eq!(*written.borrow(), b"DONE\0");
        assert_eq!(programmer.state(), SessionState::Terminated);
        assert!(matches!(
            programmer.send_command("DONE"),
            Err(Error::Invariant(_))
        ));
    }
}
