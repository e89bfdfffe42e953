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

use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between the instruction file and the chip.
///
/// NAKs on retryable exchanges and echo mismatches are consumed inside the
/// protocol layer; only conditions the host cannot recover from locally
/// surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port configuration failed.
    #[error("serial port error")]
    Serial(#[from] serial::Error),

    #[error("I/O error")]
    Io(#[from] io::Error),

    /// A blocking read exceeded the active timeout.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// The device sent a byte outside the protocol contract.
    #[error("unexpected response byte {0:#04X}")]
    UnexpectedResponse(u8),

    /// The device sent a multi-byte reply other than the expected one.
    #[error("unexpected reply: expected {expected}, received [{received}]")]
    UnexpectedReply { expected: String, received: String },

    /// The device sent a NAK diagnostic the host cannot recover from.
    #[error("device reported an error: {0}")]
    Device(String),

    #[error("{operation}: all {attempts} attempts failed")]
    RetriesExhausted { operation: String, attempts: u32 },

    /// The initial handshake never produced `WAITING\0`.
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    /// Malformed instruction file.
    #[error("{}:{line}: {reason}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Two planned files occupy the same flash bytes and overlap is
    /// disabled.
    #[error("`{}` and `{}` overlap at address {address:#X}", .first.display(), .second.display())]
    Overlap {
        first: PathBuf,
        second: PathBuf,
        address: u32,
    },

    /// Empty file, address out of range, or contents too large for flash.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("cannot access `{}`: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A condition that indicates a bug in the host, not in the device.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}
