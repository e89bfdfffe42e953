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

use std::time::Duration;

/// Total flash size of the SST39SF020A, in bytes.
pub const FLASH_SIZE: u32               = 0x40000;
/// Size of one erasable flash sector, in bytes.
pub const SECTOR_SIZE: usize            = 0x1000;
/// Number of sectors on the chip.
pub const SECTOR_COUNT: u16             = (FLASH_SIZE / SECTOR_SIZE as u32) as u16;

/// ACK byte
pub const ACK: u8                       = 0x06;
/// NAK byte
pub const NAK: u8                       = 0x15;
/// Terminator for commands and diagnostic strings.
pub const NUL: u8                       = 0x00;

pub const CMD_PROGRAM_SECTOR: &str      = "PROGRAMSECTOR";
pub const CMD_ERASE_CHIP: &str          = "ERASECHIP";
pub const CMD_DONE: &str                = "DONE";

/// Broadcast the device repeats at roughly 1 Hz until the host ACKs it.
pub const WAITING: &[u8]                = b"WAITING\0";
/// Device-initiated prompt preceding a chip erase.
pub const CONFIRM_PROMPT: &[u8]         = b"CONFIRM?\0";

/// Retries after the first failed attempt of a bounded exchange.
pub const NUM_RETRIES: u32              = 2;

/// Read timeout for ordinary exchanges.
pub const NORMAL_TIMEOUT: Duration      = Duration::from_millis(2000);
/// Read timeout while the device is busy programming or erasing flash.
pub const EXTENDED_TIMEOUT: Duration    = Duration::from_millis(10000);

/// Longest NAK diagnostic accepted, NUL terminator included.
pub const MAX_NAK_MESSAGE: usize        = 256;

/// Transcript file, created fresh in the working directory on every run.
pub const TRANSCRIPT_FILE: &str         = "ArduinoDriver.log";
