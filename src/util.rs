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

//! # Utilities
//!
//! Convenience operations layered on top of [`Programmer`].

use serial::SerialPort;

use crate::{
    constants::{FLASH_SIZE, SECTOR_SIZE},
    error::{Error, Result},
    Programmer,
};

/// Write a whole binary to the chip starting at address 0.
///
/// Whole sectors are programmed in ascending index order; a trailing
/// partial sector is zero-padded to the full 4096 bytes. Size violations
/// are rejected before any device traffic. Returns the number of sectors
/// programmed.
pub fn write_binary<P>(programmer: &mut Programmer<P>, data: &[u8]) -> Result<u16>
where
    P: SerialPort,
{
    if data.is_empty() {
        return Err(Error::InvalidPlan("binary file is empty".into()));
    }
    if data.len() as u64 > u64::from(FLASH_SIZE) {
        return Err(Error::InvalidPlan(format!(
            "binary is {} bytes, flash holds only {}",
            data.len(),
            FLASH_SIZE
        )));
    }

    let mut sectors = 0u16;
    for (index, chunk) in data.chunks(SECTOR_SIZE).enumerate() {
        let index = index as u16;
        if chunk.len() == SECTOR_SIZE {
            programmer.program_sector(index, chunk)?;
        } else {
            let mut image = [0u8; SECTOR_SIZE];
            image[..chunk.len()].copy_from_slice(chunk);
            programmer.program_sector(index, &image)?;
        }

        log::info!("Programmed sector #{} ({} bytes)", index, chunk.len());
        sectors += 1;
    }

    Ok(sectors)
}
