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

//! # Sector planning
//!
//! Arbitrary-programming mode takes a text file of (address, binary file)
//! pairs and turns it into a mapping from sector index to a fully
//! populated 4096-byte sector image, before any device traffic happens.
//!
//! Instructions are applied in file order, so where two files touch the
//! same bytes the later instruction wins. Whether that is permitted at all
//! is the caller's choice; without it, any detected overlap aborts the
//! plan.
//!
//! Instruction grammar, one instruction per line:
//!
//! ```text
//! # comment lines start with `#` in the first column
//! 0x1000 firmware.bin
//! 0x3F00 "lookup tables.bin"
//! ```

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{ErrorKind, Read},
    path::{Path, PathBuf},
};

use crate::{
    constants::{FLASH_SIZE, SECTOR_SIZE},
    error::{Error, Result},
};

/// The intended contents of one flash sector.
pub type SectorImage = Box<[u8; SECTOR_SIZE]>;

/// Sector index → sector image. A `BTreeMap` keeps iteration reproducible
/// from run to run.
pub type SectorPlan = BTreeMap<u16, SectorImage>;

/// One parsed line of the instruction file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Flash address the file contents start at.
    pub address: u32,
    /// The binary file to place there.
    pub path: PathBuf,
}

/// Half-open byte range a file occupies in flash. Overlap detection only.
#[derive(Debug)]
struct FileInterval {
    start: u32,
    end: u32,
    path: PathBuf,
}

/// Parse an instruction file into its (address, path) pairs, in file
/// order.
pub fn parse_instruction_file(path: &Path) -> Result<Vec<Instruction>> {
    let contents = fs::read_to_string(path).map_err(|source| Error::File {
        path: path.to_owned(),
        source,
    })?;

    let mut instructions = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.starts_with('#') {
            continue;
        }
        let (address, file) = parse_line(line).map_err(|reason| Error::Parse {
            path: path.to_owned(),
            line: index + 1,
            reason: format!("{} (in `{}`)", reason, line),
        })?;
        instructions.push(Instruction {
            address,
            path: PathBuf::from(file),
        });
    }

    Ok(instructions)
}

/// Grammar: `0x<hex>` SPACE `<path>`, with the path optionally wrapped in
/// a matching pair of single or double quotes.
fn parse_line(line: &str) -> std::result::Result<(u32, &str), String> {
    let mut parts = line.splitn(2, ' ');
    let address = parts.next().unwrap_or("");
    let rest = parts
        .next()
        .ok_or_else(|| "expected an address and a path separated by a single space".to_string())?;

    if !(address.starts_with("0x") || address.starts_with("0X")) {
        return Err(format!("address `{}` must start with `0x`", address));
    }
    let address = u32::from_str_radix(&address[2..], 16)
        .map_err(|_| format!("`{}` is not a valid 32-bit hex address", address))?;

    if rest.is_empty() {
        return Err("missing path after address".to_string());
    }

    Ok((address, strip_quotes(rest)))
}

fn strip_quotes(path: &str) -> &str {
    let bytes = path.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &path[1..path.len() - 1]
    } else {
        path
    }
}

/// Materialise the sector plan for `instructions`.
///
/// Validates every instruction against the flash geometry, runs overlap
/// detection, and only then reads file contents into sector images.
/// Nothing here touches the device.
pub fn build_plan(instructions: &[Instruction], allow_overlap: bool) -> Result<SectorPlan> {
    let mut intervals = Vec::with_capacity(instructions.len());
    for instruction in instructions {
        let length = fs::metadata(&instruction.path)
            .map_err(|source| Error::File {
                path: instruction.path.clone(),
                source,
            })?
            .len();

        if length == 0 {
            return Err(Error::InvalidPlan(format!(
                "`{}` is empty",
                instruction.path.display()
            )));
        }
        if instruction.address >= FLASH_SIZE {
            return Err(Error::InvalidPlan(format!(
                "address {:#X} is outside the {} byte flash",
                instruction.address, FLASH_SIZE
            )));
        }
        if u64::from(instruction.address) + length > u64::from(FLASH_SIZE) {
            return Err(Error::InvalidPlan(format!(
                "`{}` ({} bytes at {:#X}) extends past the end of flash",
                instruction.path.display(),
                length,
                instruction.address
            )));
        }

        intervals.push(FileInterval {
            start: instruction.address,
            end: instruction.address + length as u32,
            path: instruction.path.clone(),
        });
    }

    check_overlap(&mut intervals, allow_overlap)?;

    let mut plan = SectorPlan::new();
    for instruction in instructions {
        merge_file(&mut plan, instruction)?;
    }

    Ok(plan)
}

/// Sorted-adjacency scan: catches any overlap, though not necessarily
/// every overlapping pair.
fn check_overlap(intervals: &mut [FileInterval], allow_overlap: bool) -> Result<()> {
    intervals.sort_by_key(|interval| interval.start);

    for pair in intervals.windows(2) {
        if pair[1].start < pair[0].end {
            if !allow_overlap {
                return Err(Error::Overlap {
                    first: pair[0].path.clone(),
                    second: pair[1].path.clone(),
                    address: pair[1].start,
                });
            }
            log::warn!(
                "`{}` and `{}` overlap at address {:#X}, the later instruction wins",
                pair[0].path.display(),
                pair[1].path.display(),
                pair[1].start
            );
        }
    }

    Ok(())
}

/// Read one file into the plan, creating zero-filled images for every
/// sector it touches and overwriting whatever earlier instructions put
/// there.
fn merge_file(plan: &mut SectorPlan, instruction: &Instruction) -> Result<()> {
    let mut file = File::open(&instruction.path).map_err(|source| Error::File {
        path: instruction.path.clone(),
        source,
    })?;
    let length = file
        .metadata()
        .map_err(|source| Error::File {
            path: instruction.path.clone(),
            source,
        })?
        .len() as usize;

    let mut index = (instruction.address / SECTOR_SIZE as u32) as u16;
    let mut offset = (instruction.address % SECTOR_SIZE as u32) as usize;
    let mut remaining = length;
    while remaining > 0 {
        let image = plan.entry(index).or_insert_with(blank_sector);
        let take = (SECTOR_SIZE - offset).min(remaining);
        file.read_exact(&mut image[offset..offset + take])
            .map_err(|source| {
                if source.kind() == ErrorKind::UnexpectedEof {
                    Error::Invariant(format!(
                        "`{}` shrank while being planned",
                        instruction.path.display()
                    ))
                } else {
                    Error::File {
                        path: instruction.path.clone(),
                        source,
                    }
                }
            })?;

        remaining -= take;
        offset = 0;
        index += 1;
    }

    Ok(())
}

fn blank_sector() -> SectorImage {
    Box::new([0u8; SECTOR_SIZE])
}
