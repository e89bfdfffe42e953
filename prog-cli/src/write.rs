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

use std::{fs::File, io::Read, path::Path};

use serial::SystemPort;
use sst39sf::Programmer;

use anyhow::{Context, Result};

/// Whole-binary write mode: the file lands at address 0.
pub fn write(programmer: &mut Programmer<SystemPort>, binary_path: &Path) -> Result<()> {
    let mut file = File::open(binary_path)
        .with_context(|| format!("Couldn't open binary file `{}`", binary_path.display()))?;

    let mut binary = Vec::new();
    file.read_to_end(&mut binary)
        .context("Failed to read binary file contents")?;

    log::info!("Binary file: `{}`", binary_path.display());
    log::info!("Binary file size: {} bytes", binary.len());

    let sectors = sst39sf::util::write_binary(programmer, &binary)
        .context("Couldn't write the binary to the chip")?;
    log::info!("Programmed {} sectors", sectors);

    Ok(())
}
