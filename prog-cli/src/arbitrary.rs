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

use std::path::Path;

use serial::SystemPort;
use sst39sf::{plan, Programmer};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

/// Arbitrary-programming mode: plan the instruction file into sector
/// images, then program each one.
pub fn arbitrary(
    programmer: &mut Programmer<SystemPort>,
    instruction_path: &Path,
    allow_overlap: bool,
) -> Result<()> {
    let instructions = plan::parse_instruction_file(instruction_path)
        .with_context(|| format!("Couldn't parse `{}`", instruction_path.display()))?;
    log::info!("{} instructions", instructions.len());

    let plan = plan::build_plan(&instructions, allow_overlap)
        .context("Couldn't build the sector plan")?;
    log::info!("{} sectors to program", plan.len());

    let bar = ProgressBar::new(plan.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:12} [{bar:40}] {pos}/{len}")
            .progress_chars("=> "),
    );

    for (&index, image) in plan.iter() {
        bar.set_message(&format!("sector #{}", index));
        programmer
            .program_sector(index, &image[..])
            .with_context(|| format!("Couldn't program sector #{}", index))?;
        bar.inc(1);
    }
    bar.finish_with_message("done");

    Ok(())
}
