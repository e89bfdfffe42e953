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

use std::io::{self, BufRead, Write};

use serial::SystemPort;
use sst39sf::Programmer;

use anyhow::{Context, Result};

/// Erase mode: the device asks for confirmation before wiping the chip.
/// Declining is a normal, successful outcome.
pub fn erase(programmer: &mut Programmer<SystemPort>) -> Result<()> {
    let erased = programmer
        .erase_chip(confirm)
        .context("Chip erase failed")?;

    if erased {
        log::info!("Chip erased");
    } else {
        log::info!("Erase declined, chip left untouched");
    }

    Ok(())
}

/// Ask the operator for a y/n answer, re-prompting on anything else.
/// End of input counts as a decline.
fn confirm() -> bool {
    let stdin = io::stdin();
    loop {
        print!("Erase the entire chip? [y/n] ");
        if io::stdout().flush().is_err() {
            return false;
        }

        let mut answer = String::new();
        match stdin.lock().read_line(&mut answer) {
            Ok(0) | Err(_) => return false,
            Ok(_) => {}
        }

        let answer = answer.trim();
        if answer.eq_ignore_ascii_case("y") {
            return true;
        }
        if answer.eq_ignore_ascii_case("n") {
            return false;
        }
        println!("Please answer `y` or `n`.");
    }
}
