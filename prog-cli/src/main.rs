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

use std::{
    io::{self, Write},
    path::Path,
};

use serial::SerialPort;

use anyhow::{Context, Result};
use clap::{crate_authors, crate_version, App, AppSettings, Arg, ArgGroup, ArgMatches};

use sst39sf::{constants::TRANSCRIPT_FILE, Programmer, Transcript};

mod arbitrary;
mod erase;
mod list;
mod write;

fn main() {
    // Single error-to-exit adapter: every failure path funnels here after
    // cleanup has run.
    if let Err(error) = try_main() {
        println!("Error: {:#}", error);
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let app = App::new("SST39SF Programmer")
        .setting(AppSettings::ColoredHelp)
        .version(crate_version!())
        .author(crate_authors!())
        .about("Programs SST39SF-family parallel NOR flash chips through an\nArduino-based serial programmer")
        .arg(
            Arg::with_name("SERIALPORT")
                .required_unless("list-ports")
                .help("Serial port the programmer is attached to")
        )
        .arg(
            Arg::with_name("write")
                .short("w")
                .long("write")
                .takes_value(true)
                .value_name("BIN")
                .help("Write a binary file to the chip starting at address 0")
        )
        .arg(
            Arg::with_name("arbitrary")
                .short("a")
                .long("arbitrary")
                .takes_value(true)
                .value_name("INSTRUCTIONS")
                .help("Program files at the addresses listed in an instruction file. Each line is `0x<hex address> <path>`; lines starting with `#` are comments")
        )
        .arg(
            Arg::with_name("allow-overlap")
                .short("o")
                .long("allow-overlap")
                .requires("arbitrary")
                .help("Warn instead of aborting when instruction files overlap; the later instruction wins")
        )
        .arg(
            Arg::with_name("erase")
                .short("e")
                .long("erase")
                .help("Erase the entire chip (asks for confirmation)")
        )
        .arg(
            Arg::with_name("list-ports")
                .short("l")
                .long("list-ports")
                .help("List candidate serial ports and exit")
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity, -v (debug), -vv (trace)")
        )
        .group(
            ArgGroup::with_name("mode")
                .args(&["write", "arbitrary", "erase", "list-ports"])
                .required(true)
        );

    let matches = app.get_matches();

    init_logger(match matches.occurrences_of("v") {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        2..=u64::MAX => log::LevelFilter::Trace,
    })?;

    if matches.is_present("list-ports") {
        return list::list();
    }

    let port_name = matches.value_of("SERIALPORT").unwrap();

    log::info!("Opening serial port `{}`", port_name);
    let mut port = serial::open(port_name)
        .with_context(|| format!("Couldn't open serial port `{}`", port_name))?;
    port.configure(&sst39sf::port_settings())
        .context("Couldn't configure serial port")?;

    let transcript = Transcript::create(TRANSCRIPT_FILE)
        .with_context(|| format!("Couldn't create transcript file `{}`", TRANSCRIPT_FILE))?;

    let mut programmer =
        Programmer::new(port, transcript).context("Couldn't attach to the serial port")?;

    // Cleanup must run whether the operation succeeded or not: it drains
    // in-flight bytes and flushes the transcript.
    let result = run(&matches, &mut programmer);
    let cleanup = programmer.cleanup_for_exit();

    result?;
    cleanup.context("Cleanup failed")?;

    Ok(())
}

fn run(matches: &ArgMatches<'_>, programmer: &mut Programmer<serial::SystemPort>) -> Result<()> {
    log::info!("Waiting for the programmer to announce itself");
    programmer
        .bootstrap()
        .context("Handshake with the programmer failed")?;

    if let Some(binary) = matches.value_of("write") {
        write::write(programmer, Path::new(binary))?;
    } else if let Some(instructions) = matches.value_of("arbitrary") {
        arbitrary::arbitrary(
            programmer,
            Path::new(instructions),
            matches.is_present("allow-overlap"),
        )?;
    } else if matches.is_present("erase") {
        erase::erase(programmer)?;
    }

    programmer
        .finish()
        .context("Couldn't send the terminal DONE command")?;

    Ok(())
}

fn init_logger(level: log::LevelFilter) -> Result<()> {
    let mut logger = env_logger::Builder::from_env("SST39SF_LOG");
    logger.filter_level(level);

    #[cfg(unix)]
    logger.format(log_format_color);
    #[cfg(not(unix))]
    logger.format(log_format_no_color);

    logger.try_init().context("Failed to initialize logger")
}

#[cfg(unix)]
fn log_format_color(
    fmt: &mut env_logger::fmt::Formatter,
    record: &log::Record<'_>,
) -> io::Result<()> {
    let level = match record.level() {
        log::Level::Error => ansi_term::Color::Red.bold().paint("ERROR"),
        log::Level::Warn => ansi_term::Color::Yellow.bold().paint("WARN"),
        log::Level::Info => ansi_term::Color::Green.bold().paint("INFO"),
        log::Level::Debug => ansi_term::Color::Cyan.bold().paint("DEBUG"),
        log::Level::Trace => ansi_term::Color::Cyan.bold().paint("TRACE"),
    };

    writeln!(fmt, "[{}] {}", level, record.args())
}

#[cfg(not(unix))]
fn log_format_no_color(
    fmt: &mut env_logger::fmt::Formatter,
    record: &log::Record<'_>,
) -> io::Result<()> {
    let level = match record.level() {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN",
        log::Level::Info => "INFO",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };

    writeln!(fmt, "[{}] {}", level, record.args())
}
