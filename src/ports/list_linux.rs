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
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
};

use super::PortInfo;

fn read_line(path: &Path) -> io::Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_owned())
}

/// `None` means the tty is an internal (platform) UART, which cannot be
/// the programmer. `Some(None)` is a usable port without USB metadata.
fn classify(name: &OsStr) -> Option<Option<String>> {
    let device = match fs::canonicalize(Path::new("/sys/class/tty").join(name).join("device")) {
        Ok(device) => device,
        Err(_) => return Some(None),
    };
    let subsystem = fs::canonicalize(device.join("subsystem"))
        .ok()
        .and_then(|s| s.file_name().map(|n| n.to_os_string()));

    let interface = match subsystem.as_deref().and_then(|s| s.to_str()) {
        Some("platform") => return None,
        // usb-serial adapters hang one level below their USB interface.
        Some("usb-serial") => device.parent()?.to_path_buf(),
        Some("usb") => device,
        _ => return Some(None),
    };

    Some(usb_description(&interface))
}

fn usb_description(interface: &Path) -> Option<String> {
    let usb_device = interface.parent()?;

    let vid = read_line(&usb_device.join("idVendor")).ok()?;
    let pid = read_line(&usb_device.join("idProduct")).ok()?;
    let mut description = format!("{}:{}", vid, pid);
    for attribute in &["manufacturer", "product"] {
        if let Ok(value) = read_line(&usb_device.join(attribute)) {
            description.push(' ');
            description.push_str(&value);
        }
    }

    Some(description)
}

pub fn list_all() -> Vec<PortInfo> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    // The programmer is an Arduino, which enumerates as CDC-ACM or as a
    // usb-serial adapter depending on the board.
    for pattern in &["/dev/ttyACM*", "/dev/ttyUSB*", "/dev/ttyS*"] {
        if let Ok(paths) = glob::glob(pattern) {
            candidates.extend(paths.filter_map(|path| path.ok()));
        }
    }

    let mut ports = Vec::new();
    for path in candidates {
        let name = match path.file_name() {
            Some(name) => name.to_os_string(),
            None => continue,
        };
        if let Some(description) = classify(&name) {
            ports.push(PortInfo {
                device: path.into_os_string(),
                description,
            });
        }
    }

    ports
}
