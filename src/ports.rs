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

//! Serial-port discovery, to help the operator find the programmer.

use std::ffi::OsString;

#[cfg(target_os = "linux")]
mod list_linux;

/// A serial device that may be the programmer.
#[derive(Debug)]
pub struct PortInfo {
    /// Device node, e.g. `/dev/ttyACM0`.
    pub device: OsString,
    /// Human-readable USB description, when one is available.
    pub description: Option<String>,
}

impl PortInfo {
    /// List candidate serial ports on the system.
    #[cfg(target_os = "linux")]
    pub fn list_all() -> Vec<PortInfo> {
        self::list_linux::list_all()
    }

    /// Discovery is implemented for Linux only; other systems get an
    /// empty listing.
    #[cfg(not(target_os = "linux"))]
    pub fn list_all() -> Vec<PortInfo> {
        Vec::new()
    }
}
