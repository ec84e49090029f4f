/* Copyright (C) 2025 Open Information Security Foundation
 *
 * You can copy, redistribute or modify this Program under the terms of
 * the GNU General Public License version 2 as published by the Free
 * Software Foundation.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * version 2 along with this program; if not, write to the Free Software
 * Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA
 * 02110-1301, USA.
 */

use log::warn;
use std::collections::HashMap;

/// Flat key/value configuration store filled by the host before analyzers
/// are instantiated.
#[derive(Debug, Default)]
pub struct Conf {
    values: HashMap<String, String>,
}

impl Conf {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set(&mut self, key: &str, val: &str) {
        self.values.insert(key.to_string(), val.to_string());
    }

    /// Return the string value of a configuration key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    /// Return the value of `key` parsed as u32, or `default` if the key is
    /// absent or fails to parse. A parse failure is logged.
    pub fn get_u32(&self, key: &str, default: u32) -> u32 {
        match self.get(key) {
            Some(val) => match val.parse::<u32>() {
                Ok(v) => v,
                Err(_) => {
                    warn!("invalid value for {}: {}", key, val);
                    default
                }
            },
            None => default,
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some("1") | Some("yes") | Some("true") | Some("on") => true,
            Some("0") | Some("no") | Some("false") | Some("off") => false,
            Some(val) => {
                warn!("invalid value for {}: {}", key, val);
                default
            }
            None => default,
        }
    }
}
