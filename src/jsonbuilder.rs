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

//! Minimal streaming JSON object writer for event logging. Builds the
//! output buffer in one pass; keys are trusted, values are escaped.

const INIT_SIZE: usize = 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum JsonError {
    InvalidState,
}

impl std::error::Error for JsonError {}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            JsonError::InvalidState => write!(f, "invalid state"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ObjectFirst,
    ObjectNth,
}

#[derive(Debug, Clone)]
pub struct JsonBuilder {
    buf: String,
    state: Vec<State>,
}

impl JsonBuilder {
    /// Returns a new JsonBuilder in object state.
    pub fn new_object() -> Self {
        let mut buf = String::with_capacity(INIT_SIZE);
        buf.push('{');
        Self {
            buf,
            state: vec![State::ObjectFirst],
        }
    }

    /// Close the currently open object. The builder is complete when the
    /// outermost object has been closed.
    pub fn close(&mut self) -> Result<&mut Self, JsonError> {
        match self.state.pop() {
            Some(State::ObjectFirst) | Some(State::ObjectNth) => {
                self.buf.push('}');
                Ok(self)
            }
            None => Err(JsonError::InvalidState),
        }
    }

    /// Open a new object under `key`.
    pub fn open_object(&mut self, key: &str) -> Result<&mut Self, JsonError> {
        self.push_key(key)?;
        self.buf.push('{');
        self.state.push(State::ObjectFirst);
        Ok(self)
    }

    pub fn set_string(&mut self, key: &str, val: &str) -> Result<&mut Self, JsonError> {
        self.push_key(key)?;
        self.push_string(val);
        Ok(self)
    }

    /// Set a string from raw bytes; non-UTF-8 sequences are replaced.
    pub fn set_string_from_bytes(&mut self, key: &str, val: &[u8]) -> Result<&mut Self, JsonError> {
        let s = String::from_utf8_lossy(val);
        self.set_string(key, &s)
    }

    /// Set a key and value of a byte array as hex.
    pub fn set_hex(&mut self, key: &str, val: &[u8]) -> Result<&mut Self, JsonError> {
        static HEX: [u8; 16] = *b"0123456789abcdef";
        self.push_key(key)?;
        self.buf.push('"');
        for &b in val {
            self.buf.push(HEX[(b >> 4) as usize] as char);
            self.buf.push(HEX[(b & 0xf) as usize] as char);
        }
        self.buf.push('"');
        Ok(self)
    }

    pub fn set_uint(&mut self, key: &str, val: u64) -> Result<&mut Self, JsonError> {
        self.push_key(key)?;
        self.buf.push_str(&val.to_string());
        Ok(self)
    }

    pub fn set_bool(&mut self, key: &str, val: bool) -> Result<&mut Self, JsonError> {
        self.push_key(key)?;
        self.buf.push_str(if val { "true" } else { "false" });
        Ok(self)
    }

    /// Return the rendered buffer. Only a fully closed builder yields
    /// valid JSON.
    pub fn buf(&self) -> &str {
        &self.buf
    }

    fn push_key(&mut self, key: &str) -> Result<(), JsonError> {
        match self.state.last_mut() {
            Some(state @ State::ObjectFirst) => {
                *state = State::ObjectNth;
            }
            Some(State::ObjectNth) => {
                self.buf.push(',');
            }
            None => {
                return Err(JsonError::InvalidState);
            }
        }
        self.buf.push('"');
        self.buf.push_str(key);
        self.buf.push_str("\":");
        Ok(())
    }

    fn push_string(&mut self, val: &str) {
        self.buf.push('"');
        for c in val.chars() {
            match c {
                '"' => self.buf.push_str("\\\""),
                '\\' => self.buf.push_str("\\\\"),
                '\n' => self.buf.push_str("\\n"),
                '\r' => self.buf.push_str("\\r"),
                '\t' => self.buf.push_str("\\t"),
                c if (c as u32) < 0x20 => {
                    self.buf.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => self.buf.push(c),
            }
        }
        self.buf.push('"');
    }
}
