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

use crate::core::Flow;

/// Identifies an event class for subscription checks, so the dissector
/// can skip building events nothing consumes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EventId {
    TextMsg,
    HttpNotify,
    Establish,
    NotEstablish,
    BinaryMsg,
    PartialBinaryMsg,
}

impl EventId {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TextMsg => "text_msg",
            Self::HttpNotify => "http_notify",
            Self::Establish => "establish",
            Self::NotEstablish => "not_establish",
            Self::BinaryMsg => "binary_msg",
            Self::PartialBinaryMsg => "partial_binary_msg",
        }
    }
}

/// Observation raised by the Gnutella dissector. The connection handle is
/// passed alongside at emission.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum GnutellaEvent {
    /// A completed handshake block; `headers` holds all lines of the
    /// block, each with its leading CRLF.
    TextMsg { is_orig: bool, headers: Vec<u8> },
    /// The flow turned out to be HTTP; dissection is handed off.
    HttpNotify,
    /// Both sides answered with a 200 status.
    Establish,
    /// The flow ended without both sides accepting.
    NotEstablish,
    /// A framed binary message. `len` is the declared payload length;
    /// `payload` holds at most the retention cap, `trunc` is true when
    /// retention fell short of `min(len, cap)`, and `complete` is true
    /// when all declared payload bytes were seen.
    BinaryMsg {
        is_orig: bool,
        msg_type: u8,
        ttl: u8,
        hops: u8,
        len: u32,
        payload: Vec<u8>,
        payload_len: u32,
        trunc: bool,
        complete: bool,
    },
    /// Stream ended inside a message descriptor; `payload` is the
    /// accumulated header prefix of `msg_pos` bytes.
    PartialBinaryMsg {
        payload: Vec<u8>,
        is_orig: bool,
        msg_pos: u32,
    },
}

impl GnutellaEvent {
    pub fn id(&self) -> EventId {
        match self {
            Self::TextMsg { .. } => EventId::TextMsg,
            Self::HttpNotify => EventId::HttpNotify,
            Self::Establish => EventId::Establish,
            Self::NotEstablish => EventId::NotEstablish,
            Self::BinaryMsg { .. } => EventId::BinaryMsg,
            Self::PartialBinaryMsg { .. } => EventId::PartialBinaryMsg,
        }
    }
}

/// Host-side consumer of dissector events. `enabled` is consulted before
/// an event is constructed; the default subscribes to everything.
pub trait EventSink {
    fn enabled(&self, id: EventId) -> bool {
        let _ = id;
        true
    }

    fn emit(&mut self, flow: &Flow, event: GnutellaEvent);
}
