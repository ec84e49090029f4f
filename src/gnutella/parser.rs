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

use nom7::bytes::streaming::take;
use nom7::number::streaming::{be_u8, le_u32};
use nom7::IResult;

/// Length of a Gnutella message descriptor header.
pub const GNUTELLA_MSG_SIZE: usize = 23;

/// Parsed message descriptor. The 16 byte message id is an opaque GUID
/// and is not retained.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct GnutellaDescriptor {
    pub msg_type: u8,
    pub ttl: u8,
    pub hops: u8,
    pub payload_len: u32,
}

/// Dissect a 23 byte message descriptor: 16 byte GUID, type, TTL, hops,
/// then the declared payload length as unsigned little-endian.
pub fn parse_descriptor(i: &[u8]) -> IResult<&[u8], GnutellaDescriptor> {
    let (i, _guid) = take(16_usize)(i)?;
    let (i, msg_type) = be_u8(i)?;
    let (i, ttl) = be_u8(i)?;
    let (i, hops) = be_u8(i)?;
    let (i, payload_len) = le_u32(i)?;
    Ok((
        i,
        GnutellaDescriptor {
            msg_type,
            ttl,
            hops,
            payload_len,
        },
    ))
}

/// True if a handshake status line is actually an HTTP request or
/// response masquerading on a Gnutella port.
pub fn is_http_status(line: &[u8]) -> bool {
    memchr::memmem::find(line, b" HTTP/1.").is_some()
}

/// True if a status line is a Gnutella 0.6 acceptance: a `GNUTELLA`
/// prefix with a `200` status token after the first space. Lines with no
/// space, or too short to carry three code bytes, never match.
pub fn is_gnutella_ok(line: &[u8]) -> bool {
    if !line.starts_with(b"GNUTELLA") {
        return false;
    }
    let space = match memchr::memchr(b' ', line) {
        Some(pos) => pos,
        None => return false,
    };
    match line.get(space + 1..space + 4) {
        Some(code) => code == b"200",
        None => false,
    }
}
