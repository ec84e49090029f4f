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
use crate::gnutella::event::GnutellaEvent;
use crate::jsonbuilder::{JsonBuilder, JsonError};

/// Render one dissector event into the supplied builder as a
/// `"gnutella"` object. Payload bytes are hex encoded; handshake header
/// blocks are logged printable with lossy UTF-8.
pub fn log_gnutella(
    flow: &Flow, event: &GnutellaEvent, js: &mut JsonBuilder,
) -> Result<(), JsonError> {
    js.open_object("gnutella")?;
    js.set_uint("flow_id", flow.id)?;
    js.set_string("event", event.id().name())?;
    match event {
        GnutellaEvent::TextMsg { is_orig, headers } => {
            js.set_string("direction", direction_str(*is_orig))?;
            js.set_string_from_bytes("headers", headers)?;
        }
        GnutellaEvent::HttpNotify
        | GnutellaEvent::Establish
        | GnutellaEvent::NotEstablish => {}
        GnutellaEvent::BinaryMsg {
            is_orig,
            msg_type,
            ttl,
            hops,
            len,
            payload,
            payload_len,
            trunc,
            complete,
        } => {
            js.set_string("direction", direction_str(*is_orig))?;
            js.set_uint("type", (*msg_type).into())?;
            js.set_uint("ttl", (*ttl).into())?;
            js.set_uint("hops", (*hops).into())?;
            js.set_uint("length", (*len).into())?;
            js.set_uint("payload_len", (*payload_len).into())?;
            if !payload.is_empty() {
                js.set_hex("payload", payload)?;
            }
            js.set_bool("truncated", *trunc)?;
            js.set_bool("complete", *complete)?;
        }
        GnutellaEvent::PartialBinaryMsg {
            payload,
            is_orig,
            msg_pos,
        } => {
            js.set_string("direction", direction_str(*is_orig))?;
            js.set_uint("header_bytes", (*msg_pos).into())?;
            js.set_hex("payload", payload)?;
        }
    }
    js.close()?;
    Ok(())
}

fn direction_str(is_orig: bool) -> &'static str {
    if is_orig {
        "originator"
    } else {
        "responder"
    }
}
