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

//! Bidirectional, streaming Gnutella 0.6 dissector. One analyzer per TCP
//! flow, driven with reassembled byte chunks per direction. Recognizes
//! the CRLF handshake, hands off HTTP masquerades to a sibling analyzer,
//! then frames the 23 byte binary message descriptors that follow.

use std::cmp::min;
use std::mem::take;

use bitflags::bitflags;
use log::debug;

use crate::applayer::{Analyzer, ParentAnalyzer};
use crate::conf::Conf;
use crate::core::Flow;
use crate::direction::Direction;
use crate::gnutella::event::{EventId, EventSink, GnutellaEvent};
use crate::gnutella::parser::{self, GNUTELLA_MSG_SIZE};

pub const ANALYZER_NAME: &str = "gnutella";
const HTTP_ANALYZER: &str = "HTTP";

/// Default cap on retained payload bytes per message. Counting is never
/// capped, only retention.
pub const GNUTELLA_MAX_PAYLOAD: u32 = 4096;

/// Default cap on accumulated handshake bytes per direction. A flow that
/// exceeds it is not speaking Gnutella and gives up line reading.
pub const GNUTELLA_MAX_HANDSHAKE: u32 = 16384;

pub const CONF_MAX_PAYLOAD: &str = "gnutella.max-payload-size";
pub const CONF_MAX_HANDSHAKE: &str = "gnutella.max-handshake-size";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct OkBits: u8 {
        const ORIG_OK = 0x01;
        const RESP_OK = 0x02;
    }
}

/// Per-direction parser state. Two instances exist per flow, selected by
/// the delivery's direction tag before any parsing.
#[derive(Debug)]
struct GnutellaMsgState {
    /// In-progress handshake line, CR/LF stripped.
    buffer: Vec<u8>,
    got_cr: bool,
    /// Lines of the current handshake block, each with its leading CRLF.
    headers: Vec<u8>,
    /// Read cursor into the current delivery chunk; reset per delivery.
    current_offset: usize,
    /// Accumulator for a message descriptor header.
    msg: [u8; GNUTELLA_MSG_SIZE],
    msg_pos: usize,
    msg_type: u8,
    msg_ttl: u8,
    msg_hops: u8,
    msg_len: u32,
    /// Declared payload bytes still expected.
    payload_left: u32,
    /// Retained payload prefix, capped at the configured maximum.
    payload: Vec<u8>,
    /// No terminal event is pending for the message in progress. Starts
    /// true: no message is in progress.
    msg_sent: bool,
}

impl GnutellaMsgState {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            got_cr: false,
            headers: Vec::new(),
            current_offset: 0,
            msg: [0; GNUTELLA_MSG_SIZE],
            msg_pos: 0,
            msg_type: 0,
            msg_ttl: 0,
            msg_hops: 0,
            msg_len: 0,
            payload_left: 0,
            payload: Vec::new(),
            msg_sent: true,
        }
    }

    /// Scan the chunk from the current offset for the next CRLF-terminated
    /// line. Returns true with the line in `buffer` when one completed, or
    /// false at end of chunk.
    ///
    /// Historical line discipline: CR is consumed but never appended, and
    /// `got_cr` survives intervening bytes until an LF completes the line.
    /// An LF with no CR seen yet is appended like any other byte.
    fn next_line(&mut self, data: &[u8]) -> bool {
        while self.current_offset < data.len() {
            let byte = data[self.current_offset];
            if byte == b'\r' {
                self.got_cr = true;
            } else if byte == b'\n' && self.got_cr {
                self.got_cr = false;
                self.current_offset += 1;
                return true;
            } else {
                self.buffer.push(byte);
            }
            self.current_offset += 1;
        }
        false
    }

    fn dissect_header(&mut self) {
        if let Ok((_, desc)) = parser::parse_descriptor(&self.msg) {
            self.msg_type = desc.msg_type;
            self.msg_ttl = desc.ttl;
            self.msg_hops = desc.hops;
            self.msg_len = desc.payload_len;
        }
    }
}

/// Emit the terminal event for the message in progress, unless one was
/// already sent. `complete` reflects received-vs-declared, `trunc`
/// retention-vs-received at emission time.
fn send_events<S: EventSink>(
    sink: &mut S, flow: &Flow, ms: &mut GnutellaMsgState, is_orig: bool, max_payload: u32,
) {
    if ms.msg_sent {
        return;
    }
    if sink.enabled(EventId::BinaryMsg) {
        let payload_len = ms.payload.len() as u32;
        let trunc = payload_len < min(ms.msg_len, max_payload);
        sink.emit(
            flow,
            GnutellaEvent::BinaryMsg {
                is_orig,
                msg_type: ms.msg_type,
                ttl: ms.msg_ttl,
                hops: ms.msg_hops,
                len: ms.msg_len,
                payload: ms.payload.clone(),
                payload_len,
                trunc,
                complete: ms.payload_left == 0,
            },
        );
    }
    ms.msg_sent = true;
}

/// Flow analyzer for Gnutella 0.6. Owns both per-direction parser states,
/// the handshake OK bits, and the seams to the host: an event sink and the
/// parent's handoff capabilities.
pub struct GnutellaState<S: EventSink, P: ParentAnalyzer> {
    flow: Flow,
    sink: S,
    parent: P,
    orig_state: GnutellaMsgState,
    resp_state: GnutellaMsgState,
    /// OK bits merged into the flow state at handshake block ends.
    ok_bits: OkBits,
    /// OK bits observed on status lines of the current blocks.
    pending_ok: OkBits,
    sent_establish: bool,
    upgraded: bool,
    gave_up: bool,
    max_payload: u32,
    max_handshake: usize,
}

impl<S: EventSink, P: ParentAnalyzer> GnutellaState<S, P> {
    pub fn new(flow: Flow, conf: &Conf, sink: S, parent: P) -> Self {
        let max_payload = conf.get_u32(CONF_MAX_PAYLOAD, GNUTELLA_MAX_PAYLOAD);
        let max_handshake = conf.get_u32(CONF_MAX_HANDSHAKE, GNUTELLA_MAX_HANDSHAKE) as usize;
        Self {
            flow,
            sink,
            parent,
            orig_state: GnutellaMsgState::new(),
            resp_state: GnutellaMsgState::new(),
            ok_bits: OkBits::empty(),
            pending_ok: OkBits::empty(),
            sent_establish: false,
            upgraded: false,
            gave_up: false,
            max_payload,
            max_handshake,
        }
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Both directions answered with a 200 status.
    pub fn established(&self) -> bool {
        self.ok_bits.contains(OkBits::ORIG_OK | OkBits::RESP_OK)
    }

    fn msg_state(&self, is_orig: bool) -> &GnutellaMsgState {
        if is_orig {
            &self.orig_state
        } else {
            &self.resp_state
        }
    }

    fn msg_state_mut(&mut self, is_orig: bool) -> &mut GnutellaMsgState {
        if is_orig {
            &mut self.orig_state
        } else {
            &mut self.resp_state
        }
    }

    fn give_up(&mut self) {
        debug!(
            "gnutella flow {}: handshake exceeds {} bytes, not gnutella",
            self.flow.id, self.max_handshake
        );
        self.gave_up = true;
    }

    /// The status line is HTTP: notify, install an HTTP sibling, have the
    /// parent replay the buffered stream prefix into it and detach. The
    /// switch is terminal for this analyzer either way.
    fn upgrade_to_http(&mut self) {
        debug!("gnutella flow {}: HTTP masquerade, handing off", self.flow.id);
        if self.sink.enabled(EventId::HttpNotify) {
            self.sink.emit(&self.flow, GnutellaEvent::HttpNotify);
        }
        if self.parent.install_sibling(HTTP_ANALYZER) {
            self.parent.replay_buffered_prefix(HTTP_ANALYZER);
            self.parent.detach(ANALYZER_NAME);
        }
        self.upgraded = true;
    }

    /// Run the handshake line reader over the chunk until no complete line
    /// remains, the flow establishes, or dissection stops for this flow.
    fn deliver_lines(&mut self, data: &[u8], is_orig: bool) {
        while !self.established() && !self.gave_up {
            let ms = self.msg_state_mut(is_orig);
            if !ms.next_line(data) {
                break;
            }
            let line = take(&mut ms.buffer);
            if !line.is_empty() {
                if ms.headers.is_empty() {
                    // Status line of a handshake block.
                    if parser::is_http_status(&line) {
                        self.upgrade_to_http();
                        return;
                    }
                    if parser::is_gnutella_ok(&line) {
                        self.pending_ok |= if is_orig {
                            OkBits::ORIG_OK
                        } else {
                            OkBits::RESP_OK
                        };
                    }
                }
                let max_handshake = self.max_handshake;
                let ms = self.msg_state_mut(is_orig);
                ms.headers.extend_from_slice(b"\r\n");
                ms.headers.extend_from_slice(&line);
                if ms.headers.len() > max_handshake {
                    self.give_up();
                    return;
                }
            } else {
                // Empty line: the handshake block is done.
                let headers = take(&mut ms.headers);
                if self.sink.enabled(EventId::TextMsg) {
                    self.sink
                        .emit(&self.flow, GnutellaEvent::TextMsg { is_orig, headers });
                }
                self.ok_bits |= self.pending_ok;
                if self.established() && self.sink.enabled(EventId::Establish) {
                    self.sent_establish = true;
                    debug!("gnutella flow {} established", self.flow.id);
                    self.sink.emit(&self.flow, GnutellaEvent::Establish);
                }
            }
        }

        if !self.established() && !self.gave_up {
            let ms = self.msg_state(is_orig);
            if ms.buffer.len() + ms.headers.len() > self.max_handshake {
                self.give_up();
            }
        }
    }

    /// Frame message descriptors from the chunk tail: a 23 byte header,
    /// then `msg_len` payload bytes, either of which may span deliveries.
    fn deliver_messages(&mut self, data: &[u8], is_orig: bool) {
        let max_payload = self.max_payload;
        let Self {
            flow,
            sink,
            orig_state,
            resp_state,
            ..
        } = self;
        let ms = if is_orig { orig_state } else { resp_state };

        while ms.current_offset < data.len() {
            ms.msg_sent = false;

            let bytes_left = data.len() - ms.current_offset;
            let needed = GNUTELLA_MSG_SIZE - ms.msg_pos;

            if ms.payload_left == 0 && bytes_left >= needed {
                // Header completes in this chunk.
                ms.msg[ms.msg_pos..]
                    .copy_from_slice(&data[ms.current_offset..ms.current_offset + needed]);
                ms.current_offset += needed;
                ms.dissect_header();
                ms.payload_left = ms.msg_len;
                ms.msg_pos = 0;
                ms.payload.clear();
                if ms.msg_len == 0 {
                    send_events(sink, flow, ms, is_orig, max_payload);
                }
            } else if ms.payload_left == 0 {
                // Header still incomplete at end of chunk.
                ms.msg[ms.msg_pos..ms.msg_pos + bytes_left]
                    .copy_from_slice(&data[ms.current_offset..]);
                ms.current_offset += bytes_left;
                ms.msg_pos += bytes_left;
            } else {
                // Payload in progress. Retention is capped, counting is not.
                let space = (max_payload as usize).saturating_sub(ms.payload.len());
                let sz = min(bytes_left, space);
                if space > 0 {
                    ms.payload
                        .extend_from_slice(&data[ms.current_offset..ms.current_offset + sz]);
                }
                if ms.payload_left as usize > bytes_left {
                    ms.current_offset += bytes_left;
                    ms.payload_left -= bytes_left as u32;
                } else {
                    ms.current_offset += ms.payload_left as usize;
                    ms.payload_left = 0;
                    send_events(sink, flow, ms, is_orig, max_payload);
                }
            }
        }
    }
}

impl<S: EventSink, P: ParentAnalyzer> Analyzer for GnutellaState<S, P> {
    fn deliver_stream(&mut self, data: &[u8], dir: Direction) {
        if self.upgraded {
            return;
        }
        let is_orig = dir.is_originator();
        self.msg_state_mut(is_orig).current_offset = 0;

        if !self.established() {
            if self.gave_up {
                return;
            }
            self.deliver_lines(data, is_orig);
            if self.upgraded {
                return;
            }
            if self.established()
                && self.msg_state(is_orig).current_offset < data.len()
                && self.sink.enabled(EventId::BinaryMsg)
            {
                self.deliver_messages(data, is_orig);
            }
        } else if self.sink.enabled(EventId::BinaryMsg) {
            self.deliver_messages(data, is_orig);
        }
    }

    fn done(&mut self) {
        if self.upgraded {
            return;
        }
        debug!("gnutella flow {}: teardown", self.flow.id);

        if !self.sent_establish {
            if self.established() {
                if self.sink.enabled(EventId::Establish) {
                    self.sink.emit(&self.flow, GnutellaEvent::Establish);
                }
            } else if self.sink.enabled(EventId::NotEstablish) {
                self.sink.emit(&self.flow, GnutellaEvent::NotEstablish);
            }
            self.sent_establish = true;
        }

        let max_payload = self.max_payload;
        let Self {
            flow,
            sink,
            orig_state,
            resp_state,
            ..
        } = self;
        for (ms, is_orig) in [(orig_state, true), (resp_state, false)] {
            if !ms.msg_sent && ms.msg_pos > 0 {
                // The stream ended inside a descriptor header.
                if sink.enabled(EventId::PartialBinaryMsg) {
                    sink.emit(
                        flow,
                        GnutellaEvent::PartialBinaryMsg {
                            payload: ms.msg[..ms.msg_pos].to_vec(),
                            is_orig,
                            msg_pos: ms.msg_pos as u32,
                        },
                    );
                }
                ms.msg_sent = true;
            } else if !ms.msg_sent && ms.payload_left > 0 {
                send_events(sink, flow, ms, is_orig, max_payload);
            }
        }
    }

    fn name(&self) -> &'static str {
        ANALYZER_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECT_BLOCK: &[u8] = b"GNUTELLA CONNECT/0.6\r\nUser-Agent: X\r\n\r\n";
    const OK_BLOCK: &[u8] = b"GNUTELLA/0.6 200 OK\r\n\r\n";

    #[derive(Default)]
    struct TestSink {
        events: Vec<GnutellaEvent>,
        disabled: Vec<EventId>,
    }

    impl EventSink for TestSink {
        fn enabled(&self, id: EventId) -> bool {
            !self.disabled.contains(&id)
        }

        fn emit(&mut self, _flow: &Flow, event: GnutellaEvent) {
            self.events.push(event);
        }
    }

    #[derive(Default)]
    struct TestParent {
        decline: bool,
        installed: Vec<String>,
        replayed: Vec<String>,
        detached: Vec<String>,
    }

    impl ParentAnalyzer for TestParent {
        fn install_sibling(&mut self, name: &str) -> bool {
            if self.decline {
                return false;
            }
            self.installed.push(name.to_string());
            true
        }

        fn replay_buffered_prefix(&mut self, name: &str) {
            self.replayed.push(name.to_string());
        }

        fn detach(&mut self, name: &str) {
            self.detached.push(name.to_string());
        }
    }

    fn test_flow() -> Flow {
        Flow::new(
            1,
            "192.0.2.1:50000".parse().unwrap(),
            "192.0.2.2:6346".parse().unwrap(),
        )
    }

    fn new_state() -> GnutellaState<TestSink, TestParent> {
        GnutellaState::new(
            test_flow(),
            &Conf::new(),
            TestSink::default(),
            TestParent::default(),
        )
    }

    fn descriptor(msg_type: u8, ttl: u8, hops: u8, len: u32) -> Vec<u8> {
        let mut buf = vec![0_u8; GNUTELLA_MSG_SIZE];
        buf[16] = msg_type;
        buf[17] = ttl;
        buf[18] = hops;
        buf[19..23].copy_from_slice(&len.to_le_bytes());
        buf
    }

    /// Drive a fresh analyzer through the given deliveries and teardown,
    /// returning every emitted event.
    fn run(deliveries: &[(bool, &[u8])]) -> Vec<GnutellaEvent> {
        let mut state = new_state();
        for (is_orig, data) in deliveries {
            state.deliver_stream(data, Direction::from(*is_orig));
        }
        state.done();
        state.sink.events
    }

    /// Deliver a complete three-way handshake so both directions are OK.
    fn establish(state: &mut GnutellaState<TestSink, TestParent>) {
        state.deliver_stream(CONNECT_BLOCK, Direction::Originator);
        state.deliver_stream(OK_BLOCK, Direction::Responder);
        state.deliver_stream(OK_BLOCK, Direction::Originator);
        assert!(state.established());
        state.sink.events.clear();
    }

    #[test]
    fn test_clean_handshake_and_ping() {
        let mut state = new_state();
        state.deliver_stream(CONNECT_BLOCK, Direction::Originator);
        state.deliver_stream(OK_BLOCK, Direction::Responder);

        // Originator accepts and sends a ping in the same delivery.
        let mut tail = OK_BLOCK.to_vec();
        tail.extend_from_slice(&descriptor(0x00, 1, 0, 0));
        state.deliver_stream(&tail, Direction::Originator);

        assert_eq!(
            state.sink.events,
            vec![
                GnutellaEvent::TextMsg {
                    is_orig: true,
                    headers: b"\r\nGNUTELLA CONNECT/0.6\r\nUser-Agent: X".to_vec(),
                },
                GnutellaEvent::TextMsg {
                    is_orig: false,
                    headers: b"\r\nGNUTELLA/0.6 200 OK".to_vec(),
                },
                GnutellaEvent::TextMsg {
                    is_orig: true,
                    headers: b"\r\nGNUTELLA/0.6 200 OK".to_vec(),
                },
                GnutellaEvent::Establish,
                GnutellaEvent::BinaryMsg {
                    is_orig: true,
                    msg_type: 0x00,
                    ttl: 1,
                    hops: 0,
                    len: 0,
                    payload: vec![],
                    payload_len: 0,
                    trunc: false,
                    complete: true,
                },
            ]
        );

        state.done();
        // Terminal event already fired, nothing was in progress.
        assert_eq!(state.sink.events.len(), 5);
    }

    #[test]
    fn test_http_masquerade() {
        let mut state = new_state();
        state.deliver_stream(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n", Direction::Originator);

        assert_eq!(state.sink.events, vec![GnutellaEvent::HttpNotify]);
        assert_eq!(state.parent.installed, vec!["HTTP"]);
        assert_eq!(state.parent.replayed, vec!["HTTP"]);
        assert_eq!(state.parent.detached, vec![ANALYZER_NAME]);

        // The switch is terminal: no further dissection, no teardown
        // reporting from this analyzer.
        state.deliver_stream(OK_BLOCK, Direction::Responder);
        state.done();
        assert_eq!(state.sink.events, vec![GnutellaEvent::HttpNotify]);
    }

    #[test]
    fn test_http_masquerade_declined_install() {
        let mut state = new_state();
        state.parent.decline = true;
        state.deliver_stream(b"GET / HTTP/1.1\r\n", Direction::Originator);

        assert_eq!(state.sink.events, vec![GnutellaEvent::HttpNotify]);
        assert!(state.parent.installed.is_empty());
        assert!(state.parent.replayed.is_empty());
        assert!(state.parent.detached.is_empty());

        // Still terminal for this analyzer.
        state.deliver_stream(OK_BLOCK, Direction::Responder);
        state.done();
        assert_eq!(state.sink.events, vec![GnutellaEvent::HttpNotify]);
    }

    #[test]
    fn test_non_200_status() {
        let events = run(&[
            (false, b"GNUTELLA/0.6 503 Busy\r\n\r\n"),
            (true, CONNECT_BLOCK),
        ]);
        assert_eq!(
            events,
            vec![
                GnutellaEvent::TextMsg {
                    is_orig: false,
                    headers: b"\r\nGNUTELLA/0.6 503 Busy".to_vec(),
                },
                GnutellaEvent::TextMsg {
                    is_orig: true,
                    headers: b"\r\nGNUTELLA CONNECT/0.6\r\nUser-Agent: X".to_vec(),
                },
                GnutellaEvent::NotEstablish,
            ]
        );
    }

    #[test]
    fn test_fragmented_header() {
        let mut state = new_state();
        establish(&mut state);

        let header = descriptor(0x01, 7, 3, 0);
        state.deliver_stream(&header[..10], Direction::Responder);
        assert!(state.sink.events.is_empty());
        state.deliver_stream(&header[10..], Direction::Responder);

        let expected = GnutellaEvent::BinaryMsg {
            is_orig: false,
            msg_type: 0x01,
            ttl: 7,
            hops: 3,
            len: 0,
            payload: vec![],
            payload_len: 0,
            trunc: false,
            complete: true,
        };
        assert_eq!(state.sink.events, vec![expected.clone()]);

        // Identical to the unfragmented delivery.
        let mut whole = new_state();
        establish(&mut whole);
        whole.deliver_stream(&header, Direction::Responder);
        assert_eq!(whole.sink.events, vec![expected]);
    }

    #[test]
    fn test_oversize_payload_retention_cap() {
        let mut conf = Conf::new();
        conf.set(CONF_MAX_PAYLOAD, "64");
        let mut state = GnutellaState::new(
            test_flow(),
            &conf,
            TestSink::default(),
            TestParent::default(),
        );
        establish(&mut state);

        let mut data = descriptor(0x40, 2, 1, 164);
        data.extend_from_slice(&[0xaa_u8; 164]);
        state.deliver_stream(&data, Direction::Originator);

        assert_eq!(
            state.sink.events,
            vec![GnutellaEvent::BinaryMsg {
                is_orig: true,
                msg_type: 0x40,
                ttl: 2,
                hops: 1,
                len: 164,
                payload: vec![0xaa_u8; 64],
                payload_len: 64,
                // Retention equals the cap, so not truncated.
                trunc: false,
                complete: true,
            }]
        );
    }

    #[test]
    fn test_truncated_payload_at_teardown() {
        let mut state = new_state();
        establish(&mut state);

        let mut data = descriptor(0x81, 4, 0, 50);
        data.extend_from_slice(&[0x55_u8; 20]);
        state.deliver_stream(&data, Direction::Originator);
        assert!(state.sink.events.is_empty());

        state.done();
        assert_eq!(
            state.sink.events,
            vec![GnutellaEvent::BinaryMsg {
                is_orig: true,
                msg_type: 0x81,
                ttl: 4,
                hops: 0,
                len: 50,
                payload: vec![0x55_u8; 20],
                payload_len: 20,
                trunc: true,
                complete: false,
            }]
        );
    }

    #[test]
    fn test_partial_header_at_teardown() {
        let mut state = new_state();
        establish(&mut state);

        let header = descriptor(0x00, 1, 0, 0);
        state.deliver_stream(&header[..10], Direction::Originator);
        state.done();

        assert_eq!(
            state.sink.events,
            vec![GnutellaEvent::PartialBinaryMsg {
                payload: header[..10].to_vec(),
                is_orig: true,
                msg_pos: 10,
            }]
        );
    }

    #[test]
    fn test_payload_spanning_chunks() {
        let mut state = new_state();
        establish(&mut state);

        let mut data = descriptor(0x80, 5, 2, 10);
        data.extend_from_slice(b"ABCD");
        state.deliver_stream(&data, Direction::Responder);
        assert!(state.sink.events.is_empty());
        state.deliver_stream(b"EFGHIJ", Direction::Responder);

        assert_eq!(
            state.sink.events,
            vec![GnutellaEvent::BinaryMsg {
                is_orig: false,
                msg_type: 0x80,
                ttl: 5,
                hops: 2,
                len: 10,
                payload: b"ABCDEFGHIJ".to_vec(),
                payload_len: 10,
                trunc: false,
                complete: true,
            }]
        );
    }

    #[test]
    fn test_back_to_back_messages_reset_retention() {
        let mut state = new_state();
        establish(&mut state);

        let mut data = descriptor(0x00, 1, 0, 5);
        data.extend_from_slice(b"AAAAA");
        data.extend_from_slice(&descriptor(0x01, 1, 0, 3));
        data.extend_from_slice(b"BBB");
        data.extend_from_slice(&descriptor(0x00, 7, 0, 0));
        state.deliver_stream(&data, Direction::Originator);

        let payloads: Vec<Vec<u8>> = state
            .sink
            .events
            .iter()
            .map(|ev| match ev {
                GnutellaEvent::BinaryMsg { payload, .. } => payload.clone(),
                _ => panic!("unexpected event {:?}", ev),
            })
            .collect();
        assert_eq!(
            payloads,
            vec![b"AAAAA".to_vec(), b"BBB".to_vec(), Vec::new()]
        );
    }

    /// Splitting a delivery at any byte boundary must not change the
    /// emitted events.
    #[test]
    fn test_chunking_independence() {
        let mut orig_tail = OK_BLOCK.to_vec();
        orig_tail.extend_from_slice(&descriptor(0x00, 1, 0, 4));
        orig_tail.extend_from_slice(b"ping");
        orig_tail.extend_from_slice(&descriptor(0x80, 5, 2, 0));

        let reference = run(&[
            (true, CONNECT_BLOCK),
            (false, OK_BLOCK),
            (true, &orig_tail[..]),
        ]);

        for split in 0..=orig_tail.len() {
            let events = run(&[
                (true, CONNECT_BLOCK),
                (false, OK_BLOCK),
                (true, &orig_tail[..split]),
                (true, &orig_tail[split..]),
            ]);
            assert_eq!(events, reference, "split at {}", split);
        }
    }

    /// Per-direction events only depend on that direction's byte order,
    /// not on how the two sides interleave.
    #[test]
    fn test_direction_interleaving() {
        let resp_events = |events: &[GnutellaEvent]| -> Vec<GnutellaEvent> {
            events
                .iter()
                .filter(|ev| {
                    matches!(
                        ev,
                        GnutellaEvent::TextMsg { is_orig: false, .. }
                            | GnutellaEvent::BinaryMsg { is_orig: false, .. }
                    )
                })
                .cloned()
                .collect()
        };

        let ping = descriptor(0x00, 1, 0, 0);
        let a = run(&[
            (true, CONNECT_BLOCK),
            (false, OK_BLOCK),
            (true, OK_BLOCK),
            (false, &ping[..]),
        ]);
        let b = run(&[
            (false, OK_BLOCK),
            (true, CONNECT_BLOCK),
            (true, OK_BLOCK),
            (false, &ping[..]),
        ]);
        assert_eq!(resp_events(&a), resp_events(&b));
    }

    #[test]
    fn test_binary_msg_not_subscribed() {
        let mut state = new_state();
        state.sink.disabled = vec![EventId::BinaryMsg, EventId::PartialBinaryMsg];
        state.deliver_stream(CONNECT_BLOCK, Direction::Originator);
        state.deliver_stream(OK_BLOCK, Direction::Responder);
        state.deliver_stream(OK_BLOCK, Direction::Originator);
        assert!(state.established());

        let mut data = descriptor(0x00, 1, 0, 4);
        data.extend_from_slice(b"ping");
        state.deliver_stream(&data, Direction::Originator);
        state.done();

        // Handshake events only; framing never ran.
        assert_eq!(
            state
                .sink
                .events
                .iter()
                .filter(|ev| !matches!(ev, GnutellaEvent::TextMsg { .. }))
                .collect::<Vec<_>>(),
            vec![&GnutellaEvent::Establish]
        );
    }

    #[test]
    fn test_text_msg_not_subscribed_still_establishes() {
        let mut state = new_state();
        state.sink.disabled = vec![EventId::TextMsg];
        state.deliver_stream(CONNECT_BLOCK, Direction::Originator);
        state.deliver_stream(OK_BLOCK, Direction::Responder);
        state.deliver_stream(OK_BLOCK, Direction::Originator);
        assert!(state.established());
        assert_eq!(state.sink.events, vec![GnutellaEvent::Establish]);
    }

    #[test]
    fn test_handshake_overflow_gives_up() {
        let mut conf = Conf::new();
        conf.set(CONF_MAX_HANDSHAKE, "32");
        let mut state = GnutellaState::new(
            test_flow(),
            &conf,
            TestSink::default(),
            TestParent::default(),
        );

        state.deliver_stream(&[b'x'; 100], Direction::Originator);
        // A well-formed handshake afterwards is ignored: the flow already
        // stopped looking like Gnutella.
        state.deliver_stream(OK_BLOCK, Direction::Originator);
        state.deliver_stream(OK_BLOCK, Direction::Responder);
        assert!(!state.established());

        state.done();
        assert_eq!(state.sink.events, vec![GnutellaEvent::NotEstablish]);
    }

    #[test]
    fn test_line_discipline_quirks() {
        // A pending CR survives an intervening byte, so the LF after "B"
        // completes the line with the CR dropped.
        let events = run(&[(true, b"A\rB\n\r\n")]);
        assert_eq!(
            events,
            vec![
                GnutellaEvent::TextMsg {
                    is_orig: true,
                    headers: b"\r\nAB".to_vec(),
                },
                GnutellaEvent::NotEstablish,
            ]
        );

        // An LF with no CR seen yet is ordinary line data.
        let events = run(&[(true, b"X\nY\r\n\r\n")]);
        assert_eq!(
            events,
            vec![
                GnutellaEvent::TextMsg {
                    is_orig: true,
                    headers: b"\r\nX\nY".to_vec(),
                },
                GnutellaEvent::NotEstablish,
            ]
        );
    }

    #[test]
    fn test_empty_handshake_block() {
        // A bare CRLF CRLF yields a text event with no header bytes.
        let events = run(&[(true, b"\r\n")]);
        assert_eq!(
            events,
            vec![
                GnutellaEvent::TextMsg {
                    is_orig: true,
                    headers: Vec::new(),
                },
                GnutellaEvent::NotEstablish,
            ]
        );
    }

    #[test]
    fn test_at_most_one_terminal_event() {
        let mut state = new_state();
        establish(&mut state);
        state.done();
        assert!(state.sink.events.is_empty());

        let events = run(&[]);
        assert_eq!(events, vec![GnutellaEvent::NotEstablish]);
    }
}
