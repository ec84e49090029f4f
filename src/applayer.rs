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

//! Seams between a flow analyzer and the host framework: the delivery
//! lifecycle it is driven through and the parent it can ask for a
//! mid-stream protocol handoff.

use crate::direction::Direction;

/// Lifecycle surface of a per-flow analyzer.
///
/// The host calls `deliver_stream` with whole, non-overlapping, in-order
/// byte chunks per direction, then `done` exactly once when the flow ends.
pub trait Analyzer {
    fn deliver_stream(&mut self, data: &[u8], dir: Direction);
    fn done(&mut self);
    fn name(&self) -> &'static str;
}

/// Capabilities the parent analyzer exposes for a mid-stream protocol
/// switch.
///
/// `install_sibling` asks the host to instantiate the named analyzer and
/// attach it next to the caller; it returns false if the host declined.
/// `replay_buffered_prefix` re-injects the stream bytes buffered by the
/// protocol-identification arbiter into the named sibling, and `detach`
/// removes an analyzer from the parent, after which it receives no
/// further deliveries.
pub trait ParentAnalyzer {
    fn install_sibling(&mut self, name: &str) -> bool;
    fn replay_buffered_prefix(&mut self, name: &str);
    fn detach(&mut self, name: &str);
}

/// Parent for hosts without analyzer lifecycle management: every install
/// is declined.
#[derive(Debug, Default)]
pub struct NullParent;

impl ParentAnalyzer for NullParent {
    fn install_sibling(&mut self, _name: &str) -> bool {
        false
    }

    fn replay_buffered_prefix(&mut self, _name: &str) {}

    fn detach(&mut self, _name: &str) {}
}
