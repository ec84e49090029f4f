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

use std::net::SocketAddr;

/// Connection handle attached to every emitted event.
///
/// Owned by the host; analyzers only ever borrow it. The id is assigned
/// by the host and is what loggers correlate events on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    pub id: u64,
    pub orig: SocketAddr,
    pub resp: SocketAddr,
}

impl Flow {
    pub fn new(id: u64, orig: SocketAddr, resp: SocketAddr) -> Self {
        Self { id, orig, resp }
    }
}

impl std::fmt::Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.orig, self.resp)
    }
}
