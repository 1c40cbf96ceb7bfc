//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Scrollback buffer replayed to newly-joined clients.

/// Default capacity, about 512 lines of text.
const DEFAULT_CAPACITY: usize = 40 * 1024;
/// Default scroll step, about 128 lines of text.
const DEFAULT_SCROLL: usize = 10 * 1024;

/// A bounded byte buffer holding the tail of the upstream output.
///
/// Writes append; once the buffer would exceed its capacity it scrolls
/// forward in multiples of the scroll step, always keeping a contiguous
/// suffix of the byte stream. Replay trims the leading partial line so a
/// joining client starts on a line boundary.
#[derive(Debug)]
pub struct History {
    capacity: usize,
    scroll: usize,
    scrolled: bool,
    buf: Vec<u8>,
}

impl Default for History {
    fn default() -> Self {
        History::new()
    }
}

impl History {
    /// Creates a scrollback with the default sizes.
    pub fn new() -> History {
        History::with_size(DEFAULT_CAPACITY, DEFAULT_SCROLL)
    }

    /// Creates a scrollback with explicit capacity and scroll step.
    pub fn with_size(capacity: usize, scroll: usize) -> History {
        History {
            capacity,
            scroll,
            scrolled: false,
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Appends bytes, scrolling the buffer forward as needed. Never holds
    /// more than the configured capacity.
    pub fn write(&mut self, p: &[u8]) {
        let total = self.buf.len() + p.len();
        if total <= self.capacity {
            self.buf.extend_from_slice(p);
            return;
        }

        self.scrolled = true;
        let mut keep_total = total;
        while keep_total > self.capacity {
            keep_total -= self.scroll;
        }
        if keep_total <= p.len() {
            // The whole retained window is the tail of this write.
            self.buf.clear();
            self.buf.extend_from_slice(&p[p.len() - keep_total..]);
        } else {
            let keep_old = keep_total - p.len();
            let drop = self.buf.len() - keep_old;
            self.buf.drain(..drop);
            self.buf.extend_from_slice(p);
        }
    }

    /// The bytes to replay to a joining client. Once the buffer has
    /// scrolled, the leading partial line is trimmed so replay starts at
    /// a line boundary; an unscrolled buffer replays in full.
    pub fn replay(&self) -> &[u8] {
        if self.scrolled {
            if let Some(i) = self.buf.iter().position(|&b| b == b'\n') {
                return &self.buf[i + 1..];
            }
        }
        &self.buf
    }

    /// Current length in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written (or everything scrolled away).
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
