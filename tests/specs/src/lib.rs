// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the black-box suite in `tests/`.
//!
//! Everything here goes through the public `ringmux` surface only. The
//! suite drives the buffer the way transport fill code and protocol parsers
//! do: raw bytes in via add/force-add, bytes out through a cursor.

use ringmux::reader::ReadHandle;
use ringmux::ring::RingBuffer;

/// The fill byte for output buffers, so untouched bytes are detectable.
pub const FILL: u8 = 0x5a;

/// Deterministic test payload: 0, 1, 2, ... length `len`.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|x| x as u8).collect()
}

/// Zeroed backing storage of total size `size` (usable capacity `size - 1`).
pub fn storage(size: usize) -> Vec<u8> {
    vec![0; size]
}

/// Drain the implicit reader completely.
pub fn drain(ring: &mut RingBuffer) -> Vec<u8> {
    let mut out = vec![FILL; ring.capacity() + 1];
    let n = ring.read(&mut out);
    out.truncate(n);
    out
}

/// Drain a handle's backlog completely.
pub fn drain_handle(ring: &mut RingBuffer, handle: ReadHandle) -> Vec<u8> {
    let mut out = vec![FILL; ring.capacity() + 1];
    let n = ring.read_handle(handle, &mut out);
    out.truncate(n);
    out
}
