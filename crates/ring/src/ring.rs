// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-reader circular byte buffer for module transport streams.
//!
//! One fixed-size store decouples byte arrival (UART/I2C/SPI fill code) from
//! any number of consumers that parse at their own pace. Every reader owns a
//! cursor into the shared storage, so a slow consumer costs bookkeeping, not
//! copies. `add` refuses to overwrite unread data; `force_add` always lands
//! and instead evicts the oldest unread bytes from every reader it overruns.
//!
//! The buffer takes no internal lock. The `&mut self` receivers force
//! callers to serialize access; shared use goes behind the caller's own
//! mutex, wrapping the buffer the way the surrounding stack wraps its
//! transport state.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::Error;
use crate::reader::{ReadHandle, ReaderTable};

/// Advance `pos` by `n` slots, wrapping at `len`.
fn advance(len: usize, pos: usize, n: usize) -> usize {
    (pos + n) % len
}

/// Bytes from `read` forward to `write` around a ring of `len` slots.
fn distance(len: usize, read: usize, write: usize) -> usize {
    (len + write - read) % len
}

/// Copy `out.len()` bytes out of the ring starting at `cursor`, in at most
/// two segments. `out` must not be longer than the valid span.
fn copy_out(buf: &[u8], cursor: usize, out: &mut [u8]) {
    let len = buf.len();
    let end = cursor + out.len();
    if end <= len {
        out.copy_from_slice(&buf[cursor..end]);
    } else {
        let first = len - cursor;
        out[..first].copy_from_slice(&buf[cursor..]);
        out[first..].copy_from_slice(&buf[..end - len]);
    }
}

/// Multi-reader ring buffer with an explicit lifecycle.
///
/// Starts out **uninitialized**: every operation on it is a safe no-op
/// returning a neutral value. `create`/`create_with_read_handles` bind the
/// backing storage and move it to **active**; `delete` moves it back. This
/// makes the buffer safe to embed in device state that is zeroed up front
/// and may be torn down and re-created out of order.
#[derive(Debug)]
pub struct RingBuffer {
    state: Option<Active>,
}

/// Storage and cursor bookkeeping held while the buffer is active.
#[derive(Debug)]
struct Active {
    buf: Vec<u8>,
    write_pos: usize,
    /// Cursor for the implicit reader behind `read`/`data_size`.
    unhandled_pos: usize,
    /// Bytes forced out from under the implicit reader since creation.
    unhandled_lost: u64,
    read_requires_handle: bool,
    readers: ReaderTable,
    total_added: u64,
    total_lost: u64,
}

impl Active {
    /// One storage slot stays permanently unused so that cursor distance
    /// alone distinguishes "empty" from "full".
    fn usable(&self) -> usize {
        self.buf.len() - 1
    }

    fn backlog(&self, cursor: usize) -> usize {
        distance(self.buf.len(), cursor, self.write_pos)
    }

    /// Largest backlog over every reader the write side must respect.
    fn max_backlog(&self) -> usize {
        let mut max = 0;
        if !self.read_requires_handle {
            max = self.backlog(self.unhandled_pos);
        }
        for (_, slot) in self.readers.active_slots() {
            max = max.max(self.backlog(slot.cursor));
        }
        max
    }

    fn available(&self) -> usize {
        self.usable() - self.max_backlog()
    }

    /// Copy `data` in at the write cursor (at most two segments) and
    /// advance it. Callers have already checked `data.len() <= usable`.
    fn copy_in(&mut self, data: &[u8]) {
        let len = self.buf.len();
        let start = self.write_pos;
        let end = start + data.len();
        if end <= len {
            self.buf[start..end].copy_from_slice(data);
        } else {
            let first = len - start;
            self.buf[start..].copy_from_slice(&data[..first]);
            self.buf[..data.len() - first].copy_from_slice(&data[first..]);
        }
        self.write_pos = end % len;
        self.total_added += data.len() as u64;
    }
}

impl RingBuffer {
    /// A new, uninitialized ring buffer.
    pub fn new() -> Self {
        Self { state: None }
    }

    /// Bind `storage` with no read-handle support.
    ///
    /// One byte of `storage` is reserved for cursor disambiguation, so the
    /// usable capacity is `storage.len() - 1`. Creating over an already
    /// active buffer rebinds it, discarding all previous state.
    pub fn create(&mut self, storage: Vec<u8>) -> Result<(), Error> {
        self.create_with_read_handles(storage, 0)
    }

    /// Bind `storage` plus a table of `max_handles` reader slots.
    pub fn create_with_read_handles(
        &mut self,
        storage: Vec<u8>,
        max_handles: usize,
    ) -> Result<(), Error> {
        if storage.len() < 2 {
            return Err(Error::StorageTooSmall);
        }
        debug!(
            "ring buffer created: {} usable byte(s), {} read handle slot(s)",
            storage.len() - 1,
            max_handles
        );
        self.state = Some(Active {
            buf: storage,
            write_pos: 0,
            unhandled_pos: 0,
            unhandled_lost: 0,
            read_requires_handle: false,
            readers: ReaderTable::new(max_handles),
            total_added: 0,
            total_lost: 0,
        });
        Ok(())
    }

    /// Release the storage and handle table and return to uninitialized.
    /// Deleting an uninitialized buffer is a no-op.
    pub fn delete(&mut self) {
        if self.state.take().is_some() {
            debug!("ring buffer deleted");
        }
    }

    /// Whether the buffer is currently active.
    pub fn is_created(&self) -> bool {
        self.state.is_some()
    }

    /// Discard all buffered data without touching capacity, the mode flag,
    /// or handle allocations: every cursor rewinds to a common position.
    pub fn reset(&mut self) {
        let Some(active) = self.state.as_mut() else {
            return;
        };
        active.write_pos = 0;
        active.unhandled_pos = 0;
        for (_, slot) in active.readers.active_slots_mut() {
            slot.cursor = 0;
        }
    }

    /// Toggle handle-required mode. While on, the implicit reader is
    /// hidden: `data_size` reports zero, `read`/`skip`/`flush` consume
    /// nothing, and `available_size` ignores its backlog.
    ///
    /// Turning the mode back off resynchronizes the implicit reader's
    /// cursor to the write cursor: bytes added while the mode was on are
    /// never exposed to it.
    pub fn set_read_requires_handle(&mut self, required: bool) {
        let Some(active) = self.state.as_mut() else {
            return;
        };
        if active.read_requires_handle && !required {
            active.unhandled_pos = active.write_pos;
        }
        active.read_requires_handle = required;
    }

    /// Whether handle-required mode is on. `false` when uninitialized.
    pub fn read_requires_handle(&self) -> bool {
        self.state.as_ref().is_some_and(|a| a.read_requires_handle)
    }

    /// Append `data` without overwriting any reader's unread bytes.
    ///
    /// Succeeds only when `data` fits in [`available_size`](Self::available_size);
    /// on failure nothing is written. `false` on an uninitialized buffer.
    pub fn add(&mut self, data: &[u8]) -> bool {
        let Some(active) = self.state.as_mut() else {
            return false;
        };
        if data.len() > active.available() {
            return false;
        }
        active.copy_in(data);
        true
    }

    /// Append `data` unconditionally, evicting the oldest unread bytes from
    /// every reader that would otherwise be overrun.
    ///
    /// Fails only when `data` could never fit (`data.len() > capacity()`)
    /// or the buffer is uninitialized; never partially writes. An overrun
    /// reader is left with exactly `capacity()` bytes of backlog and its
    /// loss counter raised by the evicted count.
    pub fn force_add(&mut self, data: &[u8]) -> bool {
        let Some(active) = self.state.as_mut() else {
            return false;
        };
        let usable = active.usable();
        if data.len() > usable {
            return false;
        }
        let len = active.buf.len();
        // Backlogs must be measured against the write cursor as it was
        // before the copy; afterwards the modular distance is ambiguous for
        // a reader that has just been lapped.
        let old_write = active.write_pos;
        active.copy_in(data);
        // Oldest position any reader may still point at: exactly `usable`
        // bytes behind the new write cursor.
        let floor = advance(len, active.write_pos, len - usable);
        if !active.read_requires_handle {
            let before = distance(len, active.unhandled_pos, old_write);
            if before + data.len() > usable {
                let lost = (before + data.len() - usable) as u64;
                active.unhandled_pos = floor;
                active.unhandled_lost += lost;
                active.total_lost += lost;
                trace!("force add dropped {lost} unread byte(s) from the unhandled reader");
            }
        }
        for (index, slot) in active.readers.active_slots_mut() {
            let before = distance(len, slot.cursor, old_write);
            if before + data.len() > usable {
                let lost = (before + data.len() - usable) as u64;
                slot.cursor = floor;
                slot.lost += lost;
                active.total_lost += lost;
                trace!("force add dropped {lost} unread byte(s) from reader slot {index}");
            }
        }
        true
    }

    /// Copy up to `out.len()` unread bytes for the implicit reader,
    /// advancing its cursor. Returns the byte count; `0` (with `out`
    /// untouched) in handle-required mode or when uninitialized.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let Some(active) = self.state.as_mut() else {
            return 0;
        };
        if active.read_requires_handle {
            return 0;
        }
        let n = out.len().min(active.backlog(active.unhandled_pos));
        copy_out(&active.buf, active.unhandled_pos, &mut out[..n]);
        active.unhandled_pos = advance(active.buf.len(), active.unhandled_pos, n);
        n
    }

    /// Discard up to `max` unread bytes for the implicit reader, returning
    /// the number discarded. The drain counterpart of [`read`](Self::read).
    pub fn skip(&mut self, max: usize) -> usize {
        let Some(active) = self.state.as_mut() else {
            return 0;
        };
        if active.read_requires_handle {
            return 0;
        }
        let n = max.min(active.backlog(active.unhandled_pos));
        active.unhandled_pos = advance(active.buf.len(), active.unhandled_pos, n);
        n
    }

    /// Discard the implicit reader's whole backlog.
    pub fn flush(&mut self) -> usize {
        self.skip(usize::MAX)
    }

    /// As [`read`](Self::read) but against handle `h`'s private cursor.
    /// Returns `0` for stale or freed handles.
    pub fn read_handle(&mut self, handle: ReadHandle, out: &mut [u8]) -> usize {
        let Some(active) = self.state.as_mut() else {
            return 0;
        };
        let len = active.buf.len();
        let write = active.write_pos;
        let Some(slot) = active.readers.get_mut(handle) else {
            return 0;
        };
        let n = out.len().min(distance(len, slot.cursor, write));
        copy_out(&active.buf, slot.cursor, &mut out[..n]);
        slot.cursor = advance(len, slot.cursor, n);
        n
    }

    /// Discard up to `max` unread bytes for handle `h`.
    pub fn skip_handle(&mut self, handle: ReadHandle, max: usize) -> usize {
        let Some(active) = self.state.as_mut() else {
            return 0;
        };
        let len = active.buf.len();
        let write = active.write_pos;
        let Some(slot) = active.readers.get_mut(handle) else {
            return 0;
        };
        let n = max.min(distance(len, slot.cursor, write));
        slot.cursor = advance(len, slot.cursor, n);
        n
    }

    /// Discard handle `h`'s whole backlog.
    pub fn flush_handle(&mut self, handle: ReadHandle) -> usize {
        self.skip_handle(handle, usize::MAX)
    }

    /// As [`read_handle`](Self::read_handle) but non-advancing, starting
    /// `offset` bytes into the handle's unread region. Returns `0` when
    /// `offset` is at or past the end of the backlog.
    pub fn peek_handle(&self, handle: ReadHandle, out: &mut [u8], offset: usize) -> usize {
        let Some(active) = self.state.as_ref() else {
            return 0;
        };
        let Some(slot) = active.readers.get(handle) else {
            return 0;
        };
        let backlog = active.backlog(slot.cursor);
        if offset >= backlog {
            return 0;
        }
        let n = out.len().min(backlog - offset);
        let start = advance(active.buf.len(), slot.cursor, offset);
        copy_out(&active.buf, start, &mut out[..n]);
        n
    }

    /// Unread bytes visible to the implicit reader. Zero in handle-required
    /// mode and on uninitialized buffers.
    pub fn data_size(&self) -> usize {
        let Some(active) = self.state.as_ref() else {
            return 0;
        };
        if active.read_requires_handle {
            return 0;
        }
        active.backlog(active.unhandled_pos)
    }

    /// Unread bytes for handle `h`; zero for stale handles.
    pub fn data_size_handle(&self, handle: ReadHandle) -> usize {
        let Some(active) = self.state.as_ref() else {
            return 0;
        };
        active.readers.get(handle).map_or(0, |s| active.backlog(s.cursor))
    }

    /// Room the write side may fill via [`add`](Self::add) without
    /// overrunning the slowest active reader. The full usable capacity when
    /// no reader is active; zero when uninitialized.
    pub fn available_size(&self) -> usize {
        self.state.as_ref().map_or(0, Active::available)
    }

    /// Usable capacity in bytes (one less than the backing storage length).
    pub fn capacity(&self) -> usize {
        self.state.as_ref().map_or(0, Active::usable)
    }

    /// Claim a free reader slot. The new reader starts with an empty
    /// backlog: it sees only bytes added after this call.
    pub fn take_read_handle(&mut self) -> Result<ReadHandle, Error> {
        let Some(active) = self.state.as_mut() else {
            return Err(Error::NotCreated);
        };
        let cursor = active.write_pos;
        let handle = active.readers.take(cursor).ok_or(Error::HandlesExhausted)?;
        trace!("read handle {} taken", handle.index());
        Ok(handle)
    }

    /// Release a reader slot for reuse. Stale handles are ignored; any
    /// relationship between the slot's old cursor and buffered data ends
    /// here.
    pub fn give_read_handle(&mut self, handle: ReadHandle) {
        let Some(active) = self.state.as_mut() else {
            return;
        };
        if active.readers.give(handle) {
            trace!("read handle {} given back", handle.index());
        }
    }

    /// Bytes evicted from the implicit reader by forced adds since
    /// creation.
    pub fn read_loss(&self) -> u64 {
        self.state.as_ref().map_or(0, |a| a.unhandled_lost)
    }

    /// Bytes evicted from handle `h` since it was taken.
    pub fn read_loss_handle(&self, handle: ReadHandle) -> u64 {
        let Some(active) = self.state.as_ref() else {
            return 0;
        };
        active.readers.get(handle).map_or(0, |s| s.lost)
    }

    /// Snapshot of the buffer's counters for diagnostics.
    pub fn stats(&self) -> RingStats {
        let Some(active) = self.state.as_ref() else {
            return RingStats::default();
        };
        RingStats {
            capacity: active.usable(),
            available: active.available(),
            data_size: if active.read_requires_handle {
                0
            } else {
                active.backlog(active.unhandled_pos)
            },
            handle_slots: active.readers.slot_count(),
            handles_in_use: active.readers.in_use(),
            total_added: active.total_added,
            total_lost: active.total_lost,
        }
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time counters for flow-control decisions and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingStats {
    /// Usable capacity in bytes.
    pub capacity: usize,
    /// Room currently available to `add`.
    pub available: usize,
    /// Backlog of the implicit reader (zero while hidden).
    pub data_size: usize,
    /// Total reader slots in the handle table.
    pub handle_slots: usize,
    /// Slots currently allocated.
    pub handles_in_use: usize,
    /// Bytes accepted by `add`/`force_add` since creation.
    pub total_added: u64,
    /// Bytes evicted from any reader by forced adds since creation.
    pub total_lost: u64,
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
