// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The shared-memory IPC fabric is an external collaborator and is treated
// here as a narrow black-box trait: it delivers buffers keyed by stream-id
// and exposes a buffer-reservation/submit API. The router only ever talks
// to `dyn Io`; `DefaultIo` is an in-memory double used by tests and by the
// CLI demo, grounded on this codebase's chunk-storage free-list allocator
// in place of a real shared-memory region.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;
use crate::pool::MemPool;
use crate::stream_id::StreamId;

/// A handle to a buffer owned by the `Io` layer. Opaque to the router: it
/// only ever threads this back through `release_buf`.
#[derive(Clone, Copy, Debug)]
pub struct BufHandle {
    pub stream_id: StreamId,
    slot: usize,
}

/// Narrow interface over the shared-memory IPC fabric. The router never
/// interprets payload bytes; it only routes by `stream_id` and delegates
/// (de)serialization for network egress to `pack`/`unpack`.
pub trait Io: Send + Sync {
    /// Reserve a writable buffer of `size` bytes tagged with `stream_id`.
    fn reserve_buf(&self, stream_id: StreamId, size: usize) -> Result<BufHandle>;

    /// Hand a previously-reserved buffer to the IPC fabric for delivery.
    fn submit(&self, buf: BufHandle) -> Result<()>;

    /// Release a share of a buffer. Must be safe to call once per share
    /// held (the router holds one share per matched subscriber); the
    /// underlying buffer is only returned to the pool once every share has
    /// been released.
    fn release_buf(&self, buf: BufHandle);

    /// Add `extra` additional shares to `buf`, for fan-out to multiple
    /// matching subscribers. Each added share must be balanced by exactly
    /// one extra `release_buf` call.
    fn add_shares(&self, buf: BufHandle, extra: usize);

    /// Drain buffers the fabric has queued for outbound delivery, invoking
    /// `visit` once per buffer. Mirrors the router's steady-state read of
    /// IPC out-queues (§4.6).
    fn drain_out_bufs(&self, visit: &mut dyn FnMut(BufHandle));

    /// Serialize `buf` for network egress using an opaque encoder
    /// descriptor supplied at channel-creation time.
    fn pack(&self, buf: BufHandle, descriptor: &[u8]) -> Result<Vec<u8>>;

    /// Deserialize a length-delimited network blob back into a buffer,
    /// recovering its stream-id.
    fn unpack(&self, bytes: &[u8]) -> Result<BufHandle>;

    /// Read-only access to a buffer's bytes. Not part of the original
    /// black-box contract in the strict sense, but required for any
    /// in-process double or test harness to be useful.
    fn bytes(&self, buf: BufHandle) -> &[u8];
}

struct Entry {
    stream_id: StreamId,
    data: Vec<u8>,
    // Per-buffer share count (§3.4/§4.4): the router adds one share per
    // matching app beyond the first before fan-out, and the slot is only
    // returned to the pool once every share has been released.
    shares: AtomicUsize,
}

/// An in-memory stand-in for the real shared-memory IPC fabric. Buffers are
/// allocated from a fixed-capacity pool (the same free-list pattern backing
/// [`crate::pool::MemPool`]) rather than a shared-memory region.
pub struct DefaultIo {
    pool: MemPool<Entry>,
    pending: std::sync::Mutex<Vec<usize>>,
}

impl DefaultIo {
    pub fn new(capacity: usize) -> Self {
        Self { pool: MemPool::new(capacity), pending: std::sync::Mutex::new(Vec::new()) }
    }
}

impl Io for DefaultIo {
    fn reserve_buf(&self, stream_id: StreamId, size: usize) -> Result<BufHandle> {
        let slot = self
            .pool
            .acquire(Entry { stream_id, data: vec![0u8; size], shares: AtomicUsize::new(1) })
            .ok_or(crate::error::RouterError::Capacity)?;
        Ok(BufHandle { stream_id, slot })
    }

    fn submit(&self, buf: BufHandle) -> Result<()> {
        self.pending.lock().unwrap().push(buf.slot);
        Ok(())
    }

    fn release_buf(&self, buf: BufHandle) {
        let entry = unsafe { self.pool.get(buf.slot) };
        if entry.shares.fetch_sub(1, Ordering::AcqRel) == 1 {
            unsafe { self.pool.release(buf.slot) };
        }
    }

    fn add_shares(&self, buf: BufHandle, extra: usize) {
        if extra == 0 {
            return;
        }
        let entry = unsafe { self.pool.get(buf.slot) };
        entry.shares.fetch_add(extra, Ordering::AcqRel);
    }

    fn drain_out_bufs(&self, visit: &mut dyn FnMut(BufHandle)) {
        let mut pending = self.pending.lock().unwrap();
        for slot in pending.drain(..) {
            let stream_id = unsafe { self.pool.get(slot) }.stream_id;
            visit(BufHandle { stream_id, slot });
        }
    }

    fn pack(&self, buf: BufHandle, _descriptor: &[u8]) -> Result<Vec<u8>> {
        let entry = unsafe { self.pool.get(buf.slot) };
        let mut out = Vec::with_capacity(16 + 4 + entry.data.len());
        out.extend_from_slice(&buf.stream_id.to_bytes());
        out.extend_from_slice(&(entry.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&entry.data);
        Ok(out)
    }

    fn unpack(&self, bytes: &[u8]) -> Result<BufHandle> {
        if bytes.len() < 20 {
            return Err(crate::error::RouterError::InvalidArgument { reason: "short buffer".into() });
        }
        let mut wire = [0u8; 16];
        wire.copy_from_slice(&bytes[0..16]);
        let stream_id = StreamId::from_bytes(wire);
        let len = u32::from_be_bytes(bytes[16..20].try_into().unwrap()) as usize;
        let data = bytes[20..20 + len].to_vec();
        let slot = self
            .pool
            .acquire(Entry { stream_id, data })
            .ok_or(crate::error::RouterError::Capacity)?;
        Ok(BufHandle { stream_id, slot })
    }

    fn bytes(&self, buf: BufHandle) -> &[u8] {
        unsafe { &self.pool.get(buf.slot).data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_submit_drain_release() {
        let io = DefaultIo::new(4);
        let sid = StreamId::generate(0x02, 0, Some("p"), Some("n")).unwrap();
        let buf = io.reserve_buf(sid, 8).unwrap();
        io.submit(buf).unwrap();

        let mut seen = Vec::new();
        io.drain_out_bufs(&mut |b| seen.push(b));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].stream_id, sid);
        io.release_buf(seen[0]);
    }

    #[test]
    fn shared_buffer_is_freed_only_after_every_share_released() {
        // Capacity 1: the slot can only be reused once every share of the
        // original buffer has been released, proving release_buf doesn't
        // free on the first call when other apps still hold a share.
        let io = DefaultIo::new(1);
        let sid = StreamId::generate(0x02, 0, Some("p"), Some("n")).unwrap();
        let buf = io.reserve_buf(sid, 4).unwrap();
        io.add_shares(buf, 1); // two subscribers now hold this buffer

        assert!(matches!(io.reserve_buf(sid, 4), Err(crate::error::RouterError::Capacity)));

        io.release_buf(buf); // first subscriber's release
        assert!(matches!(io.reserve_buf(sid, 4), Err(crate::error::RouterError::Capacity)));

        io.release_buf(buf); // second subscriber's release frees the slot
        assert!(io.reserve_buf(sid, 4).is_ok());
    }

    #[test]
    fn pack_unpack_round_trip() {
        let io = DefaultIo::new(4);
        let sid = StreamId::generate(0x02, 0, Some("p"), Some("n")).unwrap();
        let buf = io.reserve_buf(sid, 4).unwrap();
        let wire = io.pack(buf, &[]).unwrap();
        io.release_buf(buf);

        let buf2 = io.unpack(&wire).unwrap();
        assert_eq!(buf2.stream_id, sid);
        io.release_buf(buf2);
    }
}
