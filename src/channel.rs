// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Application-facing wrapper over an `Io` channel, directionally tagged
// the way the router's per-app channel context is (output vs. input), with
// an optional encoder/decoder descriptor used when serializing messages
// for network egress.

use std::sync::Arc;

use crate::error::Result;
use crate::io::{BufHandle, Io};
use crate::stream_id::StreamId;

/// Per-application wrapper over one `Io` channel.
pub struct ChannelCtx {
    io: Arc<dyn Io>,
    stream_id: StreamId,
    is_output: bool,
    descriptor: Option<Vec<u8>>,
}

impl ChannelCtx {
    pub fn new_output(io: Arc<dyn Io>, stream_id: StreamId, descriptor: Option<Vec<u8>>) -> Self {
        Self { io, stream_id, is_output: true, descriptor }
    }

    pub fn new_input(io: Arc<dyn Io>, stream_id: StreamId, descriptor: Option<Vec<u8>>) -> Self {
        Self { io, stream_id, is_output: false, descriptor }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_output(&self) -> bool {
        self.is_output
    }

    /// Reserve a writable buffer tagged with this channel's stream-id.
    /// Valid only on output channels.
    pub fn reserve(&self, size: usize) -> Result<BufHandle> {
        debug_assert!(self.is_output, "reserve() called on an input channel");
        self.io.reserve_buf(self.stream_id, size)
    }

    /// Hand a reserved buffer to the IPC fabric; it is fanned out to
    /// matching subscribers by the router's dispatch loop.
    pub fn submit(&self, buf: BufHandle) -> Result<()> {
        self.io.submit(buf)
    }

    /// Serialize `buf` for network egress using this channel's descriptor,
    /// if one was supplied at creation.
    pub fn pack(&self, buf: BufHandle) -> Result<Vec<u8>> {
        self.io.pack(buf, self.descriptor.as_deref().unwrap_or(&[]))
    }

    /// Deserialize a network blob into a buffer owned by the IPC fabric.
    pub fn unpack(&self, bytes: &[u8]) -> Result<BufHandle> {
        self.io.unpack(bytes)
    }

    /// Release this channel's share of a buffer.
    pub fn release(&self, buf: BufHandle) {
        self.io.release_buf(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::DefaultIo;

    #[test]
    fn output_channel_reserve_submit() {
        let io: Arc<dyn Io> = Arc::new(DefaultIo::new(4));
        let sid = StreamId::generate(0x02, 0, Some("p"), Some("n")).unwrap();
        let ch = ChannelCtx::new_output(Arc::clone(&io), sid, None);
        let buf = ch.reserve(8).unwrap();
        assert!(ch.submit(buf).is_ok());
    }

    #[test]
    fn descriptor_is_threaded_through_pack() {
        let io: Arc<dyn Io> = Arc::new(DefaultIo::new(4));
        let sid = StreamId::generate(0x02, 0, Some("p"), Some("n")).unwrap();
        let ch = ChannelCtx::new_output(Arc::clone(&io), sid, Some(b"codec-v1".to_vec()));
        let buf = ch.reserve(4).unwrap();
        let packed = ch.pack(buf).unwrap();
        assert!(!packed.is_empty());
        ch.release(buf);
    }
}
