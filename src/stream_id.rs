// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// 128-bit stream identifier: bit-packed fields plus bloom-hash digests of
// string path/name components. Ported from the bit-packing and bloom-filter
// scheme of the stream-id module this router's dispatch core is built on.

use crate::error::{Result, RouterError};

const VERSION_OFFSET: u32 = 0;
const VERSION_WIDTH: u32 = 6;
const FWD_DST_OFFSET: u32 = 6;
const FWD_DST_WIDTH: u32 = 7;
const DEVICE_ID_OFFSET: u32 = 13;
const DEVICE_ID_WIDTH: u32 = 7;
const STREAM_PATH_OFFSET: u32 = 20;
const STREAM_PATH_WIDTH: u32 = 54;
const STREAM_NAME_OFFSET: u32 = 74;
const STREAM_NAME_WIDTH: u32 = 54;

/// All-ones wildcard for a 7-bit field (`device_id`, `fwd_dst`).
pub const ANY7: u8 = 0x7F;
/// All-ones wildcard for a 54-bit field (`stream_path`, `stream_name`).
pub const ANY54: u64 = (1u64 << 54) - 1;

const HASH_NUMBER_BITS: usize = 54;
const NUM_HASH_FUNCTIONS: u64 = 38;
const STREAM_ID_VERSION: u8 = 0;

/// A 128-bit routing key: five bit-packed fields per the canonical
/// big-endian wire layout. Two `StreamId`s are equal iff their 16-byte
/// representations are equal.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamId {
    bits: u128,
}

impl std::hash::Hash for StreamId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // A single write of the canonical wire form, so a `StreamIdHasher`
        // can apply MurmurHash64A directly to it (see `StreamIdHasher`).
        state.write(&self.to_bytes());
    }
}

fn field_mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

fn get_field(bits: u128, offset: u32, width: u32) -> u128 {
    let shift = 128 - offset - width;
    (bits >> shift) & field_mask(width)
}

fn set_field(bits: u128, offset: u32, width: u32, value: u128) -> u128 {
    let shift = 128 - offset - width;
    let mask = field_mask(width) << shift;
    (bits & !mask) | ((value << shift) & mask)
}

impl StreamId {
    /// Construct a `StreamId` from its 16-byte big-endian wire representation.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self { bits: u128::from_be_bytes(bytes) }
    }

    /// The 16-byte big-endian wire representation.
    pub fn to_bytes(self) -> [u8; 16] {
        self.bits.to_be_bytes()
    }

    pub fn version(self) -> u8 {
        get_field(self.bits, VERSION_OFFSET, VERSION_WIDTH) as u8
    }

    pub fn fwd_dst(self) -> u8 {
        get_field(self.bits, FWD_DST_OFFSET, FWD_DST_WIDTH) as u8
    }

    pub fn set_fwd_dst(&mut self, fwd_dst: u8) {
        self.bits = set_field(self.bits, FWD_DST_OFFSET, FWD_DST_WIDTH, fwd_dst as u128);
    }

    pub fn device_id(self) -> u8 {
        get_field(self.bits, DEVICE_ID_OFFSET, DEVICE_ID_WIDTH) as u8
    }

    pub fn set_device_id(&mut self, device_id: u8) {
        self.bits = set_field(self.bits, DEVICE_ID_OFFSET, DEVICE_ID_WIDTH, device_id as u128);
    }

    pub fn stream_path(self) -> u64 {
        get_field(self.bits, STREAM_PATH_OFFSET, STREAM_PATH_WIDTH) as u64
    }

    pub fn set_stream_path(&mut self, stream_path: u64) {
        self.bits = set_field(self.bits, STREAM_PATH_OFFSET, STREAM_PATH_WIDTH, stream_path as u128);
    }

    pub fn stream_name(self) -> u64 {
        get_field(self.bits, STREAM_NAME_OFFSET, STREAM_NAME_WIDTH) as u64
    }

    pub fn set_stream_name(&mut self, stream_name: u64) {
        self.bits = set_field(self.bits, STREAM_NAME_OFFSET, STREAM_NAME_WIDTH, stream_name as u128);
    }

    /// Build a concrete stream-id (or pattern, if `path`/`name` are `None`).
    ///
    /// `None` for `path`/`name` yields the all-ones wildcard for that field.
    /// Fails if `fwd_dst`/`device_id` exceed their 7-bit width, or if a
    /// computed hash is the reserved value zero.
    pub fn generate(fwd_dst: u8, device_id: u8, path: Option<&str>, name: Option<&str>) -> Result<StreamId> {
        if fwd_dst > ANY7 {
            return Err(RouterError::InvalidArgument { reason: format!("fwd_dst {fwd_dst} out of range") });
        }
        if device_id > ANY7 {
            return Err(RouterError::InvalidArgument { reason: format!("device_id {device_id} out of range") });
        }

        let path_hash = match path {
            None => ANY54,
            Some(p) => hash_name(p)?,
        };
        let name_hash = match name {
            None => ANY54,
            Some(n) => hash_name(n)?,
        };

        let mut bits = 0u128;
        bits = set_field(bits, VERSION_OFFSET, VERSION_WIDTH, STREAM_ID_VERSION as u128);
        bits = set_field(bits, FWD_DST_OFFSET, FWD_DST_WIDTH, fwd_dst as u128);
        bits = set_field(bits, DEVICE_ID_OFFSET, DEVICE_ID_WIDTH, device_id as u128);
        bits = set_field(bits, STREAM_PATH_OFFSET, STREAM_PATH_WIDTH, path_hash as u128);
        bits = set_field(bits, STREAM_NAME_OFFSET, STREAM_NAME_WIDTH, name_hash as u128);

        Ok(StreamId { bits })
    }

    /// The all-wildcard pattern: matches any concrete stream-id.
    pub fn any() -> StreamId {
        StreamId::generate(ANY7, ANY7, None, None).expect("wildcard generation cannot fail")
    }

    /// Pattern-match predicate: every wildcard field in `req` (all-ones)
    /// matches any concrete field in `self`; a concrete field in `req` must
    /// equal the corresponding field in `self`.
    ///
    /// Equivalent to the per-32-bit-word masked check, since bitwise AND
    /// does not depend on how the 128 bits are chunked.
    pub fn matches(self, req: StreamId) -> bool {
        (self.bits & req.bits) == self.bits
    }

    /// Overwrite the given fields with their ANY wildcard, used to compute
    /// the router's 16 masked lookup probes.
    fn masked(self, any_fwd_dst: bool, any_device: bool, any_path: bool, any_name: bool) -> StreamId {
        let mut sid = self;
        if any_fwd_dst {
            sid.set_fwd_dst(ANY7);
        }
        if any_device {
            sid.set_device_id(ANY7);
        }
        if any_path {
            sid.set_stream_path(ANY54);
        }
        if any_name {
            sid.set_stream_name(ANY54);
        }
        sid
    }

    /// The full lattice of 16 masks over {fwd_dst, device_id, stream_path,
    /// stream_name} replaced by ANY, in a fixed enumeration order.
    pub fn probes(self) -> [StreamId; 16] {
        let mut out = [StreamId::default(); 16];
        for (i, slot) in out.iter_mut().enumerate() {
            let any_fwd_dst = i & 0b0001 != 0;
            let any_device = i & 0b0010 != 0;
            let any_path = i & 0b0100 != 0;
            let any_name = i & 0b1000 != 0;
            *slot = self.masked(any_fwd_dst, any_device, any_path, any_name);
        }
        out
    }
}

impl std::fmt::Debug for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamId")
            .field("fwd_dst", &self.fwd_dst())
            .field("device_id", &self.device_id())
            .field("stream_path", &format_args!("{:#016x}", self.stream_path()))
            .field("stream_name", &format_args!("{:#016x}", self.stream_name()))
            .finish()
    }
}

/// MurmurHash64A (Austin Appleby), the 64-bit big-endian-agnostic variant
/// used to seed the bloom filter's hash functions.
pub(crate) fn murmur_hash64a(data: &[u8], seed: u64) -> u64 {
    const M: u64 = 0xc6a4a7935bd1e995;
    const R: u32 = 47;

    let mut h: u64 = seed ^ (data.len() as u64).wrapping_mul(M);

    let n_blocks = data.len() / 8;
    for i in 0..n_blocks {
        let mut k = u64::from_le_bytes(data[i * 8..i * 8 + 8].try_into().unwrap());
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = &data[n_blocks * 8..];
    let mut k: u64 = 0;
    for (i, &b) in tail.iter().enumerate().rev() {
        k ^= (b as u64) << (8 * i);
    }
    if !tail.is_empty() {
        h ^= k;
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;
    h
}

/// Insert `s` into a 54-bit-wide bloom filter with 38 hash functions
/// (MurmurHash64A seeded 0..37) and extract the resulting bitmap as a
/// dense 54-bit digest. Zero is a reserved/invalid hash value.
pub fn hash_name(s: &str) -> Result<u64> {
    let bytes = s.as_bytes();
    let mut bitmap: u64 = 0;
    for seed in 0..NUM_HASH_FUNCTIONS {
        let h = murmur_hash64a(bytes, seed) % (HASH_NUMBER_BITS as u64);
        bitmap |= 1u64 << h;
    }
    if bitmap == 0 {
        return Err(RouterError::InvalidArgument { reason: "hash evaluated to reserved value zero".into() });
    }
    Ok(bitmap)
}

/// MurmurHash64A over the stream-id's 16-byte wire representation, seeded
/// 6602834, used as the `RequestTable`'s hash-table hash.
pub fn stream_id_table_hash(sid: StreamId) -> u64 {
    murmur_hash64a(&sid.to_bytes(), 6602834)
}

/// `Hasher` that applies MurmurHash64A (seed 6602834) to the single 16-byte
/// write a `StreamId`'s `Hash` impl performs. Used to key the `RequestTable`
/// the way the hash-table hashing contract in the external interfaces
/// section specifies.
#[derive(Default)]
pub struct StreamIdHasher(u64);

impl std::hash::Hasher for StreamIdHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.0 = murmur_hash64a(bytes, 6602834);
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Default)]
pub struct StreamIdBuildHasher;

impl std::hash::BuildHasher for StreamIdBuildHasher {
    type Hasher = StreamIdHasher;

    fn build_hasher(&self) -> StreamIdHasher {
        StreamIdHasher::default()
    }
}
