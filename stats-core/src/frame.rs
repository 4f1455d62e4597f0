use bytes::{Bytes, BytesMut};

/// Size threshold under which a new line is coalesced into the current tail
/// frame rather than starting a fresh one (`spec.md` §4.3).
pub const TAIL_COALESCE_LIMIT: usize = 4000;

/// Capacity of a freshly allocated frame.
pub const FRAME_CAPACITY: usize = 4096;

/// Soft cap: terminate a subscriber whose queue exceeds this *and* whose
/// connection is older than [`SLOW_CONSUMER_AGE_SECS`].
pub const SOFT_CAP_BYTES: usize = 2_000_000;

/// Hard cap: terminate a subscriber whose queue exceeds this regardless of age.
pub const HARD_CAP_BYTES: usize = 6_000_000;

/// Connection age, in seconds, past which the soft cap applies.
pub const SLOW_CONSUMER_AGE_SECS: i64 = 60;

/// Number of frames drained in one send pass.
pub const DRAIN_MAX_FRAMES: usize = 14;

/// Approximate byte budget drained in one send pass.
pub const DRAIN_MAX_BYTES: usize = 50 * 1024;

/// One buffer in a subscriber's outbound queue.
///
/// `sealed` marks a frame ineligible for further appends — set on the HTTP
/// response header frame built during registration (`spec.md` §4.4), the
/// Rust counterpart of the original's `STATS_BLOCK_CONNECTION` refbuf flag.
#[derive(Debug)]
pub struct Frame {
    buf: BytesMut,
    sealed: bool,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(FRAME_CAPACITY),
            sealed: false,
        }
    }

    pub fn sealed(text: &str) -> Self {
        let mut buf = BytesMut::with_capacity(text.len());
        buf.extend_from_slice(text.as_bytes());
        Self { buf, sealed: true }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn can_append(&self, additional: usize) -> bool {
        !self.sealed && self.buf.len() + additional < TAIL_COALESCE_LIMIT
    }

    pub fn append(&mut self, text: &str) {
        self.buf.extend_from_slice(text.as_bytes());
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}
