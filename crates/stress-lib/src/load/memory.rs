//! Memory buffer grown in fixed-size chunks of filler
//!
//! The buffer only ever grows toward its target or is dropped entirely;
//! there is no in-place shrinking.

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Size of each allocation step
pub const CHUNK_BYTES: usize = 350 * 1024;

const BYTES_PER_MB: usize = 1024 * 1024;

pub struct MemoryBuffer {
    chunks: Vec<Box<[u8]>>,
    rng: StdRng,
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Number of chunks needed to cover `target_mb`
    pub fn chunks_for(target_mb: i32) -> usize {
        let target_bytes = target_mb.max(0) as usize * BYTES_PER_MB;
        target_bytes.div_ceil(CHUNK_BYTES)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn len_bytes(&self) -> usize {
        self.chunks.len() * CHUNK_BYTES
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn needs_growth(&self, target_mb: i32) -> bool {
        self.chunks.len() < Self::chunks_for(target_mb)
    }

    /// True when the buffer holds more than the target requires
    pub fn overshoots(&self, target_mb: i32) -> bool {
        self.chunks.len() > Self::chunks_for(target_mb)
    }

    /// Append one chunk of random alphanumeric filler
    pub fn grow_chunk(&mut self) {
        let chunk: Vec<u8> = (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(CHUNK_BYTES)
            .collect();
        self.chunks.push(chunk.into_boxed_slice());
    }

    /// Release everything, including the chunk list's capacity
    pub fn clear(&mut self) {
        self.chunks = Vec::new();
    }
}

/// Ask the allocator to hand freed pages back to the OS.
///
/// Best effort: only glibc exposes this.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub fn compact_heap() {
    // SAFETY: malloc_trim has no preconditions and only touches allocator state.
    unsafe {
        libc::malloc_trim(0);
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub fn compact_heap() {}
