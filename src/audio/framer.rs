//! # Audio Framing Buffer
//!
//! Accumulates raw PCM audio bytes arriving over a WebSocket connection and
//! hands out fixed-size chunks sized for the recognition engine's incremental
//! call. Clients fragment audio arbitrarily, so the framer must be
//! fragmentation-invariant: leftover samples are retained for the next input,
//! never dropped and never duplicated.
//!
//! ## Audio Format:
//! - **Encoding**: 16-bit signed PCM, little-endian
//! - **Channels**: Mono (1 channel)
//! - **Normalization**: Samples scaled from [-32768, 32767] to [-1.0, 1.0]
//!
//! ## Chunk Sizing:
//! chunk_size = sample_rate * chunk_duration_ms / 1000. A chunk is only
//! emitted once at least chunk_size samples have accumulated; `drain_all`
//! is the single exception, used at task finish.

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::VecDeque;
use std::io::Cursor;
use tracing::warn;

/// Per-connection accumulator of decoded audio samples.
///
/// ## Ownership:
/// Exclusively owned by one connection's orchestrator; no locking needed.
///
/// ## Side Effects:
/// Tracks the total number of samples ever seen so the connection can report
/// elapsed audio duration in result events. No I/O.
pub struct AudioFramer {
    /// Decoded samples waiting to be framed into chunks
    buffer: VecDeque<f32>,

    /// Sample rate declared by the session (Hz)
    sample_rate: u32,

    /// Number of samples per emitted chunk
    chunk_size: usize,

    /// Total samples seen since creation or the last reset
    total_samples: u64,
}

impl AudioFramer {
    /// Create a framer for the given sample rate and chunk duration.
    ///
    /// ## Example:
    /// At 16kHz with 100ms chunks: 16000 * 100 / 1000 = 1600 samples per chunk.
    pub fn new(sample_rate: u32, chunk_duration_ms: u32) -> Self {
        let chunk_size = (sample_rate as usize * chunk_duration_ms as usize) / 1000;

        Self {
            buffer: VecDeque::with_capacity(chunk_size * 2),
            sample_rate,
            chunk_size,
            total_samples: 0,
        }
    }

    /// Decode a raw byte block and append the samples to the buffer.
    ///
    /// ## Returns:
    /// The decoded samples from this block (normalized f32). A malformed
    /// block (odd byte count) is logged and yields no samples at all;
    /// decode problems never surface to the caller.
    pub fn add_audio(&mut self, data: &[u8]) -> Vec<f32> {
        if data.is_empty() {
            return Vec::new();
        }
        if data.len() % 2 != 0 {
            warn!(
                bytes = data.len(),
                "Audio data length is odd for 16-bit PCM, discarding block"
            );
            return Vec::new();
        }

        let mut cursor = Cursor::new(data);
        let mut samples = Vec::with_capacity(data.len() / 2);

        // Read each 16-bit sample (little-endian) and normalize to [-1.0, 1.0]
        while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
            samples.push(sample as f32 / 32768.0);
        }

        self.buffer.extend(samples.iter().copied());
        self.total_samples += samples.len() as u64;

        samples
    }

    /// Take the next complete chunk, if one has accumulated.
    ///
    /// ## Contract:
    /// Returns exactly `chunk_size` samples or `None`; the caller polls again
    /// after more audio arrives. This is a non-blocking best-effort drain,
    /// not a timed wait.
    pub fn next_chunk(&mut self) -> Option<Vec<f32>> {
        if self.buffer.len() < self.chunk_size {
            return None;
        }

        Some(self.buffer.drain(..self.chunk_size).collect())
    }

    /// Empty the buffer and return everything, regardless of length.
    ///
    /// Used only when a task finishes and trailing audio must be flushed
    /// through the engine's finalize call.
    pub fn drain_all(&mut self) -> Vec<f32> {
        self.buffer.drain(..).collect()
    }

    /// Clear buffered samples and running duration counters.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.total_samples = 0;
    }

    /// Number of samples currently buffered (not yet emitted as chunks).
    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Samples per emitted chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total audio duration seen since creation or the last reset.
    pub fn duration_ms(&self) -> u64 {
        self.total_samples * 1000 / self.sample_rate as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a little-endian PCM byte block from i16 samples.
    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_normalizes_to_unit_range() {
        let mut framer = AudioFramer::new(16000, 100);
        let decoded = framer.add_audio(&pcm_bytes(&[0, 16384, -32768, 32767]));

        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[0], 0.0);
        assert_eq!(decoded[1], 0.5);
        assert_eq!(decoded[2], -1.0);
        assert!(decoded[3] < 1.0 && decoded[3] > 0.999);
    }

    #[test]
    fn test_chunk_only_emitted_when_full() {
        // 10ms chunks at 1kHz = 10 samples per chunk
        let mut framer = AudioFramer::new(1000, 10);

        framer.add_audio(&pcm_bytes(&[1; 9]));
        assert!(framer.next_chunk().is_none());

        framer.add_audio(&pcm_bytes(&[1; 1]));
        let chunk = framer.next_chunk().expect("chunk should be ready");
        assert_eq!(chunk.len(), 10);
        assert!(framer.next_chunk().is_none());
    }

    #[test]
    fn test_framing_is_fragmentation_invariant() {
        let samples: Vec<i16> = (0..100).map(|i| (i * 7) as i16).collect();
        let bytes = pcm_bytes(&samples);

        // Whole input at once
        let mut whole = AudioFramer::new(1000, 10);
        whole.add_audio(&bytes);
        let mut whole_chunks = Vec::new();
        while let Some(chunk) = whole.next_chunk() {
            whole_chunks.extend(chunk);
        }

        // Same input split at awkward boundaries (including odd offsets
        // within the byte stream are not valid PCM frames, so split on
        // sample boundaries of varying sizes)
        let mut split = AudioFramer::new(1000, 10);
        let mut split_chunks = Vec::new();
        for fragment in bytes.chunks(6) {
            split.add_audio(fragment);
            while let Some(chunk) = split.next_chunk() {
                split_chunks.extend(chunk);
            }
        }

        assert_eq!(whole_chunks, split_chunks);
        assert_eq!(whole_chunks.len(), 100);
    }

    #[test]
    fn test_leftover_samples_survive_into_next_chunk() {
        let mut framer = AudioFramer::new(1000, 10);

        framer.add_audio(&pcm_bytes(&[5; 15]));
        assert!(framer.next_chunk().is_some());
        assert_eq!(framer.buffered_samples(), 5);

        framer.add_audio(&pcm_bytes(&[5; 5]));
        let chunk = framer.next_chunk().expect("leftover plus new data");
        assert_eq!(chunk.len(), 10);
    }

    #[test]
    fn test_drain_all_returns_partial_chunk() {
        let mut framer = AudioFramer::new(1000, 10);
        framer.add_audio(&pcm_bytes(&[3; 7]));

        assert!(framer.next_chunk().is_none());
        assert_eq!(framer.drain_all().len(), 7);
        assert_eq!(framer.buffered_samples(), 0);
    }

    #[test]
    fn test_odd_byte_count_discards_block() {
        let mut framer = AudioFramer::new(1000, 10);
        let mut bytes = pcm_bytes(&[1, 2, 3]);
        bytes.push(0xAB);

        let decoded = framer.add_audio(&bytes);
        assert!(decoded.is_empty());
        assert_eq!(framer.buffered_samples(), 0);
        assert_eq!(framer.duration_ms(), 0);
    }

    #[test]
    fn test_duration_tracks_all_samples_seen() {
        let mut framer = AudioFramer::new(1000, 10);
        framer.add_audio(&pcm_bytes(&[0; 250]));
        assert_eq!(framer.duration_ms(), 250);

        // Emitting chunks does not reduce the reported duration
        while framer.next_chunk().is_some() {}
        assert_eq!(framer.duration_ms(), 250);

        framer.reset();
        assert_eq!(framer.duration_ms(), 0);
    }
}
