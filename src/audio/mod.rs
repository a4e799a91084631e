//! # Audio Processing Module
//!
//! Handles the audio half of the duplex WebSocket protocol: raw binary frames
//! of 16-bit little-endian PCM are decoded and accumulated into fixed-size
//! chunks sized for the recognition engine's incremental call.
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: declared per session (16kHz default)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers

pub mod framer; // Fixed-size chunking buffer for incremental recognition

pub use framer::AudioFramer;
