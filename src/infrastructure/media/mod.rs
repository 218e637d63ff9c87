//! FFmpeg/FFprobe subprocess wrappers and encoding parameter selection.

pub mod encoding;
pub mod error;
pub mod ffmpeg;
pub mod probe;
pub mod toolkit;
