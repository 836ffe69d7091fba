//! Frame-capture collaborator for fragdeck.
//!
//! The renderer hands over one [`CapturedFrame`] per exported tick; the
//! [`Recorder`] encodes the sequence into the configured container. The
//! collaborator surface is intentionally narrow: `start()` once, `capture()`
//! once per frame, then `stop()` followed by `save()` exactly once.

mod frame;
mod recorder;

pub use frame::CapturedFrame;
pub use recorder::{CaptureError, Recorder};

use std::path::PathBuf;
use std::str::FromStr;

/// Output container for an export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    /// One PNG file per frame inside the output directory.
    PngSequence,
    /// One JPEG file per frame inside the output directory.
    JpegSequence,
    /// A single looping animated GIF at the output path.
    Gif,
}

impl CaptureFormat {
    /// Whether the output is a directory of per-frame files.
    pub fn is_sequence(self) -> bool {
        matches!(self, CaptureFormat::PngSequence | CaptureFormat::JpegSequence)
    }

    /// File extension used for per-frame files.
    pub fn frame_extension(self) -> &'static str {
        match self {
            CaptureFormat::PngSequence => "png",
            CaptureFormat::JpegSequence => "jpg",
            CaptureFormat::Gif => "gif",
        }
    }
}

impl FromStr for CaptureFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "png" => Ok(CaptureFormat::PngSequence),
            "jpeg" | "jpg" => Ok(CaptureFormat::JpegSequence),
            "gif" => Ok(CaptureFormat::Gif),
            other => Err(format!(
                "unknown capture format `{other}` (expected png, jpeg, or gif)"
            )),
        }
    }
}

impl std::fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureFormat::PngSequence => f.write_str("png"),
            CaptureFormat::JpegSequence => f.write_str("jpeg"),
            CaptureFormat::Gif => f.write_str("gif"),
        }
    }
}

/// Recorder configuration, fixed for the lifetime of one export run.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub format: CaptureFormat,
    /// Playback rate the sequence is encoded for (frames per second).
    pub frame_rate: u32,
    /// Log each captured frame at info level instead of trace.
    pub verbose: bool,
    /// Directory for sequence formats; file path for GIF.
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_parse_from_user_input() {
        assert_eq!("png".parse(), Ok(CaptureFormat::PngSequence));
        assert_eq!("JPEG".parse(), Ok(CaptureFormat::JpegSequence));
        assert_eq!("jpg".parse(), Ok(CaptureFormat::JpegSequence));
        assert_eq!("gif".parse(), Ok(CaptureFormat::Gif));
        assert!("webm".parse::<CaptureFormat>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for format in [
            CaptureFormat::PngSequence,
            CaptureFormat::JpegSequence,
            CaptureFormat::Gif,
        ] {
            assert_eq!(format.to_string().parse(), Ok(format));
        }
    }

    #[test]
    fn sequence_formats_are_flagged() {
        assert!(CaptureFormat::PngSequence.is_sequence());
        assert!(CaptureFormat::JpegSequence.is_sequence());
        assert!(!CaptureFormat::Gif.is_sequence());
    }
}
