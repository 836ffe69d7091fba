use std::path::PathBuf;

use capture::CaptureFormat;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "fragdeck",
    author,
    version,
    about = "Live fragment-shader preview and frame-sequence exporter",
    arg_required_else_help = false
)]
pub struct Cli {
    /// Fragment shader to preview: WebGL-style GLSL using the `time`,
    /// `mouse`, and `resolution` uniforms. Re-read from disk on every
    /// apply/reset (R) or export (E). Falls back to the built-in demo shader
    /// when omitted.
    #[arg(value_name = "SHADER")]
    pub shader: Option<PathBuf>,

    /// Initial surface resolution (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", default_value = "512x512")]
    pub size: String,

    /// Export frame rate in frames per second.
    #[arg(long, value_name = "FPS", default_value_t = 30, value_parser = parse_frame_rate)]
    pub fps: u32,

    /// Shader time at which the exported sequence starts (seconds).
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    pub start: f32,

    /// Length of the exported sequence (seconds).
    #[arg(long, value_name = "SECONDS", default_value_t = 3.0)]
    pub duration: f32,

    /// Capture container: `png`, `jpeg`, or `gif`.
    #[arg(long, value_name = "FORMAT", default_value = "png", value_parser = parse_format)]
    pub format: CaptureFormat,

    /// Output location: a directory for frame sequences, a file path for GIF.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Log every captured frame during an export run.
    #[arg(long)]
    pub verbose_capture: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

fn parse_frame_rate(value: &str) -> Result<u32, String> {
    let fps: u32 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a whole number"))?;
    if fps == 0 {
        return Err("frame rate must be greater than zero".to_string());
    }
    Ok(fps)
}

fn parse_format(value: &str) -> Result<CaptureFormat, String> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_frame_rates_are_rejected_at_the_boundary() {
        assert!(parse_frame_rate("0").is_err());
        assert!(parse_frame_rate("-5").is_err());
        assert!(parse_frame_rate("abc").is_err());
        assert_eq!(parse_frame_rate("60"), Ok(60));
    }

    #[test]
    fn formats_parse_through_the_capture_crate() {
        assert_eq!(parse_format("gif"), Ok(CaptureFormat::Gif));
        assert!(parse_format("webm").is_err());
    }

    #[test]
    fn defaults_cover_a_short_export() {
        let cli = Cli::parse_from(["fragdeck"]);
        assert_eq!(cli.fps, 30);
        assert_eq!(cli.duration, 3.0);
        assert_eq!(cli.start, 0.0);
        assert_eq!(cli.format, CaptureFormat::PngSequence);
        assert!(cli.shader.is_none());
    }
}
