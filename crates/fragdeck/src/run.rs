use std::path::PathBuf;

use anyhow::Result;
use capture::CaptureFormat;
use renderer::{ExportSettings, ShaderSource, ViewerConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::defaults::DEFAULT_FRAGMENT_SOURCE;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let surface_size = parse_surface_size(&cli.size)?;

    let shader = match cli.shader {
        Some(path) => {
            tracing::info!(path = %path.display(), "previewing shader from file");
            ShaderSource::File(path)
        }
        None => {
            tracing::info!("no shader supplied; previewing the built-in demo shader");
            ShaderSource::Inline(DEFAULT_FRAGMENT_SOURCE.to_string())
        }
    };

    let output = cli.output.unwrap_or_else(|| default_output(cli.format));
    let config = ViewerConfig {
        surface_size,
        shader,
        export: ExportSettings {
            frame_rate: cli.fps,
            start_time: cli.start,
            duration: cli.duration,
            format: cli.format,
            output,
            verbose: cli.verbose_capture,
        },
    };

    renderer::run(config)
}

fn default_output(format: CaptureFormat) -> PathBuf {
    if format.is_sequence() {
        PathBuf::from("frames")
    } else {
        PathBuf::from("export.gif")
    }
}

pub(crate) fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow::anyhow!("expected WxH format, e.g. 1280x720"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        anyhow::bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_sizes_parse_in_both_cases() {
        assert_eq!(parse_surface_size("1280x720").expect("parse"), (1280, 720));
        assert_eq!(parse_surface_size(" 640X480 ").expect("parse"), (640, 480));
    }

    #[test]
    fn malformed_surface_sizes_are_rejected() {
        assert!(parse_surface_size("1280").is_err());
        assert!(parse_surface_size("0x720").is_err());
        assert!(parse_surface_size("widextall").is_err());
    }

    #[test]
    fn sequence_formats_default_to_a_directory() {
        assert_eq!(
            default_output(CaptureFormat::PngSequence),
            PathBuf::from("frames")
        );
        assert_eq!(
            default_output(CaptureFormat::JpegSequence),
            PathBuf::from("frames")
        );
        assert_eq!(default_output(CaptureFormat::Gif), PathBuf::from("export.gif"));
    }
}
