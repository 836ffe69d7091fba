use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use capture::{CaptureConfig, CaptureFormat};
use director::ExportPlan;

/// Where the fragment-shader text comes from.
///
/// The text is re-read on demand every time an action needs it, so edits made
/// between actions are picked up without any watcher machinery. The core
/// never inspects the text beyond attempting to compile it.
#[derive(Debug, Clone)]
pub enum ShaderSource {
    /// Re-read from disk on every apply/reset or export action.
    File(PathBuf),
    /// Fixed in-memory source (the embedded default shader).
    Inline(String),
}

impl ShaderSource {
    /// Current shader text.
    pub fn fetch(&self) -> Result<String> {
        match self {
            ShaderSource::File(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read shader at {}", path.display())),
            ShaderSource::Inline(text) => Ok(text.clone()),
        }
    }

    /// Human-readable origin for log lines.
    pub fn describe(&self) -> String {
        match self {
            ShaderSource::File(path) => path.display().to_string(),
            ShaderSource::Inline(_) => "<built-in>".to_string(),
        }
    }
}

/// Export-configuration inputs, read synchronously each time the export
/// action fires. Values are treated as already parsed; a zero frame rate is a
/// caller contract violation handled at the CLI boundary, not here.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub frame_rate: u32,
    pub start_time: f32,
    pub duration: f32,
    pub format: CaptureFormat,
    /// Directory for sequence formats; file path for GIF.
    pub output: PathBuf,
    pub verbose: bool,
}

impl ExportSettings {
    pub(crate) fn plan(&self) -> ExportPlan {
        ExportPlan {
            frame_rate: self.frame_rate,
            start_time: self.start_time,
            duration: self.duration,
        }
    }

    pub(crate) fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            format: self.format,
            frame_rate: self.frame_rate,
            verbose: self.verbose,
            output: self.output.clone(),
        }
    }
}

/// Immutable configuration handed to the renderer at start-up.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Initial surface size in physical pixels.
    pub surface_size: (u32, u32),
    /// Fragment shader the preview starts with.
    pub shader: ShaderSource,
    /// Export parameters applied when the export action fires.
    pub export: ExportSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_sources_fetch_their_text() {
        let source = ShaderSource::Inline("void main(void) {}".into());
        assert_eq!(source.fetch().expect("fetch"), "void main(void) {}");
        assert_eq!(source.describe(), "<built-in>");
    }

    #[test]
    fn missing_files_surface_the_path() {
        let source = ShaderSource::File(PathBuf::from("/definitely/not/here.frag"));
        let err = source.fetch().unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.frag"));
    }

    #[test]
    fn settings_expand_into_plan_and_capture_config() {
        let settings = ExportSettings {
            frame_rate: 24,
            start_time: 1.0,
            duration: 2.5,
            format: CaptureFormat::Gif,
            output: PathBuf::from("out.gif"),
            verbose: true,
        };
        let plan = settings.plan();
        assert_eq!(plan.frame_rate, 24);
        assert_eq!(plan.start_time, 1.0);
        assert_eq!(plan.duration, 2.5);
        let capture = settings.capture_config();
        assert_eq!(capture.frame_rate, 24);
        assert!(capture.verbose);
        assert_eq!(capture.output, PathBuf::from("out.gif"));
    }
}
