use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};
use thiserror::Error;

use crate::frame::CapturedFrame;
use crate::{CaptureConfig, CaptureFormat};

/// Failures raised by the capture collaborator. The render loop does not
/// retry any of them; a failed frame ends the export run.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("recorder cannot {action} while {state}")]
    State {
        action: &'static str,
        state: &'static str,
    },
    #[error("frame {index} is {actual} bytes; {width}x{height} RGBA needs {expected}")]
    FrameSize {
        index: u32,
        width: u32,
        height: u32,
        actual: usize,
        expected: usize,
    },
    #[error("failed to prepare capture output at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode frame {index}")]
    Encode {
        index: u32,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecorderState {
    Armed,
    Recording,
    Stopped,
    Saved,
}

impl RecorderState {
    fn name(self) -> &'static str {
        match self {
            RecorderState::Armed => "armed",
            RecorderState::Recording => "recording",
            RecorderState::Stopped => "stopped",
            RecorderState::Saved => "saved",
        }
    }
}

/// Encodes a sequence of rendered frames into the configured output.
///
/// The caller drives the collaborator through exactly one
/// `start -> capture* -> stop -> save` cycle per export run. Sequence formats
/// stream each frame to disk as it arrives; GIF streams frames into a single
/// file whose trailer is written on [`Recorder::save`].
pub struct Recorder {
    config: CaptureConfig,
    state: RecorderState,
    frames_written: u32,
    gif: Option<GifEncoder<BufWriter<File>>>,
}

impl Recorder {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            state: RecorderState::Armed,
            frames_written: 0,
            gif: None,
        }
    }

    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }

    /// Prepares the output location and begins accepting frames.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.expect_state(RecorderState::Armed, "start")?;

        match self.config.format {
            CaptureFormat::PngSequence | CaptureFormat::JpegSequence => {
                fs::create_dir_all(&self.config.output).map_err(|source| CaptureError::Io {
                    path: self.config.output.clone(),
                    source,
                })?;
            }
            CaptureFormat::Gif => {
                if let Some(parent) = self.config.output.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent).map_err(|source| CaptureError::Io {
                            path: parent.to_path_buf(),
                            source,
                        })?;
                    }
                }
                let file =
                    File::create(&self.config.output).map_err(|source| CaptureError::Io {
                        path: self.config.output.clone(),
                        source,
                    })?;
                let mut encoder = GifEncoder::new(BufWriter::new(file));
                encoder
                    .set_repeat(Repeat::Infinite)
                    .map_err(|source| CaptureError::Encode { index: 0, source })?;
                self.gif = Some(encoder);
            }
        }

        tracing::debug!(
            format = %self.config.format,
            output = %self.config.output.display(),
            frame_rate = self.config.frame_rate,
            "capture started"
        );
        self.state = RecorderState::Recording;
        Ok(())
    }

    /// Encodes one frame. Frames must arrive in sequence order.
    pub fn capture(&mut self, frame: &CapturedFrame) -> Result<(), CaptureError> {
        self.expect_state(RecorderState::Recording, "capture")?;

        let expected = frame.expected_len();
        if frame.data.len() != expected {
            return Err(CaptureError::FrameSize {
                index: frame.frame_index,
                width: frame.width,
                height: frame.height,
                actual: frame.data.len(),
                expected,
            });
        }

        match self.config.format {
            CaptureFormat::PngSequence => {
                let path = self.frame_path(frame.frame_index);
                image::save_buffer(
                    &path,
                    &frame.data,
                    frame.width,
                    frame.height,
                    image::ExtendedColorType::Rgba8,
                )
                .map_err(|source| CaptureError::Encode {
                    index: frame.frame_index,
                    source,
                })?;
            }
            CaptureFormat::JpegSequence => {
                // JPEG has no alpha channel; drop it.
                let rgb: Vec<u8> = frame
                    .data
                    .chunks_exact(4)
                    .flat_map(|px| [px[0], px[1], px[2]])
                    .collect();
                let path = self.frame_path(frame.frame_index);
                image::save_buffer(
                    &path,
                    &rgb,
                    frame.width,
                    frame.height,
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(|source| CaptureError::Encode {
                    index: frame.frame_index,
                    source,
                })?;
            }
            CaptureFormat::Gif => {
                let encoder = self.gif.as_mut().expect("gif encoder exists while recording");
                let buffer = RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
                    .expect("length checked above");
                let delay = Delay::from_numer_denom_ms(1000, self.config.frame_rate.max(1));
                encoder
                    .encode_frame(Frame::from_parts(buffer, 0, 0, delay))
                    .map_err(|source| CaptureError::Encode {
                        index: frame.frame_index,
                        source,
                    })?;
            }
        }

        self.frames_written += 1;
        if self.config.verbose {
            tracing::info!(frame = frame.frame_index, "captured frame");
        } else {
            tracing::trace!(frame = frame.frame_index, "captured frame");
        }
        Ok(())
    }

    /// Stops accepting frames.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        self.expect_state(RecorderState::Recording, "stop")?;
        self.state = RecorderState::Stopped;
        Ok(())
    }

    /// Finalizes the output and returns its location.
    pub fn save(&mut self) -> Result<PathBuf, CaptureError> {
        self.expect_state(RecorderState::Stopped, "save")?;
        // Dropping the encoder writes the GIF trailer and flushes the file.
        self.gif = None;
        self.state = RecorderState::Saved;
        tracing::info!(
            frames = self.frames_written,
            output = %self.config.output.display(),
            "capture saved"
        );
        Ok(self.config.output.clone())
    }

    fn frame_path(&self, frame_index: u32) -> PathBuf {
        self.config.output.join(format!(
            "frame_{frame_index:06}.{}",
            self.config.format.frame_extension()
        ))
    }

    fn expect_state(
        &self,
        expected: RecorderState,
        action: &'static str,
    ) -> Result<(), CaptureError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CaptureError::State {
                action,
                state: self.state.name(),
            })
        }
    }
}
