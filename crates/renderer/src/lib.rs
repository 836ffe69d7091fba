//! Renderer crate for fragdeck.
//!
//! Glues the preview window, the `wgpu` quad pipeline, and the mode
//! controller together. The overall flow is:
//!
//! ```text
//!   CLI / fragdeck
//!          │ ViewerConfig
//!          ▼
//!   window::run ──▶ ViewerState ──▶ winit event loop ──▶ Director::fire()
//!          ▲                                   │
//!          │                  Tick::Preview ───┤──▶ draw to surface
//!          │                  Tick::Export ────┘──▶ draw offscreen ─▶ capture
//! ```
//!
//! `ViewerState` owns every live resource (surface, device, quad geometry,
//! the current shader program); the `director` crate decides which loop is
//! active and when ticks fire. User fragment shaders are wrapped at runtime
//! so WebGL-style GLSL compiles as Vulkan GLSL against our uniform block.

mod compile;
mod context;
mod export;
mod geometry;
mod pipeline;
mod types;
mod uniforms;
mod window;

pub use compile::{validate_fragment_source, ShaderError, ShaderStageKind};
pub use types::{ExportSettings, ShaderSource, ViewerConfig};
pub use window::run;
