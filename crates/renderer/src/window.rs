use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use capture::Recorder;
use director::{
    Director, FrameScheduler, Mode, SystemTimeSource, Tick, TickHandle,
};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::context::GpuContext;
use crate::export::ExportTarget;
use crate::geometry::QuadGeometry;
use crate::pipeline::{PipelineLayouts, ShaderProgram, UniformBinding};
use crate::types::ViewerConfig;
use crate::uniforms::QuadUniforms;

/// Opens the preview window and drives the event loop until the user quits.
///
/// Keys: `R` applies the current shader text, `E` starts an export run,
/// `Esc` quits. Resizing the window resizes the surface and takes the same
/// reset transition as `R`.
pub fn run(config: ViewerConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title("fragdeck")
        .with_inner_size(window_size)
        .build(&event_loop)
        .context("failed to create preview window")?;
    let window = Arc::new(window);

    let mut state = ViewerState::new(window.clone(), config)?;
    state.start()?;

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Wait);

            match event {
                Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
                    match event {
                        WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                            elwt.exit();
                        }
                        WindowEvent::Resized(new_size) => {
                            state.handle_resize(new_size);
                        }
                        WindowEvent::ScaleFactorChanged {
                            mut inner_size_writer,
                            ..
                        } => {
                            // Keep the current logical size when the scale factor changes.
                            let _ = inner_size_writer.request_inner_size(state.size());
                        }
                        WindowEvent::KeyboardInput { event, .. } => {
                            state.handle_key(event, elwt);
                        }
                        WindowEvent::RedrawRequested => {
                            state.handle_redraw(elwt);
                        }
                        _ => {}
                    }
                }
                Event::AboutToWait => {
                    state.pump();
                }
                _ => {}
            }
        })
        .map_err(|err| anyhow!("event loop error: {err}"))
}

/// Frame scheduler backed by winit redraw requests.
///
/// `request_redraw` cannot be revoked once issued, so cancellation is tracked
/// by handle: a redraw whose handle no longer matches the live one is dropped
/// before it reaches the director.
struct RedrawScheduler {
    window: Arc<Window>,
    next_handle: u64,
    live: Option<TickHandle>,
}

impl RedrawScheduler {
    fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            next_handle: 0,
            live: None,
        }
    }

    fn live(&self) -> Option<TickHandle> {
        self.live
    }
}

impl FrameScheduler for RedrawScheduler {
    fn schedule_next(&mut self) -> TickHandle {
        let handle = TickHandle::new(self.next_handle);
        self.next_handle += 1;
        self.live = Some(handle);
        self.window.request_redraw();
        handle
    }

    fn cancel(&mut self, handle: TickHandle) {
        if self.live == Some(handle) {
            self.live = None;
        }
    }
}

/// The session object owning every live resource: window, GPU context, quad
/// geometry, the current program, and the mode controller. All state lives
/// here and is threaded explicitly through each operation.
struct ViewerState {
    window: Arc<Window>,
    gpu: GpuContext,
    layouts: PipelineLayouts,
    geometry: QuadGeometry,
    uniforms: QuadUniforms,
    binding: UniformBinding,
    program: Option<ShaderProgram>,
    export_target: Option<ExportTarget>,
    recorder: Option<Recorder>,
    director: Director<RedrawScheduler, SystemTimeSource>,
    config: ViewerConfig,
}

impl ViewerState {
    fn new(window: Arc<Window>, config: ViewerConfig) -> Result<Self> {
        let size = window.inner_size();
        let gpu = GpuContext::new(window.as_ref(), size)?;
        let layouts = PipelineLayouts::new(&gpu.device)?;
        let geometry = QuadGeometry::new(&gpu.device);
        let uniforms = QuadUniforms::new(gpu.size().width, gpu.size().height);
        let binding = UniformBinding::new(&gpu.device, &layouts, &uniforms);
        let director = Director::new(
            RedrawScheduler::new(window.clone()),
            SystemTimeSource::new(),
        );

        Ok(Self {
            window,
            gpu,
            layouts,
            geometry,
            uniforms,
            binding,
            program: None,
            export_target: None,
            recorder: None,
            director,
            config,
        })
    }

    fn window(&self) -> &Window {
        self.window.as_ref()
    }

    fn size(&self) -> PhysicalSize<u32> {
        self.gpu.size()
    }

    /// Compiles the startup shader and enters continuous preview. A shader
    /// that fails at startup is fatal; later failures only abort their cycle.
    fn start(&mut self) -> Result<()> {
        self.rebuild_program().with_context(|| {
            format!(
                "startup shader {} was rejected",
                self.config.shader.describe()
            )
        })?;
        self.director.start();
        Ok(())
    }

    /// Builds a fresh program from the current shader text and installs it.
    /// The superseded pipeline is dropped here, which releases its GPU
    /// objects.
    fn rebuild_program(&mut self) -> Result<()> {
        let source = self.config.shader.fetch()?;
        let program = ShaderProgram::new(
            &self.gpu.device,
            &self.layouts,
            self.gpu.surface_format,
            &source,
        )?;
        drop(self.program.replace(program));
        Ok(())
    }

    /// The apply/reset transition: cancel the outstanding tick, rebuild from
    /// the current text, restart the preview clock. On failure the canceled
    /// tick stays canceled and the prior program remains installed.
    fn apply_reset(&mut self) {
        self.director.interrupt();
        match self.rebuild_program() {
            Ok(()) => self.director.resume_preview(),
            Err(err) => {
                tracing::error!("shader update rejected; press R to retry:\n{err:#}");
            }
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        self.gpu.resize(new_size);
        let size = self.gpu.size();
        self.uniforms
            .set_resolution(size.width as f32, size.height as f32);
        match self.director.mode() {
            Mode::Exporting => {
                // The run keeps the dimensions it started with; the export
                // target is only rebuilt for the next run.
                tracing::warn!(
                    width = size.width,
                    height = size.height,
                    "surface resized during export; capture keeps its original dimensions"
                );
            }
            _ => self.apply_reset(),
        }
    }

    fn handle_key(&mut self, event: KeyEvent, elwt: &EventLoopWindowTarget<()>) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match event.logical_key.as_ref() {
            Key::Character("r") | Key::Character("R") => {
                tracing::info!(shader = %self.config.shader.describe(), "apply/reset requested");
                self.apply_reset();
            }
            Key::Character("e") | Key::Character("E") => {
                tracing::info!("export requested");
                self.begin_export();
            }
            Key::Named(NamedKey::Escape) => {
                elwt.exit();
            }
            _ => {}
        }
    }

    /// The preview-to-export transition: cancel, rebuild a fresh program from
    /// the current text, read the export configuration, start the capture
    /// collaborator, and begin the bounded tick sequence.
    fn begin_export(&mut self) {
        self.director.interrupt();
        if let Err(err) = self.rebuild_program() {
            tracing::error!("export aborted; shader failed to build:\n{err:#}");
            return;
        }

        let settings = self.config.export.clone();
        let mut recorder = Recorder::new(settings.capture_config());
        if let Err(err) = recorder.start() {
            tracing::error!("export aborted; capture collaborator failed to start:\n{err:#}");
            return;
        }

        let size = self.gpu.size();
        let format = self.gpu.surface_format;
        let stale = self
            .export_target
            .as_ref()
            .map_or(true, |target| !target.matches(size, format));
        if stale {
            self.export_target = Some(ExportTarget::new(&self.gpu.device, size, format));
        }

        let plan = settings.plan();
        tracing::info!(
            frame_rate = plan.frame_rate,
            start_time = plan.start_time,
            duration = plan.duration,
            frames = plan.total_frames(),
            format = %settings.format,
            output = %settings.output.display(),
            "starting export run"
        );
        self.recorder = Some(recorder);
        self.director.begin_export(plan);
    }

    /// Keeps redraw callbacks flowing while a tick is outstanding; some
    /// platforms coalesce or drop redraw requests issued mid-event.
    fn pump(&mut self) {
        if self.director.is_scheduled() {
            self.window.request_redraw();
        }
    }

    fn handle_redraw(&mut self, elwt: &EventLoopWindowTarget<()>) {
        let Some(handle) = self.director.scheduler().live() else {
            return;
        };
        let Some(tick) = self.director.fire(handle) else {
            return;
        };
        match tick {
            Tick::Preview { time } => self.render_preview(time, elwt),
            Tick::Export {
                time,
                frame_index,
                last,
            } => self.render_export(time, frame_index, last, elwt),
        }
    }

    fn render_preview(&mut self, time: f32, elwt: &EventLoopWindowTarget<()>) {
        let size = self.gpu.size();
        self.uniforms
            .set_resolution(size.width as f32, size.height as f32);
        self.uniforms.set_time(time);
        self.binding.upload(&self.gpu.queue, &self.uniforms);
        self.present(elwt);
    }

    fn render_export(
        &mut self,
        time: f32,
        frame_index: u32,
        last: bool,
        elwt: &EventLoopWindowTarget<()>,
    ) {
        if let Err(err) = self.capture_frame(time, frame_index) {
            tracing::error!("export failed at frame {frame_index}:\n{err:#}");
            self.abandon_export();
            return;
        }

        // Mirror the exported frame onto the window so progress stays visible.
        self.present(elwt);

        if last {
            self.finish_export();
        }
    }

    /// Renders one export frame offscreen, waits for the GPU to finish, and
    /// hands the raster to the capture collaborator.
    fn capture_frame(&mut self, time: f32, frame_index: u32) -> Result<()> {
        let target = self
            .export_target
            .as_ref()
            .ok_or_else(|| anyhow!("export target missing"))?;
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| anyhow!("no active program for export"))?;

        let size = target.size();
        self.uniforms
            .set_resolution(size.width as f32, size.height as f32);
        self.uniforms.set_time(time);
        self.binding.upload(&self.gpu.queue, &self.uniforms);

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("export encoder"),
            });
        encode_quad_pass(
            &mut encoder,
            &target.view,
            program,
            &self.binding,
            &self.geometry,
        );
        target.copy_out(&mut encoder);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let frame = target.read_frame(&self.gpu.device, frame_index)?;
        let recorder = self
            .recorder
            .as_mut()
            .ok_or_else(|| anyhow!("capture collaborator missing"))?;
        recorder.capture(&frame)?;
        Ok(())
    }

    /// Export completed: stop then save exactly once, then take the reset
    /// transition back into continuous preview.
    fn finish_export(&mut self) {
        if let Some(mut recorder) = self.recorder.take() {
            let frames = recorder.frames_written();
            match recorder.stop().and_then(|_| recorder.save()) {
                Ok(path) => {
                    tracing::info!(frames, output = %path.display(), "export sequence saved");
                }
                Err(err) => {
                    tracing::error!("failed to finalize capture:\n{err:#}");
                }
            }
        }
        self.apply_reset();
    }

    /// A capture failure is terminal for the run; the partial output is left
    /// unsaved and preview resumes.
    fn abandon_export(&mut self) {
        self.recorder = None;
        self.apply_reset();
    }

    fn present(&mut self, elwt: &EventLoopWindowTarget<()>) {
        match self.draw_to_surface() {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.gpu.resize(self.gpu.size());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                tracing::error!("surface out of memory; exiting");
                elwt.exit();
            }
            Err(other) => {
                tracing::warn!("surface error: {other:?}; retrying next frame");
            }
        }
    }

    fn draw_to_surface(&mut self) -> Result<(), wgpu::SurfaceError> {
        let Some(program) = self.program.as_ref() else {
            return Ok(());
        };

        let frame = self.gpu.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render encoder"),
            });
        encode_quad_pass(&mut encoder, &view, program, &self.binding, &self.geometry);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

/// The shared tick body: activate the program, bind the uniform block and
/// quad geometry, draw 6 indices as two triangles.
fn encode_quad_pass(
    encoder: &mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    program: &ShaderProgram,
    binding: &UniformBinding,
    geometry: &QuadGeometry,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("quad pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    });
    pass.set_pipeline(&program.pipeline);
    pass.set_bind_group(0, &binding.bind_group, &[]);
    pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
    pass.set_index_buffer(geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
    pass.draw_indexed(0..geometry.index_count, 0, 0..1);
}
