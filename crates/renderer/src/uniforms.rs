use bytemuck::{Pod, Zeroable};

/// CPU-side mirror of the `QuadParams` uniform block injected by
/// `compile::HEADER`.
///
/// std140 layout: two vec2 slots, one float, then explicit padding so the
/// block size is a 16-byte multiple.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug)]
pub(crate) struct QuadUniforms {
    resolution: [f32; 2],
    mouse: [f32; 2],
    time: f32,
    _padding: [f32; 3],
}

unsafe impl Zeroable for QuadUniforms {}
unsafe impl Pod for QuadUniforms {}

impl QuadUniforms {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            resolution: [width as f32, height as f32],
            // Mouse tracking is not implemented; the uniform stays at the origin.
            mouse: [0.0, 0.0],
            time: 0.0,
            _padding: [0.0; 3],
        }
    }

    pub fn set_resolution(&mut self, width: f32, height: f32) {
        self.resolution = [width, height];
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.time = seconds;
    }

    #[cfg(test)]
    pub fn resolution(&self) -> [f32; 2] {
        self.resolution
    }

    #[cfg(test)]
    pub fn time(&self) -> f32 {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_is_a_multiple_of_sixteen() {
        assert_eq!(std::mem::size_of::<QuadUniforms>(), 32);
        assert_eq!(std::mem::align_of::<QuadUniforms>(), 16);
    }

    #[test]
    fn new_frames_start_at_time_zero_with_mouse_at_origin() {
        let uniforms = QuadUniforms::new(640, 480);
        assert_eq!(uniforms.resolution(), [640.0, 480.0]);
        assert_eq!(uniforms.time(), 0.0);
        assert_eq!(uniforms.mouse, [0.0, 0.0]);
    }

    #[test]
    fn resolution_updates_take_effect_exactly() {
        let mut uniforms = QuadUniforms::new(100, 100);
        uniforms.set_resolution(1920.0, 1080.0);
        assert_eq!(uniforms.resolution(), [1920.0, 1080.0]);
    }
}
