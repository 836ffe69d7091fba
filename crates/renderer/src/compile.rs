use std::borrow::Cow;

use thiserror::Error;
use wgpu::naga;

/// Shader stage named in compile diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStageKind {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStageKind::Vertex => f.write_str("vertex"),
            ShaderStageKind::Fragment => f.write_str("fragment"),
        }
    }
}

/// The two ways turning shader text into an executable program can fail.
/// Both carry the underlying compiler's diagnostic text verbatim; neither is
/// retried anywhere.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to compile {stage} shader:\n{diagnostic}")]
    Compile {
        stage: ShaderStageKind,
        diagnostic: String,
    },
    #[error("failed to link shader program:\n{diagnostic}")]
    Link { diagnostic: String },
}

impl ShaderError {
    /// The compiler/validator output, without the surrounding message.
    pub fn diagnostic(&self) -> &str {
        match self {
            ShaderError::Compile { diagnostic, .. } | ShaderError::Link { diagnostic } => {
                diagnostic
            }
        }
    }
}

/// Wraps and checks fragment source without touching the GPU.
///
/// Parse failures surface as [`ShaderError::Compile`], module validation
/// failures as [`ShaderError::Link`]. The windowed host runs this before
/// handing the source to the device, so a bad shader never reaches a draw
/// call.
pub fn validate_fragment_source(source: &str) -> Result<(), ShaderError> {
    validate_glsl(&wrap_fragment_source(source), naga::ShaderStage::Fragment)
}

/// Compiles the user fragment shader into a `wgpu` module.
pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
    source: &str,
) -> Result<wgpu::ShaderModule, ShaderError> {
    let wrapped = wrap_fragment_source(source);
    validate_glsl(&wrapped, naga::ShaderStage::Fragment)?;

    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("fragdeck fragment"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(wrapped),
            stage: naga::ShaderStage::Fragment,
            defines: &[],
        },
    }))
}

/// Compiles the fixed full-screen quad vertex shader.
pub(crate) fn compile_vertex_shader(
    device: &wgpu::Device,
) -> Result<wgpu::ShaderModule, ShaderError> {
    validate_glsl(VERTEX_SHADER_GLSL, naga::ShaderStage::Vertex)?;

    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("fragdeck quad vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: naga::ShaderStage::Vertex,
            defines: &[],
        },
    }))
}

fn validate_glsl(source: &str, stage: naga::ShaderStage) -> Result<(), ShaderError> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(stage);
    let module = frontend
        .parse(&options, source)
        .map_err(|errors| ShaderError::Compile {
            stage: stage_kind(stage),
            diagnostic: errors.emit_to_string(source),
        })?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|error| ShaderError::Link {
        diagnostic: error.emit_to_string(source),
    })?;

    Ok(())
}

fn stage_kind(stage: naga::ShaderStage) -> ShaderStageKind {
    match stage {
        naga::ShaderStage::Vertex => ShaderStageKind::Vertex,
        _ => ShaderStageKind::Fragment,
    }
}

/// Produces a self-contained GLSL fragment shader from WebGL-style source.
///
/// Steps performed:
///
/// 1. Strip `#version`, `precision`, and `#extension` directives plus the
///    declarations of the three well-known uniforms so our own definitions
///    can take their place.
/// 2. Prepend [`HEADER`], which declares the uniform block, macro aliases for
///    `time`/`mouse`/`resolution`/`gl_FragColor`, and renames the user's
///    entry point.
/// 3. Append [`FOOTER`], which remaps `gl_FragCoord` to the bottom-left
///    origin the source dialect assumes, calls the user's entry point, and
///    forwards the output color.
pub(crate) fn wrap_fragment_source(source: &str) -> String {
    let mut sanitized = String::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#version")
            || trimmed.starts_with("#extension")
            || trimmed.starts_with("precision ")
        {
            continue;
        }
        let is_known_uniform = trimmed.starts_with("uniform ")
            && (trimmed.contains("time")
                || trimmed.contains("mouse")
                || trimmed.contains("resolution"));
        if is_known_uniform {
            continue;
        }
        sanitized.push_str(line);
        sanitized.push('\n');
    }

    format!("{HEADER}\n#line 1\n{sanitized}{FOOTER}")
}

/// GLSL prologue injected ahead of every user fragment shader.
///
/// The uniform block layout must match `QuadUniforms` in `uniforms.rs`.
const HEADER: &str = r"#version 450
layout(location = 0) out vec4 fragdeck_out_color;

layout(std140, set = 0, binding = 0) uniform QuadParams {
    vec2 _resolution;
    vec2 _mouse;
    float _time;
} ubo;

// Map the WebGL-style uniform names onto the block fields via macros so the
// user source compiles unchanged.
#define resolution ubo._resolution
#define mouse ubo._mouse
#define time ubo._time

vec4 fragdeck_frag_color;
#define gl_FragColor fragdeck_frag_color

vec4 fragdeck_frag_coord;
#define gl_FragCoord fragdeck_frag_coord

#define main fragdeck_user_main
";

/// GLSL epilogue that remaps coordinates and delegates to the user entry point.
const FOOTER: &str = r"#undef main
void main() {
    // Capture the real builtin gl_FragCoord, then remap to the bottom-left
    // origin WebGL shaders assume. The macro is lifted temporarily so the
    // hardware builtin is readable.
    #undef gl_FragCoord
    vec2 builtinFC = vec2(gl_FragCoord.x, gl_FragCoord.y);
    #define gl_FragCoord fragdeck_frag_coord

    fragdeck_frag_coord = vec4(builtinFC.x, resolution.y - builtinFC.y, 0.0, 1.0);
    fragdeck_frag_color = vec4(0.0);
    fragdeck_user_main();
    fragdeck_out_color = fragdeck_frag_color;
}
";

/// Minimal quad vertex shader; positions arrive from the vertex buffer.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec3 position;

void main() {
    gl_Position = vec4(position, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
#ifdef GL_ES
precision mediump float;
#endif

#extension GL_OES_standard_derivatives : enable

uniform float time;
uniform vec2 mouse;
uniform vec2 resolution;

void main(void) {
    vec2 position = gl_FragCoord.xy / resolution.xy;
    gl_FragColor = vec4(position, sin(time), 1.0);
}
"#;

    #[test]
    fn wrap_strips_known_uniforms_and_directives() {
        let wrapped = wrap_fragment_source(SAMPLE);
        assert!(!wrapped.contains("uniform float time"));
        assert!(!wrapped.contains("uniform vec2 mouse"));
        assert!(!wrapped.contains("uniform vec2 resolution"));
        assert!(!wrapped.contains("precision mediump"));
        assert!(!wrapped.contains("#extension"));
        assert!(wrapped.contains("#line 1"));
    }

    #[test]
    fn wrap_keeps_the_user_body() {
        let wrapped = wrap_fragment_source(SAMPLE);
        assert!(wrapped.contains("gl_FragCoord.xy / resolution.xy"));
        assert!(wrapped.contains("#define main fragdeck_user_main"));
    }

    #[test]
    fn wrap_flips_the_fragment_origin() {
        let wrapped = wrap_fragment_source(SAMPLE);
        assert!(wrapped.contains("resolution.y - builtinFC.y"));
    }

    #[test]
    fn valid_source_passes_validation() {
        validate_fragment_source(SAMPLE).expect("sample shader should validate");
    }

    #[test]
    fn empty_source_is_a_compile_error() {
        let err = validate_fragment_source("").unwrap_err();
        match err {
            ShaderError::Compile { diagnostic, .. } => {
                assert!(!diagnostic.is_empty(), "diagnostic text must be surfaced")
            }
            other => panic!("expected a compile error, got {other:?}"),
        }
    }

    #[test]
    fn syntax_errors_carry_the_compiler_diagnostic() {
        let err = validate_fragment_source("void main(void) { gl_FragColor = ; }").unwrap_err();
        assert!(matches!(err, ShaderError::Compile { .. }));
        assert!(!err.diagnostic().is_empty());
    }

    #[test]
    fn vertex_shader_validates() {
        validate_glsl(VERTEX_SHADER_GLSL, naga::ShaderStage::Vertex)
            .expect("builtin vertex shader should validate");
    }
}
