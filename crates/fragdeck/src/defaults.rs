/// Demo shader shown when no file is supplied: interference rings swept by a
/// slow three-lobed rotation, all driven by `time`.
pub const DEFAULT_FRAGMENT_SOURCE: &str = r"#ifdef GL_ES
precision mediump float;
#endif

uniform float time;
uniform vec2 mouse;
uniform vec2 resolution;

void main(void) {
    vec2 uv = gl_FragCoord.xy / resolution.xy;
    vec2 centered = uv - 0.5 + mouse * 0.25;

    float rings = sin(length(centered) * 24.0 - time * 2.0);
    float sweep = cos(atan(centered.y, centered.x) * 3.0 + time * 0.5);
    float glow = rings * 0.5 + sweep * 0.5;

    vec3 color = vec3(
        0.5 + 0.5 * glow,
        0.3 + 0.4 * sin(glow * 2.0 + time * 0.7),
        0.6 - 0.3 * glow
    );
    gl_FragColor = vec4(color, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shader_compiles() {
        renderer::validate_fragment_source(DEFAULT_FRAGMENT_SOURCE)
            .expect("bundled demo shader must always build");
    }

    #[test]
    fn default_shader_uses_the_documented_uniforms() {
        for name in ["time", "mouse", "resolution"] {
            assert!(
                DEFAULT_FRAGMENT_SOURCE.contains(name),
                "demo shader should exercise `{name}`"
            );
        }
    }
}
