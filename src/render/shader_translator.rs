//! Rewrites GLSL ES 3.00 emitted by the cross-platform shader compiler into
//! something a WebGL2-style context accepts.
//!
//! Both passes are plain text substitutions against the compiler's fixed
//! output conventions. Neither validates the shader.

use std::sync::LazyLock;

use regex::Regex;

/// Name of the uniform block [`fragment_munge`] inserts. The host fills it
/// with the canvas size in pixels.
pub const CANVAS_BLOCK_NAME: &str = "canvas_uniform_block";

const CANVAS_BLOCK: &str = "struct canvas_uniform_struct { vec2 size; };\n\
                            uniform canvas_uniform_block { canvas_uniform_struct canvas; };";

const FLIPPED_FRAG_COORD: &str =
    "vec4(gl_FragCoord.x, canvas.size.y - gl_FragCoord.y, gl_FragCoord.zw)";

static PRECISION_PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)((?:^precision [^;]+;\n){2})").expect("valid preamble pattern")
});

static FRAG_COORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"gl_FragCoord").expect("valid gl_FragCoord pattern"));

static STAGE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(uniform \S+\d+)(?:Vertex|Fragment)( \{ \S+ _group_\d+_binding_\d+)")
        .expect("valid uniform block pattern")
});

static STAGE_BINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(_group_\d+_binding_\d+_)[vf]s\b").expect("valid binding pattern")
});

/// Flips `gl_FragCoord.y` so fragment code written for a top-left origin
/// sees the same coordinates under GL's bottom-left origin.
///
/// Looks for the two `precision` lines the compiler always emits, declares
/// the canvas-size block right after them and rewrites every `gl_FragCoord`.
/// Without that preamble, or when this pass already inserted the block, the
/// source comes back unchanged.
pub fn fragment_munge(glsl: &str) -> String {
    let Some(preamble) = PRECISION_PREAMBLE.find(glsl) else {
        return glsl.to_owned();
    };
    // Already translated.
    if glsl[preamble.end()..].starts_with(CANVAS_BLOCK) {
        return glsl.to_owned();
    }

    let mut out = String::with_capacity(glsl.len() + CANVAS_BLOCK.len() + 64);
    out.push_str(&glsl[..preamble.end()]);
    out.push_str(CANVAS_BLOCK);
    out.push('\n');
    out.push_str(&glsl[preamble.end()..]);
    FRAG_COORD.replace_all(&out, FLIPPED_FRAG_COORD).into_owned()
}

/// Makes the vertex and fragment stages agree on one uniform block.
///
/// The compiler names the per-stage copies `<Type><N>Vertex` and
/// `<Type><N>Fragment` and suffixes their instance names with `_vs` / `_fs`.
/// GL links blocks by name, so both become `<Type><N>VertexFragment` and
/// `_vfs`.
pub fn shader_munge(glsl: &str) -> String {
    let merged = STAGE_BLOCK.replace_all(glsl, "${1}VertexFragment${2}");
    STAGE_BINDING
        .replace_all(&merged, "${1}vfs")
        .into_owned()
}
