//! Small WebGL2 / OpenGL ES 3.0 rendering helpers: a textured-quad draw
//! pipeline, background image decoding into placeholder textures, and source
//! rewriting for GLSL emitted by shader cross-compilers.

pub mod error;
pub mod logging;
pub mod render;
pub mod settings;

pub use error::{DecodeError, RenderError, ShaderStage};
pub use logging::{LoggingConfig, init_logging};
pub use render::draw_pipeline::{DrawInfo, DrawPipeline};
pub use render::null_backend::{GlCall, NullBackend};
pub use render::renderer_backends::{GlowBackend, GraphicsBackend};
pub use render::shader::ShaderProgram;
pub use render::shader_translator::{CANVAS_BLOCK_NAME, fragment_munge, shader_munge};
pub use render::texture::{Texture, TextureState};
pub use render::texture_loader::{DecodeCompletion, DecodeOutcome, ImageKind, TextureLoader};
pub use render::translated_program::{TranslatedProgram, TranslatedShaders};
pub use settings::{Settings, SettingsError};
