pub mod draw_pipeline;
pub mod null_backend;
pub mod renderer_backends;
pub(crate) mod scoped_binding;
pub mod shader;
pub mod shader_translator;
pub mod texture;
pub mod texture_loader;
pub mod translated_program;
