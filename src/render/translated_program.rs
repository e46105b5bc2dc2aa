use std::rc::Rc;

use crate::error::Result;
use crate::render::draw_pipeline::create_buffer;
use crate::render::renderer_backends::GraphicsBackend;
use crate::render::shader::ShaderProgram;
use crate::render::shader_translator::{CANVAS_BLOCK_NAME, fragment_munge, shader_munge};
use crate::settings::{RendererSettings, TranslatorSettings};

// std140 rounds a block holding a struct up to vec4 alignment.
const CANVAS_BLOCK_SIZE: usize = 16;

/// Vertex and fragment sources after translation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedShaders {
    pub vertex: String,
    pub fragment: String,
}

impl TranslatedShaders {
    pub fn translate(vertex: &str, fragment: &str, settings: &TranslatorSettings) -> Self {
        let (mut vertex, mut fragment) = (vertex.to_owned(), fragment.to_owned());
        if settings.unify_uniform_blocks {
            vertex = shader_munge(&vertex);
            fragment = shader_munge(&fragment);
        }
        if settings.flip_fragment_coord {
            fragment = fragment_munge(&fragment);
        }
        Self { vertex, fragment }
    }
}

/// A program built from compiler-emitted GLSL. When the fragment stage reads
/// the canvas-size block, the program owns the buffer that feeds it.
pub struct TranslatedProgram<B: GraphicsBackend> {
    backend: Rc<B>,
    shader: ShaderProgram<B>,
    canvas_buffer: Option<B::Buffer>,
    canvas_binding: u32,
}

impl<B: GraphicsBackend> TranslatedProgram<B> {
    pub fn new(
        backend: Rc<B>,
        vertex: &str,
        fragment: &str,
        translator: &TranslatorSettings,
        renderer: &RendererSettings,
    ) -> Result<Self> {
        let gl = &*backend;
        let sources = TranslatedShaders::translate(vertex, fragment, translator);
        let shader = ShaderProgram::build(gl, &sources.vertex, &sources.fragment)?;

        let canvas_binding = renderer.canvas_block_binding;
        let canvas_buffer = match Self::create_canvas_buffer(gl, &shader, canvas_binding) {
            Ok(buffer) => buffer,
            Err(err) => {
                shader.delete(gl);
                return Err(err);
            }
        };
        log::debug!(
            "Translated program built, canvas block {}",
            if canvas_buffer.is_some() { "bound" } else { "absent" }
        );

        Ok(Self {
            backend,
            shader,
            canvas_buffer,
            canvas_binding,
        })
    }

    fn create_canvas_buffer(
        gl: &B,
        shader: &ShaderProgram<B>,
        binding: u32,
    ) -> Result<Option<B::Buffer>> {
        if gl
            .get_uniform_block_index(shader.program, CANVAS_BLOCK_NAME)
            .is_none()
        {
            return Ok(None);
        }
        shader.bind_uniform_block(gl, CANVAS_BLOCK_NAME, binding)?;
        let buffer = create_buffer(gl)?;
        gl.bind_buffer(glow::UNIFORM_BUFFER, Some(buffer));
        gl.buffer_data_size(
            glow::UNIFORM_BUFFER,
            CANVAS_BLOCK_SIZE as i32,
            glow::DYNAMIC_DRAW,
        );
        gl.bind_buffer(glow::UNIFORM_BUFFER, None);
        Ok(Some(buffer))
    }

    pub fn program(&self) -> B::Program {
        self.shader.program
    }

    pub fn canvas_block_bound(&self) -> bool {
        self.canvas_buffer.is_some()
    }

    /// Feeds the canvas size used by the flipped `gl_FragCoord`. No-op when
    /// the fragment stage never reads it.
    pub fn set_canvas_size(&self, width: f32, height: f32) {
        let Some(buffer) = self.canvas_buffer else {
            return;
        };
        let gl = &*self.backend;
        let data: [f32; 4] = [width, height, 0.0, 0.0];
        gl.bind_buffer(glow::UNIFORM_BUFFER, Some(buffer));
        gl.buffer_sub_data_u8_slice(glow::UNIFORM_BUFFER, 0, bytemuck::cast_slice(&data));
        gl.bind_buffer_base(glow::UNIFORM_BUFFER, self.canvas_binding, Some(buffer));
    }

    /// Makes this program current, with its canvas block attached.
    pub fn use_program(&self) {
        let gl = &*self.backend;
        gl.use_program(Some(self.shader.program));
        if let Some(buffer) = self.canvas_buffer {
            gl.bind_buffer_base(glow::UNIFORM_BUFFER, self.canvas_binding, Some(buffer));
        }
    }

    pub fn destroy(self) {
        let gl = &*self.backend;
        if let Some(buffer) = self.canvas_buffer {
            gl.delete_buffer(buffer);
        }
        self.shader.delete(gl);
    }
}
