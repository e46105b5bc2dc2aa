use std::cell::Cell;
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::error::{RenderError, Result};
use crate::render::renderer_backends::GraphicsBackend;
use crate::render::scoped_binding::ScopedVertexArrayBinding;
use crate::render::shader::ShaderProgram;
use crate::render::texture::Texture;
use crate::settings::RendererSettings;

pub const DRAW_INFO_BLOCK: &str = "drawInfo";
pub const SAMPLER_UNIFORM: &str = "sampler";

pub const TEXTURE_VERTEX_SHADER: &str = "#version 300 es
precision mediump float;
layout(location = 0) in vec2 framePos;
layout(location = 1) in vec2 texCoord;
uniform drawInfo {
  vec2 canvasSize;
  vec2 drawPos;
  vec2 drawSize;
  vec2 textureSize;
};
out vec2 vTexCoord;
void main() {
  vec2 pos = framePos * drawSize * 0.5 + drawPos;
  pos.y = canvasSize.y - pos.y;
  pos = (pos / canvasSize) * 2.0 - 1.0;
  gl_Position = vec4(pos, 0.0, 1.0);
  vTexCoord = texCoord;
}
";

pub const TEXTURE_FRAGMENT_SHADER: &str = "#version 300 es
precision mediump float;
in vec2 vTexCoord;
out vec4 outColor;
uniform drawInfo {
  vec2 canvasSize;
  vec2 drawPos;
  vec2 drawSize;
  vec2 textureSize;
};
uniform sampler2D sampler;
void main() {
  outColor = texture(sampler, vTexCoord * drawSize / textureSize);
}
";

// Unit quad, counter-clockwise from the top right.
const QUAD_POSITIONS: [f32; 8] = [1.0, 1.0, -1.0, 1.0, -1.0, -1.0, 1.0, -1.0];
const QUAD_TEX_COORDS: [f32; 8] = [1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0];
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Per-draw uniform payload, laid out exactly like the `drawInfo` block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DrawInfo {
    pub canvas_size: Vec2,
    pub draw_pos: Vec2,
    /// On-screen footprint and sampled region: the texture's used size.
    pub draw_size: Vec2,
    /// Full backing image size, only used to scale texture coordinates.
    pub texture_size: Vec2,
}

impl DrawInfo {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Draws textured, axis-aligned rectangles. Owns one program, one static
/// quad and one uniform buffer, all reused by every draw.
pub struct DrawPipeline<B: GraphicsBackend> {
    backend: Rc<B>,
    shader: ShaderProgram<B>,
    sampler: B::UniformLocation,
    draw_info_buffer: B::Buffer,
    draw_info_binding: u32,
    vertex_array: B::VertexArray,
    quad_buffers: Vec<B::Buffer>,
    draws: Cell<u64>,
}

impl<B: GraphicsBackend> DrawPipeline<B> {
    pub fn new(backend: Rc<B>, settings: &RendererSettings) -> Result<Self> {
        let gl = &*backend;
        let shader = ShaderProgram::build(gl, TEXTURE_VERTEX_SHADER, TEXTURE_FRAGMENT_SHADER)?;

        let mut buffers = Vec::with_capacity(4);
        let mut vertex_array = None;
        let created = Self::create_resources(
            gl,
            &shader,
            settings.draw_info_binding,
            &mut buffers,
            &mut vertex_array,
        );

        match (created, vertex_array) {
            (Ok((sampler, draw_info_buffer)), Some(vertex_array)) => {
                log::debug!(
                    "Draw pipeline ready, drawInfo bound to slot {}",
                    settings.draw_info_binding
                );
                buffers.retain(|buffer| *buffer != draw_info_buffer);
                Ok(Self {
                    backend,
                    shader,
                    sampler,
                    draw_info_buffer,
                    draw_info_binding: settings.draw_info_binding,
                    vertex_array,
                    quad_buffers: buffers,
                    draws: Cell::new(0),
                })
            }
            (created, vertex_array) => {
                for buffer in buffers {
                    gl.delete_buffer(buffer);
                }
                if let Some(vertex_array) = vertex_array {
                    gl.delete_vertex_array(vertex_array);
                }
                shader.delete(gl);
                Err(created.err().unwrap_or(RenderError::CreateObject {
                    kind: "vertex array",
                    reason: String::from("not created"),
                }))
            }
        }
    }

    /// Everything created here is pushed into `buffers` / `vertex_array` as
    /// soon as it exists so the caller can release it on failure.
    fn create_resources(
        gl: &B,
        shader: &ShaderProgram<B>,
        binding: u32,
        buffers: &mut Vec<B::Buffer>,
        vertex_array: &mut Option<B::VertexArray>,
    ) -> Result<(B::UniformLocation, B::Buffer)> {
        shader.bind_uniform_block(gl, DRAW_INFO_BLOCK, binding)?;
        let sampler = gl
            .get_uniform_location(shader.program, SAMPLER_UNIFORM)
            .ok_or(RenderError::MissingUniform(SAMPLER_UNIFORM))?;

        let draw_info_buffer = create_buffer(gl)?;
        buffers.push(draw_info_buffer);
        gl.bind_buffer(glow::UNIFORM_BUFFER, Some(draw_info_buffer));
        gl.buffer_data_size(
            glow::UNIFORM_BUFFER,
            size_of::<DrawInfo>() as i32,
            glow::DYNAMIC_DRAW,
        );
        gl.bind_buffer(glow::UNIFORM_BUFFER, None);

        let vao = gl
            .create_vertex_array()
            .map_err(|reason| RenderError::CreateObject {
                kind: "vertex array",
                reason,
            })?;
        *vertex_array = Some(vao);

        let _bound = ScopedVertexArrayBinding::new(gl, vao);
        // Vertex position and tex coords.
        for (location, data) in [QUAD_POSITIONS, QUAD_TEX_COORDS].iter().enumerate() {
            let buffer = create_buffer(gl)?;
            buffers.push(buffer);
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(data.as_slice()),
                glow::STATIC_DRAW,
            );
            gl.vertex_attrib_pointer_f32(location as u32, 2, 0, 0);
            gl.enable_vertex_attrib_array(location as u32);
        }
        // Index.
        let index_buffer = create_buffer(gl)?;
        buffers.push(index_buffer);
        gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(index_buffer));
        gl.buffer_data_u8_slice(
            glow::ELEMENT_ARRAY_BUFFER,
            bytemuck::cast_slice(QUAD_INDICES.as_slice()),
            glow::STATIC_DRAW,
        );
        gl.bind_buffer(glow::ARRAY_BUFFER, None);

        Ok((sampler, draw_info_buffer))
    }

    /// Draws `texture` centred on `(x, y)` in a top-left-origin canvas of
    /// `canvas_width` x `canvas_height` pixels.
    ///
    /// `used_size` is both the on-screen size and the top-left region of the
    /// `size`-sized texture that gets sampled. The vertex array is unbound
    /// again however this returns.
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &self,
        texture: B::Texture,
        canvas_width: f32,
        canvas_height: f32,
        x: f32,
        y: f32,
        size: Vec2,
        used_size: Vec2,
    ) -> Result<()> {
        let gl = &*self.backend;
        let info = DrawInfo {
            canvas_size: Vec2::new(canvas_width, canvas_height),
            draw_pos: Vec2::new(x, y),
            draw_size: used_size,
            texture_size: size,
        };

        gl.use_program(Some(self.shader.program));
        gl.bind_buffer(glow::UNIFORM_BUFFER, Some(self.draw_info_buffer));
        gl.buffer_sub_data_u8_slice(glow::UNIFORM_BUFFER, 0, info.as_bytes());
        gl.bind_buffer_base(
            glow::UNIFORM_BUFFER,
            self.draw_info_binding,
            Some(self.draw_info_buffer),
        );
        gl.active_texture(glow::TEXTURE0);
        gl.bind_texture(glow::TEXTURE_2D, Some(texture));
        gl.uniform_1_i32(Some(&self.sampler), 0);

        let _bound = ScopedVertexArrayBinding::new(gl, self.vertex_array);
        gl.draw_elements(glow::TRIANGLES, QUAD_INDICES.len() as i32)?;

        self.draws.set(self.draws.get() + 1);
        log::trace!("Drew {:?} at ({}, {}) size {}", texture, x, y, used_size);
        Ok(())
    }

    /// Draws a [`Texture`] at its current size, placeholder or not.
    pub fn draw_texture(
        &self,
        texture: &Texture<B::Texture>,
        canvas_size: Vec2,
        position: Vec2,
    ) -> Result<()> {
        let [width, height] = texture.size();
        let [used_width, used_height] = texture.used_size();
        self.draw(
            texture.handle(),
            canvas_size.x,
            canvas_size.y,
            position.x,
            position.y,
            Vec2::new(width as f32, height as f32),
            Vec2::new(used_width as f32, used_height as f32),
        )
    }

    /// Number of draws that completed successfully.
    pub fn draw_count(&self) -> u64 {
        self.draws.get()
    }

    /// Releases every GPU object the pipeline owns.
    pub fn destroy(self) {
        let gl = &*self.backend;
        gl.delete_vertex_array(self.vertex_array);
        for buffer in &self.quad_buffers {
            gl.delete_buffer(*buffer);
        }
        gl.delete_buffer(self.draw_info_buffer);
        self.shader.delete(gl);
    }
}

pub(crate) fn create_buffer<B: GraphicsBackend>(gl: &B) -> Result<B::Buffer> {
    gl.create_buffer()
        .map_err(|reason| RenderError::CreateObject {
            kind: "buffer",
            reason,
        })
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use super::*;
    use crate::render::null_backend::{GlCall, NullBackend};

    fn pipeline() -> (Rc<NullBackend>, DrawPipeline<NullBackend>) {
        let backend = Rc::new(NullBackend::new());
        let pipeline = DrawPipeline::new(backend.clone(), &RendererSettings::default()).unwrap();
        (backend, pipeline)
    }

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    #[test]
    fn test_draw_info_layout() {
        assert_eq!(size_of::<DrawInfo>(), 32);
        let info = DrawInfo {
            canvas_size: Vec2::new(1.0, 2.0),
            draw_pos: Vec2::new(3.0, 4.0),
            draw_size: Vec2::new(5.0, 6.0),
            texture_size: Vec2::new(7.0, 8.0),
        };
        assert_eq!(
            floats(info.as_bytes()),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
        );
    }

    #[test]
    fn test_construction_builds_static_quad() {
        let (backend, pipeline) = pipeline();
        let calls = backend.calls();

        assert!(calls.contains(&GlCall::UniformBlockBinding {
            program: pipeline.shader.program,
            index: 0,
            binding: 0,
        }));
        assert!(calls.contains(&GlCall::BufferDataSize {
            target: glow::UNIFORM_BUFFER,
            size: 32,
            usage: glow::DYNAMIC_DRAW,
        }));
        for location in [0, 1] {
            assert!(calls.contains(&GlCall::VertexAttribPointer {
                index: location,
                size: 2,
                stride: 0,
                offset: 0,
            }));
            assert!(calls.contains(&GlCall::EnableVertexAttribArray(location)));
        }
        assert!(calls.contains(&GlCall::BufferData {
            target: glow::ELEMENT_ARRAY_BUFFER,
            data: bytemuck::cast_slice::<u16, u8>(&QUAD_INDICES).to_vec(),
            usage: glow::STATIC_DRAW,
        }));
        assert!(calls.contains(&GlCall::BufferData {
            target: glow::ARRAY_BUFFER,
            data: bytemuck::cast_slice::<f32, u8>(&QUAD_POSITIONS).to_vec(),
            usage: glow::STATIC_DRAW,
        }));
        assert_eq!(pipeline.quad_buffers.len(), 3);
        assert_eq!(backend.bound_vertex_array(), None);
    }

    #[test]
    fn test_custom_binding_slot() {
        let backend = Rc::new(NullBackend::new());
        let settings = RendererSettings {
            draw_info_binding: 5,
            ..RendererSettings::default()
        };
        let pipeline = DrawPipeline::new(backend.clone(), &settings).unwrap();
        backend.clear_calls();
        pipeline
            .draw(1, 10.0, 10.0, 0.0, 0.0, Vec2::ONE, Vec2::ONE)
            .unwrap();
        assert!(backend.calls().contains(&GlCall::BindBufferBase {
            target: glow::UNIFORM_BUFFER,
            index: 5,
            buffer: Some(pipeline.draw_info_buffer),
        }));
    }

    #[test]
    fn test_draw_uploads_payload_in_order() {
        let (backend, pipeline) = pipeline();
        backend.clear_calls();

        pipeline
            .draw(
                42,
                800.0,
                600.0,
                10.0,
                20.0,
                Vec2::new(64.0, 64.0),
                Vec2::new(32.0, 32.0),
            )
            .unwrap();

        let expected = vec![800.0, 600.0, 10.0, 20.0, 32.0, 32.0, 64.0, 64.0];
        let uploads: Vec<_> = backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GlCall::BufferSubData {
                    target: glow::UNIFORM_BUFFER,
                    offset: 0,
                    data,
                } => Some(floats(&data)),
                _ => None,
            })
            .collect();
        assert_eq!(uploads, vec![expected.clone()]);
        let contents = backend.buffer_contents(pipeline.draw_info_buffer).unwrap();
        assert_eq!(floats(&contents), expected);
    }

    #[test]
    fn test_draw_binds_state_then_unbinds_vertex_array() {
        let (backend, pipeline) = pipeline();
        backend.clear_calls();
        pipeline
            .draw(42, 100.0, 100.0, 50.0, 50.0, Vec2::splat(8.0), Vec2::splat(8.0))
            .unwrap();

        let calls = backend.calls();
        let position = |wanted: &GlCall| calls.iter().position(|call| call == wanted).unwrap();
        let texture = position(&GlCall::BindTexture {
            target: glow::TEXTURE_2D,
            texture: Some(42),
        });
        let unit = position(&GlCall::ActiveTexture(glow::TEXTURE0));
        let sampler = position(&GlCall::Uniform1i {
            location: Some(pipeline.sampler),
            value: 0,
        });
        let bind = position(&GlCall::BindVertexArray(Some(pipeline.vertex_array)));
        let draw = position(&GlCall::DrawElements {
            mode: glow::TRIANGLES,
            count: 6,
        });
        let unbind = position(&GlCall::BindVertexArray(None));
        assert!(unit < texture && texture < sampler && sampler < bind);
        assert!(bind < draw && draw < unbind);
        assert_eq!(backend.bound_vertex_array(), None);
        assert_eq!(pipeline.draw_count(), 1);
    }

    #[test]
    fn test_draw_reuses_gpu_objects() {
        let (backend, pipeline) = pipeline();
        backend.clear_calls();
        for frame in 0..3 {
            pipeline
                .draw(1, 64.0, 64.0, frame as f32, 0.0, Vec2::ONE, Vec2::ONE)
                .unwrap();
        }
        assert!(!backend.calls().iter().any(|call| matches!(
            call,
            GlCall::CreateBuffer(_)
                | GlCall::CreateVertexArray(_)
                | GlCall::CreateProgram(_)
                | GlCall::BufferData { .. }
                | GlCall::BufferDataSize { .. }
        )));
        assert_eq!(pipeline.draw_count(), 3);
    }

    #[test]
    fn test_failed_draw_unbinds_vertex_array() {
        let (backend, pipeline) = pipeline();
        backend.set_fail_draw(Some(glow::INVALID_OPERATION));

        let err = pipeline
            .draw(1, 64.0, 64.0, 0.0, 0.0, Vec2::ONE, Vec2::ONE)
            .unwrap_err();
        assert!(matches!(err, RenderError::Draw { code } if code == glow::INVALID_OPERATION));
        assert_eq!(backend.bound_vertex_array(), None);
        assert_eq!(pipeline.draw_count(), 0);
    }

    #[test]
    fn test_earlier_gl_error_is_not_blamed_on_draw() {
        let (backend, pipeline) = pipeline();
        // Left behind by an unrelated oversized texture upload.
        backend.push_error(glow::INVALID_VALUE);

        pipeline
            .draw(1, 64.0, 64.0, 0.0, 0.0, Vec2::ONE, Vec2::ONE)
            .unwrap();
        assert_eq!(pipeline.draw_count(), 1);
        assert!(backend.pending_errors().is_empty());

        backend.push_error(glow::INVALID_VALUE);
        backend.set_fail_draw(Some(glow::INVALID_OPERATION));
        let err = pipeline
            .draw(1, 64.0, 64.0, 0.0, 0.0, Vec2::ONE, Vec2::ONE)
            .unwrap_err();
        assert!(matches!(err, RenderError::Draw { code } if code == glow::INVALID_OPERATION));
        assert_eq!(pipeline.draw_count(), 1);
    }

    #[test]
    fn test_panicking_draw_unbinds_vertex_array() {
        let (backend, pipeline) = pipeline();
        backend.set_panic_on_draw(true);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pipeline.draw(1, 64.0, 64.0, 0.0, 0.0, Vec2::ONE, Vec2::ONE)
        }));
        assert!(result.is_err());
        assert_eq!(backend.bound_vertex_array(), None);
    }

    #[test]
    fn test_draw_texture_uses_texture_sizes() {
        let (backend, pipeline) = pipeline();
        let mut texture = Texture::ready(9u32, 64, 32);
        texture.set_used_size([16, 8]);
        backend.clear_calls();

        pipeline
            .draw_texture(&texture, Vec2::new(320.0, 240.0), Vec2::new(5.0, 6.0))
            .unwrap();

        let contents = backend.buffer_contents(pipeline.draw_info_buffer).unwrap();
        assert_eq!(
            floats(&contents),
            vec![320.0, 240.0, 5.0, 6.0, 16.0, 8.0, 64.0, 32.0]
        );
    }

    #[test]
    fn test_draw_pending_texture_as_placeholder() {
        let (backend, pipeline) = pipeline();
        let texture = Texture::pending(3u32);
        pipeline
            .draw_texture(&texture, Vec2::new(10.0, 10.0), Vec2::ZERO)
            .unwrap();
        let contents = backend.buffer_contents(pipeline.draw_info_buffer).unwrap();
        assert_eq!(&floats(&contents)[4..], &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_construction_failures_are_fatal() {
        let backend = Rc::new(NullBackend::new());
        backend.set_fail_link(true);
        let result = DrawPipeline::new(backend.clone(), &RendererSettings::default());
        assert!(matches!(result, Err(RenderError::ProgramLink { .. })));

        let backend = Rc::new(NullBackend::new());
        backend.set_fail_create(true);
        let result = DrawPipeline::new(backend.clone(), &RendererSettings::default());
        assert!(matches!(result, Err(RenderError::CreateObject { .. })));
    }

    #[test]
    fn test_destroy_releases_everything() {
        let (backend, pipeline) = pipeline();
        let program = pipeline.shader.program;
        let vertex_array = pipeline.vertex_array;
        backend.clear_calls();
        pipeline.destroy();

        let calls = backend.calls();
        assert!(calls.contains(&GlCall::DeleteProgram(program)));
        assert!(calls.contains(&GlCall::DeleteVertexArray(vertex_array)));
        let deleted_buffers = calls
            .iter()
            .filter(|call| matches!(call, GlCall::DeleteBuffer(_)))
            .count();
        assert_eq!(deleted_buffers, 4);
    }
}
