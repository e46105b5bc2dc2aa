use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use crate::render::renderer_backends::GraphicsBackend;

/// One recorded GPU call.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    CreateBuffer(u32),
    DeleteBuffer(u32),
    BindBuffer { target: u32, buffer: Option<u32> },
    BindBufferBase { target: u32, index: u32, buffer: Option<u32> },
    BufferDataSize { target: u32, size: i32, usage: u32 },
    BufferData { target: u32, data: Vec<u8>, usage: u32 },
    BufferSubData { target: u32, offset: i32, data: Vec<u8> },
    CreateShader { shader: u32, shader_type: u32 },
    CompileShader(u32),
    DeleteShader(u32),
    CreateProgram(u32),
    AttachShader { program: u32, shader: u32 },
    LinkProgram(u32),
    DeleteProgram(u32),
    UseProgram(Option<u32>),
    UniformBlockBinding { program: u32, index: u32, binding: u32 },
    Uniform1i { location: Option<u32>, value: i32 },
    CreateVertexArray(u32),
    DeleteVertexArray(u32),
    BindVertexArray(Option<u32>),
    EnableVertexAttribArray(u32),
    VertexAttribPointer { index: u32, size: i32, stride: i32, offset: i32 },
    CreateTexture(u32),
    DeleteTexture(u32),
    ActiveTexture(u32),
    BindTexture { target: u32, texture: Option<u32> },
    TexImage2d { texture: Option<u32>, width: i32, height: i32 },
    TexParameter { texture: Option<u32>, parameter: u32, value: i32 },
    DrawElements { mode: u32, count: i32 },
}

/// Headless backend: hands out integer handles, keeps just enough state to
/// answer queries, and records every call. Failures can be switched on to
/// exercise error paths.
#[derive(Default)]
pub struct NullBackend {
    next_id: Cell<u32>,
    calls: RefCell<Vec<GlCall>>,
    bound_buffers: RefCell<HashMap<u32, u32>>,
    buffers: RefCell<HashMap<u32, Vec<u8>>>,
    bound_texture: Cell<Option<u32>>,
    textures: RefCell<HashMap<u32, NullTexture>>,
    bound_vertex_array: Cell<Option<u32>>,
    shader_sources: RefCell<HashMap<u32, String>>,
    program_shaders: RefCell<HashMap<u32, Vec<u32>>>,
    fail_create: Cell<bool>,
    fail_compile: Cell<bool>,
    fail_link: Cell<bool>,
    fail_draw: Cell<Option<u32>>,
    #[cfg(test)]
    panic_on_draw: Cell<bool>,
    errors: RefCell<VecDeque<u32>>,
    max_texture_size: Cell<Option<i32>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NullTexture {
    pub width: i32,
    pub height: i32,
    pub pixels: Vec<u8>,
    pub parameters: HashMap<u32, i32>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.set(fail);
    }

    pub fn set_fail_compile(&self, fail: bool) {
        self.fail_compile.set(fail);
    }

    pub fn set_fail_link(&self, fail: bool) {
        self.fail_link.set(fail);
    }

    /// Makes every subsequent draw report `code` as a GL error.
    pub fn set_fail_draw(&self, code: Option<u32>) {
        self.fail_draw.set(code);
    }

    #[cfg(test)]
    pub(crate) fn set_panic_on_draw(&self, panic: bool) {
        self.panic_on_draw.set(panic);
    }

    /// Raises a GL error flag that stays set until `get_error` reads it.
    pub fn push_error(&self, code: u32) {
        self.errors.borrow_mut().push_back(code);
    }

    /// Error flags not yet read.
    pub fn pending_errors(&self) -> Vec<u32> {
        self.errors.borrow().iter().copied().collect()
    }

    /// Texture uploads wider or taller than `max` raise `INVALID_VALUE` and
    /// leave the texture untouched, like `GL_MAX_TEXTURE_SIZE`.
    pub fn set_max_texture_size(&self, max: Option<i32>) {
        self.max_texture_size.set(max);
    }

    pub fn calls(&self) -> Vec<GlCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn bound_vertex_array(&self) -> Option<u32> {
        self.bound_vertex_array.get()
    }

    pub fn buffer_contents(&self, buffer: u32) -> Option<Vec<u8>> {
        self.buffers.borrow().get(&buffer).cloned()
    }

    pub fn texture(&self, texture: u32) -> Option<NullTexture> {
        self.textures.borrow().get(&texture).cloned()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.borrow().len()
    }

    fn record(&self, call: GlCall) {
        self.calls.borrow_mut().push(call);
    }

    fn allocate(&self, kind: &str) -> Result<u32, String> {
        if self.fail_create.get() {
            return Err(format!("no {kind} available"));
        }
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        Ok(id)
    }

    fn bound_buffer(&self, target: u32) -> Option<u32> {
        self.bound_buffers.borrow().get(&target).copied()
    }
}

impl GraphicsBackend for NullBackend {
    type Buffer = u32;
    type Texture = u32;
    type Shader = u32;
    type Program = u32;
    type VertexArray = u32;
    type UniformLocation = u32;

    fn create_buffer(&self) -> Result<u32, String> {
        let id = self.allocate("buffer")?;
        self.buffers.borrow_mut().insert(id, Vec::new());
        self.record(GlCall::CreateBuffer(id));
        Ok(id)
    }

    fn delete_buffer(&self, buffer: u32) {
        self.buffers.borrow_mut().remove(&buffer);
        self.record(GlCall::DeleteBuffer(buffer));
    }

    fn bind_buffer(&self, target: u32, buffer: Option<u32>) {
        let mut bound = self.bound_buffers.borrow_mut();
        match buffer {
            Some(buffer) => bound.insert(target, buffer),
            None => bound.remove(&target),
        };
        self.record(GlCall::BindBuffer { target, buffer });
    }

    fn bind_buffer_base(&self, target: u32, index: u32, buffer: Option<u32>) {
        self.record(GlCall::BindBufferBase {
            target,
            index,
            buffer,
        });
    }

    fn buffer_data_size(&self, target: u32, size: i32, usage: u32) {
        if let Some(buffer) = self.bound_buffer(target) {
            self.buffers
                .borrow_mut()
                .insert(buffer, vec![0; size.max(0) as usize]);
        }
        self.record(GlCall::BufferDataSize {
            target,
            size,
            usage,
        });
    }

    fn buffer_data_u8_slice(&self, target: u32, data: &[u8], usage: u32) {
        if let Some(buffer) = self.bound_buffer(target) {
            self.buffers.borrow_mut().insert(buffer, data.to_vec());
        }
        self.record(GlCall::BufferData {
            target,
            data: data.to_vec(),
            usage,
        });
    }

    fn buffer_sub_data_u8_slice(&self, target: u32, offset: i32, data: &[u8]) {
        if let Some(buffer) = self.bound_buffer(target)
            && let Some(contents) = self.buffers.borrow_mut().get_mut(&buffer)
        {
            let start = offset.max(0) as usize;
            let end = start + data.len();
            if contents.len() < end {
                contents.resize(end, 0);
            }
            contents[start..end].copy_from_slice(data);
        }
        self.record(GlCall::BufferSubData {
            target,
            offset,
            data: data.to_vec(),
        });
    }

    fn create_shader(&self, shader_type: u32) -> Result<u32, String> {
        let shader = self.allocate("shader")?;
        self.record(GlCall::CreateShader {
            shader,
            shader_type,
        });
        Ok(shader)
    }

    fn shader_source(&self, shader: u32, source: &str) {
        self.shader_sources
            .borrow_mut()
            .insert(shader, source.to_owned());
    }

    fn compile_shader(&self, shader: u32) {
        self.record(GlCall::CompileShader(shader));
    }

    fn get_shader_compile_status(&self, _shader: u32) -> bool {
        !self.fail_compile.get()
    }

    fn get_shader_info_log(&self, shader: u32) -> String {
        if self.fail_compile.get() {
            format!("ERROR: 0:1: shader {shader} rejected")
        } else {
            String::new()
        }
    }

    fn delete_shader(&self, shader: u32) {
        self.record(GlCall::DeleteShader(shader));
    }

    fn create_program(&self) -> Result<u32, String> {
        let program = self.allocate("program")?;
        self.program_shaders.borrow_mut().insert(program, Vec::new());
        self.record(GlCall::CreateProgram(program));
        Ok(program)
    }

    fn attach_shader(&self, program: u32, shader: u32) {
        self.program_shaders
            .borrow_mut()
            .entry(program)
            .or_default()
            .push(shader);
        self.record(GlCall::AttachShader { program, shader });
    }

    fn link_program(&self, program: u32) {
        self.record(GlCall::LinkProgram(program));
    }

    fn get_program_link_status(&self, _program: u32) -> bool {
        !self.fail_link.get()
    }

    fn get_program_info_log(&self, program: u32) -> String {
        if self.fail_link.get() {
            format!("program {program}: interface mismatch")
        } else {
            String::new()
        }
    }

    fn delete_program(&self, program: u32) {
        self.program_shaders.borrow_mut().remove(&program);
        self.record(GlCall::DeleteProgram(program));
    }

    fn use_program(&self, program: Option<u32>) {
        self.record(GlCall::UseProgram(program));
    }

    /// A block exists when any attached stage declares `uniform <name>`.
    fn get_uniform_block_index(&self, program: u32, name: &str) -> Option<u32> {
        let needle = format!("uniform {name}");
        let sources = self.shader_sources.borrow();
        let shaders = self.program_shaders.borrow();
        shaders
            .get(&program)?
            .iter()
            .filter_map(|shader| sources.get(shader))
            .any(|source| source.lines().any(|line| line.trim_start().starts_with(&needle)))
            .then_some(0)
    }

    fn uniform_block_binding(&self, program: u32, index: u32, binding: u32) {
        self.record(GlCall::UniformBlockBinding {
            program,
            index,
            binding,
        });
    }

    fn get_uniform_location(&self, program: u32, name: &str) -> Option<u32> {
        let needle = format!(" {name};");
        let sources = self.shader_sources.borrow();
        let shaders = self.program_shaders.borrow();
        shaders
            .get(&program)?
            .iter()
            .filter_map(|shader| sources.get(shader))
            .any(|source| source.contains(&needle))
            .then_some(program * 100)
    }

    fn uniform_1_i32(&self, location: Option<&u32>, value: i32) {
        self.record(GlCall::Uniform1i {
            location: location.copied(),
            value,
        });
    }

    fn create_vertex_array(&self) -> Result<u32, String> {
        let id = self.allocate("vertex array")?;
        self.record(GlCall::CreateVertexArray(id));
        Ok(id)
    }

    fn delete_vertex_array(&self, vertex_array: u32) {
        self.record(GlCall::DeleteVertexArray(vertex_array));
    }

    fn bind_vertex_array(&self, vertex_array: Option<u32>) {
        self.bound_vertex_array.set(vertex_array);
        self.record(GlCall::BindVertexArray(vertex_array));
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        self.record(GlCall::EnableVertexAttribArray(index));
    }

    fn vertex_attrib_pointer_f32(&self, index: u32, size: i32, stride: i32, offset: i32) {
        self.record(GlCall::VertexAttribPointer {
            index,
            size,
            stride,
            offset,
        });
    }

    fn create_texture(&self) -> Result<u32, String> {
        let id = self.allocate("texture")?;
        self.textures.borrow_mut().insert(id, NullTexture::default());
        self.record(GlCall::CreateTexture(id));
        Ok(id)
    }

    fn delete_texture(&self, texture: u32) {
        self.textures.borrow_mut().remove(&texture);
        if self.bound_texture.get() == Some(texture) {
            self.bound_texture.set(None);
        }
        self.record(GlCall::DeleteTexture(texture));
    }

    fn active_texture(&self, unit: u32) {
        self.record(GlCall::ActiveTexture(unit));
    }

    fn bind_texture(&self, target: u32, texture: Option<u32>) {
        self.bound_texture.set(texture);
        self.record(GlCall::BindTexture { target, texture });
    }

    fn tex_image_2d_rgba(&self, _target: u32, width: i32, height: i32, pixels: &[u8]) {
        let texture = self.bound_texture.get();
        let too_large = self
            .max_texture_size
            .get()
            .is_some_and(|max| width > max || height > max);
        if too_large {
            self.push_error(glow::INVALID_VALUE);
        } else if let Some(id) = texture
            && let Some(entry) = self.textures.borrow_mut().get_mut(&id)
        {
            entry.width = width;
            entry.height = height;
            entry.pixels = pixels.to_vec();
        }
        self.record(GlCall::TexImage2d {
            texture,
            width,
            height,
        });
    }

    fn tex_parameter_i32(&self, _target: u32, parameter: u32, value: i32) {
        let texture = self.bound_texture.get();
        if let Some(id) = texture
            && let Some(entry) = self.textures.borrow_mut().get_mut(&id)
        {
            entry.parameters.insert(parameter, value);
        }
        self.record(GlCall::TexParameter {
            texture,
            parameter,
            value,
        });
    }

    fn get_error(&self) -> u32 {
        self.errors
            .borrow_mut()
            .pop_front()
            .unwrap_or(glow::NO_ERROR)
    }

    fn issue_draw_elements(&self, mode: u32, count: i32) {
        self.record(GlCall::DrawElements { mode, count });
        #[cfg(test)]
        {
            if self.panic_on_draw.get() {
                panic!("draw call aborted");
            }
        }
        if let Some(code) = self.fail_draw.get() {
            self.push_error(code);
        }
    }
}
