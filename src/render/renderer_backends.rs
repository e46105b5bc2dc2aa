use std::fmt::Debug;

use glow::{Context as GlowContext, HasContext};

use crate::error::RenderError;

/// The slice of an OpenGL ES 3.0 / WebGL2 context that the sprite renderer
/// consumes. Enum arguments are raw GL constants from `glow`.
pub trait GraphicsBackend {
    type Buffer: Copy + Debug + PartialEq;
    type Texture: Copy + Debug + PartialEq;
    type Shader: Copy + Debug + PartialEq;
    type Program: Copy + Debug + PartialEq;
    type VertexArray: Copy + Debug + PartialEq;
    type UniformLocation: Debug;

    fn create_buffer(&self) -> Result<Self::Buffer, String>;
    fn delete_buffer(&self, buffer: Self::Buffer);
    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>);
    fn bind_buffer_base(&self, target: u32, index: u32, buffer: Option<Self::Buffer>);
    fn buffer_data_size(&self, target: u32, size: i32, usage: u32);
    fn buffer_data_u8_slice(&self, target: u32, data: &[u8], usage: u32);
    fn buffer_sub_data_u8_slice(&self, target: u32, offset: i32, data: &[u8]);

    fn create_shader(&self, shader_type: u32) -> Result<Self::Shader, String>;
    fn shader_source(&self, shader: Self::Shader, source: &str);
    fn compile_shader(&self, shader: Self::Shader);
    fn get_shader_compile_status(&self, shader: Self::Shader) -> bool;
    fn get_shader_info_log(&self, shader: Self::Shader) -> String;
    fn delete_shader(&self, shader: Self::Shader);

    fn create_program(&self) -> Result<Self::Program, String>;
    fn attach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn link_program(&self, program: Self::Program);
    fn get_program_link_status(&self, program: Self::Program) -> bool;
    fn get_program_info_log(&self, program: Self::Program) -> String;
    fn delete_program(&self, program: Self::Program);
    fn use_program(&self, program: Option<Self::Program>);

    fn get_uniform_block_index(&self, program: Self::Program, name: &str) -> Option<u32>;
    fn uniform_block_binding(&self, program: Self::Program, index: u32, binding: u32);
    fn get_uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;
    fn uniform_1_i32(&self, location: Option<&Self::UniformLocation>, x: i32);

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String>;
    fn delete_vertex_array(&self, vertex_array: Self::VertexArray);
    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>);
    fn enable_vertex_attrib_array(&self, index: u32);
    fn vertex_attrib_pointer_f32(&self, index: u32, size: i32, stride: i32, offset: i32);

    fn create_texture(&self) -> Result<Self::Texture, String>;
    fn delete_texture(&self, texture: Self::Texture);
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>);
    /// Uploads tightly packed RGBA8 pixels to level 0 of the bound texture.
    fn tex_image_2d_rgba(&self, target: u32, width: i32, height: i32, pixels: &[u8]);
    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32);

    /// Pops the oldest pending GL error flag, `glow::NO_ERROR` when none is set.
    fn get_error(&self) -> u32;

    /// Issues an indexed triangle draw with `u16` indices from the bound
    /// element buffer. Errors are left in the GL error flags.
    fn issue_draw_elements(&self, mode: u32, count: i32);

    /// Discards error flags raised by earlier calls. Returns how many were set.
    fn clear_errors(&self) -> usize {
        let mut cleared = 0;
        // A lost context can keep reporting; GL defines a handful of flags at most.
        while cleared < MAX_PENDING_ERRORS && self.get_error() != glow::NO_ERROR {
            cleared += 1;
        }
        if cleared > 0 {
            log::debug!("Discarded {} stale GL error(s)", cleared);
        }
        cleared
    }

    /// Indexed draw that reports only the error raised by the draw itself.
    fn draw_elements(&self, mode: u32, count: i32) -> Result<(), RenderError> {
        self.clear_errors();
        self.issue_draw_elements(mode, count);
        match self.get_error() {
            glow::NO_ERROR => Ok(()),
            code => Err(RenderError::Draw { code }),
        }
    }
}

const MAX_PENDING_ERRORS: usize = 16;

pub struct GlowBackend {
    gl: GlowContext,
}

impl GlowBackend {
    pub fn new(gl: GlowContext) -> Self {
        Self { gl }
    }

    pub fn gl(&self) -> &GlowContext {
        &self.gl
    }
}

// Every call below requires the wrapped context to be current on this thread.
impl GraphicsBackend for GlowBackend {
    type Buffer = glow::Buffer;
    type Texture = glow::Texture;
    type Shader = glow::Shader;
    type Program = glow::Program;
    type VertexArray = glow::VertexArray;
    type UniformLocation = glow::UniformLocation;

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        unsafe { self.gl.create_buffer() }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        unsafe { self.gl.delete_buffer(buffer) }
    }

    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>) {
        unsafe { self.gl.bind_buffer(target, buffer) }
    }

    fn bind_buffer_base(&self, target: u32, index: u32, buffer: Option<Self::Buffer>) {
        unsafe { self.gl.bind_buffer_base(target, index, buffer) }
    }

    fn buffer_data_size(&self, target: u32, size: i32, usage: u32) {
        unsafe { self.gl.buffer_data_size(target, size, usage) }
    }

    fn buffer_data_u8_slice(&self, target: u32, data: &[u8], usage: u32) {
        unsafe { self.gl.buffer_data_u8_slice(target, data, usage) }
    }

    fn buffer_sub_data_u8_slice(&self, target: u32, offset: i32, data: &[u8]) {
        unsafe { self.gl.buffer_sub_data_u8_slice(target, offset, data) }
    }

    fn create_shader(&self, shader_type: u32) -> Result<Self::Shader, String> {
        unsafe { self.gl.create_shader(shader_type) }
    }

    fn shader_source(&self, shader: Self::Shader, source: &str) {
        unsafe { self.gl.shader_source(shader, source) }
    }

    fn compile_shader(&self, shader: Self::Shader) {
        unsafe { self.gl.compile_shader(shader) }
    }

    fn get_shader_compile_status(&self, shader: Self::Shader) -> bool {
        unsafe { self.gl.get_shader_compile_status(shader) }
    }

    fn get_shader_info_log(&self, shader: Self::Shader) -> String {
        unsafe { self.gl.get_shader_info_log(shader) }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        unsafe { self.gl.delete_shader(shader) }
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        unsafe { self.gl.create_program() }
    }

    fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.attach_shader(program, shader) }
    }

    fn link_program(&self, program: Self::Program) {
        unsafe { self.gl.link_program(program) }
    }

    fn get_program_link_status(&self, program: Self::Program) -> bool {
        unsafe { self.gl.get_program_link_status(program) }
    }

    fn get_program_info_log(&self, program: Self::Program) -> String {
        unsafe { self.gl.get_program_info_log(program) }
    }

    fn delete_program(&self, program: Self::Program) {
        unsafe { self.gl.delete_program(program) }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        unsafe { self.gl.use_program(program) }
    }

    fn get_uniform_block_index(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { self.gl.get_uniform_block_index(program, name) }
    }

    fn uniform_block_binding(&self, program: Self::Program, index: u32, binding: u32) {
        unsafe { self.gl.uniform_block_binding(program, index, binding) }
    }

    fn get_uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn uniform_1_i32(&self, location: Option<&Self::UniformLocation>, x: i32) {
        unsafe { self.gl.uniform_1_i32(location, x) }
    }

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
        unsafe { self.gl.create_vertex_array() }
    }

    fn delete_vertex_array(&self, vertex_array: Self::VertexArray) {
        unsafe { self.gl.delete_vertex_array(vertex_array) }
    }

    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        unsafe { self.gl.bind_vertex_array(vertex_array) }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn vertex_attrib_pointer_f32(&self, index: u32, size: i32, stride: i32, offset: i32) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index, size, glow::FLOAT, false, stride, offset)
        }
    }

    fn create_texture(&self) -> Result<Self::Texture, String> {
        unsafe { self.gl.create_texture() }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(unit) }
    }

    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>) {
        unsafe { self.gl.bind_texture(target, texture) }
    }

    fn tex_image_2d_rgba(&self, target: u32, width: i32, height: i32, pixels: &[u8]) {
        unsafe {
            self.gl.tex_image_2d(
                target,
                0,
                glow::RGBA as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(pixels)),
            );
        }
    }

    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32) {
        unsafe { self.gl.tex_parameter_i32(target, parameter, value) }
    }

    fn get_error(&self) -> u32 {
        unsafe { self.gl.get_error() }
    }

    fn issue_draw_elements(&self, mode: u32, count: i32) {
        unsafe { self.gl.draw_elements(mode, count, glow::UNSIGNED_SHORT, 0) }
    }
}
