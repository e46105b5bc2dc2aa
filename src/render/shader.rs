use crate::error::{RenderError, Result, ShaderStage};
use crate::render::renderer_backends::GraphicsBackend;

/// A linked vertex + fragment program.
pub struct ShaderProgram<B: GraphicsBackend> {
    pub program: B::Program,
}

impl<B: GraphicsBackend> std::fmt::Debug for ShaderProgram<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("program", &self.program)
            .finish()
    }
}

impl<B: GraphicsBackend> ShaderProgram<B> {
    pub fn build(backend: &B, vertex_src: &str, fragment_src: &str) -> Result<Self> {
        let program = backend
            .create_program()
            .map_err(|reason| RenderError::CreateObject {
                kind: "program",
                reason,
            })?;

        let mut attached = Vec::with_capacity(2);
        let result = (|| {
            for (stage, source) in [
                (ShaderStage::Vertex, vertex_src),
                (ShaderStage::Fragment, fragment_src),
            ] {
                let shader = Self::compile(backend, stage, source)?;
                backend.attach_shader(program, shader);
                attached.push(shader);
            }

            backend.link_program(program);
            if !backend.get_program_link_status(program) {
                return Err(RenderError::ProgramLink {
                    log: backend.get_program_info_log(program),
                });
            }
            Ok(())
        })();

        for shader in attached {
            backend.delete_shader(shader);
        }

        match result {
            Ok(()) => {
                log::debug!("Program linked successfully");
                Ok(Self { program })
            }
            Err(err) => {
                backend.delete_program(program);
                Err(err)
            }
        }
    }

    fn compile(backend: &B, stage: ShaderStage, source: &str) -> Result<B::Shader> {
        let shader = backend
            .create_shader(stage.gl_enum())
            .map_err(|reason| RenderError::CreateObject {
                kind: "shader",
                reason,
            })?;
        backend.shader_source(shader, source);
        backend.compile_shader(shader);
        if !backend.get_shader_compile_status(shader) {
            let log = backend.get_shader_info_log(shader);
            backend.delete_shader(shader);
            return Err(RenderError::ShaderCompile { stage, log });
        }
        Ok(shader)
    }

    /// Looks up a uniform block and points it at `binding`.
    pub fn bind_uniform_block(
        &self,
        backend: &B,
        name: &'static str,
        binding: u32,
    ) -> Result<()> {
        let index = backend
            .get_uniform_block_index(self.program, name)
            .ok_or(RenderError::MissingUniformBlock(name))?;
        backend.uniform_block_binding(self.program, index, binding);
        Ok(())
    }

    pub fn delete(self, backend: &B) {
        backend.delete_program(self.program);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::null_backend::{GlCall, NullBackend};

    const VERT: &str = "#version 300 es\nuniform block { vec2 a; };\nvoid main() {}\n";
    const FRAG: &str = "#version 300 es\nprecision mediump float;\nvoid main() {}\n";

    #[test]
    fn test_build_links_and_deletes_stages() {
        let backend = NullBackend::new();
        let shader = ShaderProgram::build(&backend, VERT, FRAG).unwrap();
        let calls = backend.calls();
        assert!(calls.contains(&GlCall::LinkProgram(shader.program)));
        let deleted = calls
            .iter()
            .filter(|call| matches!(call, GlCall::DeleteShader(_)))
            .count();
        assert_eq!(deleted, 2);
    }

    #[test]
    fn test_compile_failure_carries_log() {
        let backend = NullBackend::new();
        backend.set_fail_compile(true);
        let err = ShaderProgram::build(&backend, VERT, FRAG).unwrap_err();
        match err {
            RenderError::ShaderCompile { stage, log } => {
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(log.contains("rejected"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(
            backend
                .calls()
                .iter()
                .any(|call| matches!(call, GlCall::DeleteProgram(_)))
        );
    }

    #[test]
    fn test_link_failure() {
        let backend = NullBackend::new();
        backend.set_fail_link(true);
        let err = ShaderProgram::build(&backend, VERT, FRAG).unwrap_err();
        assert!(matches!(err, RenderError::ProgramLink { .. }));
    }

    #[test]
    fn test_create_failure() {
        let backend = NullBackend::new();
        backend.set_fail_create(true);
        let err = ShaderProgram::build(&backend, VERT, FRAG).unwrap_err();
        assert!(matches!(
            err,
            RenderError::CreateObject {
                kind: "program",
                ..
            }
        ));
    }

    #[test]
    fn test_bind_uniform_block() {
        let backend = NullBackend::new();
        let shader = ShaderProgram::build(&backend, VERT, FRAG).unwrap();
        shader.bind_uniform_block(&backend, "block", 3).unwrap();
        assert!(backend.calls().contains(&GlCall::UniformBlockBinding {
            program: shader.program,
            index: 0,
            binding: 3,
        }));
        let err = shader
            .bind_uniform_block(&backend, "missing", 3)
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingUniformBlock("missing")));
    }
}
