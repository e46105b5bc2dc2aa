use thiserror::Error;

/// Fatal failures. These abort pipeline or texture construction, or surface
/// straight out of a draw call.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to create {kind}: {reason}")]
    CreateObject { kind: &'static str, reason: String },

    #[error("{stage} shader compilation failed: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("Program linking failed: {log}")]
    ProgramLink { log: String },

    #[error("Uniform block '{0}' not found in program")]
    MissingUniformBlock(&'static str),

    #[error("Uniform '{0}' not found in program")]
    MissingUniform(&'static str),

    #[error("Unrecognized image header: {0:02x?}")]
    UnknownImageFormat(Vec<u8>),

    #[error("Expected {expected} bytes of RGBA pixel data, got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    #[error("Texture dimensions {width}x{height} are out of range")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Texture upload failed with GL error 0x{code:04x}")]
    Upload { code: u32 },

    #[error("Draw call failed with GL error 0x{code:04x}")]
    Draw { code: u32 },
}

/// Asynchronous decode failures. Only ever delivered through a
/// [`DecodeCompletion`](crate::DecodeCompletion); the placeholder texture stays usable.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Decoded image could not be uploaded: {0}")]
    Upload(RenderError),

    #[error("Decode worker exited without a result")]
    WorkerLost,

    #[error("Texture was released before decoding finished")]
    TextureReleased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn gl_enum(self) -> u32 {
        match self {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "Vertex"),
            ShaderStage::Fragment => write!(f, "Fragment"),
        }
    }
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
