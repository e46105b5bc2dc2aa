use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::mpsc;

use futures::channel::oneshot;
use image::{ImageFormat, RgbaImage};

use crate::error::{DecodeError, RenderError, Result};
use crate::render::renderer_backends::GraphicsBackend;
use crate::render::scoped_binding::ScopedTextureBinding;
use crate::render::texture::{Texture, TextureShared};

const TRANSPARENT_PIXEL: [u8; 4] = [0, 0, 0, 0];

/// Encoded image formats recognised by their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn sniff(bytes: &[u8]) -> Result<Self> {
        let Some(&[b0, b1, b2, b3]) = bytes.first_chunk::<4>() else {
            return Err(RenderError::UnknownImageFormat(bytes.to_vec()));
        };
        if u32::from_be_bytes([b0, b1, b2, b3]) == 0x8950_4E47 {
            Ok(ImageKind::Png)
        } else if u16::from_be_bytes([b0, b1]) == 0xFFD8 {
            Ok(ImageKind::Jpeg)
        } else {
            Err(RenderError::UnknownImageFormat(vec![b0, b1, b2, b3]))
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
        }
    }

    pub fn format(self) -> ImageFormat {
        match self {
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// `[width, height]` of the decoded image, or why decoding failed.
pub type DecodeOutcome = std::result::Result<[u32; 2], DecodeError>;

/// Resolves once the texture's real pixels are on the GPU. Observing it is
/// optional; dropping it does not cancel the decode.
pub type DecodeCompletion = oneshot::Receiver<DecodeOutcome>;

struct DecodedImage {
    id: u64,
    result: std::result::Result<RgbaImage, DecodeError>,
}

struct PendingUpload<H> {
    target: Weak<TextureShared<H>>,
    notify: oneshot::Sender<DecodeOutcome>,
}

/// Turns encoded image bytes into textures that are drawable immediately.
///
/// Decoding runs on the rayon pool. Uploads only ever happen inside
/// [`poll`](Self::poll) / [`finish`](Self::finish), which must be called on
/// the thread that owns the GPU context.
pub struct TextureLoader<B: GraphicsBackend> {
    backend: Rc<B>,
    next_id: u64,
    pending: HashMap<u64, PendingUpload<B::Texture>>,
    sender: mpsc::Sender<DecodedImage>,
    receiver: mpsc::Receiver<DecodedImage>,
}

impl<B: GraphicsBackend> TextureLoader<B> {
    pub fn new(backend: Rc<B>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            backend,
            next_id: 0,
            pending: HashMap::new(),
            sender,
            receiver,
        }
    }

    /// Returns a 1x1 transparent texture right away and starts decoding
    /// `bytes` into it. Unrecognised formats fail before any GPU object is
    /// created.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<(Texture<B::Texture>, DecodeCompletion)> {
        let kind = ImageKind::sniff(bytes)?;

        let handle = self.create_texture()?;
        if let Err(err) = self.upload(handle, 1, 1, &TRANSPARENT_PIXEL) {
            self.backend.delete_texture(handle);
            return Err(err);
        }
        let texture = Texture::pending(handle);

        let id = self.next_id;
        self.next_id += 1;
        let (notify, completion) = oneshot::channel();
        self.pending.insert(
            id,
            PendingUpload {
                target: texture.downgrade(),
                notify,
            },
        );

        log::debug!(
            "Decoding {} ({} bytes) into texture {:?}",
            kind.mime(),
            bytes.len(),
            handle
        );

        let sender = self.sender.clone();
        let bytes = bytes.to_vec();
        let format = kind.format();
        rayon::spawn(move || {
            let decoded = panic::catch_unwind(AssertUnwindSafe(|| {
                image::load_from_memory_with_format(&bytes, format).map(|image| image.to_rgba8())
            }));
            let result = match decoded {
                Ok(Ok(image)) => Ok(image),
                Ok(Err(err)) => Err(DecodeError::Image(err)),
                Err(_) => Err(DecodeError::WorkerLost),
            };
            // The loader may already be gone.
            let _ = sender.send(DecodedImage { id, result });
        });

        Ok((texture, completion))
    }

    /// Creates a ready texture from tightly packed RGBA8 pixels.
    pub fn from_rgba(&self, width: u32, height: u32, pixels: &[u8]) -> Result<Texture<B::Texture>> {
        let expected = usize::try_from(width)
            .ok()
            .zip(usize::try_from(height).ok())
            .and_then(|(w, h)| w.checked_mul(h)?.checked_mul(4))
            .ok_or(RenderError::InvalidDimensions { width, height })?;
        if pixels.len() != expected {
            return Err(RenderError::InvalidPixelData {
                expected,
                actual: pixels.len(),
            });
        }
        let handle = self.create_texture()?;
        if let Err(err) = self.upload(handle, width, height, pixels) {
            self.backend.delete_texture(handle);
            return Err(err);
        }
        Ok(Texture::ready(handle, width, height))
    }

    /// Uploads every decode that has finished since the last poll and
    /// resolves its completion. Returns how many were settled.
    pub fn poll(&mut self) -> usize {
        let mut settled = 0;
        while let Ok(decoded) = self.receiver.try_recv() {
            self.settle(decoded);
            settled += 1;
        }
        settled
    }

    /// Blocks until every outstanding decode has been settled.
    pub fn finish(&mut self) {
        while !self.pending.is_empty() {
            match self.receiver.recv() {
                Ok(decoded) => self.settle(decoded),
                Err(_) => break,
            }
        }
    }

    /// Number of decodes not yet settled.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn settle(&mut self, decoded: DecodedImage) {
        let Some(pending) = self.pending.remove(&decoded.id) else {
            return;
        };

        let outcome = match (decoded.result, pending.target.upgrade()) {
            (Ok(image), Some(shared)) => {
                let (width, height) = image.dimensions();
                match self.upload(shared.handle, width, height, image.as_raw()) {
                    Ok(()) => {
                        shared.mark_ready(width, height);
                        log::debug!(
                            "Texture {:?} ready at {}x{}",
                            shared.handle,
                            width,
                            height
                        );
                        Ok([width, height])
                    }
                    Err(err) => {
                        log::warn!(
                            "Texture {:?} upload of {}x{} failed: {}",
                            shared.handle,
                            width,
                            height,
                            err
                        );
                        Err(DecodeError::Upload(err))
                    }
                }
            }
            (Ok(_), None) => {
                log::debug!("Dropping decoded image for a released texture");
                Err(DecodeError::TextureReleased)
            }
            (Err(err), _) => {
                log::warn!("Texture decode failed: {}", err);
                Err(err)
            }
        };

        // Nobody has to be listening.
        let _ = pending.notify.send(outcome);
    }

    fn create_texture(&self) -> Result<B::Texture> {
        self.backend
            .create_texture()
            .map_err(|reason| RenderError::CreateObject {
                kind: "texture",
                reason,
            })
    }

    /// Replaces the texture's level 0 and sets sampling parameters. The
    /// texture is left as it was when GL rejects the pixels.
    fn upload(&self, handle: B::Texture, width: u32, height: u32, pixels: &[u8]) -> Result<()> {
        let (Ok(gl_width), Ok(gl_height)) = (i32::try_from(width), i32::try_from(height)) else {
            return Err(RenderError::InvalidDimensions { width, height });
        };
        let backend = &*self.backend;
        backend.clear_errors();
        let _bound = ScopedTextureBinding::new(backend, handle);
        backend.tex_image_2d_rgba(glow::TEXTURE_2D, gl_width, gl_height, pixels);
        match backend.get_error() {
            glow::NO_ERROR => {}
            code => return Err(RenderError::Upload { code }),
        }
        for (parameter, value) in [
            (glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE),
            (glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE),
            (glow::TEXTURE_MIN_FILTER, glow::NEAREST),
            (glow::TEXTURE_MAG_FILTER, glow::NEAREST),
        ] {
            backend.tex_parameter_i32(glow::TEXTURE_2D, parameter, value as i32);
        }
        Ok(())
    }
}
