use std::cell::Cell;
use std::rc::{Rc, Weak};

use crate::render::renderer_backends::GraphicsBackend;

/// Where a texture's pixel content stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureState {
    /// Holds the transparent 1x1 placeholder while the real image decodes.
    Pending,
    Ready { width: u32, height: u32 },
}

pub(crate) struct TextureShared<H> {
    pub(crate) handle: H,
    state: Cell<TextureState>,
    used_size: Cell<Option<[u32; 2]>>,
}

impl<H: Copy> TextureShared<H> {
    /// The only transition a texture ever makes.
    pub(crate) fn mark_ready(&self, width: u32, height: u32) {
        debug_assert_eq!(self.state.get(), TextureState::Pending);
        self.state.set(TextureState::Ready { width, height });
        self.used_size.set(None);
    }
}

/// One GPU-resident 2D image. The handle is valid, and safe to draw with,
/// from the moment the texture is returned; only its contents and size
/// change when a pending decode completes.
pub struct Texture<H> {
    shared: Rc<TextureShared<H>>,
}

impl<H: Copy> Texture<H> {
    pub(crate) fn pending(handle: H) -> Self {
        Self::with_state(handle, TextureState::Pending)
    }

    pub(crate) fn ready(handle: H, width: u32, height: u32) -> Self {
        Self::with_state(handle, TextureState::Ready { width, height })
    }

    fn with_state(handle: H, state: TextureState) -> Self {
        Self {
            shared: Rc::new(TextureShared {
                handle,
                state: Cell::new(state),
                used_size: Cell::new(None),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<TextureShared<H>> {
        Rc::downgrade(&self.shared)
    }

    pub fn handle(&self) -> H {
        self.shared.handle
    }

    pub fn state(&self) -> TextureState {
        self.shared.state.get()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state(), TextureState::Ready { .. })
    }

    /// Pixel size of the whole backing image; `[1, 1]` while pending.
    pub fn size(&self) -> [u32; 2] {
        match self.state() {
            TextureState::Pending => [1, 1],
            TextureState::Ready { width, height } => [width, height],
        }
    }

    /// Top-left region that is sampled and drawn. Defaults to [`size`](Self::size).
    pub fn used_size(&self) -> [u32; 2] {
        self.shared.used_size.get().unwrap_or_else(|| self.size())
    }

    /// Restricts drawing to the top-left `used_size` pixels. Cleared when a
    /// pending decode completes.
    pub fn set_used_size(&mut self, used_size: [u32; 2]) {
        self.shared.used_size.set(Some(used_size));
    }

    pub fn reset_used_size(&mut self) {
        self.shared.used_size.set(None);
    }

    /// Deletes the GPU texture. A decode still in flight for it is discarded.
    pub fn release<B: GraphicsBackend<Texture = H>>(self, backend: &B) {
        let handle = self.shared.handle;
        drop(self);
        backend.delete_texture(handle);
    }
}

impl<H: std::fmt::Debug> std::fmt::Debug for Texture<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("handle", &self.shared.handle)
            .field("state", &self.shared.state.get())
            .field("used_size", &self.shared.used_size.get())
            .finish()
    }
}
