use crate::render::renderer_backends::GraphicsBackend;

/// Binds an object for the lifetime of the guard and restores the unbound
/// state on drop, including when the scope is left through `?` or a panic.
macro_rules! define_scoped_binding {
    (struct $binding_ty_name:ident => $handle:ident, $binding_fn:ident $(, $target_name:path)?) => {
        pub(crate) struct $binding_ty_name<'a, B: GraphicsBackend> {
            backend: &'a B,
        }

        impl<'a, B: GraphicsBackend> $binding_ty_name<'a, B> {
            pub(crate) fn new(backend: &'a B, new_binding: B::$handle) -> Self {
                backend.$binding_fn($($target_name,)? Some(new_binding));
                Self { backend }
            }
        }

        impl<B: GraphicsBackend> Drop for $binding_ty_name<'_, B> {
            fn drop(&mut self) {
                self.backend.$binding_fn($($target_name,)? None);
            }
        }
    };
}

define_scoped_binding!(struct ScopedVertexArrayBinding => VertexArray, bind_vertex_array);
define_scoped_binding!(struct ScopedTextureBinding => Texture, bind_texture, glow::TEXTURE_2D);
