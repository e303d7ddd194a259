// SPDX-License-Identifier: CEPL-1.0
//! Texture format subset and the typeless/typed translations the depth
//! detection needs when turning a depth-stencil into something shaders can
//! sample.

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Format {
    #[default]
    Unknown,

    R16Typeless,
    R16Unorm,
    D16Unorm,

    R24G8Typeless,
    R24UnormX8Uint,
    D24UnormS8Uint,

    R32Typeless,
    R32Float,
    D32Float,

    R32G8X24Typeless,
    R32FloatX8X24Typeless,
    D32FloatS8Uint,

    // D3D9 vendor format for sampling a depth surface
    Intz,

    R8G8B8A8Typeless,
    R8G8B8A8Unorm,
    B8G8R8A8Unorm,
}

impl Format {
    /// Typeless equivalent, or the format itself if it has none.
    pub fn to_typeless(self) -> Format {
        use Format::*;
        match self {
            R16Unorm | D16Unorm => R16Typeless,
            R24UnormX8Uint | D24UnormS8Uint => R24G8Typeless,
            R32Float | D32Float => R32Typeless,
            R32FloatX8X24Typeless | D32FloatS8Uint => R32G8X24Typeless,
            R8G8B8A8Unorm => R8G8B8A8Typeless,
            other => other,
        }
    }

    /// Default shader-readable interpretation of a (typeless) format.
    pub fn to_default_typed(self) -> Format {
        use Format::*;
        match self {
            R16Typeless | D16Unorm => R16Unorm,
            R24G8Typeless | D24UnormS8Uint => R24UnormX8Uint,
            R32Typeless | D32Float => R32Float,
            R32G8X24Typeless | D32FloatS8Uint => R32FloatX8X24Typeless,
            R8G8B8A8Typeless => R8G8B8A8Unorm,
            other => other,
        }
    }

    /// Depth-stencil interpretation of a (typeless) format.
    pub fn to_depth_stencil_typed(self) -> Format {
        use Format::*;
        match self {
            R16Typeless | R16Unorm => D16Unorm,
            R24G8Typeless | R24UnormX8Uint => D24UnormS8Uint,
            R32Typeless | R32Float => D32Float,
            R32G8X24Typeless | R32FloatX8X24Typeless => D32FloatS8Uint,
            other => other,
        }
    }

    pub fn has_depth(self) -> bool {
        use Format::*;
        matches!(self, D16Unorm | D24UnormS8Uint | D32Float | D32FloatS8Uint | Intz)
    }
}

#[cfg(test)]
mod tests {
    use super::Format;

    #[test]
    fn depth_formats_round_trip_through_typeless() {
        for fmt in [
            Format::D16Unorm,
            Format::D24UnormS8Uint,
            Format::D32Float,
            Format::D32FloatS8Uint,
        ] {
            let typeless = fmt.to_typeless();
            assert_ne!(typeless, fmt);
            assert_eq!(typeless.to_depth_stencil_typed(), fmt);
            assert!(typeless.to_default_typed().to_typeless() == typeless);
        }
    }

    #[test]
    fn typed_formats_are_fixed_points() {
        assert_eq!(Format::R32Float.to_default_typed(), Format::R32Float);
        assert_eq!(Format::Intz.to_typeless(), Format::Intz);
        assert_eq!(Format::Unknown.to_default_typed(), Format::Unknown);
    }
}
