// SPDX-License-Identifier: CEPL-1.0
//! Normalized, backend-agnostic object model shared by the runtime, the
//! depth-stencil detection engine and the backend shims.
//!
//! Handles are opaque integers minted by whichever backend owns the native
//! object; zero always means "no object". Nothing in this crate dereferences
//! a handle, all object properties go through the [`Backend`] trait.

mod events;
mod format;

pub use events::{Event, EventKind};
pub use format::Format;

use bitflags::bitflags;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
        pub struct $name(pub u64);

        impl $name {
            pub const NULL: Self = Self(0);

            #[inline]
            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

opaque_handle!(Device);
opaque_handle!(Sampler);
opaque_handle!(Resource);
opaque_handle!(ResourceView);
opaque_handle!(Pipeline);
opaque_handle!(CommandList);
opaque_handle!(CommandQueue);
opaque_handle!(SwapChain);

/// Kinds of objects the runtime tracks. Each kind has its own live-handle
/// set, so handles only need to be unique within a kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ObjectKind {
    Device,
    Sampler,
    Resource,
    ResourceView,
    Pipeline,
    CommandList,
    CommandQueue,
    SwapChain,
}

impl ObjectKind {
    pub const COUNT: usize = 8;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Native graphics API a backend shim sits in front of.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeviceApi {
    D3d9,
    D3d10,
    D3d11,
    D3d12,
    OpenGl,
    Vulkan,
}

impl DeviceApi {
    /// Whether resource memory may be aliased between distinct resources.
    /// On these APIs a live depth-stencil cannot be read back at an
    /// arbitrary later point, so a backup copy is always required.
    #[inline]
    pub fn aliased_resource_memory(self) -> bool {
        matches!(self, DeviceApi::D3d12 | DeviceApi::Vulkan)
    }
}

bitflags! {
    /// Resource bind/usage states, also used as barrier transition states.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct ResourceUsage: u32 {
        const VERTEX_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const CONSTANT_BUFFER = 0x4;
        const DEPTH_STENCIL_WRITE = 0x10;
        const DEPTH_STENCIL_READ = 0x20;
        const DEPTH_STENCIL = 0x30;
        const RENDER_TARGET = 0x40;
        const SHADER_RESOURCE = 0x80;
        const UNORDERED_ACCESS = 0x100;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const RESOLVE_DEST = 0x1000;
        const RESOLVE_SOURCE = 0x2000;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum MemoryHeap {
    #[default]
    Unknown,
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
    CpuOnly,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ResourceType {
    #[default]
    Unknown,
    Buffer,
    Texture1d,
    Texture2d,
    Texture3d,
    Surface,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ResourceDesc {
    pub ty: ResourceType,
    pub width: u32,
    pub height: u32,
    pub depth_or_layers: u16,
    pub levels: u16,
    pub format: Format,
    pub samples: u16,
    pub heap: MemoryHeap,
    pub usage: ResourceUsage,
}

impl ResourceDesc {
    pub fn tex2d(width: u32, height: u32, format: Format, usage: ResourceUsage) -> Self {
        ResourceDesc {
            ty: ResourceType::Texture2d,
            width,
            height,
            depth_or_layers: 1,
            levels: 1,
            format,
            samples: 1,
            heap: MemoryHeap::GpuOnly,
            usage,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ResourceViewType {
    #[default]
    Unknown,
    Buffer,
    Texture1d,
    Texture2d,
    Texture2dArray,
    Texture3d,
    TextureCube,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ResourceViewDesc {
    pub ty: ResourceViewType,
    pub format: Format,
    pub first_level: u32,
    pub level_count: u32,
    pub first_layer: u32,
    pub layer_count: u32,
}

impl ResourceViewDesc {
    /// Two-dimensional view of the first level and layer, the shape every
    /// readable depth view in this project uses.
    pub fn texture_2d(format: Format) -> Self {
        ResourceViewDesc {
            ty: ResourceViewType::Texture2d,
            format,
            first_level: 0,
            level_count: 1,
            first_layer: 0,
            layer_count: 1,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Command type of an indirect draw/dispatch when the backend can tell.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum IndirectCommand {
    #[default]
    Unknown,
    Draw,
    DrawIndexed,
    Dispatch,
}

/// The narrow seam between the core and a per-API shim. All methods are
/// callable from any thread the host issues graphics calls on.
///
/// Creation methods return `None` on failure; the callers degrade to "no
/// depth-stencil available" rather than propagating an error.
pub trait Backend: Send + Sync {
    fn api(&self) -> DeviceApi;

    fn resource_desc(&self, resource: Resource) -> Option<ResourceDesc>;
    fn resource_from_view(&self, view: ResourceView) -> Option<Resource>;

    fn create_resource(&self, desc: &ResourceDesc, initial_state: ResourceUsage)
        -> Option<Resource>;
    fn destroy_resource(&self, resource: Resource);

    fn create_resource_view(
        &self,
        resource: Resource,
        usage_type: ResourceUsage,
        desc: &ResourceViewDesc,
    ) -> Option<ResourceView>;
    fn destroy_resource_view(&self, view: ResourceView);

    /// Output dimensions of the swap chain the selection is matched against.
    fn frame_dimensions(&self, swap_chain: SwapChain) -> Option<(u32, u32)>;

    /// Command list that records directly onto the queue.
    fn immediate_command_list(&self, queue: CommandQueue) -> Option<CommandList>;

    fn copy_resource(&self, list: CommandList, source: Resource, dest: Resource);
    fn barrier(
        &self,
        list: CommandList,
        resource: Resource,
        old_usage: ResourceUsage,
        new_usage: ResourceUsage,
    );

    /// Blocks until all work submitted to the queue has retired. The one
    /// deliberate stall in the system, used before destroying objects that
    /// may still be referenced by in-flight command lists.
    fn wait_idle(&self, queue: CommandQueue);
}
