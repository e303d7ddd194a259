// SPDX-License-Identifier: CEPL-1.0
//! Normalized event stream fired by the backend shims.
//!
//! Notification events inform listeners after the fact. Filter events run
//! before the native operation; if any listener reports the event as handled
//! the shim suppresses the original call. See [`EventKind::is_filter`].

use crate::{
    CommandList, CommandQueue, Device, IndirectCommand, ObjectKind, Pipeline, Rect, Resource,
    ResourceDesc, ResourceUsage, ResourceView, ResourceViewDesc, Sampler, SwapChain, Viewport,
};

#[derive(Debug)]
pub enum Event<'a> {
    // Object lifecycle
    InitDevice { device: Device },
    DestroyDevice { device: Device },
    InitSwapChain { swap_chain: SwapChain },
    DestroySwapChain { swap_chain: SwapChain },
    InitSampler { sampler: Sampler },
    DestroySampler { sampler: Sampler },
    InitPipeline { pipeline: Pipeline },
    DestroyPipeline { pipeline: Pipeline },
    InitResource { resource: Resource, desc: ResourceDesc },
    DestroyResource { resource: Resource },
    InitResourceView {
        view: ResourceView,
        resource: Resource,
        usage_type: ResourceUsage,
        desc: ResourceViewDesc,
    },
    DestroyResourceView { view: ResourceView },
    InitCommandList { list: CommandList },
    DestroyCommandList { list: CommandList },
    InitCommandQueue { queue: CommandQueue },
    DestroyCommandQueue { queue: CommandQueue },

    // Recording
    BindViewports {
        list: CommandList,
        first: u32,
        viewports: &'a [Viewport],
    },
    BindRenderTargetsAndDepthStencil {
        list: CommandList,
        render_targets: &'a [ResourceView],
        depth_stencil: ResourceView,
    },
    Draw {
        list: CommandList,
        vertices: u32,
        instances: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        list: CommandList,
        indices: u32,
        instances: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawOrDispatchIndirect {
        list: CommandList,
        command: IndirectCommand,
        buffer: Resource,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    ClearDepthStencilView {
        list: CommandList,
        view: ResourceView,
        depth: Option<f32>,
        stencil: Option<u8>,
        rects: &'a [Rect],
    },
    BeginRenderPass {
        list: CommandList,
        render_targets: &'a [ResourceView],
        depth_stencil: ResourceView,
    },
    CopyResource {
        list: CommandList,
        source: Resource,
        dest: Resource,
    },
    Barrier {
        list: CommandList,
        resource: Resource,
        old_usage: ResourceUsage,
        new_usage: ResourceUsage,
    },
    ResetCommandList { list: CommandList },

    // Frame
    ExecuteCommandList { queue: CommandQueue, list: CommandList },
    ExecuteSecondaryCommandList {
        list: CommandList,
        secondary: CommandList,
    },
    Present { queue: CommandQueue, swap_chain: SwapChain },
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EventKind {
    InitDevice,
    DestroyDevice,
    InitSwapChain,
    DestroySwapChain,
    InitSampler,
    DestroySampler,
    InitPipeline,
    DestroyPipeline,
    InitResource,
    DestroyResource,
    InitResourceView,
    DestroyResourceView,
    InitCommandList,
    DestroyCommandList,
    InitCommandQueue,
    DestroyCommandQueue,
    BindViewports,
    BindRenderTargetsAndDepthStencil,
    Draw,
    DrawIndexed,
    DrawOrDispatchIndirect,
    ClearDepthStencilView,
    BeginRenderPass,
    CopyResource,
    Barrier,
    ResetCommandList,
    ExecuteCommandList,
    ExecuteSecondaryCommandList,
    Present,
}

impl EventKind {
    pub const COUNT: usize = 29;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Filter events may suppress the originating native call when any
    /// listener reports them handled; notification events cannot.
    pub fn is_filter(self) -> bool {
        matches!(
            self,
            EventKind::Draw
                | EventKind::DrawIndexed
                | EventKind::DrawOrDispatchIndirect
                | EventKind::ClearDepthStencilView
                | EventKind::CopyResource
        )
    }
}

impl Event<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::InitDevice { .. } => EventKind::InitDevice,
            Event::DestroyDevice { .. } => EventKind::DestroyDevice,
            Event::InitSwapChain { .. } => EventKind::InitSwapChain,
            Event::DestroySwapChain { .. } => EventKind::DestroySwapChain,
            Event::InitSampler { .. } => EventKind::InitSampler,
            Event::DestroySampler { .. } => EventKind::DestroySampler,
            Event::InitPipeline { .. } => EventKind::InitPipeline,
            Event::DestroyPipeline { .. } => EventKind::DestroyPipeline,
            Event::InitResource { .. } => EventKind::InitResource,
            Event::DestroyResource { .. } => EventKind::DestroyResource,
            Event::InitResourceView { .. } => EventKind::InitResourceView,
            Event::DestroyResourceView { .. } => EventKind::DestroyResourceView,
            Event::InitCommandList { .. } => EventKind::InitCommandList,
            Event::DestroyCommandList { .. } => EventKind::DestroyCommandList,
            Event::InitCommandQueue { .. } => EventKind::InitCommandQueue,
            Event::DestroyCommandQueue { .. } => EventKind::DestroyCommandQueue,
            Event::BindViewports { .. } => EventKind::BindViewports,
            Event::BindRenderTargetsAndDepthStencil { .. } => {
                EventKind::BindRenderTargetsAndDepthStencil
            }
            Event::Draw { .. } => EventKind::Draw,
            Event::DrawIndexed { .. } => EventKind::DrawIndexed,
            Event::DrawOrDispatchIndirect { .. } => EventKind::DrawOrDispatchIndirect,
            Event::ClearDepthStencilView { .. } => EventKind::ClearDepthStencilView,
            Event::BeginRenderPass { .. } => EventKind::BeginRenderPass,
            Event::CopyResource { .. } => EventKind::CopyResource,
            Event::Barrier { .. } => EventKind::Barrier,
            Event::ResetCommandList { .. } => EventKind::ResetCommandList,
            Event::ExecuteCommandList { .. } => EventKind::ExecuteCommandList,
            Event::ExecuteSecondaryCommandList { .. } => EventKind::ExecuteSecondaryCommandList,
            Event::Present { .. } => EventKind::Present,
        }
    }

    /// The recording context whose liveness gates processing of this event,
    /// if there is one. Lifecycle events manage liveness themselves.
    pub fn origin(&self) -> Option<(ObjectKind, u64)> {
        match *self {
            Event::BindViewports { list, .. }
            | Event::BindRenderTargetsAndDepthStencil { list, .. }
            | Event::Draw { list, .. }
            | Event::DrawIndexed { list, .. }
            | Event::DrawOrDispatchIndirect { list, .. }
            | Event::ClearDepthStencilView { list, .. }
            | Event::BeginRenderPass { list, .. }
            | Event::CopyResource { list, .. }
            | Event::Barrier { list, .. }
            | Event::ResetCommandList { list }
            | Event::ExecuteSecondaryCommandList { list, .. } => {
                Some((ObjectKind::CommandList, list.0))
            }
            Event::ExecuteCommandList { queue, .. } | Event::Present { queue, .. } => {
                Some((ObjectKind::CommandQueue, queue.0))
            }
            _ => None,
        }
    }
}
