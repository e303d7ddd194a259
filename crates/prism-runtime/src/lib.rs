// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Interception runtime: ties a backend shim to the handle registry, the
//! per-object extension store and the event bus, and exposes one entry point
//! per normalized event for the shim to call.

mod bus;
mod extensions;
mod registry;

pub use bus::{CallbackToken, EventBus, EventCallback};
pub use extensions::ExtensionStore;
pub use registry::HandleRegistry;

use prism_api::{
    Backend, CommandList, CommandQueue, Device, Event, EventKind, IndirectCommand, ObjectKind,
    Pipeline, Rect, Resource, ResourceDesc, ResourceUsage, ResourceView, ResourceViewDesc,
    Sampler, SwapChain, Viewport,
};
use prism_core::Config;
use std::sync::Arc;
use tracing::error;

/// One runtime per device. Created by the backend shim at device init, shared
/// by every thread the host records on.
pub struct Runtime {
    backend: Arc<dyn Backend>,
    config: Config,
    registry: HandleRegistry,
    extensions: ExtensionStore,
    events: EventBus,
}

impl Runtime {
    pub fn new(backend: Arc<dyn Backend>, config: Config) -> Self {
        Runtime {
            backend,
            config,
            registry: HandleRegistry::default(),
            extensions: ExtensionStore::default(),
            events: EventBus::default(),
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub fn extensions(&self) -> &ExtensionStore {
        &self.extensions
    }

    pub fn register_event(&self, kind: EventKind, callback: EventCallback) -> CallbackToken {
        self.events.register(kind, callback)
    }

    pub fn unregister_event(&self, token: CallbackToken) {
        self.events.unregister(token)
    }

    /// Guarded dispatch: an event originating from a handle the registry does
    /// not know indicates host misuse or a shim lifetime bug. Debug builds
    /// assert; release builds skip the event to keep the host's frame intact.
    fn dispatch(&self, event: &Event<'_>) -> bool {
        if let Some((kind, handle)) = event.origin() {
            if !self.registry.is_live(kind, handle) {
                error!("{:?} event on dead {kind:?} handle {handle:#x}", event.kind());
                debug_assert!(false, "event on unregistered handle");
                return false;
            }
        }
        self.events.dispatch(self, event)
    }

    // --- object lifecycle, called by the shim ---

    pub fn init_device(&self, device: Device) {
        self.registry.register(ObjectKind::Device, device.0);
        self.dispatch(&Event::InitDevice { device });
    }

    pub fn destroy_device(&self, device: Device) {
        self.dispatch(&Event::DestroyDevice { device });
        self.extensions.purge(ObjectKind::Device, device.0);
        self.registry.unregister(ObjectKind::Device, device.0);
    }

    pub fn init_swap_chain(&self, swap_chain: SwapChain) {
        self.registry.register(ObjectKind::SwapChain, swap_chain.0);
        self.dispatch(&Event::InitSwapChain { swap_chain });
    }

    pub fn destroy_swap_chain(&self, swap_chain: SwapChain) {
        self.dispatch(&Event::DestroySwapChain { swap_chain });
        self.extensions.purge(ObjectKind::SwapChain, swap_chain.0);
        self.registry.unregister(ObjectKind::SwapChain, swap_chain.0);
    }

    pub fn init_sampler(&self, sampler: Sampler) {
        self.registry.register(ObjectKind::Sampler, sampler.0);
        self.dispatch(&Event::InitSampler { sampler });
    }

    pub fn destroy_sampler(&self, sampler: Sampler) {
        self.dispatch(&Event::DestroySampler { sampler });
        self.extensions.purge(ObjectKind::Sampler, sampler.0);
        self.registry.unregister(ObjectKind::Sampler, sampler.0);
    }

    pub fn init_pipeline(&self, pipeline: Pipeline) {
        self.registry.register(ObjectKind::Pipeline, pipeline.0);
        self.dispatch(&Event::InitPipeline { pipeline });
    }

    pub fn destroy_pipeline(&self, pipeline: Pipeline) {
        self.dispatch(&Event::DestroyPipeline { pipeline });
        self.extensions.purge(ObjectKind::Pipeline, pipeline.0);
        self.registry.unregister(ObjectKind::Pipeline, pipeline.0);
    }

    pub fn init_resource(&self, resource: Resource, desc: ResourceDesc) {
        self.registry.register(ObjectKind::Resource, resource.0);
        self.dispatch(&Event::InitResource { resource, desc });
    }

    pub fn destroy_resource(&self, resource: Resource) {
        self.dispatch(&Event::DestroyResource { resource });
        self.extensions.purge(ObjectKind::Resource, resource.0);
        self.registry.unregister(ObjectKind::Resource, resource.0);
    }

    pub fn init_resource_view(
        &self,
        view: ResourceView,
        resource: Resource,
        usage_type: ResourceUsage,
        desc: ResourceViewDesc,
    ) {
        self.registry.register(ObjectKind::ResourceView, view.0);
        self.dispatch(&Event::InitResourceView {
            view,
            resource,
            usage_type,
            desc,
        });
    }

    pub fn destroy_resource_view(&self, view: ResourceView) {
        self.dispatch(&Event::DestroyResourceView { view });
        self.extensions.purge(ObjectKind::ResourceView, view.0);
        self.registry.unregister(ObjectKind::ResourceView, view.0);
    }

    pub fn init_command_list(&self, list: CommandList) {
        self.registry.register(ObjectKind::CommandList, list.0);
        self.dispatch(&Event::InitCommandList { list });
    }

    pub fn destroy_command_list(&self, list: CommandList) {
        self.dispatch(&Event::DestroyCommandList { list });
        self.extensions.purge(ObjectKind::CommandList, list.0);
        self.registry.unregister(ObjectKind::CommandList, list.0);
    }

    pub fn init_command_queue(&self, queue: CommandQueue) {
        self.registry.register(ObjectKind::CommandQueue, queue.0);
        self.dispatch(&Event::InitCommandQueue { queue });
    }

    pub fn destroy_command_queue(&self, queue: CommandQueue) {
        self.dispatch(&Event::DestroyCommandQueue { queue });
        self.extensions.purge(ObjectKind::CommandQueue, queue.0);
        self.registry.unregister(ObjectKind::CommandQueue, queue.0);
    }

    // --- internal allocations, tracked like host objects ---

    /// Creates a resource through the backend and runs it through the same
    /// init path as host-created resources.
    pub fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_state: ResourceUsage,
    ) -> Option<Resource> {
        let resource = self.backend.create_resource(desc, initial_state)?;
        self.init_resource(resource, *desc);
        Some(resource)
    }

    pub fn release_resource(&self, resource: Resource) {
        self.destroy_resource(resource);
        self.backend.destroy_resource(resource);
    }

    pub fn create_resource_view(
        &self,
        resource: Resource,
        usage_type: ResourceUsage,
        desc: &ResourceViewDesc,
    ) -> Option<ResourceView> {
        let view = self.backend.create_resource_view(resource, usage_type, desc)?;
        self.init_resource_view(view, resource, usage_type, *desc);
        Some(view)
    }

    pub fn release_resource_view(&self, view: ResourceView) {
        self.destroy_resource_view(view);
        self.backend.destroy_resource_view(view);
    }

    // --- recording events ---

    pub fn bind_viewports(&self, list: CommandList, first: u32, viewports: &[Viewport]) {
        self.dispatch(&Event::BindViewports {
            list,
            first,
            viewports,
        });
    }

    pub fn bind_render_targets_and_depth_stencil(
        &self,
        list: CommandList,
        render_targets: &[ResourceView],
        depth_stencil: ResourceView,
    ) {
        self.dispatch(&Event::BindRenderTargetsAndDepthStencil {
            list,
            render_targets,
            depth_stencil,
        });
    }

    pub fn draw(
        &self,
        list: CommandList,
        vertices: u32,
        instances: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> bool {
        self.dispatch(&Event::Draw {
            list,
            vertices,
            instances,
            first_vertex,
            first_instance,
        })
    }

    pub fn draw_indexed(
        &self,
        list: CommandList,
        indices: u32,
        instances: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> bool {
        self.dispatch(&Event::DrawIndexed {
            list,
            indices,
            instances,
            first_index,
            vertex_offset,
            first_instance,
        })
    }

    pub fn draw_or_dispatch_indirect(
        &self,
        list: CommandList,
        command: IndirectCommand,
        buffer: Resource,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) -> bool {
        self.dispatch(&Event::DrawOrDispatchIndirect {
            list,
            command,
            buffer,
            offset,
            draw_count,
            stride,
        })
    }

    pub fn clear_depth_stencil_view(
        &self,
        list: CommandList,
        view: ResourceView,
        depth: Option<f32>,
        stencil: Option<u8>,
        rects: &[Rect],
    ) -> bool {
        self.dispatch(&Event::ClearDepthStencilView {
            list,
            view,
            depth,
            stencil,
            rects,
        })
    }

    pub fn begin_render_pass(
        &self,
        list: CommandList,
        render_targets: &[ResourceView],
        depth_stencil: ResourceView,
    ) {
        self.dispatch(&Event::BeginRenderPass {
            list,
            render_targets,
            depth_stencil,
        });
    }

    pub fn copy_resource(&self, list: CommandList, source: Resource, dest: Resource) -> bool {
        self.dispatch(&Event::CopyResource { list, source, dest })
    }

    pub fn barrier(
        &self,
        list: CommandList,
        resource: Resource,
        old_usage: ResourceUsage,
        new_usage: ResourceUsage,
    ) {
        self.dispatch(&Event::Barrier {
            list,
            resource,
            old_usage,
            new_usage,
        });
    }

    pub fn reset_command_list(&self, list: CommandList) {
        self.dispatch(&Event::ResetCommandList { list });
    }

    // --- frame events ---

    pub fn execute_command_list(&self, queue: CommandQueue, list: CommandList) {
        self.dispatch(&Event::ExecuteCommandList { queue, list });
    }

    pub fn execute_secondary_command_list(&self, list: CommandList, secondary: CommandList) {
        self.dispatch(&Event::ExecuteSecondaryCommandList { list, secondary });
    }

    pub fn present(&self, queue: CommandQueue, swap_chain: SwapChain) {
        self.dispatch(&Event::Present { queue, swap_chain });
    }
}
