// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Automatic depth-stencil detection.
//!
//! Observes the normalized event stream, accounts draw workload per bound
//! depth-stencil resource and per recording context, and selects the
//! resource most likely to hold the host's main 3D scene each frame, keeping
//! a shader-readable view (and, where required, a backup copy) of it.

mod detect;
mod stats;

pub use detect::{aspect_ratio_match, better_candidate, DeviceState};
pub use stats::{ClearRecord, ContextState, DepthStencilInfo, DrawStats};

use detect::{clear_depth_impl, select_on_present};
use prism_api::{
    CommandList, CommandQueue, Device, Event, EventKind, IndirectCommand, ObjectKind, Resource,
    ResourceView, SwapChain,
};
use prism_runtime::{CallbackToken, Runtime};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Accounting attached to every command list and command queue.
#[derive(Default)]
struct ContextTracking {
    state: Mutex<ContextState>,
}

/// Selection state attached to the device.
#[derive(Default)]
struct DeviceTracking {
    state: Mutex<DeviceState>,
}

/// The published result of the detection, for downstream consumers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DepthSelection {
    pub resource: Resource,
    /// View suitable for shader reads; on the live resource where the
    /// backend allows it, on the backup texture otherwise.
    pub view: ResourceView,
}

fn device_tracking(rt: &Runtime, device: u64) -> Option<Arc<DeviceTracking>> {
    rt.extensions().get::<DeviceTracking>(ObjectKind::Device, device)
}

fn context_tracking(
    rt: &Runtime,
    kind: ObjectKind,
    handle: u64,
) -> Option<Arc<ContextTracking>> {
    rt.extensions().get::<ContextTracking>(kind, handle)
}

/// The currently selected depth-stencil and its readable view, or `None`
/// while detection has not converged (or resource creation failed this
/// frame). Re-checks the registry so a selection from the previous frame
/// whose resource has since died reads as absent.
pub fn current_selection(rt: &Runtime, device: Device) -> Option<DepthSelection> {
    let tracking = device_tracking(rt, device.0)?;
    let state = tracking.state.lock().expect("device state poisoned");
    if state.selected_depth_stencil.is_null() || state.selected_shader_resource.is_null() {
        return None;
    }
    if !rt
        .registry()
        .is_live(ObjectKind::Resource, state.selected_depth_stencil.0)
    {
        return None;
    }
    Some(DepthSelection {
        resource: state.selected_depth_stencil,
        view: state.selected_shader_resource,
    })
}

/// All depth-stencil resources seen last frame with their final counters.
pub fn frame_candidates(rt: &Runtime, device: Device) -> Vec<(Resource, DepthStencilInfo)> {
    match device_tracking(rt, device.0) {
        Some(tracking) => tracking
            .state
            .lock()
            .expect("device state poisoned")
            .frame_candidates
            .clone(),
        None => Vec::new(),
    }
}

/// Final since-last-clear stats of last frame's winner.
pub fn previous_frame_stats(rt: &Runtime, device: Device) -> Option<DrawStats> {
    let tracking = device_tracking(rt, device.0)?;
    let stats = tracking.state.lock().expect("device state poisoned").previous_stats;
    Some(stats)
}

/// Pins the selection to a specific resource (escape hatch for a bad
/// automatic choice); `None` returns to automatic detection. Takes effect at
/// the next present.
pub fn set_override_depth_stencil(rt: &Runtime, device: Device, resource: Option<Resource>) {
    if let Some(tracking) = device_tracking(rt, device.0) {
        tracking
            .state
            .lock()
            .expect("device state poisoned")
            .override_depth_stencil = resource.unwrap_or(Resource::NULL);
    }
}

fn on_init_device(rt: &Runtime, device: Device) {
    if let Some(tracking) = rt.extensions().attach::<DeviceTracking>(ObjectKind::Device, device.0)
    {
        let cfg = rt.config().depth;
        let mut state = tracking.state.lock().expect("device state poisoned");
        state.preserve_depth_buffers = cfg.copy_before_clears;
        state.use_aspect_ratio_heuristics = cfg.use_aspect_ratio_heuristics;
        state.force_clear_index = if cfg.copy_at_clear_index == u32::MAX {
            0
        } else {
            cfg.copy_at_clear_index
        };
    }
}

fn on_destroy_device(rt: &Runtime, device: Device) {
    let Some(tracking) = device_tracking(rt, device.0) else {
        return;
    };
    let (backup, view) = {
        let mut state = tracking.state.lock().expect("device state poisoned");
        (
            std::mem::replace(&mut state.backup_texture, Resource::NULL),
            std::mem::replace(&mut state.selected_shader_resource, ResourceView::NULL),
        )
    };
    if !view.is_null() {
        rt.release_resource_view(view);
    }
    if !backup.is_null() {
        rt.release_resource(backup);
    }
    rt.extensions().detach::<DeviceTracking>(ObjectKind::Device, device.0);
}

fn on_bind_depth_stencil(rt: &Runtime, device: u64, list: CommandList, view: ResourceView) {
    let resolved = if view.is_null() {
        Resource::NULL
    } else {
        rt.backend().resource_from_view(view).unwrap_or(Resource::NULL)
    };

    let Some(ctx) = context_tracking(rt, ObjectKind::CommandList, list.0) else {
        return;
    };
    let mut state = ctx.state.lock().expect("context state poisoned");

    // On aliasing backends the outgoing depth-stencil's memory may belong to
    // another resource by present time, so flush a backup now
    if resolved != state.current_depth_stencil
        && !state.current_depth_stencil.is_null()
        && rt.backend().api().aliased_resource_memory()
    {
        if let Some(dev) = device_tracking(rt, device) {
            let device_state = dev.state.lock().expect("device state poisoned");
            let outgoing = state.current_depth_stencil;
            clear_depth_impl(rt, list, &mut state, &device_state, outgoing, true);
        }
    }

    state.current_depth_stencil = resolved;
}

fn on_draw(rt: &Runtime, list: CommandList, vertices: u32, instances: u32) {
    let Some(ctx) = context_tracking(rt, ObjectKind::CommandList, list.0) else {
        return;
    };
    let mut state = ctx.state.lock().expect("context state poisoned");
    if state.current_depth_stencil.is_null() {
        return;
    }

    let viewport = state.current_viewport;
    let depth_stencil = state.current_depth_stencil;
    let counters = state.counters.entry(depth_stencil).or_default();
    let vertex_count = vertices as u64 * instances as u64;
    counters.total_stats.vertices += vertex_count;
    counters.total_stats.draw_calls += 1;
    counters.current_stats.vertices += vertex_count;
    counters.current_stats.draw_calls += 1;
    counters.current_stats.last_viewport = viewport;
}

fn on_draw_indirect(rt: &Runtime, list: CommandList, command: IndirectCommand, draw_count: u32) {
    if command == IndirectCommand::Dispatch {
        return;
    }
    let Some(ctx) = context_tracking(rt, ObjectKind::CommandList, list.0) else {
        return;
    };
    let mut state = ctx.state.lock().expect("context state poisoned");
    if state.current_depth_stencil.is_null() {
        return;
    }

    let viewport = state.current_viewport;
    let depth_stencil = state.current_depth_stencil;
    let counters = state.counters.entry(depth_stencil).or_default();
    counters.total_stats.draw_calls += draw_count;
    counters.total_stats.indirect_draw_calls += draw_count;
    counters.current_stats.draw_calls += draw_count;
    counters.current_stats.indirect_draw_calls += draw_count;
    counters.current_stats.last_viewport = viewport;
}

fn on_clear_depth_stencil(
    rt: &Runtime,
    device: u64,
    list: CommandList,
    view: ResourceView,
    depth: Option<f32>,
) {
    // Stencil-only clears do not invalidate the depth data
    if depth.is_none() {
        return;
    }
    let Some(dev) = device_tracking(rt, device) else {
        return;
    };
    let Some(ctx) = context_tracking(rt, ObjectKind::CommandList, list.0) else {
        return;
    };
    let mut state = ctx.state.lock().expect("context state poisoned");
    let device_state = dev.state.lock().expect("device state poisoned");
    if !device_state.preserve_depth_buffers {
        return;
    }
    let Some(resource) = rt.backend().resource_from_view(view) else {
        return;
    };
    clear_depth_impl(rt, list, &mut state, &device_state, resource, false);
}

fn on_execute(rt: &Runtime, target_kind: ObjectKind, target: u64, source: CommandList) {
    let Some(source_ctx) = context_tracking(rt, ObjectKind::CommandList, source.0) else {
        return;
    };
    let snapshot = source_ctx
        .state
        .lock()
        .expect("context state poisoned")
        .clone();
    let Some(target_ctx) = context_tracking(rt, target_kind, target) else {
        return;
    };
    target_ctx
        .state
        .lock()
        .expect("context state poisoned")
        .merge(&snapshot);
}

fn on_present(rt: &Runtime, device: u64, queue: CommandQueue, swap_chain: SwapChain) {
    let Some(ctx) = context_tracking(rt, ObjectKind::CommandQueue, queue.0) else {
        return;
    };
    let Some(dev) = device_tracking(rt, device) else {
        return;
    };
    let mut queue_state = ctx.state.lock().expect("context state poisoned");
    let mut device_state = dev.state.lock().expect("device state poisoned");
    select_on_present(rt, &mut queue_state, &mut device_state, queue, swap_chain);
}

/// Registered callbacks of the detection engine. Dropping the tracker does
/// not unregister; call [`unregister`](Self::unregister) while the runtime
/// is quiescent.
pub struct DepthTracker {
    tokens: Vec<CallbackToken>,
}

impl DepthTracker {
    pub fn register(rt: &Runtime) -> DepthTracker {
        let device = Arc::new(AtomicU64::new(0));
        let mut tokens = Vec::new();

        {
            let device = device.clone();
            tokens.push(rt.register_event(
                EventKind::InitDevice,
                Arc::new(move |rt, event| {
                    if let Event::InitDevice { device: handle } = *event {
                        device.store(handle.0, Ordering::Release);
                        on_init_device(rt, handle);
                    }
                    false
                }),
            ));
        }
        tokens.push(rt.register_event(
            EventKind::DestroyDevice,
            Arc::new(|rt, event| {
                if let Event::DestroyDevice { device } = *event {
                    on_destroy_device(rt, device);
                }
                false
            }),
        ));

        tokens.push(rt.register_event(
            EventKind::InitCommandList,
            Arc::new(|rt, event| {
                if let Event::InitCommandList { list } = *event {
                    rt.extensions()
                        .attach::<ContextTracking>(ObjectKind::CommandList, list.0);
                }
                false
            }),
        ));
        tokens.push(rt.register_event(
            EventKind::DestroyCommandList,
            Arc::new(|rt, event| {
                if let Event::DestroyCommandList { list } = *event {
                    rt.extensions()
                        .detach::<ContextTracking>(ObjectKind::CommandList, list.0);
                }
                false
            }),
        ));
        tokens.push(rt.register_event(
            EventKind::InitCommandQueue,
            Arc::new(|rt, event| {
                if let Event::InitCommandQueue { queue } = *event {
                    rt.extensions()
                        .attach::<ContextTracking>(ObjectKind::CommandQueue, queue.0);
                }
                false
            }),
        ));
        tokens.push(rt.register_event(
            EventKind::DestroyCommandQueue,
            Arc::new(|rt, event| {
                if let Event::DestroyCommandQueue { queue } = *event {
                    rt.extensions()
                        .detach::<ContextTracking>(ObjectKind::CommandQueue, queue.0);
                }
                false
            }),
        ));

        tokens.push(rt.register_event(
            EventKind::BindViewports,
            Arc::new(|rt, event| {
                if let Event::BindViewports {
                    list,
                    first,
                    viewports,
                } = *event
                {
                    // Only the main viewport matters for the heuristic
                    if first == 0 && !viewports.is_empty() {
                        if let Some(ctx) = context_tracking(rt, ObjectKind::CommandList, list.0) {
                            ctx.state
                                .lock()
                                .expect("context state poisoned")
                                .current_viewport = viewports[0];
                        }
                    }
                }
                false
            }),
        ));

        {
            let device = device.clone();
            tokens.push(rt.register_event(
                EventKind::BindRenderTargetsAndDepthStencil,
                Arc::new(move |rt, event| {
                    if let Event::BindRenderTargetsAndDepthStencil {
                        list,
                        depth_stencil,
                        ..
                    } = *event
                    {
                        on_bind_depth_stencil(
                            rt,
                            device.load(Ordering::Acquire),
                            list,
                            depth_stencil,
                        );
                    }
                    false
                }),
            ));
        }
        {
            let device = device.clone();
            tokens.push(rt.register_event(
                EventKind::BeginRenderPass,
                Arc::new(move |rt, event| {
                    if let Event::BeginRenderPass {
                        list,
                        depth_stencil,
                        ..
                    } = *event
                    {
                        on_bind_depth_stencil(
                            rt,
                            device.load(Ordering::Acquire),
                            list,
                            depth_stencil,
                        );
                    }
                    false
                }),
            ));
        }

        tokens.push(rt.register_event(
            EventKind::Draw,
            Arc::new(|rt, event| {
                if let Event::Draw {
                    list,
                    vertices,
                    instances,
                    ..
                } = *event
                {
                    on_draw(rt, list, vertices, instances);
                }
                false
            }),
        ));
        tokens.push(rt.register_event(
            EventKind::DrawIndexed,
            Arc::new(|rt, event| {
                if let Event::DrawIndexed {
                    list,
                    indices,
                    instances,
                    ..
                } = *event
                {
                    on_draw(rt, list, indices, instances);
                }
                false
            }),
        ));
        tokens.push(rt.register_event(
            EventKind::DrawOrDispatchIndirect,
            Arc::new(|rt, event| {
                if let Event::DrawOrDispatchIndirect {
                    list,
                    command,
                    draw_count,
                    ..
                } = *event
                {
                    on_draw_indirect(rt, list, command, draw_count);
                }
                false
            }),
        ));

        {
            let device = device.clone();
            tokens.push(rt.register_event(
                EventKind::ClearDepthStencilView,
                Arc::new(move |rt, event| {
                    if let Event::ClearDepthStencilView {
                        list, view, depth, ..
                    } = *event
                    {
                        on_clear_depth_stencil(
                            rt,
                            device.load(Ordering::Acquire),
                            list,
                            view,
                            depth,
                        );
                    }
                    false
                }),
            ));
        }

        tokens.push(rt.register_event(
            EventKind::ResetCommandList,
            Arc::new(|rt, event| {
                if let Event::ResetCommandList { list } = *event {
                    if let Some(ctx) = context_tracking(rt, ObjectKind::CommandList, list.0) {
                        ctx.state.lock().expect("context state poisoned").reset();
                    }
                }
                false
            }),
        ));

        tokens.push(rt.register_event(
            EventKind::ExecuteCommandList,
            Arc::new(|rt, event| {
                if let Event::ExecuteCommandList { queue, list } = *event {
                    on_execute(rt, ObjectKind::CommandQueue, queue.0, list);
                }
                false
            }),
        ));
        tokens.push(rt.register_event(
            EventKind::ExecuteSecondaryCommandList,
            Arc::new(|rt, event| {
                if let Event::ExecuteSecondaryCommandList { list, secondary } = *event {
                    on_execute(rt, ObjectKind::CommandList, list.0, secondary);
                }
                false
            }),
        ));

        {
            let device = device.clone();
            tokens.push(rt.register_event(
                EventKind::Present,
                Arc::new(move |rt, event| {
                    if let Event::Present { queue, swap_chain } = *event {
                        on_present(rt, device.load(Ordering::Acquire), queue, swap_chain);
                    }
                    false
                }),
            ));
        }

        DepthTracker { tokens }
    }

    pub fn unregister(self, rt: &Runtime) {
        for token in self.tokens {
            rt.unregister_event(token);
        }
    }
}
