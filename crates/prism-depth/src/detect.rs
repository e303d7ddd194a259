// SPDX-License-Identifier: CEPL-1.0
//! The heuristics: clear-time backup decisions and the frame-end selection
//! of the host's main depth-stencil.

use crate::stats::{ClearRecord, ContextState, DepthStencilInfo, DrawStats};
use prism_api::{
    CommandList, CommandQueue, DeviceApi, Format, MemoryHeap, ObjectKind, Resource, ResourceDesc,
    ResourceType, ResourceUsage, ResourceView, ResourceViewDesc, SwapChain,
};
use prism_runtime::Runtime;
use tracing::{debug, error};

/// Published per-device selection result plus the knobs that steer it.
/// Single writer (the present-time selector), read by downstream consumers.
#[derive(Debug)]
pub struct DeviceState {
    /// Make backup copies at clear time instead of once at present.
    pub preserve_depth_buffers: bool,
    pub use_aspect_ratio_heuristics: bool,
    /// Zero selects the copy point automatically, otherwise the N-th clear
    /// of the frame wins.
    pub force_clear_index: u32,
    /// Final since-last-clear stats of the winner last frame.
    pub previous_stats: DrawStats,
    pub backup_texture: Resource,
    pub selected_depth_stencil: Resource,
    /// Manual override; unconditionally wins while the resource is live.
    pub override_depth_stencil: Resource,
    pub selected_shader_resource: ResourceView,
    /// All depth-stencils seen last frame with their final counters.
    pub frame_candidates: Vec<(Resource, DepthStencilInfo)>,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState {
            preserve_depth_buffers: false,
            use_aspect_ratio_heuristics: true,
            force_clear_index: 0,
            previous_stats: DrawStats::default(),
            backup_texture: Resource::NULL,
            selected_depth_stencil: Resource::NULL,
            override_depth_stencil: Resource::NULL,
            selected_shader_resource: ResourceView::NULL,
            frame_candidates: Vec::new(),
        }
    }
}

/// Whether a viewport (or candidate extent) plausibly covers a surface of
/// `width`x`height`: dimension ratios similar in value or near-exact integer
/// multiples, and the aspect ratios themselves close.
pub fn aspect_ratio_match(check_width: f32, check_height: f32, width: u32, height: u32) -> bool {
    if check_width == 0.0 || check_height == 0.0 {
        return true;
    }

    let w = width as f32;
    let h = height as f32;
    let w_ratio = w / check_width;
    let h_ratio = h / check_height;
    let aspect_delta = (w / h) - (check_width / check_height);

    aspect_delta.abs() <= 0.1
        && (((0.5..=1.85).contains(&w_ratio) && (0.5..=1.85).contains(&h_ratio))
            || (w_ratio.fract() <= 0.02 && h_ratio.fract() <= 0.02))
}

/// Whether the candidate's own indirect traffic makes its vertex counter
/// untrustworthy (vertex counts of indirect draws are unknown at record
/// time).
fn indirect_heavy(stats: &DrawStats) -> bool {
    stats.draw_calls > 0 && stats.indirect_draw_calls >= stats.draw_calls / 3
}

/// Candidate ranking. Indirect-heavy candidates are ranked among themselves
/// by draw-call count and take precedence over vertex-ranked ones, since a
/// vertex comparison against an undercounted candidate is meaningless.
pub fn better_candidate(challenger: &DrawStats, best: &DrawStats) -> bool {
    match (indirect_heavy(challenger), indirect_heavy(best)) {
        (true, true) => challenger.draw_calls > best.draw_calls,
        (true, false) => true,
        (false, true) => false,
        (false, false) => challenger.vertices > best.vertices,
    }
}

/// Clear-time heuristic (also invoked with `fullscreen_pass` on
/// depth-stencil switches on aliasing backends): decides whether the stats
/// accumulated since the last clear are worth snapshotting and whether the
/// live depth-stencil should be copied to the backup before the clear wipes
/// it.
pub(crate) fn clear_depth_impl(
    rt: &Runtime,
    list: CommandList,
    state: &mut ContextState,
    device_state: &DeviceState,
    depth_stencil: Resource,
    fullscreen_pass: bool,
) {
    if depth_stencil.is_null()
        || device_state.backup_texture.is_null()
        || depth_stencil != device_state.selected_depth_stencil
    {
        return;
    }

    let first_empty_stats = state.first_empty_stats;
    let best_copy_vertices = state.best_copy_stats.vertices;

    let mut consumed_first_empty = false;
    let mut new_best_copy_stats = None;

    let counters = state.counters.entry(depth_stencil).or_default();

    // The first clear of a frame often belongs to the tail of the previous
    // frame's scene, so adopt last frame's final stats for it.
    if !fullscreen_pass && counters.current_stats.draw_calls == 0 && first_empty_stats {
        counters.current_stats = device_state.previous_stats;
        consumed_first_empty = true;
    }

    // No workload since the last clear, nothing to snapshot
    if counters.current_stats.draw_calls == 0 {
        if consumed_first_empty {
            state.first_empty_stats = false;
        }
        return;
    }

    // Reject sub-region clears (shadow maps and the like)
    if device_state.use_aspect_ratio_heuristics {
        if let Some(desc) = rt.backend().resource_desc(depth_stencil) {
            let viewport = counters.current_stats.last_viewport;
            if !aspect_ratio_match(viewport.width, viewport.height, desc.width, desc.height) {
                counters.current_stats = DrawStats::default();
                if consumed_first_empty {
                    state.first_empty_stats = false;
                }
                return;
            }
        }
    }

    counters.clears.push(ClearRecord {
        stats: counters.current_stats,
        fullscreen_pass,
    });

    let copy = if device_state.force_clear_index == 0 {
        // Automatic: copy on any clear at least as heavy as the best seen so
        // far this frame (>= so a tie prefers the later, usually more
        // complete pass)
        fullscreen_pass || counters.current_stats.vertices >= best_copy_vertices
    } else {
        counters.clears.len() == device_state.force_clear_index as usize
    };

    if copy {
        // Fullscreen-flagged flushes win by order (last one counts), so they
        // do not raise the bar for regular clears
        if !fullscreen_pass {
            new_best_copy_stats = Some(counters.current_stats);
        }

        let backend = rt.backend();
        backend.barrier(
            list,
            depth_stencil,
            ResourceUsage::DEPTH_STENCIL_WRITE,
            ResourceUsage::COPY_SOURCE,
        );
        backend.copy_resource(list, depth_stencil, device_state.backup_texture);
        backend.barrier(
            list,
            depth_stencil,
            ResourceUsage::COPY_SOURCE,
            ResourceUsage::DEPTH_STENCIL_WRITE,
        );

        counters.copied_during_frame = true;
    }

    counters.current_stats = DrawStats::default();

    if consumed_first_empty {
        state.first_empty_stats = false;
    }
    if let Some(stats) = new_best_copy_stats {
        state.best_copy_stats = stats;
    }
}

/// (Re)creates the backup texture so it matches the selected resource.
fn update_backup_texture(
    rt: &Runtime,
    device_state: &mut DeviceState,
    queue: CommandQueue,
    desc: ResourceDesc,
) {
    let backend = rt.backend();

    let format = match backend.api() {
        // INTZ cannot be a copy target, so fall back to a plain float texture
        DeviceApi::D3d9 => Format::R32Float,
        // Depth formats are valid for shader resource views in Vulkan
        DeviceApi::Vulkan => desc.format,
        _ => desc.format.to_typeless(),
    };

    if !device_state.backup_texture.is_null() {
        if let Some(existing) = backend.resource_desc(device_state.backup_texture) {
            if existing.width == desc.width
                && existing.height == desc.height
                && existing.format == format
            {
                return;
            }
        }
        // May still be read by in-flight work
        backend.wait_idle(queue);
        rt.release_resource(device_state.backup_texture);
        device_state.backup_texture = Resource::NULL;
    }

    let backup_desc = ResourceDesc {
        ty: ResourceType::Texture2d,
        heap: MemoryHeap::GpuOnly,
        usage: ResourceUsage::SHADER_RESOURCE | ResourceUsage::COPY_DEST,
        format,
        samples: 1,
        ..desc
    };

    match rt.create_resource(&backup_desc, ResourceUsage::COPY_DEST) {
        Some(resource) => device_state.backup_texture = resource,
        None => error!("failed to create backup depth-stencil texture"),
    }
}

/// Frame-end selector: scores the frame's candidates, publishes the winner
/// and keeps the readable view/backup texture in sync with it.
pub(crate) fn select_on_present(
    rt: &Runtime,
    queue_state: &mut ContextState,
    device_state: &mut DeviceState,
    queue: CommandQueue,
    swap_chain: SwapChain,
) {
    let backend = rt.backend();
    let api = backend.api();
    let frame_dimensions = backend.frame_dimensions(swap_chain);

    device_state.frame_candidates.clear();

    let mut best_match = Resource::NULL;
    let mut best_desc = ResourceDesc::default();
    let mut best_snapshot = DepthStencilInfo::default();

    for (&resource, snapshot) in &queue_state.counters {
        // Destroyed mid-frame; the handle may already belong to something else
        if !rt.registry().is_live(ObjectKind::Resource, resource.0) {
            continue;
        }

        device_state.frame_candidates.push((resource, snapshot.clone()));

        if snapshot.total_stats.draw_calls == 0 {
            continue;
        }

        let Some(desc) = backend.resource_desc(resource) else {
            continue;
        };
        // Multisampled targets would need a resolve first
        if desc.samples > 1 {
            continue;
        }

        if device_state.use_aspect_ratio_heuristics {
            if let Some((frame_width, frame_height)) = frame_dimensions {
                if !aspect_ratio_match(
                    desc.width as f32,
                    desc.height as f32,
                    frame_width,
                    frame_height,
                ) {
                    continue;
                }
            }
        }

        if better_candidate(&snapshot.total_stats, &best_snapshot.total_stats) {
            best_match = resource;
            best_desc = desc;
            best_snapshot = snapshot.clone();
        }
    }

    if !device_state.override_depth_stencil.is_null()
        && rt
            .registry()
            .is_live(ObjectKind::Resource, device_state.override_depth_stencil.0)
    {
        if let Some(desc) = backend.resource_desc(device_state.override_depth_stencil) {
            best_match = device_state.override_depth_stencil;
            best_desc = desc;
            best_snapshot = queue_state
                .counters
                .get(&best_match)
                .cloned()
                .unwrap_or_default();
        }
    }

    if !best_match.is_null() {
        // Re-enter on an unchanged selection while the view is missing, so a
        // transient creation failure heals on a later frame
        if best_match != device_state.selected_depth_stencil
            || device_state.selected_shader_resource.is_null()
        {
            debug!(
                "selected depth-stencil {:#x} ({}x{})",
                best_match.0, best_desc.width, best_desc.height
            );

            if !device_state.selected_shader_resource.is_null() {
                // The view may still be bound for reading by in-flight work
                backend.wait_idle(queue);
                rt.release_resource_view(device_state.selected_shader_resource);
            }

            device_state.selected_depth_stencil = best_match;
            device_state.selected_shader_resource = ResourceView::NULL;

            let view_format = if api == DeviceApi::Vulkan {
                best_desc.format
            } else {
                best_desc.format.to_default_typed()
            };

            // A backup is needed when copying at clears, when the resource
            // cannot be sampled directly, or when the backend may alias its
            // memory to another resource before present
            let needs_backup = device_state.preserve_depth_buffers
                || !best_desc.usage.contains(ResourceUsage::SHADER_RESOURCE)
                || api.aliased_resource_memory();

            if needs_backup {
                update_backup_texture(rt, device_state, queue, best_desc);

                if !device_state.backup_texture.is_null() {
                    let format = if api == DeviceApi::D3d9 {
                        Format::R32Float
                    } else {
                        view_format
                    };
                    device_state.selected_shader_resource = rt
                        .create_resource_view(
                            device_state.backup_texture,
                            ResourceUsage::SHADER_RESOURCE,
                            &ResourceViewDesc::texture_2d(format),
                        )
                        .unwrap_or(ResourceView::NULL);
                }
            } else {
                device_state.selected_shader_resource = rt
                    .create_resource_view(
                        best_match,
                        ResourceUsage::SHADER_RESOURCE,
                        &ResourceViewDesc::texture_2d(view_format),
                    )
                    .unwrap_or(ResourceView::NULL);

                if !device_state.backup_texture.is_null() {
                    rt.release_resource(device_state.backup_texture);
                    device_state.backup_texture = Resource::NULL;
                }
            }
        }

        device_state.previous_stats = best_snapshot.current_stats;

        if !device_state.preserve_depth_buffers
            && !device_state.backup_texture.is_null()
            && !best_snapshot.copied_during_frame
            && best_desc.usage.contains(ResourceUsage::COPY_SOURCE)
        {
            // Fallback for hosts that never clear the depth buffer
            if let Some(list) = backend.immediate_command_list(queue) {
                backend.barrier(
                    list,
                    best_match,
                    ResourceUsage::DEPTH_STENCIL | ResourceUsage::SHADER_RESOURCE,
                    ResourceUsage::COPY_SOURCE,
                );
                backend.copy_resource(list, best_match, device_state.backup_texture);
                backend.barrier(
                    list,
                    best_match,
                    ResourceUsage::COPY_SOURCE,
                    ResourceUsage::DEPTH_STENCIL | ResourceUsage::SHADER_RESOURCE,
                );
            }
        }
    } else if !device_state.selected_depth_stencil.is_null() {
        if !device_state.selected_shader_resource.is_null() {
            backend.wait_idle(queue);
            rt.release_resource_view(device_state.selected_shader_resource);
        }
        device_state.selected_depth_stencil = Resource::NULL;
        device_state.selected_shader_resource = ResourceView::NULL;
    }

    queue_state.reset_on_present();
}
