// SPDX-License-Identifier: CEPL-1.0
//! End-to-end detection scenarios driven through the runtime entry points,
//! the way a backend shim would call them.

use prism_api::{
    CommandList, CommandQueue, Device, DeviceApi, Format, Resource, ResourceDesc, ResourceUsage,
    ResourceView, ResourceViewDesc, SwapChain, Viewport,
};
use prism_backend_soft::SoftBackend;
use prism_core::{Config, DepthCfg};
use prism_depth::{self as depth, DepthTracker};
use prism_runtime::Runtime;
use std::sync::Arc;

const DEVICE: Device = Device(1);
const QUEUE: CommandQueue = CommandQueue(2);
const SWAP_CHAIN: SwapChain = SwapChain(3);
const LIST: CommandList = CommandList(4);

const SCENE_DS: Resource = Resource(7);
const SCENE_DSV: ResourceView = ResourceView(70);

struct Host {
    backend: Arc<SoftBackend>,
    rt: Runtime,
}

fn host(api: DeviceApi, config: Config) -> Host {
    let backend = Arc::new(SoftBackend::new(api));
    let rt = Runtime::new(backend.clone(), config);
    DepthTracker::register(&rt);

    rt.init_device(DEVICE);
    rt.init_command_queue(QUEUE);
    rt.init_swap_chain(SWAP_CHAIN);
    rt.init_command_list(LIST);
    backend.set_frame_dimensions(SWAP_CHAIN, 1920, 1080);

    Host { backend, rt }
}

fn preserve_config() -> Config {
    Config {
        depth: DepthCfg {
            copy_before_clears: true,
            ..DepthCfg::default()
        },
    }
}

impl Host {
    fn add_depth_target(
        &self,
        resource: Resource,
        view: ResourceView,
        width: u32,
        height: u32,
        usage: ResourceUsage,
    ) {
        let desc = ResourceDesc::tex2d(width, height, Format::D32Float, usage);
        self.backend.insert_resource(resource, desc);
        self.rt.init_resource(resource, desc);

        let view_desc = ResourceViewDesc::texture_2d(Format::D32Float);
        self.backend.insert_view(view, resource, view_desc);
        self.rt
            .init_resource_view(view, resource, ResourceUsage::DEPTH_STENCIL, view_desc);
    }

    fn bind_viewport(&self, list: CommandList, width: f32, height: f32) {
        self.rt.bind_viewports(
            list,
            0,
            &[Viewport {
                x: 0.0,
                y: 0.0,
                width,
                height,
                min_depth: 0.0,
                max_depth: 1.0,
            }],
        );
    }

    fn bind_depth(&self, list: CommandList, view: ResourceView) {
        self.rt.bind_render_targets_and_depth_stencil(list, &[], view);
    }

    fn draw(&self, list: CommandList, vertices: u32) {
        self.rt.draw(list, vertices, 1, 0, 0);
    }

    fn clear_depth(&self, list: CommandList, view: ResourceView) {
        self.rt.clear_depth_stencil_view(list, view, Some(1.0), None, &[]);
    }

    fn submit_and_present(&self, list: CommandList) {
        self.rt.execute_command_list(QUEUE, list);
        self.rt.present(QUEUE, SWAP_CHAIN);
    }
}

fn sampleable_depth_usage() -> ResourceUsage {
    ResourceUsage::DEPTH_STENCIL | ResourceUsage::SHADER_RESOURCE | ResourceUsage::COPY_SOURCE
}

#[test]
fn selects_scene_depth_stencil_after_one_frame() {
    let host = host(DeviceApi::D3d11, Config::default());
    host.add_depth_target(SCENE_DS, SCENE_DSV, 1920, 1080, sampleable_depth_usage());

    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.bind_depth(LIST, SCENE_DSV);
    host.draw(LIST, 300);
    host.clear_depth(LIST, SCENE_DSV);
    host.submit_and_present(LIST);

    let selection = depth::current_selection(&host.rt, DEVICE).expect("a selection");
    assert_eq!(selection.resource, SCENE_DS);
    assert!(!selection.view.is_null());

    let stats = depth::previous_frame_stats(&host.rt, DEVICE).unwrap();
    assert_eq!(stats.vertices, 300);
    assert_eq!(stats.draw_calls, 1);

    let candidates = depth::frame_candidates(&host.rt, DEVICE);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].0, SCENE_DS);
}

#[test]
fn destroyed_candidate_is_never_selected() {
    let host = host(DeviceApi::D3d11, Config::default());
    host.add_depth_target(SCENE_DS, SCENE_DSV, 1920, 1080, sampleable_depth_usage());

    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.bind_depth(LIST, SCENE_DSV);
    host.draw(LIST, 300);
    host.bind_depth(LIST, ResourceView::NULL);
    host.rt.execute_command_list(QUEUE, LIST);

    // Gone between submit and present; its stats must be discarded
    host.rt.destroy_resource_view(SCENE_DSV);
    host.rt.destroy_resource(SCENE_DS);

    host.rt.present(QUEUE, SWAP_CHAIN);

    assert!(depth::current_selection(&host.rt, DEVICE).is_none());
    assert!(depth::frame_candidates(&host.rt, DEVICE).is_empty());
}

#[test]
fn selection_dies_with_its_resource() {
    let host = host(DeviceApi::D3d11, Config::default());
    host.add_depth_target(SCENE_DS, SCENE_DSV, 1920, 1080, sampleable_depth_usage());

    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.bind_depth(LIST, SCENE_DSV);
    host.draw(LIST, 300);
    host.submit_and_present(LIST);
    assert!(depth::current_selection(&host.rt, DEVICE).is_some());

    // Readers re-check liveness, so the stale selection reads as absent
    host.rt.destroy_resource_view(SCENE_DSV);
    host.rt.destroy_resource(SCENE_DS);
    assert!(depth::current_selection(&host.rt, DEVICE).is_none());
}

#[test]
fn aspect_heuristics_reject_shadow_map() {
    let host = host(DeviceApi::D3d11, Config::default());
    host.add_depth_target(SCENE_DS, SCENE_DSV, 1920, 1080, sampleable_depth_usage());

    let shadow = Resource(8);
    let shadow_view = ResourceView(80);
    host.add_depth_target(shadow, shadow_view, 2048, 2048, sampleable_depth_usage());

    // The shadow pass draws far more geometry than the scene
    host.bind_viewport(LIST, 2048.0, 2048.0);
    host.bind_depth(LIST, shadow_view);
    host.draw(LIST, 10_000);

    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.bind_depth(LIST, SCENE_DSV);
    host.draw(LIST, 300);

    host.submit_and_present(LIST);

    let selection = depth::current_selection(&host.rt, DEVICE).expect("a selection");
    assert_eq!(selection.resource, SCENE_DS);
    // Both still show up in the candidate list for inspection
    assert_eq!(depth::frame_candidates(&host.rt, DEVICE).len(), 2);
}

#[test]
fn view_creation_failure_degrades_to_no_selection() {
    let host = host(DeviceApi::D3d11, Config::default());
    host.add_depth_target(SCENE_DS, SCENE_DSV, 1920, 1080, sampleable_depth_usage());

    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.bind_depth(LIST, SCENE_DSV);
    host.draw(LIST, 300);

    host.backend.set_fail_creation(true);
    host.submit_and_present(LIST);

    // The pick happened but no readable view exists, so consumers see null
    assert!(depth::current_selection(&host.rt, DEVICE).is_none());
    assert_eq!(depth::previous_frame_stats(&host.rt, DEVICE).unwrap().vertices, 300);
    assert_eq!(depth::frame_candidates(&host.rt, DEVICE).len(), 1);

    // Recovers once creation works again and the stats keep flowing
    host.backend.set_fail_creation(false);
    host.rt.reset_command_list(LIST);
    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.bind_depth(LIST, SCENE_DSV);
    host.draw(LIST, 300);
    host.submit_and_present(LIST);
    assert!(depth::current_selection(&host.rt, DEVICE).is_some());
}

#[test]
fn preserve_mode_copies_at_clear_and_carries_first_clear_stats() {
    let host = host(DeviceApi::D3d11, preserve_config());
    host.add_depth_target(SCENE_DS, SCENE_DSV, 1920, 1080, sampleable_depth_usage());

    // Frame 1 establishes the selection and the backup texture
    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.bind_depth(LIST, SCENE_DSV);
    host.draw(LIST, 300);
    host.submit_and_present(LIST);
    assert!(depth::current_selection(&host.rt, DEVICE).is_some());
    assert!(host.backend.copies().is_empty());

    // Frame 2: the clear arrives before any draw, so it adopts last frame's
    // stats and snapshots the depth data into the backup
    host.rt.reset_command_list(LIST);
    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.bind_depth(LIST, SCENE_DSV);
    host.clear_depth(LIST, SCENE_DSV);

    let copies = host.backend.copies();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].source, SCENE_DS);
    assert_eq!(copies[0].list, LIST);

    // A second clear with no draws in between records and copies nothing
    host.clear_depth(LIST, SCENE_DSV);
    assert_eq!(host.backend.copies().len(), 1);

    host.draw(LIST, 50);
    host.submit_and_present(LIST);

    let candidates = depth::frame_candidates(&host.rt, DEVICE);
    let (_, info) = candidates.iter().find(|(r, _)| *r == SCENE_DS).unwrap();
    assert_eq!(info.clears.len(), 1);
    assert_eq!(info.clears[0].stats.vertices, 300);
    assert!(info.copied_during_frame);
    assert_eq!(depth::previous_frame_stats(&host.rt, DEVICE).unwrap().vertices, 50);
}

#[test]
fn subregion_viewport_clear_discards_stats_without_copy() {
    let host = host(DeviceApi::D3d11, preserve_config());
    host.add_depth_target(SCENE_DS, SCENE_DSV, 1920, 1080, sampleable_depth_usage());

    // Frame 1 establishes the selection and the backup texture
    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.bind_depth(LIST, SCENE_DSV);
    host.draw(LIST, 300);
    host.submit_and_present(LIST);
    assert!(depth::current_selection(&host.rt, DEVICE).is_some());

    // Frame 2: draws land under a 100x100 viewport, so the clear must throw
    // the stats away instead of recording and copying
    host.rt.reset_command_list(LIST);
    host.bind_viewport(LIST, 100.0, 100.0);
    host.bind_depth(LIST, SCENE_DSV);
    host.draw(LIST, 40);
    host.clear_depth(LIST, SCENE_DSV);
    assert!(host.backend.copies().is_empty());

    host.submit_and_present(LIST);

    let candidates = depth::frame_candidates(&host.rt, DEVICE);
    let (_, info) = candidates.iter().find(|(r, _)| *r == SCENE_DS).unwrap();
    assert!(info.clears.is_empty());
    assert!(!info.copied_during_frame);
    assert_eq!(depth::previous_frame_stats(&host.rt, DEVICE).unwrap().vertices, 0);
}

#[test]
fn present_fallback_copies_when_host_never_clears() {
    let host = host(DeviceApi::D3d12, Config::default());
    // No shader-resource usage, so reads must go through the backup
    host.add_depth_target(
        SCENE_DS,
        SCENE_DSV,
        1920,
        1080,
        ResourceUsage::DEPTH_STENCIL | ResourceUsage::COPY_SOURCE,
    );

    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.bind_depth(LIST, SCENE_DSV);
    host.draw(LIST, 300);
    host.bind_depth(LIST, ResourceView::NULL);
    host.submit_and_present(LIST);

    let selection = depth::current_selection(&host.rt, DEVICE).expect("a selection");
    assert_eq!(selection.resource, SCENE_DS);
    assert!(!selection.view.is_null());

    // The depth data reached the backup via the immediate list at present
    let copies = host.backend.copies();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].source, SCENE_DS);
}

#[test]
fn worker_lists_merge_into_the_queue() {
    let host = host(DeviceApi::D3d12, Config::default());
    host.add_depth_target(SCENE_DS, SCENE_DSV, 1920, 1080, sampleable_depth_usage());

    let worker_a = CommandList(40);
    let worker_b = CommandList(41);
    host.rt.init_command_list(worker_a);
    host.rt.init_command_list(worker_b);

    for (list, vertices) in [(worker_a, 100), (worker_b, 200)] {
        host.bind_viewport(list, 1920.0, 1080.0);
        host.bind_depth(list, SCENE_DSV);
        host.draw(list, vertices);
        host.bind_depth(list, ResourceView::NULL);
        host.rt.execute_command_list(QUEUE, list);
    }
    host.rt.present(QUEUE, SWAP_CHAIN);

    let selection = depth::current_selection(&host.rt, DEVICE).expect("a selection");
    assert_eq!(selection.resource, SCENE_DS);
    assert_eq!(depth::previous_frame_stats(&host.rt, DEVICE).unwrap().vertices, 300);
    assert_eq!(depth::previous_frame_stats(&host.rt, DEVICE).unwrap().draw_calls, 2);
}

#[test]
fn override_beats_the_automatic_pick() {
    let host = host(DeviceApi::D3d11, Config::default());
    host.add_depth_target(SCENE_DS, SCENE_DSV, 1920, 1080, sampleable_depth_usage());

    let hud = Resource(9);
    let hud_view = ResourceView(90);
    host.add_depth_target(hud, hud_view, 1920, 1080, sampleable_depth_usage());

    depth::set_override_depth_stencil(&host.rt, DEVICE, Some(hud));

    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.bind_depth(LIST, SCENE_DSV);
    host.draw(LIST, 10_000);
    host.bind_depth(LIST, hud_view);
    host.draw(LIST, 12);
    host.submit_and_present(LIST);

    let selection = depth::current_selection(&host.rt, DEVICE).expect("a selection");
    assert_eq!(selection.resource, hud);

    // Back to automatic on the next frame
    depth::set_override_depth_stencil(&host.rt, DEVICE, None);
    host.rt.reset_command_list(LIST);
    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.bind_depth(LIST, SCENE_DSV);
    host.draw(LIST, 10_000);
    host.submit_and_present(LIST);
    assert_eq!(
        depth::current_selection(&host.rt, DEVICE).unwrap().resource,
        SCENE_DS
    );
}

#[test]
fn aliasing_backend_flushes_on_depth_stencil_switch() {
    let host = host(DeviceApi::Vulkan, preserve_config());
    host.add_depth_target(SCENE_DS, SCENE_DSV, 1920, 1080, sampleable_depth_usage());

    let other = Resource(8);
    let other_view = ResourceView(80);
    host.add_depth_target(other, other_view, 1920, 1080, sampleable_depth_usage());

    // Frame 1 establishes the selection and backup
    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.rt.begin_render_pass(LIST, &[], SCENE_DSV);
    host.draw(LIST, 300);
    host.submit_and_present(LIST);
    assert!(depth::current_selection(&host.rt, DEVICE).is_some());
    let before = host.backend.copies().len();

    // Frame 2: switching away from the selected depth-stencil must back up
    // its contents, since the memory may be aliased afterwards
    host.rt.reset_command_list(LIST);
    host.bind_viewport(LIST, 1920.0, 1080.0);
    host.rt.begin_render_pass(LIST, &[], SCENE_DSV);
    host.draw(LIST, 300);
    host.rt.begin_render_pass(LIST, &[], other_view);

    let copies = host.backend.copies();
    assert_eq!(copies.len(), before + 1);
    assert_eq!(copies.last().unwrap().source, SCENE_DS);

    host.submit_and_present(LIST);

    let candidates = depth::frame_candidates(&host.rt, DEVICE);
    let (_, info) = candidates.iter().find(|(r, _)| *r == SCENE_DS).unwrap();
    assert!(info.clears.iter().any(|c| c.fullscreen_pass));
}
