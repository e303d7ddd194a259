// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Demo host: replays a synthetic frame trace (a shadow pass followed by the
//! main scene pass) through the runtime and logs what the depth detection
//! selects each frame.

use anyhow::{bail, Result};
use clap::Parser;
use prism_api::{
    CommandList, CommandQueue, Device, DeviceApi, Format, Resource, ResourceDesc, ResourceUsage,
    ResourceView, ResourceViewDesc, SwapChain, Viewport,
};
use prism_backend_soft::SoftBackend;
use prism_core::{init_tracing, Config};
use prism_depth::DepthTracker;
use prism_runtime::Runtime;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Graphics API to emulate: d3d9 | d3d10 | d3d11 | d3d12 | opengl | vulkan
    #[arg(long, default_value = "d3d12")]
    api: String,

    /// Number of frames to replay
    #[arg(long, default_value_t = 8)]
    frames: u32,

    /// Path to the config file
    #[arg(long, default_value = "prism.toml")]
    config: String,
}

fn parse_api(name: &str) -> Result<DeviceApi> {
    Ok(match name {
        "d3d9" => DeviceApi::D3d9,
        "d3d10" => DeviceApi::D3d10,
        "d3d11" => DeviceApi::D3d11,
        "d3d12" => DeviceApi::D3d12,
        "opengl" => DeviceApi::OpenGl,
        "vulkan" => DeviceApi::Vulkan,
        other => bail!("unknown api {other:?}"),
    })
}

const DEVICE: Device = Device(1);
const QUEUE: CommandQueue = CommandQueue(2);
const SWAP_CHAIN: SwapChain = SwapChain(3);
const LIST: CommandList = CommandList(4);

const SCENE_DS: Resource = Resource(10);
const SCENE_DSV: ResourceView = ResourceView(11);
const SHADOW_DS: Resource = Resource(20);
const SHADOW_DSV: ResourceView = ResourceView(21);

const FRAME_WIDTH: u32 = 1920;
const FRAME_HEIGHT: u32 = 1080;
const SHADOW_SIZE: u32 = 2048;

fn add_depth_target(
    backend: &SoftBackend,
    rt: &Runtime,
    resource: Resource,
    view: ResourceView,
    width: u32,
    height: u32,
) {
    let desc = ResourceDesc::tex2d(
        width,
        height,
        Format::D32Float,
        ResourceUsage::DEPTH_STENCIL | ResourceUsage::COPY_SOURCE,
    );
    backend.insert_resource(resource, desc);
    rt.init_resource(resource, desc);

    let view_desc = ResourceViewDesc::texture_2d(Format::D32Float);
    backend.insert_view(view, resource, view_desc);
    rt.init_resource_view(view, resource, ResourceUsage::DEPTH_STENCIL, view_desc);
}

fn viewport(width: u32, height: u32) -> Viewport {
    Viewport {
        x: 0.0,
        y: 0.0,
        width: width as f32,
        height: height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

fn record_frame(rt: &Runtime, frame: u32) {
    rt.reset_command_list(LIST);

    // Shadow pass: lots of geometry into the square shadow map
    rt.bind_viewports(LIST, 0, &[viewport(SHADOW_SIZE, SHADOW_SIZE)]);
    rt.bind_render_targets_and_depth_stencil(LIST, &[], SHADOW_DSV);
    rt.clear_depth_stencil_view(LIST, SHADOW_DSV, Some(1.0), None, &[]);
    rt.draw_indexed(LIST, 90_000, 1, 0, 0, 0);

    // Scene pass
    rt.bind_viewports(LIST, 0, &[viewport(FRAME_WIDTH, FRAME_HEIGHT)]);
    rt.bind_render_targets_and_depth_stencil(LIST, &[], SCENE_DSV);
    rt.clear_depth_stencil_view(LIST, SCENE_DSV, Some(1.0), None, &[]);
    rt.draw_indexed(LIST, 30_000 + frame * 500, 1, 0, 0, 0);
    rt.draw(LIST, 4_000, 16, 0, 0);

    rt.execute_command_list(QUEUE, LIST);
    rt.present(QUEUE, SWAP_CHAIN);
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let api = parse_api(&args.api)?;
    let config = Config::load(&args.config);

    info!("api = {api:?}");
    info!(
        "copy_before_clears = {}, aspect heuristics = {}",
        config.depth.copy_before_clears, config.depth.use_aspect_ratio_heuristics
    );

    let backend = Arc::new(SoftBackend::new(api));
    let rt = Runtime::new(backend.clone(), config);
    let tracker = DepthTracker::register(&rt);

    rt.init_device(DEVICE);
    rt.init_command_queue(QUEUE);
    rt.init_swap_chain(SWAP_CHAIN);
    rt.init_command_list(LIST);
    backend.set_frame_dimensions(SWAP_CHAIN, FRAME_WIDTH, FRAME_HEIGHT);

    add_depth_target(&backend, &rt, SCENE_DS, SCENE_DSV, FRAME_WIDTH, FRAME_HEIGHT);
    add_depth_target(&backend, &rt, SHADOW_DS, SHADOW_DSV, SHADOW_SIZE, SHADOW_SIZE);

    for frame in 0..args.frames {
        record_frame(&rt, frame);

        match prism_depth::current_selection(&rt, DEVICE) {
            Some(selection) => {
                let stats = prism_depth::previous_frame_stats(&rt, DEVICE).unwrap_or_default();
                info!(
                    "frame {frame}: selected {:#x} via view {:#x} ({} draws, {} vertices)",
                    selection.resource.0, selection.view.0, stats.draw_calls, stats.vertices
                );
            }
            None => info!("frame {frame}: no depth-stencil selected yet"),
        }
    }

    let candidates = prism_depth::frame_candidates(&rt, DEVICE);
    for (resource, stats) in &candidates {
        info!(
            "candidate {:#x}: {} draws, {} vertices, {} clears",
            resource.0,
            stats.total_stats.draw_calls,
            stats.total_stats.vertices,
            stats.clears.len()
        );
    }
    info!(
        "replayed {} frames, {} copies and {} barriers issued",
        args.frames,
        backend.copies().len(),
        backend.barriers().len()
    );

    rt.destroy_resource_view(SHADOW_DSV);
    rt.destroy_resource(SHADOW_DS);
    rt.destroy_resource_view(SCENE_DSV);
    rt.destroy_resource(SCENE_DS);
    rt.destroy_command_list(LIST);
    rt.destroy_swap_chain(SWAP_CHAIN);
    rt.destroy_command_queue(QUEUE);
    rt.destroy_device(DEVICE);
    tracker.unregister(&rt);

    Ok(())
}
