// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Software [`Backend`]: pure bookkeeping behind the backend seam, standing
//! in for a native shim. Backs the demo app and the integration tests.
//!
//! It mints handles, keeps resource/view tables and journals every copy,
//! barrier and idle wait so tests can assert on GPU-facing side effects.

use prism_api::{
    Backend, CommandList, CommandQueue, DeviceApi, Resource, ResourceDesc, ResourceUsage,
    ResourceView, ResourceViewDesc, SwapChain,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

#[derive(Clone, Copy, Debug)]
pub struct CopyRecord {
    pub list: CommandList,
    pub source: Resource,
    pub dest: Resource,
}

#[derive(Clone, Copy, Debug)]
pub struct BarrierRecord {
    pub list: CommandList,
    pub resource: Resource,
    pub old_usage: ResourceUsage,
    pub new_usage: ResourceUsage,
}

pub struct SoftBackend {
    api: DeviceApi,
    next_handle: AtomicU64,
    resources: Mutex<HashMap<u64, ResourceDesc>>,
    views: Mutex<HashMap<u64, (Resource, ResourceViewDesc)>>,
    frames: Mutex<HashMap<u64, (u32, u32)>>,
    immediate_lists: Mutex<HashMap<u64, CommandList>>,
    copies: Mutex<Vec<CopyRecord>>,
    barriers: Mutex<Vec<BarrierRecord>>,
    idle_waits: AtomicUsize,
    fail_creation: AtomicBool,
}

impl SoftBackend {
    pub fn new(api: DeviceApi) -> Self {
        SoftBackend {
            api,
            // Host simulations pick small handles themselves; minted handles
            // start far above to keep the two ranges apart.
            next_handle: AtomicU64::new(1 << 32),
            resources: Mutex::new(HashMap::new()),
            views: Mutex::new(HashMap::new()),
            frames: Mutex::new(HashMap::new()),
            immediate_lists: Mutex::new(HashMap::new()),
            copies: Mutex::new(Vec::new()),
            barriers: Mutex::new(Vec::new()),
            idle_waits: AtomicUsize::new(0),
            fail_creation: AtomicBool::new(false),
        }
    }

    fn mint(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a host-owned resource under a caller-chosen handle.
    pub fn insert_resource(&self, resource: Resource, desc: ResourceDesc) {
        self.resources.lock().unwrap().insert(resource.0, desc);
    }

    /// Registers a host-owned view of `resource` under a caller-chosen handle.
    pub fn insert_view(&self, view: ResourceView, resource: Resource, desc: ResourceViewDesc) {
        self.views.lock().unwrap().insert(view.0, (resource, desc));
    }

    pub fn set_frame_dimensions(&self, swap_chain: SwapChain, width: u32, height: u32) {
        self.frames
            .lock()
            .unwrap()
            .insert(swap_chain.0, (width, height));
    }

    /// Makes the next resource/view creations fail, for exercising the
    /// degrade-to-null paths.
    pub fn set_fail_creation(&self, fail: bool) {
        self.fail_creation.store(fail, Ordering::Relaxed);
    }

    pub fn copies(&self) -> Vec<CopyRecord> {
        self.copies.lock().unwrap().clone()
    }

    pub fn barriers(&self) -> Vec<BarrierRecord> {
        self.barriers.lock().unwrap().clone()
    }

    pub fn idle_waits(&self) -> usize {
        self.idle_waits.load(Ordering::Relaxed)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.lock().unwrap().len()
    }

    pub fn view_count(&self) -> usize {
        self.views.lock().unwrap().len()
    }
}

impl Backend for SoftBackend {
    fn api(&self) -> DeviceApi {
        self.api
    }

    fn resource_desc(&self, resource: Resource) -> Option<ResourceDesc> {
        self.resources.lock().unwrap().get(&resource.0).copied()
    }

    fn resource_from_view(&self, view: ResourceView) -> Option<Resource> {
        self.views.lock().unwrap().get(&view.0).map(|(r, _)| *r)
    }

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        _initial_state: ResourceUsage,
    ) -> Option<Resource> {
        if self.fail_creation.load(Ordering::Relaxed) {
            return None;
        }
        let resource = Resource(self.mint());
        self.resources.lock().unwrap().insert(resource.0, *desc);
        debug!("created {}x{} resource {:#x}", desc.width, desc.height, resource.0);
        Some(resource)
    }

    fn destroy_resource(&self, resource: Resource) {
        self.resources.lock().unwrap().remove(&resource.0);
    }

    fn create_resource_view(
        &self,
        resource: Resource,
        _usage_type: ResourceUsage,
        desc: &ResourceViewDesc,
    ) -> Option<ResourceView> {
        if self.fail_creation.load(Ordering::Relaxed) {
            return None;
        }
        if !self.resources.lock().unwrap().contains_key(&resource.0) {
            return None;
        }
        let view = ResourceView(self.mint());
        self.views.lock().unwrap().insert(view.0, (resource, *desc));
        Some(view)
    }

    fn destroy_resource_view(&self, view: ResourceView) {
        self.views.lock().unwrap().remove(&view.0);
    }

    fn frame_dimensions(&self, swap_chain: SwapChain) -> Option<(u32, u32)> {
        self.frames.lock().unwrap().get(&swap_chain.0).copied()
    }

    fn immediate_command_list(&self, queue: CommandQueue) -> Option<CommandList> {
        let mut lists = self.immediate_lists.lock().unwrap();
        let list = lists
            .entry(queue.0)
            .or_insert_with(|| CommandList(self.mint()));
        Some(*list)
    }

    fn copy_resource(&self, list: CommandList, source: Resource, dest: Resource) {
        self.copies.lock().unwrap().push(CopyRecord { list, source, dest });
    }

    fn barrier(
        &self,
        list: CommandList,
        resource: Resource,
        old_usage: ResourceUsage,
        new_usage: ResourceUsage,
    ) {
        self.barriers.lock().unwrap().push(BarrierRecord {
            list,
            resource,
            old_usage,
            new_usage,
        });
    }

    fn wait_idle(&self, _queue: CommandQueue) {
        self.idle_waits.fetch_add(1, Ordering::Relaxed);
    }
}
