// SPDX-License-Identifier: CEPL-1.0
//! In-memory `Gpu` and `WindowProvider` used by the unit tests.
//!
//! The fake queue executes submissions in order and only retires them when the
//! host waits on a fence (or the device goes idle), so "outstanding" work is
//! exactly what the scheduler has not yet throttled on. Misuse that Vulkan
//! would flag as undefined behaviour panics instead.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use ash::vk::{self, Handle};

use crate::error::{PresentError, PresentResult};
use crate::gpu::{AcquireOutcome, ChainHandle, Gpu, GraphicsPipeline, PresentOutcome, SwapchainDesc};
use crate::window::WindowProvider;
use crate::RenderSize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recorded {
    Begin,
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    },
    BindPipeline(vk::Pipeline),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    EndRenderPass,
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scripted<T> {
    Return(T),
    Fail(vk::Result),
}

#[derive(Clone, Copy, Debug)]
pub struct SubmitRecord {
    pub cmd: vk::CommandBuffer,
    pub wait: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal: vk::Semaphore,
    pub fence: vk::Fence,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    CreateSwapchain,
    DestroySwapchain,
    Acquire,
    Submit,
    Present,
    WaitIdle,
}

struct FakeChain {
    images: Vec<vk::Image>,
    next_image: usize,
}

pub struct FakeState {
    pub caps: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub modes: Vec<vk::PresentModeKHR>,

    next_handle: u64,
    live: HashMap<u64, &'static str>,
    chains: HashMap<u64, FakeChain>,
    fences: HashMap<u64, bool>,
    semaphores: HashMap<u64, bool>,
    pending: VecDeque<u64>,

    pub created: Vec<SwapchainDesc>,
    pub retired_hints: Vec<Option<vk::SwapchainKHR>>,
    pub recorded: HashMap<vk::CommandBuffer, Vec<Recorded>>,
    pub submits: Vec<SubmitRecord>,
    pub acquired: Vec<(u32, usize)>,
    pub events: Vec<Event>,
    pub max_outstanding: usize,
    pub fence_waits: usize,

    pub acquire_script: VecDeque<Scripted<AcquireOutcome>>,
    pub present_script: VecDeque<Scripted<PresentOutcome>>,
}

pub struct FakeGpu {
    state: RefCell<FakeState>,
}

pub fn free_size_caps(min_images: u32, max_images: u32) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count: min_images,
        max_image_count: max_images,
        current_extent: vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        },
        min_image_extent: vk::Extent2D {
            width: 1,
            height: 1,
        },
        max_image_extent: vk::Extent2D {
            width: 4096,
            height: 4096,
        },
        supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
        current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        ..Default::default()
    }
}

pub fn srgb_format() -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }
}

impl FakeGpu {
    pub fn new(caps: vk::SurfaceCapabilitiesKHR) -> Self {
        Self {
            state: RefCell::new(FakeState {
                caps,
                formats: vec![srgb_format()],
                modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                next_handle: 1,
                live: HashMap::new(),
                chains: HashMap::new(),
                fences: HashMap::new(),
                semaphores: HashMap::new(),
                pending: VecDeque::new(),
                created: Vec::new(),
                retired_hints: Vec::new(),
                recorded: HashMap::new(),
                submits: Vec::new(),
                acquired: Vec::new(),
                events: Vec::new(),
                max_outstanding: 0,
                fence_waits: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
            }),
        }
    }

    /// min 2 / unbounded max, free-size surface.
    pub fn standard() -> Self {
        Self::new(free_size_caps(2, 0))
    }

    pub fn state(&self) -> std::cell::RefMut<'_, FakeState> {
        self.state.borrow_mut()
    }

    pub fn script_acquire(&self, outcome: Scripted<AcquireOutcome>) {
        self.state().acquire_script.push_back(outcome);
    }

    pub fn script_present(&self, outcome: Scripted<PresentOutcome>) {
        self.state().present_script.push_back(outcome);
    }

    /// Kinds of every handle created and not yet destroyed.
    pub fn live_handles(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.state.borrow().live.values().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn outstanding(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn count(&self, event: Event) -> usize {
        self.state.borrow().events.iter().filter(|&&e| e == event).count()
    }
}

impl FakeState {
    fn mint(&mut self, kind: &'static str) -> u64 {
        let raw = self.next_handle;
        self.next_handle += 1;
        self.live.insert(raw, kind);
        raw
    }

    fn release(&mut self, raw: u64, kind: &'static str) {
        match self.live.remove(&raw) {
            Some(k) => assert_eq!(k, kind, "handle {raw} released as the wrong kind"),
            None => panic!("{kind} {raw} released twice or never created"),
        }
    }

    fn retire_through(&mut self, fence: u64) {
        while let Some(f) = self.pending.pop_front() {
            self.fences.insert(f, true);
            if f == fence {
                return;
            }
        }
    }
}

impl Gpu for FakeGpu {
    fn surface_capabilities(&self) -> PresentResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.state.borrow().caps)
    }

    fn surface_formats(&self) -> PresentResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.state.borrow().formats.clone())
    }

    fn surface_present_modes(&self) -> PresentResult<Vec<vk::PresentModeKHR>> {
        Ok(self.state.borrow().modes.clone())
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        retired: Option<&ChainHandle>,
    ) -> PresentResult<ChainHandle> {
        let mut s = self.state();
        if let Some(old) = retired {
            assert!(
                s.chains.contains_key(&old.raw().as_raw()),
                "retired chain hint refers to a destroyed chain"
            );
        }
        let raw = s.mint("swapchain");
        // Drivers may hand out more than requested; the fake never does.
        let images = (0..desc.min_image_count)
            .map(|_| vk::Image::from_raw(s.mint("image")))
            .collect();
        s.chains.insert(
            raw,
            FakeChain {
                images,
                next_image: 0,
            },
        );
        s.created.push(*desc);
        s.retired_hints.push(retired.map(ChainHandle::raw));
        s.events.push(Event::CreateSwapchain);
        Ok(ChainHandle::new(vk::SwapchainKHR::from_raw(raw)))
    }

    fn swapchain_images(&self, chain: &ChainHandle) -> PresentResult<Vec<vk::Image>> {
        let s = self.state.borrow();
        Ok(s.chains[&chain.raw().as_raw()].images.clone())
    }

    fn destroy_swapchain(&self, chain: ChainHandle) {
        let mut s = self.state();
        let raw = chain.raw().as_raw();
        if let Some(c) = s.chains.remove(&raw) {
            for image in c.images {
                s.release(image.as_raw(), "image");
            }
        }
        s.release(raw, "swapchain");
        s.events.push(Event::DestroySwapchain);
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
    ) -> PresentResult<vk::ImageView> {
        Ok(vk::ImageView::from_raw(self.state().mint("image_view")))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state().release(view.as_raw(), "image_view");
    }

    fn create_render_pass(&self, _format: vk::Format) -> PresentResult<vk::RenderPass> {
        Ok(vk::RenderPass::from_raw(self.state().mint("render_pass")))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state().release(render_pass.as_raw(), "render_pass");
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> PresentResult<vk::Framebuffer> {
        Ok(vk::Framebuffer::from_raw(self.state().mint("framebuffer")))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state().release(framebuffer.as_raw(), "framebuffer");
    }

    fn create_pipeline(
        &self,
        _render_pass: vk::RenderPass,
        _extent: vk::Extent2D,
    ) -> PresentResult<GraphicsPipeline> {
        let mut s = self.state();
        Ok(GraphicsPipeline {
            layout: vk::PipelineLayout::from_raw(s.mint("pipeline_layout")),
            pipeline: vk::Pipeline::from_raw(s.mint("pipeline")),
        })
    }

    fn destroy_pipeline(&self, pipeline: GraphicsPipeline) {
        let mut s = self.state();
        s.release(pipeline.pipeline.as_raw(), "pipeline");
        s.release(pipeline.layout.as_raw(), "pipeline_layout");
    }

    fn allocate_command_buffers(&self, count: u32) -> PresentResult<Vec<vk::CommandBuffer>> {
        let mut s = self.state();
        Ok((0..count)
            .map(|_| vk::CommandBuffer::from_raw(s.mint("command_buffer")))
            .collect())
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        let mut s = self.state();
        for cmd in buffers {
            s.release(cmd.as_raw(), "command_buffer");
            s.recorded.remove(cmd);
        }
    }

    fn begin_commands(&self, cmd: vk::CommandBuffer) -> PresentResult<()> {
        self.state().recorded.insert(cmd, vec![Recorded::Begin]);
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        _clear: [f32; 4],
    ) {
        self.state()
            .recorded
            .entry(cmd)
            .or_default()
            .push(Recorded::BeginRenderPass {
                render_pass,
                framebuffer,
                extent,
            });
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: &GraphicsPipeline) {
        self.state()
            .recorded
            .entry(cmd)
            .or_default()
            .push(Recorded::BindPipeline(pipeline.pipeline));
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        self.state()
            .recorded
            .entry(cmd)
            .or_default()
            .push(Recorded::Draw {
                vertex_count,
                instance_count,
            });
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.state()
            .recorded
            .entry(cmd)
            .or_default()
            .push(Recorded::EndRenderPass);
    }

    fn end_commands(&self, cmd: vk::CommandBuffer) -> PresentResult<()> {
        self.state()
            .recorded
            .entry(cmd)
            .or_default()
            .push(Recorded::End);
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> PresentResult<vk::Fence> {
        let mut s = self.state();
        let raw = s.mint("fence");
        s.fences.insert(raw, signaled);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut s = self.state();
        let raw = fence.as_raw();
        assert!(!s.pending.contains(&raw), "destroying a fence still in flight");
        s.fences.remove(&raw);
        s.release(raw, "fence");
    }

    fn create_semaphore(&self) -> PresentResult<vk::Semaphore> {
        let mut s = self.state();
        let raw = s.mint("semaphore");
        s.semaphores.insert(raw, false);
        Ok(vk::Semaphore::from_raw(raw))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut s = self.state();
        s.semaphores.remove(&semaphore.as_raw());
        s.release(semaphore.as_raw(), "semaphore");
    }

    fn wait_fence(&self, fence: vk::Fence) -> PresentResult<()> {
        let mut s = self.state();
        let raw = fence.as_raw();
        s.fence_waits += 1;
        if s.fences[&raw] {
            return Ok(());
        }
        assert!(
            s.pending.contains(&raw),
            "waiting on an unsignaled fence with no pending submission would block forever"
        );
        s.retire_through(raw);
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> PresentResult<()> {
        let mut s = self.state();
        let raw = fence.as_raw();
        assert!(!s.pending.contains(&raw), "resetting a fence still in flight");
        s.fences.insert(raw, false);
        Ok(())
    }

    fn acquire_next_image(
        &self,
        chain: &ChainHandle,
        signal: vk::Semaphore,
    ) -> PresentResult<AcquireOutcome> {
        let mut s = self.state();
        s.events.push(Event::Acquire);
        // A scripted `Ready` hands back its index verbatim, in range or not.
        let (scripted_index, suboptimal) = match s.acquire_script.pop_front() {
            Some(Scripted::Return(AcquireOutcome::OutOfDate)) => {
                return Ok(AcquireOutcome::OutOfDate)
            }
            Some(Scripted::Return(AcquireOutcome::Ready { index, suboptimal })) => {
                (Some(index), suboptimal)
            }
            Some(Scripted::Fail(result)) => {
                return Err(PresentError::PresentationFailure {
                    op: "acquire_next_image",
                    result,
                })
            }
            None => (None, false),
        };
        let sem = signal.as_raw();
        assert!(
            !s.semaphores[&sem],
            "image-available semaphore signaled twice without a wait"
        );
        s.semaphores.insert(sem, true);

        let c = s
            .chains
            .get_mut(&chain.raw().as_raw())
            .expect("acquire on a destroyed chain");
        let count = c.images.len();
        let index = scripted_index.unwrap_or((c.next_image % count) as u32);
        c.next_image += 1;
        s.acquired.push((index, count));
        Ok(AcquireOutcome::Ready { index, suboptimal })
    }

    fn submit(
        &self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> PresentResult<()> {
        let mut s = self.state();
        assert!(s.recorded.contains_key(&cmd), "submitting an unrecorded buffer");
        assert!(s.semaphores[&wait.as_raw()], "submit waits on an unsignaled semaphore");
        assert!(!s.fences[&fence.as_raw()], "submit with a signaled fence");
        s.semaphores.insert(wait.as_raw(), false);
        s.semaphores.insert(signal.as_raw(), true);
        s.pending.push_back(fence.as_raw());
        s.max_outstanding = s.max_outstanding.max(s.pending.len());
        s.submits.push(SubmitRecord {
            cmd,
            wait,
            wait_stage,
            signal,
            fence,
        });
        s.events.push(Event::Submit);
        Ok(())
    }

    fn present(
        &self,
        _chain: &ChainHandle,
        _image_index: u32,
        wait: vk::Semaphore,
    ) -> PresentResult<PresentOutcome> {
        let mut s = self.state();
        assert!(s.semaphores[&wait.as_raw()], "present waits on an unsignaled semaphore");
        s.semaphores.insert(wait.as_raw(), false);
        s.events.push(Event::Present);
        match s.present_script.pop_front() {
            Some(Scripted::Return(outcome)) => Ok(outcome),
            Some(Scripted::Fail(result)) => Err(PresentError::PresentationFailure {
                op: "queue_present",
                result,
            }),
            None => Ok(PresentOutcome::Optimal),
        }
    }

    fn wait_idle(&self) -> PresentResult<()> {
        let mut s = self.state();
        while let Some(f) = s.pending.pop_front() {
            s.fences.insert(f, true);
        }
        s.events.push(Event::WaitIdle);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowEvent {
    Resize(RenderSize),
    Close,
}

pub struct FakeWindow {
    pub size: RenderSize,
    pub close: bool,
    pub resized: Cell<bool>,
    /// Raise the resize flag on this `resize_pending` query (1-based), so a
    /// resize can land in the middle of a frame.
    pub resize_on_query: Option<usize>,
    resize_queries: Cell<usize>,
    /// Applied one per `pump_events` call.
    pub pumped: VecDeque<WindowEvent>,
    /// Applied one per `wait_events` call; running dry means a real wait would hang.
    pub waited: VecDeque<WindowEvent>,
    /// Close is requested on this pump (1-based) if set.
    pub close_on_pump: Option<usize>,
    pub pumps: usize,
    pub waits: usize,
}

impl FakeWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: RenderSize::new(width, height),
            close: false,
            resized: Cell::new(false),
            resize_on_query: None,
            resize_queries: Cell::new(0),
            pumped: VecDeque::new(),
            waited: VecDeque::new(),
            close_on_pump: None,
            pumps: 0,
            waits: 0,
        }
    }

    fn apply(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::Resize(size) => {
                self.size = size;
                self.resized.set(true);
            }
            WindowEvent::Close => self.close = true,
        }
    }
}

impl WindowProvider for FakeWindow {
    fn framebuffer_size(&self) -> RenderSize {
        self.size
    }

    fn close_requested(&self) -> bool {
        self.close
    }

    fn resize_pending(&self) -> bool {
        let n = self.resize_queries.get() + 1;
        self.resize_queries.set(n);
        if self.resize_on_query == Some(n) {
            self.resized.set(true);
        }
        self.resized.get()
    }

    fn clear_resize(&mut self) {
        self.resized.set(false);
    }

    fn pump_events(&mut self) {
        self.pumps += 1;
        if self.close_on_pump == Some(self.pumps) {
            self.close = true;
        }
        if let Some(event) = self.pumped.pop_front() {
            self.apply(event);
        }
    }

    fn wait_events(&mut self) {
        self.waits += 1;
        let event = self
            .waited
            .pop_front()
            .expect("wait_events with nothing scripted would block forever");
        self.apply(event);
    }
}
