//! 测试用的 mock：记录命令序列的 encoder、内存中的资源分配器、mock renderer

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ash::prelude::VkResult;
use ash::vk;
use ash::vk::Handle;
use truvis_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier, GfxMemoryBarrier};
use truvis_gfx::commands::command_encoder::GfxCommandEncoder;

use crate::allocator::{
    RgAllocatedBuffer, RgAllocatedImage, RgMeshRenderer, RgOverlayRenderer, RgResourceAllocator, RgTargetBinding,
};
use crate::frame_op::{RgClearOp, RgDrawState, RgSurface};
use crate::resource_registry::RgResourceGroup;
use crate::resource_state::{RgBufferState, RgImageState};

pub const SWAPCHAIN_RENDER_PASS: u64 = 0x100;
pub const SWAPCHAIN_IMAGE: u64 = 0x200;
pub const OVERLAY_PIPELINE: u64 = 0x300;
pub const MESH_PIPELINE: u64 = 0x400;

/// 离屏目标的 render pass / image 都从这个值开始编号
const OFFSCREEN_BASE: u64 = 0x1000;

/// encoder 收到的一条命令
#[derive(Clone, Debug, PartialEq)]
pub enum RgCmd {
    Reset,
    Begin(vk::CommandBufferUsageFlags),
    End,
    BeginRenderPass(vk::RenderPass),
    EndRenderPass,
    ClearAttachments(Vec<vk::ImageAspectFlags>),
    SetViewport,
    SetScissor,
    BindPipeline(vk::PipelineBindPoint, vk::Pipeline),
    Blit {
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        filter: vk::Filter,
    },
    Dispatch(glam::UVec3),
    Draw,
    DrawIndirect { indexed: bool },
    MemoryBarrier(usize),
    /// (image, old layout, new layout)
    ImageBarrier(Vec<(vk::Image, vk::ImageLayout, vk::ImageLayout)>),
    BufferBarrier(Vec<vk::Buffer>),
}

/// 记录所有命令的 encoder
#[derive(Default)]
pub struct MockEncoder {
    commands: RefCell<Vec<RgCmd>>,
    labels: RefCell<Vec<String>>,
    pub fail_begin: Cell<Option<vk::Result>>,
    pub fail_end: Cell<Option<vk::Result>>,
}

impl MockEncoder {
    pub fn commands(&self) -> Vec<RgCmd> {
        self.commands.borrow().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.borrow().clone()
    }

    pub fn count(&self, predicate: impl Fn(&RgCmd) -> bool) -> usize {
        self.commands.borrow().iter().filter(|cmd| predicate(cmd)).count()
    }

    pub fn position(&self, predicate: impl Fn(&RgCmd) -> bool) -> Option<usize> {
        self.commands.borrow().iter().position(predicate)
    }

    fn push(&self, cmd: RgCmd) {
        self.commands.borrow_mut().push(cmd);
    }
}

impl GfxCommandEncoder for MockEncoder {
    fn reset(&self) -> VkResult<()> {
        self.commands.borrow_mut().clear();
        self.labels.borrow_mut().clear();
        self.push(RgCmd::Reset);
        Ok(())
    }

    fn begin(&self, usage_flag: vk::CommandBufferUsageFlags, _debug_label_name: &str) -> VkResult<()> {
        if let Some(err) = self.fail_begin.get() {
            return Err(err);
        }
        self.push(RgCmd::Begin(usage_flag));
        Ok(())
    }

    fn end(&self) -> VkResult<()> {
        if let Some(err) = self.fail_end.get() {
            return Err(err);
        }
        self.push(RgCmd::End);
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        _framebuffer: vk::Framebuffer,
        _render_area: vk::Rect2D,
        _clear_values: &[vk::ClearValue],
    ) {
        self.push(RgCmd::BeginRenderPass(render_pass));
    }

    fn cmd_end_render_pass(&self) {
        self.push(RgCmd::EndRenderPass);
    }

    fn cmd_clear_attachments(&self, attachments: &[vk::ClearAttachment], _rects: &[vk::ClearRect]) {
        self.push(RgCmd::ClearAttachments(attachments.iter().map(|a| a.aspect_mask).collect()));
    }

    fn cmd_set_viewport(&self, _first_viewport: u32, _viewports: &[vk::Viewport]) {
        self.push(RgCmd::SetViewport);
    }

    fn cmd_set_scissor(&self, _first_scissor: u32, _scissors: &[vk::Rect2D]) {
        self.push(RgCmd::SetScissor);
    }

    fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.push(RgCmd::BindPipeline(bind_point, pipeline));
    }

    fn cmd_blit_image(
        &self,
        src_image: vk::Image,
        src_layout: vk::ImageLayout,
        dst_image: vk::Image,
        dst_layout: vk::ImageLayout,
        _regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        self.push(RgCmd::Blit {
            src: src_image,
            src_layout,
            dst: dst_image,
            dst_layout,
            filter,
        });
    }

    fn cmd_dispatch(&self, group_cnt: glam::UVec3) {
        self.push(RgCmd::Dispatch(group_cnt));
    }

    fn cmd_draw(&self, _vertex_count: u32, _instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.push(RgCmd::Draw);
    }

    fn cmd_draw_indexed(
        &self,
        _index_count: u32,
        _instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.push(RgCmd::Draw);
    }

    fn cmd_draw_indirect(&self, _buffer: vk::Buffer, _offset: vk::DeviceSize, _draw_count: u32, _stride: u32) {
        self.push(RgCmd::DrawIndirect { indexed: false });
    }

    fn cmd_draw_indexed_indirect(&self, _buffer: vk::Buffer, _offset: vk::DeviceSize, _draw_count: u32, _stride: u32) {
        self.push(RgCmd::DrawIndirect { indexed: true });
    }

    fn memory_barrier(&self, barriers: &[GfxMemoryBarrier]) {
        self.push(RgCmd::MemoryBarrier(barriers.len()));
    }

    fn image_memory_barrier(&self, _dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        self.push(RgCmd::ImageBarrier(
            barriers.iter().map(|b| (b.vk_image(), b.old_layout(), b.new_layout())).collect(),
        ));
    }

    fn buffer_memory_barrier(&self, _dependency_flags: vk::DependencyFlags, barriers: &[GfxBufferBarrier]) {
        self.push(RgCmd::BufferBarrier(barriers.iter().map(|b| b.vk_buffer()).collect()));
    }

    fn begin_label(&self, label_name: &str, _label_color: glam::Vec4) {
        self.labels.borrow_mut().push(label_name.to_string());
    }

    fn end_label(&self) {}
}

/// 内存中的资源分配器
///
/// image / buffer 按资源名首次出现的顺序编号，初始状态可以预先设置
#[derive(Default)]
pub struct MockAllocator {
    pub images: HashMap<String, RgAllocatedImage>,
    pub buffers: HashMap<String, RgAllocatedBuffer>,
    pub initial_image_states: HashMap<String, RgImageState>,
    pub missing_targets: Vec<RgSurface>,
    pub missing_resources: Vec<String>,
    pub ensure_calls: usize,
    pub committed_images: HashMap<String, RgImageState>,
    pub committed_buffers: HashMap<String, RgBufferState>,
}

impl MockAllocator {
    pub fn image_of(&self, name: &str) -> vk::Image {
        self.images[name].image
    }

    pub fn target_image(target: RgSurface) -> vk::Image {
        match target {
            RgSurface::Swapchain => vk::Image::from_raw(SWAPCHAIN_IMAGE),
            RgSurface::Offscreen(handle) => vk::Image::from_raw(OFFSCREEN_BASE + 2 * handle.0 as u64 + 1),
        }
    }

    pub fn target_render_pass(target: RgSurface) -> vk::RenderPass {
        match target {
            RgSurface::Swapchain => vk::RenderPass::from_raw(SWAPCHAIN_RENDER_PASS),
            RgSurface::Offscreen(handle) => vk::RenderPass::from_raw(OFFSCREEN_BASE + 2 * handle.0 as u64),
        }
    }
}

impl RgResourceAllocator for MockAllocator {
    fn ensure_allocated_image(&mut self, group: &RgResourceGroup) -> Option<RgAllocatedImage> {
        self.ensure_calls += 1;
        if self.missing_resources.contains(&group.name) {
            return None;
        }
        let next_raw = 0x10_000 + self.images.len() as u64;
        let initial = self.initial_image_states.get(&group.name).copied().unwrap_or(RgImageState::UNDEFINED);
        Some(*self.images.entry(group.name.clone()).or_insert(RgAllocatedImage {
            image: vk::Image::from_raw(next_raw),
            aspect: vk::ImageAspectFlags::empty(),
            current_state: initial,
        }))
    }

    fn ensure_allocated_buffer(&mut self, group: &RgResourceGroup) -> Option<RgAllocatedBuffer> {
        self.ensure_calls += 1;
        if self.missing_resources.contains(&group.name) {
            return None;
        }
        let next_raw = 0x20_000 + self.buffers.len() as u64;
        Some(*self.buffers.entry(group.name.clone()).or_insert(RgAllocatedBuffer {
            buffer: vk::Buffer::from_raw(next_raw),
            current_state: RgBufferState::UNDEFINED,
        }))
    }

    fn resolve_target(&mut self, target: RgSurface) -> Option<RgTargetBinding> {
        if self.missing_targets.contains(&target) {
            return None;
        }
        let steady_state = match target {
            RgSurface::Swapchain => RgImageState::COLOR_ATTACHMENT_WRITE,
            RgSurface::Offscreen(_) => RgImageState::SHADER_READ_FRAGMENT,
        };
        Some(RgTargetBinding {
            render_pass: Self::target_render_pass(target),
            framebuffer: vk::Framebuffer::null(),
            render_area: vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: vk::Extent2D {
                    width: 1280,
                    height: 720,
                },
            },
            clear_values: vec![vk::ClearValue::default()],
            color_image: Self::target_image(target),
            steady_state,
        })
    }

    fn commit_image_state(&mut self, group: &RgResourceGroup, state: RgImageState) {
        self.committed_images.insert(group.name.clone(), state);
        if let Some(image) = self.images.get_mut(&group.name) {
            image.current_state = state;
        }
    }

    fn commit_buffer_state(&mut self, group: &RgResourceGroup, state: RgBufferState) {
        self.committed_buffers.insert(group.name.clone(), state);
        if let Some(buffer) = self.buffers.get_mut(&group.name) {
            buffer.current_state = state;
        }
    }
}

/// 绑定 pipeline 并画一个三角形
#[derive(Default)]
pub struct MockMeshRenderer {
    pub draws: Cell<usize>,
}

impl RgMeshRenderer for MockMeshRenderer {
    fn record_draw(&self, encoder: &dyn GfxCommandEncoder, _render_pass: vk::RenderPass, draw_state: &RgDrawState) {
        self.draws.set(self.draws.get() + 1);
        encoder.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, draw_state.pipeline);
        encoder.cmd_draw(3, 1, 0, 0);
    }
}

#[derive(Default)]
pub struct MockOverlayRenderer {
    pub render_passes: RefCell<Vec<vk::RenderPass>>,
}

impl RgOverlayRenderer for MockOverlayRenderer {
    fn record_overlay(&self, encoder: &dyn GfxCommandEncoder, render_pass: vk::RenderPass, _render_area: vk::Rect2D) {
        self.render_passes.borrow_mut().push(render_pass);
        encoder.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, vk::Pipeline::from_raw(OVERLAY_PIPELINE));
        encoder.cmd_draw(6, 1, 0, 0);
    }
}

pub fn draw_state() -> RgDrawState {
    RgDrawState {
        viewport: vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: 1280.0,
            height: 720.0,
            min_depth: 0.0,
            max_depth: 1.0,
        },
        scissor: vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
        },
        pipeline: vk::Pipeline::from_raw(MESH_PIPELINE),
    }
}

pub fn clear_op() -> RgClearOp {
    RgClearOp {
        color: true,
        depth: false,
        stencil: false,
        clear_color: glam::Vec4::new(0.0, 0.0, 0.0, 1.0),
        clear_depth: 1.0,
        clear_stencil: 0,
        rect: vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
        },
    }
}

/// 设备丢失标记是进程级的，读写它的测试需要串行执行
pub fn device_state_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}
