//! 命令流录制
//!
//! 单线程遍历排好序的操作，维护一个很小的状态机：
//!
//! ```text
//! Idle ──(clear/draw)──> PassOpen(context) ──(blit/dispatch/pass 边界/换目标)──> Idle ...
//! ```
//!
//! 录制分两个阶段：
//! 1. 解析：为所有被 barrier 引用的资源组和所有被操作引用的渲染目标调用分配器
//! 2. 发射：假设所有资源都有效，只发出命令
//!
//! 一帧总是以 swapchain 上的收尾 render pass 结束，overlay 在其中绘制。

use std::collections::{HashMap, HashSet};

use ash::vk;
use itertools::Itertools;
use truvis_gfx::basic::color::LabelColor;
use truvis_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier, GfxMemoryBarrier};
use truvis_gfx::commands::command_encoder::GfxCommandEncoder;

use crate::allocator::{RgAllocatedBuffer, RgAllocatedImage, RgOverlayRenderer, RgResourceAllocator, RgTargetBinding};
use crate::barrier::RgPassBarriers;
use crate::compiler::RgCompiledGraph;
use crate::errors::{RgError, RgResult};
use crate::frame_op::{
    RgBlitOp, RgClearOp, RgComputeDispatchOp, RgFrameOp, RgFrameOpContext, RgFrameOpKind, RgIndirectDrawOp,
    RgMeshDrawOp, RgSurface,
};
use crate::memory_scope::{RgHazardMask, RgMemoryScope};
use crate::pass_meta::{RG_SWAPCHAIN_PSEUDO_PASS, RgPassIndex};
use crate::resource_registry::RgResourceGroupHandle;
use crate::resource_state::{RgBufferState, RgImageState};

/// 收尾 pass 使用的调度标识，不会与生产者的标识比较
const CLOSING_PASS_IDENTITY: u64 = u64::MAX;

/// 一帧的录制统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RgRecordStats {
    pub render_pass_begins: u32,
    /// 每次 `cmd_pipeline_barrier2` 调用计一次
    pub barrier_batches: u32,
    pub ops_recorded: u32,
    /// 没有 swapchain 伪 pass barrier 时，所有入口 barrier 被提前到帧开始
    pub hoisted_entry_barriers: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RecorderState {
    Idle,
    PassOpen(RgFrameOpContext),
}

/// 解析阶段的结果
#[derive(Default)]
struct ResolvedResources {
    images: HashMap<RgResourceGroupHandle, RgAllocatedImage>,
    buffers: HashMap<RgResourceGroupHandle, RgAllocatedBuffer>,
    targets: HashMap<RgSurface, RgTargetBinding>,
}

/// 单帧命令录制器
pub struct RgFrameRecorder<'a, E: GfxCommandEncoder> {
    encoder: &'a E,
    graph: &'a RgCompiledGraph,
    overlay: Option<&'a dyn RgOverlayRenderer>,
    pending_hazards: RgHazardMask,
    usage: vk::CommandBufferUsageFlags,

    resolved: ResolvedResources,
    /// 录制过程中资源组的实际状态
    image_states: HashMap<RgResourceGroupHandle, RgImageState>,
    buffer_states: HashMap<RgResourceGroupHandle, RgBufferState>,

    state: RecorderState,
    active_pass: Option<RgPassIndex>,
    emitted_passes: HashSet<RgPassIndex>,
    hoisted_entries: bool,
    stats: RgRecordStats,
}

// new & init
impl<'a, E: GfxCommandEncoder> RgFrameRecorder<'a, E> {
    pub fn new(encoder: &'a E, graph: &'a RgCompiledGraph) -> Self {
        Self {
            encoder,
            graph,
            overlay: None,
            pending_hazards: RgHazardMask::empty(),
            usage: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,

            resolved: ResolvedResources::default(),
            image_states: HashMap::new(),
            buffer_states: HashMap::new(),

            state: RecorderState::Idle,
            active_pass: None,
            emitted_passes: HashSet::new(),
            hoisted_entries: false,
            stats: RgRecordStats::default(),
        }
    }

    /// builder
    #[inline]
    pub fn with_overlay(mut self, overlay: Option<&'a dyn RgOverlayRenderer>) -> Self {
        self.overlay = overlay;
        self
    }

    /// 录制开始时先发出的粗粒度内存 barrier
    #[inline]
    pub fn with_memory_barrier(mut self, hazards: RgHazardMask) -> Self {
        self.pending_hazards = hazards;
        self
    }

    /// command buffer 会被重复提交时不能使用 `ONE_TIME_SUBMIT`
    #[inline]
    pub fn with_usage(mut self, usage: vk::CommandBufferUsageFlags) -> Self {
        self.usage = usage;
        self
    }
}

// record
impl<E: GfxCommandEncoder> RgFrameRecorder<'_, E> {
    /// 录制一帧
    ///
    /// begin / end 失败、资源或目标无法解析都是致命错误，调用方必须丢弃这一帧
    pub fn record(
        mut self,
        ops: &[RgFrameOp<'_>],
        allocator: &mut dyn RgResourceAllocator,
        debug_label: &str,
    ) -> RgResult<RgRecordStats> {
        #[cfg(feature = "profiling")]
        let _span = tracy_client::span!("RgFrameRecorder::record");

        self.resolve(ops, allocator)?;

        self.encoder.reset().map_err(|e| RgError::backend("reset", e))?;
        self.encoder.begin(self.usage, debug_label).map_err(|e| RgError::backend("begin", e))?;

        self.emit_frame_start_barriers();

        for op in ops {
            if self.active_pass != Some(op.pass_index) {
                self.enter_pass(op.pass_index);
            }

            match &op.kind {
                RgFrameOpKind::Clear(clear) => self.record_clear(op.context, clear),
                RgFrameOpKind::MeshDraw(draw) => self.record_mesh_draw(op.context, draw),
                RgFrameOpKind::Blit(blit) => self.record_blit(blit),
                RgFrameOpKind::IndirectDraw(draw) => self.record_indirect_draw(op.context, draw),
                RgFrameOpKind::ComputeDispatch(dispatch) => self.record_dispatch(dispatch),
            }
            self.stats.ops_recorded += 1;
        }

        self.record_closing_pass();

        self.encoder.end().map_err(|e| RgError::backend("end", e))?;

        self.commit_states(allocator);

        log::debug!(
            "frame recorded: {} ops, {} render passes, {} barrier batches",
            self.stats.ops_recorded,
            self.stats.render_pass_begins,
            self.stats.barrier_batches
        );
        Ok(self.stats)
    }

    /// 解析阶段：分配所有资源组、解析所有渲染目标
    fn resolve(&mut self, ops: &[RgFrameOp<'_>], allocator: &mut dyn RgResourceAllocator) -> RgResult<()> {
        let graph = self.graph;
        for (handle, group) in graph.resources().iter() {
            if group.is_image {
                let image = allocator
                    .ensure_allocated_image(group)
                    .ok_or_else(|| RgError::MissingResource(group.name.clone()))?;
                self.image_states.insert(handle, image.current_state);
                self.resolved.images.insert(handle, image);
            } else {
                let buffer = allocator
                    .ensure_allocated_buffer(group)
                    .ok_or_else(|| RgError::MissingResource(group.name.clone()))?;
                self.buffer_states.insert(handle, buffer.current_state);
                self.resolved.buffers.insert(handle, buffer);
            }
        }

        for op in ops {
            if let RgFrameOpKind::Blit(blit) = &op.kind {
                if blit.src == blit.dst {
                    return Err(RgError::BlitAliasing(blit.src));
                }
            }
        }

        let surfaces = ops
            .iter()
            .flat_map(|op| op.referenced_surfaces())
            .chain(std::iter::once(RgSurface::Swapchain))
            .unique()
            .collect_vec();
        for surface in surfaces {
            let binding = allocator.resolve_target(surface).ok_or(RgError::MissingTarget(surface))?;
            self.resolved.targets.insert(surface, binding);
        }

        Ok(())
    }

    /// 帧开始：粗粒度内存 barrier，然后是 swapchain 伪 pass 的 barrier；
    /// 没有伪 pass barrier 时把所有入口 barrier 提前到这里
    fn emit_frame_start_barriers(&mut self) {
        if let Some(scope) = RgMemoryScope::resolve(self.pending_hazards) {
            self.encoder.memory_barrier(&[GfxMemoryBarrier::new().mask(scope)]);
            self.stats.barrier_batches += 1;
        }

        let graph = self.graph;
        let sync = graph.synchronization();
        let frame_start = match sync.swapchain_barriers() {
            Some(barriers) => barriers.clone(),
            None => {
                self.hoisted_entries = true;
                self.stats.hoisted_entry_barriers = true;
                sync.entry_barriers()
            }
        };
        self.emitted_passes.insert(RG_SWAPCHAIN_PSEUDO_PASS);
        self.emit_barriers(&frame_start);
    }

    /// pass 边界：发出该 pass 的 barrier（每帧最多一次）
    ///
    /// barrier 不能在 render pass 内发出，只有确实有 barrier 时才需要关闭当前 render pass
    fn enter_pass(&mut self, pass_index: RgPassIndex) {
        self.active_pass = Some(pass_index);
        if !self.emitted_passes.insert(pass_index) {
            return;
        }

        let graph = self.graph;
        let Some(barriers) = graph.synchronization().barriers_for(pass_index) else {
            return;
        };
        let barriers = if self.hoisted_entries { barriers.without_entries() } else { barriers.clone() };
        if barriers.is_empty() {
            return;
        }

        self.close_render_pass();
        self.emit_barriers(&barriers);
    }

    fn emit_barriers(&mut self, barriers: &RgPassBarriers) {
        let mut image_barriers = Vec::with_capacity(barriers.image_barriers.len());
        for planned in &barriers.image_barriers {
            let (Some(image), Some(&tracked)) =
                (self.resolved.images.get(&planned.group), self.image_states.get(&planned.group))
            else {
                continue;
            };

            // 入口 barrier 的前置状态是占位值；若中间有 pass 没有任何操作，规划的前置 layout 也可能过时
            let previous = if planned.entry || tracked.layout != planned.previous_state.layout {
                tracked
            } else {
                planned.previous_state
            };
            self.image_states.insert(planned.group, planned.next_state);
            if !previous.needs_barrier_to(&planned.next_state) {
                continue;
            }

            let aspect = if image.aspect.is_empty() { planned.aspect } else { image.aspect };
            image_barriers.push(planned.to_gfx_barrier(image.image, previous, aspect));
        }

        let mut buffer_barriers = Vec::with_capacity(barriers.buffer_barriers.len());
        for planned in &barriers.buffer_barriers {
            let (Some(buffer), Some(&tracked)) =
                (self.resolved.buffers.get(&planned.group), self.buffer_states.get(&planned.group))
            else {
                continue;
            };

            let previous = if planned.entry { tracked } else { planned.previous_state };
            self.buffer_states.insert(planned.group, planned.next_state);
            if !previous.needs_barrier_to(&planned.next_state) {
                continue;
            }
            buffer_barriers.push(planned.to_gfx_barrier(buffer.buffer, previous));
        }

        self.submit_barriers(&image_barriers, &buffer_barriers);
    }

    fn submit_barriers(&mut self, image_barriers: &[GfxImageBarrier], buffer_barriers: &[GfxBufferBarrier]) {
        if !image_barriers.is_empty() {
            self.encoder.image_memory_barrier(vk::DependencyFlags::empty(), image_barriers);
            self.stats.barrier_batches += 1;
        }
        if !buffer_barriers.is_empty() {
            self.encoder.buffer_memory_barrier(vk::DependencyFlags::empty(), buffer_barriers);
            self.stats.barrier_batches += 1;
        }
    }

    fn close_render_pass(&mut self) {
        if let RecorderState::PassOpen(_) = self.state {
            self.encoder.cmd_end_render_pass();
            self.encoder.end_label();
            self.state = RecorderState::Idle;
        }
    }

    /// 确保为 `context` 打开了 render pass，返回该 render pass
    ///
    /// 上下文相同则复用，否则关闭旧的再打开新的
    fn ensure_render_pass(&mut self, context: RgFrameOpContext) -> vk::RenderPass {
        let binding = &self.resolved.targets[&context.target];
        if self.state == RecorderState::PassOpen(context) {
            return binding.render_pass;
        }

        if let RecorderState::PassOpen(_) = self.state {
            self.encoder.cmd_end_render_pass();
            self.encoder.end_label();
        }

        let label = match context.target {
            RgSurface::Swapchain => "swapchain".to_string(),
            RgSurface::Offscreen(handle) => format!("target-{}", handle.0),
        };
        self.encoder.begin_label(&label, LabelColor::COLOR_RENDER_PASS);
        self.encoder.cmd_begin_render_pass(
            binding.render_pass,
            binding.framebuffer,
            binding.render_area,
            &binding.clear_values,
        );
        self.state = RecorderState::PassOpen(context);
        self.stats.render_pass_begins += 1;
        binding.render_pass
    }

    fn record_clear(&mut self, context: RgFrameOpContext, clear: &RgClearOp) {
        let attachments = clear.clear_attachments();
        if attachments.is_empty() {
            log::debug!("clear op without any aspect is skipped");
            return;
        }

        self.ensure_render_pass(context);
        let rect = vk::ClearRect {
            rect: clear.rect,
            base_array_layer: 0,
            layer_count: 1,
        };
        self.encoder.cmd_clear_attachments(&attachments, std::slice::from_ref(&rect));
    }

    fn record_mesh_draw(&mut self, context: RgFrameOpContext, draw: &RgMeshDrawOp<'_>) {
        let render_pass = self.ensure_render_pass(context);
        self.encoder.cmd_set_viewport(0, std::slice::from_ref(&draw.draw_state.viewport));
        self.encoder.cmd_set_scissor(0, std::slice::from_ref(&draw.draw_state.scissor));
        draw.renderer.record_draw(self.encoder, render_pass, &draw.draw_state);
    }

    fn record_indirect_draw(&mut self, context: RgFrameOpContext, draw: &RgIndirectDrawOp) {
        self.ensure_render_pass(context);
        self.encoder.cmd_set_viewport(0, std::slice::from_ref(&draw.draw_state.viewport));
        self.encoder.cmd_set_scissor(0, std::slice::from_ref(&draw.draw_state.scissor));
        self.encoder.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, draw.draw_state.pipeline);
        if draw.indexed {
            self.encoder.cmd_draw_indexed_indirect(draw.buffer, draw.offset, draw.draw_count, draw.stride);
        } else {
            self.encoder.cmd_draw_indirect(draw.buffer, draw.offset, draw.draw_count, draw.stride);
        }
    }

    /// dispatch 不能在 render pass 内
    fn record_dispatch(&mut self, dispatch: &RgComputeDispatchOp) {
        self.close_render_pass();
        self.encoder.begin_label("dispatch", LabelColor::COLOR_COMPUTE);
        self.encoder.cmd_bind_pipeline(vk::PipelineBindPoint::COMPUTE, dispatch.pipeline);
        self.encoder.cmd_dispatch(dispatch.group_count);
        self.encoder.end_label();
    }

    /// blit：关闭 render pass，源/目标切到传输 layout，blit，再切回各自的稳定状态
    fn record_blit(&mut self, blit: &RgBlitOp) {
        self.close_render_pass();

        let src = &self.resolved.targets[&blit.src];
        let dst = &self.resolved.targets[&blit.dst];
        let transition = |image: vk::Image, from: RgImageState, to: RgImageState| {
            GfxImageBarrier::new()
                .image(image)
                .layout_transfer(from.layout, to.layout)
                .src_mask(from.stage, from.src_access())
                .dst_mask(to.stage, to.access)
                .image_aspect_flag(vk::ImageAspectFlags::COLOR)
        };

        let to_transfer = [
            transition(src.color_image, src.steady_state, RgImageState::TRANSFER_SRC),
            transition(dst.color_image, dst.steady_state, RgImageState::TRANSFER_DST),
        ];
        let to_steady = [
            transition(src.color_image, RgImageState::TRANSFER_SRC, src.steady_state),
            transition(dst.color_image, RgImageState::TRANSFER_DST, dst.steady_state),
        ];
        let (src_image, dst_image) = (src.color_image, dst.color_image);
        let filter = if blit.linear_filter { vk::Filter::LINEAR } else { vk::Filter::NEAREST };

        self.encoder.begin_label("blit", LabelColor::COLOR_TRANSFER);
        self.submit_barriers(&to_transfer, &[]);
        self.encoder.cmd_blit_image(
            src_image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &blit.regions,
            filter,
        );
        self.submit_barriers(&to_steady, &[]);
        self.encoder.end_label();
    }

    /// 收尾：确保 swapchain 的 render pass 打开，绘制 overlay，关闭
    fn record_closing_pass(&mut self) {
        let context = match self.state {
            RecorderState::PassOpen(context) if context.target == RgSurface::Swapchain => context,
            _ => RgFrameOpContext::new(CLOSING_PASS_IDENTITY, RgSurface::Swapchain),
        };
        let render_pass = self.ensure_render_pass(context);

        if let Some(overlay) = self.overlay {
            let render_area = self.resolved.targets[&RgSurface::Swapchain].render_area;
            self.encoder.begin_label("overlay", LabelColor::COLOR_OVERLAY);
            overlay.record_overlay(self.encoder, render_pass, render_area);
            self.encoder.end_label();
        }

        self.close_render_pass();
    }

    /// 把录制结束时各资源组的状态交还给分配器
    fn commit_states(&self, allocator: &mut dyn RgResourceAllocator) {
        let resources = self.graph.resources();
        for (handle, state) in &self.image_states {
            if let Some(group) = resources.get(*handle) {
                allocator.commit_image_state(group, *state);
            }
        }
        for (handle, state) in &self.buffer_states {
            if let Some(group) = resources.get(*handle) {
                allocator.commit_buffer_state(group, *state);
            }
        }
    }
}
