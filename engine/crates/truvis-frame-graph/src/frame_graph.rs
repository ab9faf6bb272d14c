//! Frame graph 入口
//!
//! 把编译、调度、录制串成一次 `record_frame` 调用，
//! 并维护每个 frame slot 的 command stream 和 dirty 标记。

use std::sync::Arc;

use ash::vk;
use truvis_gfx::commands::command_encoder::GfxCommandEncoder;
use truvis_gfx::commands::semaphore::is_device_lost;

use crate::allocator::{RgOverlayRenderer, RgResourceAllocator};
use crate::command_slots::RgCommandSlots;
use crate::compiler::{RgCompiledGraph, RgGraphCompiler};
use crate::errors::{RgError, RgResult};
use crate::frame_op::RgFrameOp;
use crate::memory_scope::RgHazardMask;
use crate::pass_meta::RgPassMeta;
use crate::recorder::{RgFrameRecorder, RgRecordStats};
use crate::scheduler::RgFrameScheduler;
use crate::settings::{RgFrameGraphSettings, RgRecordPolicy};

/// 一次 `record_frame` 的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgFrameOutcome {
    Recorded(RgRecordStats),
    /// slot 不是 dirty 的，之前录制的 stream 可以直接重新提交
    Skipped,
}

/// Frame graph
///
/// `S` 是 command stream 的类型，运行时为 `GfxCommandBuffer`
pub struct RgFrameGraph<S: GfxCommandEncoder> {
    settings: RgFrameGraphSettings,
    compiler: RgGraphCompiler,
    slots: RgCommandSlots<S>,
    /// 下一次录制开始时发出的粗粒度内存 barrier
    pending_hazards: RgHazardMask,
}

// new & init
impl<S: GfxCommandEncoder> RgFrameGraph<S> {
    pub fn new(settings: RgFrameGraphSettings) -> Self {
        log::info!(
            "frame graph created: {} frames in flight, record policy {:?}",
            settings.frames_in_flight,
            settings.record_policy
        );
        let slots = RgCommandSlots::new(settings.frames_in_flight);
        Self {
            settings,
            compiler: RgGraphCompiler::new(),
            slots,
            pending_hazards: RgHazardMask::empty(),
        }
    }
}

// getters
impl<S: GfxCommandEncoder> RgFrameGraph<S> {
    #[inline]
    pub fn settings(&self) -> &RgFrameGraphSettings {
        &self.settings
    }

    #[inline]
    pub fn slots(&self) -> &RgCommandSlots<S> {
        &self.slots
    }

    #[inline]
    pub fn slots_mut(&mut self) -> &mut RgCommandSlots<S> {
        &mut self.slots
    }

    #[inline]
    pub fn pending_hazards(&self) -> RgHazardMask {
        self.pending_hazards
    }
}

// update
impl<S: GfxCommandEncoder> RgFrameGraph<S> {
    /// 累积一个粗粒度内存 barrier，在下一次录制开始时发出
    ///
    /// 已经录制好的 stream 不包含这个 barrier，因此所有 slot 都需要重新录制
    pub fn add_memory_barrier(&mut self, hazards: RgHazardMask) {
        if hazards.is_empty() {
            return;
        }
        self.pending_hazards |= hazards;
        self.slots.mark_all_dirty();
    }

    /// 丢弃缓存的编译结果，所有 slot 标记为 dirty
    pub fn invalidate(&mut self) {
        self.compiler.invalidate();
        self.slots.mark_all_dirty();
    }

    /// 编译 pass 元数据，拓扑变化时所有 slot 标记为 dirty
    pub fn compile(&mut self, passes: &[RgPassMeta]) -> RgResult<Arc<RgCompiledGraph>> {
        let (graph, recompiled) = self.compiler.compile_cached(passes)?;
        if recompiled {
            self.slots.mark_all_dirty();
            if self.settings.print_plan_on_recompile {
                graph.print_execution_plan();
            }
        }
        Ok(graph)
    }
}

// record
impl<S: GfxCommandEncoder> RgFrameGraph<S> {
    /// 编译、调度并录制 `slot` 的 command stream
    ///
    /// 录制策略为 `WhenDirty` 且 slot 不是 dirty 时跳过录制；
    /// 无论是否录制，`ops` 都在本次调用后丢弃
    pub fn record_frame(
        &mut self,
        slot: usize,
        passes: &[RgPassMeta],
        ops: Vec<RgFrameOp<'_>>,
        allocator: &mut dyn RgResourceAllocator,
        overlay: Option<&dyn RgOverlayRenderer>,
    ) -> RgResult<RgFrameOutcome> {
        #[cfg(feature = "profiling")]
        let _span = tracy_client::span!("RgFrameGraph::record_frame");

        if is_device_lost() {
            return Err(RgError::DeviceLost);
        }

        self.slots.validate()?;
        self.slots.stream(slot)?;

        let graph = self.compile(passes)?;

        let usage = match self.settings.record_policy {
            RgRecordPolicy::Always => vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            RgRecordPolicy::WhenDirty => {
                if !self.slots.is_dirty(slot) {
                    log::trace!("frame slot {} is clean, reuse recorded commands", slot);
                    return Ok(RgFrameOutcome::Skipped);
                }
                vk::CommandBufferUsageFlags::empty()
            }
        };

        let scheduled = RgFrameScheduler::schedule(ops, &graph, self.settings.build_secondary_buckets);
        log::trace!("frame slot {}: {} ops, {} secondary buckets", slot, scheduled.ops.len(), scheduled.buckets.len());

        let stream = self.slots.stream(slot)?;
        let stats = RgFrameRecorder::new(stream, &graph)
            .with_overlay(overlay)
            .with_memory_barrier(self.pending_hazards)
            .with_usage(usage)
            .record(&scheduled.ops, allocator, &format!("frame-slot-{slot}"))?;

        self.slots.clear_dirty(slot);
        self.pending_hazards = RgHazardMask::empty();
        Ok(RgFrameOutcome::Recorded(stats))
    }
}
