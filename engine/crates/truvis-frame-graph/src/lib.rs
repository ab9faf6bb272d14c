//! Frame Graph - 声明式帧描述到 Vulkan 命令流的编译器
//!
//! 输入两部分：
//! - 每个逻辑 pass 的元数据（[`RgPassMeta`]）：读写了哪些具名资源、作为哪种 attachment
//! - 一帧内所有的操作（[`RgFrameOp`]）：clear / draw / blit / indirect / dispatch，
//!   每个操作带有所属的 pass index 和调度上下文
//!
//! 输出一条顺序正确、同步正确、render pass 切换尽量少的命令流。
//!
//! # 流水线
//!
//! 1. [`RgGraphCompiler`]：依赖分析 + 稳定拓扑排序 + barrier 规划 + 兼容 pass 合批，
//!    得到 [`RgCompiledGraph`]（pass 拓扑不变时跨帧复用）
//! 2. [`RgFrameScheduler`]：swapchain 上下文合并、确定性排序、secondary bucket 划分
//! 3. [`RgFrameRecorder`]：render pass 状态机，发出 barrier / render pass / 绘制命令
//!
//! [`RgFrameGraph`] 把三步串起来，并负责 frame slot 的 dirty 标记和设备丢失检查。
//!
//! # 使用示例
//!
//! ```ignore
//! use truvis_frame_graph::*;
//!
//! let passes = vec![
//!     RgPassMeta::new(0, "depth-prepass", RgPassStage::Graphics).with_usage(RgResourceUsage::attachment(
//!         RgResourceType::DepthStencilAttachment,
//!         "depth",
//!         vk::AttachmentLoadOp::CLEAR,
//!         vk::AttachmentStoreOp::STORE,
//!     )),
//!     RgPassMeta::new(1, "opaque", RgPassStage::Graphics)
//!         .with_usage(RgResourceUsage::read(RgResourceType::SampledImage, "depth"))
//!         .with_usage(RgResourceUsage::attachment(
//!             RgResourceType::ColorAttachment,
//!             RG_SWAPCHAIN_RESOURCE,
//!             vk::AttachmentLoadOp::CLEAR,
//!             vk::AttachmentStoreOp::STORE,
//!         )),
//! ];
//!
//! let mut frame_graph = RgFrameGraph::new(RgFrameGraphSettings::default());
//! frame_graph.slots_mut().allocate(0, command_buffer)?;
//! frame_graph.record_frame(0, &passes, frame_ops, &mut allocator, Some(&gui_overlay))?;
//! ```

mod allocator;
mod barrier;
mod command_slots;
mod compiler;
mod errors;
mod frame_graph;
mod frame_op;
mod graph;
mod memory_scope;
mod pass_meta;
mod recorder;
mod resource_registry;
mod resource_state;
mod scheduler;
mod settings;

#[cfg(test)]
mod test_utils;

// Re-exports
pub use allocator::{
    RgAllocatedBuffer, RgAllocatedImage, RgMeshRenderer, RgOverlayRenderer, RgResourceAllocator, RgTargetBinding,
};
pub use barrier::{RgPassBarriers, RgPlannedBufferBarrier, RgPlannedImageBarrier, RgSyncInfo, RgSyncPlanner};
pub use command_slots::RgCommandSlots;
pub use compiler::{RgCompiledGraph, RgGraphCompiler, RgPassBatch};
pub use errors::{RgError, RgResult};
pub use frame_graph::{RgFrameGraph, RgFrameOutcome};
pub use frame_op::{
    RgBlitOp, RgClearOp, RgComputeDispatchOp, RgDrawState, RgFrameOp, RgFrameOpContext, RgFrameOpKind,
    RgFrameOpType, RgIndirectDrawOp, RgMeshDrawOp, RgSurface, RgTargetHandle,
};
pub use graph::{RgDependencyAnalyzer, RgDependencyEdge, RgDependencyGraph};
pub use memory_scope::{RgHazardMask, RgMemoryScope};
pub use pass_meta::{
    RG_SWAPCHAIN_PSEUDO_PASS, RG_SWAPCHAIN_RESOURCE, RgPassIndex, RgPassMeta, RgPassStage, RgResourceAccess,
    RgResourceType, RgResourceUsage,
};
pub use recorder::{RgFrameRecorder, RgRecordStats};
pub use resource_registry::{RgResourceGroup, RgResourceGroupHandle, RgResourceRegistry};
pub use resource_state::{RgBufferState, RgImageState};
pub use scheduler::{RgFrameScheduler, RgScheduledFrame, RgSecondaryBucket};
pub use settings::{RgFrameGraphSettings, RgRecordPolicy};
