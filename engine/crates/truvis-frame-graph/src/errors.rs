//! Frame graph 错误定义
//!
//! 这里没有可恢复的错误路径：所有错误要么是上游声明/初始化顺序的编程错误，
//! 要么是后端失败，调用方只能丢弃当前帧（设备丢失时需要重建整个 renderer）。

use ash::vk;

use crate::frame_op::RgSurface;
use crate::pass_meta::RgPassIndex;

#[derive(Debug, thiserror::Error)]
pub enum RgError {
    /// pass 依赖图中存在环
    #[error("dependency cycle detected involving passes: {passes:?}")]
    DependencyCycle { passes: Vec<String> },

    /// 同一个 pass index 被声明了多次，rank 表无法构成双射
    #[error("pass index {0} is declared more than once")]
    DuplicatePassIndex(RgPassIndex),

    /// slot 超出范围
    #[error("frame slot {slot} is out of range ({slot_count} slots)")]
    SlotOutOfRange { slot: usize, slot_count: usize },

    /// 当前 frame slot 的 command stream 从未分配
    #[error("command stream of frame slot {0} was never allocated")]
    StreamNotAllocated(usize),

    /// dirty 标记数组和 command stream 数量不一致
    #[error("dirty flag count {flags} does not match command stream count {streams}")]
    InconsistentDirtyFlags { flags: usize, streams: usize },

    /// 资源分配器无法提供资源组的后备资源
    #[error("resource group \"{0}\" could not be allocated")]
    MissingResource(String),

    /// 资源分配器无法解析渲染目标
    #[error("render target {0:?} could not be resolved")]
    MissingTarget(RgSurface),

    /// blit 的源和目标是同一个 surface
    #[error("blit source and destination alias the same surface {0:?}")]
    BlitAliasing(RgSurface),

    /// begin / end / reset 等后端调用失败
    #[error("command stream {stage} failed: {result}")]
    Backend { stage: &'static str, result: vk::Result },

    /// 设备丢失，直到 renderer 重建前不能再录制
    #[error("GPU device lost")]
    DeviceLost,
}

impl RgError {
    /// 将后端返回的 `vk::Result` 转换为错误，设备丢失单独区分
    pub(crate) fn backend(stage: &'static str, result: vk::Result) -> Self {
        if result == vk::Result::ERROR_DEVICE_LOST {
            truvis_gfx::commands::semaphore::mark_device_lost();
            Self::DeviceLost
        } else {
            Self::Backend { stage, result }
        }
    }
}

pub type RgResult<T> = Result<T, RgError>;
