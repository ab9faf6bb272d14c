//! Recorder 的外部协作者
//!
//! - [`RgResourceAllocator`]：把资源组和渲染目标解析成物理资源
//! - [`RgMeshRenderer`]：录制单个 mesh 的绘制
//! - [`RgOverlayRenderer`]：收尾 swapchain pass 中的 overlay（调试 UI 等）
//!
//! 这些 trait 都只在录制线程上调用。

use ash::vk;
use truvis_gfx::commands::command_encoder::GfxCommandEncoder;

use crate::frame_op::{RgDrawState, RgSurface};
use crate::resource_registry::RgResourceGroup;
use crate::resource_state::{RgBufferState, RgImageState};

/// 资源组的后备 image 及其当前状态
#[derive(Clone, Copy, Debug)]
pub struct RgAllocatedImage {
    pub image: vk::Image,
    /// 由 format 推断的 aspect，为空时使用资源类型推断的 aspect
    pub aspect: vk::ImageAspectFlags,
    pub current_state: RgImageState,
}

/// 资源组的后备 buffer 及其当前状态
#[derive(Clone, Copy, Debug)]
pub struct RgAllocatedBuffer {
    pub buffer: vk::Buffer,
    pub current_state: RgBufferState,
}

/// 渲染目标解析结果
#[derive(Clone)]
pub struct RgTargetBinding {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub render_area: vk::Rect2D,
    pub clear_values: Vec<vk::ClearValue>,
    /// blit 使用的颜色 image
    pub color_image: vk::Image,
    /// 在 render pass 之外时颜色 image 所处的状态，blit 结束后切回这个状态
    pub steady_state: RgImageState,
}

/// 资源分配器
///
/// 所有方法都必须幂等：同一帧内可能对同一个资源组调用多次
pub trait RgResourceAllocator {
    /// 返回（必要时创建）资源组的后备 image，无法提供时返回 `None`
    fn ensure_allocated_image(&mut self, group: &RgResourceGroup) -> Option<RgAllocatedImage>;

    /// 返回（必要时创建）资源组的后备 buffer，无法提供时返回 `None`
    fn ensure_allocated_buffer(&mut self, group: &RgResourceGroup) -> Option<RgAllocatedBuffer>;

    /// 解析渲染目标：swapchain 使用固定的 render pass / framebuffer，离屏目标使用各自的
    fn resolve_target(&mut self, target: RgSurface) -> Option<RgTargetBinding>;

    /// 录制结束后 image 所处的状态，下一帧的入口 barrier 以此为前置状态
    fn commit_image_state(&mut self, group: &RgResourceGroup, state: RgImageState);

    fn commit_buffer_state(&mut self, group: &RgResourceGroup, state: RgBufferState);
}

/// 可以绘制 mesh 的 renderer
///
/// 只能发出绑定和绘制命令，不能自己开始或结束 render pass
pub trait RgMeshRenderer {
    fn record_draw(&self, encoder: &dyn GfxCommandEncoder, render_pass: vk::RenderPass, draw_state: &RgDrawState);
}

/// 收尾 swapchain pass 中的内容
pub trait RgOverlayRenderer {
    fn record_overlay(&self, encoder: &dyn GfxCommandEncoder, render_pass: vk::RenderPass, render_area: vk::Rect2D);
}
