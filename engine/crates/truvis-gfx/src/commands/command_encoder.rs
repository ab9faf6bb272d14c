use ash::prelude::VkResult;
use ash::vk;

use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier, GfxMemoryBarrier};

/// 命令录制接口
///
/// frame graph 的 recorder 只通过这个 trait 发出命令，
/// 真实后端是 [`GfxCommandBuffer`](crate::commands::command_buffer::GfxCommandBuffer)，
/// 测试中可以用记录命令序列的 mock 替代。
///
/// 所有方法都只接收 `&self`：命令缓冲本身就是一个 vk handle，录制不需要 Rust 层面的独占借用。
pub trait GfxCommandEncoder {
    /// 重置 command stream，丢弃之前录制的所有命令
    fn reset(&self) -> VkResult<()>;

    /// 开始录制，自动 begin 一个 debug label
    fn begin(&self, usage_flag: vk::CommandBufferUsageFlags, debug_label_name: &str) -> VkResult<()>;

    /// 结束录制，自动 end debug label
    fn end(&self) -> VkResult<()>;

    // ---------------- render pass ----------------

    /// - command type: action, state
    /// - supported queue types: graphics
    fn cmd_begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    );

    /// - command type: action, state
    /// - supported queue types: graphics
    fn cmd_end_render_pass(&self);

    /// 在已经打开的 render pass 内部清除 attachment 的一个区域
    ///
    /// - command type: action
    /// - supported queue types: graphics
    fn cmd_clear_attachments(&self, attachments: &[vk::ClearAttachment], rects: &[vk::ClearRect]);

    // ---------------- state ----------------

    /// - command type: state
    /// - supported queue types: graphics
    fn cmd_set_viewport(&self, first_viewport: u32, viewports: &[vk::Viewport]);

    /// - command type: state
    /// - supported queue types: graphics
    fn cmd_set_scissor(&self, first_scissor: u32, scissors: &[vk::Rect2D]);

    /// - command type: state
    /// - supported queue types: graphics, compute
    fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);

    // ---------------- action ----------------

    /// 必须在 render pass 之外
    ///
    /// - command type: action
    /// - supported queue types: graphics
    fn cmd_blit_image(
        &self,
        src_image: vk::Image,
        src_layout: vk::ImageLayout,
        dst_image: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    );

    /// 必须在 render pass 之外
    ///
    /// - command type: action
    /// - supported queue types: compute
    fn cmd_dispatch(&self, group_cnt: glam::UVec3);

    /// - command type: action
    /// - supported queue types: graphics
    fn cmd_draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    /// - command type: action
    /// - supported queue types: graphics
    fn cmd_draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    /// - command type: action
    /// - supported queue types: graphics
    fn cmd_draw_indirect(&self, buffer: vk::Buffer, offset: vk::DeviceSize, draw_count: u32, stride: u32);

    /// - command type: action
    /// - supported queue types: graphics
    fn cmd_draw_indexed_indirect(&self, buffer: vk::Buffer, offset: vk::DeviceSize, draw_count: u32, stride: u32);

    // ---------------- synchronize ----------------

    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    fn memory_barrier(&self, barriers: &[GfxMemoryBarrier]);

    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    fn image_memory_barrier(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]);

    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    fn buffer_memory_barrier(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxBufferBarrier]);

    // ---------------- debug ----------------

    fn begin_label(&self, label_name: &str, label_color: glam::Vec4);

    fn end_label(&self);
}
