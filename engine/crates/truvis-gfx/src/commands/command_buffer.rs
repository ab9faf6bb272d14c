use std::ffi::CString;

use ash::prelude::VkResult;
use ash::vk;
use itertools::Itertools;

use crate::basic::color::LabelColor;
use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier, GfxMemoryBarrier};
use crate::commands::command_encoder::GfxCommandEncoder;

/// 命令缓冲封装
///
/// 封装 Vulkan CommandBuffer，device 通过参数显式传入，而不是从全局单例获取，
/// 这样同一个类型既可以用于主线程的 primary buffer，也可以交给 worker 录制 secondary buffer。
///
/// # 使用示例
/// ```ignore
/// let cmd = GfxCommandBuffer::allocate(device.clone(), debug_utils, pool, vk::CommandBufferLevel::PRIMARY, "frame-A")?;
/// cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "frame-A")?;
/// // 录制命令...
/// cmd.end()?;
/// ```
#[derive(Clone)]
pub struct GfxCommandBuffer {
    device: ash::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,

    vk_handle: vk::CommandBuffer,

    #[cfg(debug_assertions)]
    name: String,
}

// new & init
impl GfxCommandBuffer {
    pub fn allocate(
        device: ash::Device,
        debug_utils: Option<ash::ext::debug_utils::Device>,
        command_pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
        debug_name: &str,
    ) -> VkResult<Self> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(level)
            .command_buffer_count(1);

        let vk_handle = unsafe { device.allocate_command_buffers(&info)?[0] };
        log::debug!("allocate command buffer: {}", debug_name);

        Ok(Self {
            device,
            debug_utils,
            vk_handle,

            #[cfg(debug_assertions)]
            name: debug_name.to_string(),
        })
    }
}

// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }

    #[cfg(debug_assertions)]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl GfxCommandEncoder for GfxCommandBuffer {
    #[inline]
    fn reset(&self) -> VkResult<()> {
        unsafe { self.device.reset_command_buffer(self.vk_handle, vk::CommandBufferResetFlags::empty()) }
    }

    #[inline]
    fn begin(&self, usage_flag: vk::CommandBufferUsageFlags, debug_label_name: &str) -> VkResult<()> {
        unsafe {
            self.device
                .begin_command_buffer(self.vk_handle, &vk::CommandBufferBeginInfo::default().flags(usage_flag))?;
        }
        self.begin_label(debug_label_name, LabelColor::COLOR_CMD);
        Ok(())
    }

    #[inline]
    fn end(&self) -> VkResult<()> {
        self.end_label();
        unsafe { self.device.end_command_buffer(self.vk_handle) }
    }

    fn cmd_begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);
        unsafe {
            self.device.cmd_begin_render_pass(self.vk_handle, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    #[inline]
    fn cmd_end_render_pass(&self) {
        unsafe { self.device.cmd_end_render_pass(self.vk_handle) }
    }

    #[inline]
    fn cmd_clear_attachments(&self, attachments: &[vk::ClearAttachment], rects: &[vk::ClearRect]) {
        unsafe { self.device.cmd_clear_attachments(self.vk_handle, attachments, rects) }
    }

    #[inline]
    fn cmd_set_viewport(&self, first_viewport: u32, viewports: &[vk::Viewport]) {
        unsafe { self.device.cmd_set_viewport(self.vk_handle, first_viewport, viewports) }
    }

    #[inline]
    fn cmd_set_scissor(&self, first_scissor: u32, scissors: &[vk::Rect2D]) {
        unsafe { self.device.cmd_set_scissor(self.vk_handle, first_scissor, scissors) }
    }

    #[inline]
    fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(self.vk_handle, bind_point, pipeline) }
    }

    #[inline]
    fn cmd_blit_image(
        &self,
        src_image: vk::Image,
        src_layout: vk::ImageLayout,
        dst_image: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        unsafe {
            self.device.cmd_blit_image(self.vk_handle, src_image, src_layout, dst_image, dst_layout, regions, filter);
        }
    }

    #[inline]
    fn cmd_dispatch(&self, group_cnt: glam::UVec3) {
        unsafe { self.device.cmd_dispatch(self.vk_handle, group_cnt.x, group_cnt.y, group_cnt.z) }
    }

    #[inline]
    fn cmd_draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe { self.device.cmd_draw(self.vk_handle, vertex_count, instance_count, first_vertex, first_instance) }
    }

    #[inline]
    fn cmd_draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                self.vk_handle,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    #[inline]
    fn cmd_draw_indirect(&self, buffer: vk::Buffer, offset: vk::DeviceSize, draw_count: u32, stride: u32) {
        unsafe { self.device.cmd_draw_indirect(self.vk_handle, buffer, offset, draw_count, stride) }
    }

    #[inline]
    fn cmd_draw_indexed_indirect(&self, buffer: vk::Buffer, offset: vk::DeviceSize, draw_count: u32, stride: u32) {
        unsafe { self.device.cmd_draw_indexed_indirect(self.vk_handle, buffer, offset, draw_count, stride) }
    }

    #[inline]
    fn memory_barrier(&self, barriers: &[GfxMemoryBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info = vk::DependencyInfo::default().memory_barriers(&barriers);
        unsafe { self.device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info) }
    }

    #[inline]
    fn image_memory_barrier(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(&barriers).dependency_flags(dependency_flags);
        unsafe { self.device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info) }
    }

    #[inline]
    fn buffer_memory_barrier(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxBufferBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info =
            vk::DependencyInfo::default().buffer_memory_barriers(&barriers).dependency_flags(dependency_flags);
        unsafe { self.device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info) }
    }

    fn begin_label(&self, label_name: &str, label_color: glam::Vec4) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let name = CString::new(label_name).unwrap_or_default();
        unsafe {
            debug_utils.cmd_begin_debug_utils_label(
                self.vk_handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(label_color.into()),
            );
        }
    }

    fn end_label(&self) {
        if let Some(debug_utils) = &self.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(self.vk_handle) }
        }
    }
}
