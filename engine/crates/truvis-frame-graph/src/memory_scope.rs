//! 粗粒度内存 barrier
//!
//! 上层用抽象的 hazard 类别描述“接下来要以什么方式读取之前写入的数据”，
//! 这里把它解析成具体的 pipeline stage 和 access scope。

use ash::vk;
use truvis_gfx::commands::barrier::GfxBarrierMask;

bitflags::bitflags! {
    /// 抽象 hazard 类别
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RgHazardMask: u32 {
        const VERTEX_ATTRIB_ARRAY = 1 << 0;
        const ELEMENT_ARRAY = 1 << 1;
        const UNIFORM = 1 << 2;
        const TEXTURE_FETCH = 1 << 3;
        const SHADER_IMAGE_ACCESS = 1 << 4;
        const COMMAND = 1 << 5;
        const PIXEL_BUFFER = 1 << 6;
        const TEXTURE_UPDATE = 1 << 7;
        const BUFFER_UPDATE = 1 << 8;
        const FRAMEBUFFER = 1 << 9;
        const TRANSFORM_FEEDBACK = 1 << 10;
        const QUERY_BUFFER = 1 << 11;
        const CLIENT_MAPPED_BUFFER = 1 << 12;
        const ATOMIC_COUNTER = 1 << 13;
        const SHADER_STORAGE = 1 << 14;
    }
}

/// 可能写入数据的所有 stage：着色器和传输
const PRODUCER_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags2::FRAGMENT_SHADER.as_raw()
        | vk::PipelineStageFlags2::COMPUTE_SHADER.as_raw()
        | vk::PipelineStageFlags2::TRANSFER.as_raw(),
);

const PRODUCER_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw() | vk::AccessFlags2::TRANSFER_WRITE.as_raw(),
);

const SHADER_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags2::FRAGMENT_SHADER.as_raw()
        | vk::PipelineStageFlags2::COMPUTE_SHADER.as_raw(),
);

const STORAGE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::SHADER_STORAGE_READ.as_raw() | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
);

const TRANSFER_ACCESS: vk::AccessFlags2 =
    vk::AccessFlags2::from_raw(vk::AccessFlags2::TRANSFER_READ.as_raw() | vk::AccessFlags2::TRANSFER_WRITE.as_raw());

const FRAMEBUFFER_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT.as_raw()
        | vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
        | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
);

const FRAMEBUFFER_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
);

/// 单个类别的固定 scope：src 总是着色器/传输写入，dst 是该类别的读取方式
const fn category_scope(dst_stage: vk::PipelineStageFlags2, dst_access: vk::AccessFlags2) -> GfxBarrierMask {
    GfxBarrierMask {
        src_stage: PRODUCER_STAGES,
        dst_stage,
        src_access: PRODUCER_ACCESS,
        dst_access,
    }
}

const CATEGORY_SCOPES: [(RgHazardMask, GfxBarrierMask); 15] = [
    (
        RgHazardMask::VERTEX_ATTRIB_ARRAY,
        category_scope(vk::PipelineStageFlags2::VERTEX_INPUT, vk::AccessFlags2::VERTEX_ATTRIBUTE_READ),
    ),
    (
        RgHazardMask::ELEMENT_ARRAY,
        category_scope(vk::PipelineStageFlags2::INDEX_INPUT, vk::AccessFlags2::INDEX_READ),
    ),
    (RgHazardMask::UNIFORM, category_scope(SHADER_STAGES, vk::AccessFlags2::UNIFORM_READ)),
    (RgHazardMask::TEXTURE_FETCH, category_scope(SHADER_STAGES, vk::AccessFlags2::SHADER_SAMPLED_READ)),
    (RgHazardMask::SHADER_IMAGE_ACCESS, category_scope(SHADER_STAGES, STORAGE_ACCESS)),
    (
        RgHazardMask::COMMAND,
        category_scope(vk::PipelineStageFlags2::DRAW_INDIRECT, vk::AccessFlags2::INDIRECT_COMMAND_READ),
    ),
    (RgHazardMask::PIXEL_BUFFER, category_scope(vk::PipelineStageFlags2::TRANSFER, TRANSFER_ACCESS)),
    (
        RgHazardMask::TEXTURE_UPDATE,
        category_scope(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
    ),
    (RgHazardMask::BUFFER_UPDATE, category_scope(vk::PipelineStageFlags2::TRANSFER, TRANSFER_ACCESS)),
    (RgHazardMask::FRAMEBUFFER, category_scope(FRAMEBUFFER_STAGES, FRAMEBUFFER_ACCESS)),
    (
        RgHazardMask::TRANSFORM_FEEDBACK,
        category_scope(vk::PipelineStageFlags2::TRANSFORM_FEEDBACK_EXT, vk::AccessFlags2::TRANSFORM_FEEDBACK_WRITE_EXT),
    ),
    (
        RgHazardMask::QUERY_BUFFER,
        category_scope(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
    ),
    (
        RgHazardMask::CLIENT_MAPPED_BUFFER,
        category_scope(vk::PipelineStageFlags2::HOST, vk::AccessFlags2::HOST_READ),
    ),
    (RgHazardMask::ATOMIC_COUNTER, category_scope(SHADER_STAGES, STORAGE_ACCESS)),
    (RgHazardMask::SHADER_STORAGE, category_scope(SHADER_STAGES, STORAGE_ACCESS)),
];

/// hazard 类别到 barrier scope 的解析
pub struct RgMemoryScope;

impl RgMemoryScope {
    /// 把 hazard mask 解析成 barrier scope
    ///
    /// - 空 mask 不需要 barrier，返回 `None`
    /// - 多个类别按 flag 取并集
    /// - 解析结果中任何为空的分量退化为“所有命令 / 所有内存”，不会省略同步
    pub fn resolve(mask: RgHazardMask) -> Option<GfxBarrierMask> {
        if mask.is_empty() {
            return None;
        }

        let mut scope = GfxBarrierMask {
            src_stage: vk::PipelineStageFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
        };
        for (_, category_scope) in CATEGORY_SCOPES.iter().filter(|(category, _)| mask.contains(*category)) {
            scope.src_stage |= category_scope.src_stage;
            scope.dst_stage |= category_scope.dst_stage;
            scope.src_access |= category_scope.src_access;
            scope.dst_access |= category_scope.dst_access;
        }

        let mut widened = false;
        if scope.src_stage.is_empty() {
            scope.src_stage = GfxBarrierMask::ALL.src_stage;
            widened = true;
        }
        if scope.dst_stage.is_empty() {
            scope.dst_stage = GfxBarrierMask::ALL.dst_stage;
            widened = true;
        }
        if scope.src_access.is_empty() {
            scope.src_access = GfxBarrierMask::ALL.src_access;
            widened = true;
        }
        if scope.dst_access.is_empty() {
            scope.dst_access = GfxBarrierMask::ALL.dst_access;
            widened = true;
        }
        if widened {
            log::warn!("hazard mask {:#x} resolved to an empty scope, widened to all commands", mask.bits());
        }

        Some(scope)
    }
}
