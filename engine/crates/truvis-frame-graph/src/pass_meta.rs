//! Pass 元数据
//!
//! 每一帧由上层的 render graph 声明层提交，描述每个逻辑 pass 读写了哪些具名资源。
//! 提交顺序不保证执行顺序，执行顺序完全由共享资源名推导出的依赖图决定。

use ash::vk;
use itertools::Itertools;

use crate::resource_state::{RgBufferState, RgImageState};

/// 逻辑 pass 的编号，由声明层分配
pub type RgPassIndex = u32;

/// 伪 pass：“第一个使用 swapchain 的 pass 之前”
///
/// swapchain image 的入口 barrier 挂在这个 key 下，在录制开始时统一发出。
pub const RG_SWAPCHAIN_PSEUDO_PASS: RgPassIndex = RgPassIndex::MAX;

/// pass 元数据中表示可呈现 surface 的资源名
pub const RG_SWAPCHAIN_RESOURCE: &str = "swapchain";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgPassStage {
    Graphics,
    Compute,
    Transfer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceType {
    ColorAttachment,
    DepthStencilAttachment,
    SampledImage,
    StorageImage,
    TransferSrc,
    TransferDst,
    UniformBuffer,
    StorageBuffer,
    IndirectBuffer,
    VertexBuffer,
}

impl RgResourceType {
    /// attachment signature 中使用的名字
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ColorAttachment => "color",
            Self::DepthStencilAttachment => "depth-stencil",
            Self::SampledImage => "sampled",
            Self::StorageImage => "storage-image",
            Self::TransferSrc => "transfer-src",
            Self::TransferDst => "transfer-dst",
            Self::UniformBuffer => "uniform",
            Self::StorageBuffer => "storage-buffer",
            Self::IndirectBuffer => "indirect",
            Self::VertexBuffer => "vertex",
        }
    }

    #[inline]
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            Self::ColorAttachment
                | Self::DepthStencilAttachment
                | Self::SampledImage
                | Self::StorageImage
                | Self::TransferSrc
                | Self::TransferDst
        )
    }

    /// 从资源类型推断的 image aspect，分配器可以根据实际 format 覆盖
    #[inline]
    pub fn default_aspect(&self) -> vk::ImageAspectFlags {
        match self {
            Self::DepthStencilAttachment => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            _ if self.is_image() => vk::ImageAspectFlags::COLOR,
            _ => vk::ImageAspectFlags::empty(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceAccess {
    Read,
    Write,
    ReadWrite,
}

impl RgResourceAccess {
    #[inline]
    pub fn reads(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    #[inline]
    pub fn writes(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// pass 对一个具名资源的一次使用
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RgResourceUsage {
    pub resource_type: RgResourceType,
    pub resource_name: String,
    pub is_attachment: bool,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub access: RgResourceAccess,
}

// new & init
impl RgResourceUsage {
    fn non_attachment(resource_type: RgResourceType, name: impl Into<String>, access: RgResourceAccess) -> Self {
        Self {
            resource_type,
            resource_name: name.into(),
            is_attachment: false,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            access,
        }
    }

    pub fn read(resource_type: RgResourceType, name: impl Into<String>) -> Self {
        Self::non_attachment(resource_type, name, RgResourceAccess::Read)
    }

    pub fn write(resource_type: RgResourceType, name: impl Into<String>) -> Self {
        Self::non_attachment(resource_type, name, RgResourceAccess::Write)
    }

    pub fn read_write(resource_type: RgResourceType, name: impl Into<String>) -> Self {
        Self::non_attachment(resource_type, name, RgResourceAccess::ReadWrite)
    }

    /// render pass attachment
    ///
    /// attachment 总是写入；`load_op == LOAD` 时同时读取之前的内容
    pub fn attachment(
        resource_type: RgResourceType,
        name: impl Into<String>,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
    ) -> Self {
        let access = if load_op == vk::AttachmentLoadOp::LOAD {
            RgResourceAccess::ReadWrite
        } else {
            RgResourceAccess::Write
        };
        Self {
            resource_type,
            resource_name: name.into(),
            is_attachment: true,
            load_op,
            store_op,
            access,
        }
    }
}

// tools
impl RgResourceUsage {
    /// `type:name:loadOp:storeOp`
    pub fn signature_token(&self) -> String {
        format!("{}:{}:{:?}:{:?}", self.resource_type.as_str(), self.resource_name, self.load_op, self.store_op)
    }

    #[inline]
    pub fn is_swapchain(&self) -> bool {
        self.resource_name == RG_SWAPCHAIN_RESOURCE
    }

    /// 这次使用要求 image 处于的状态
    pub fn required_image_state(&self, stage: RgPassStage) -> RgImageState {
        use RgResourceAccess::*;
        let compute = stage != RgPassStage::Graphics;
        match (self.resource_type, self.access) {
            (RgResourceType::ColorAttachment, Read) => RgImageState::COLOR_ATTACHMENT_READ,
            (RgResourceType::ColorAttachment, Write) => RgImageState::COLOR_ATTACHMENT_WRITE,
            (RgResourceType::ColorAttachment, ReadWrite) => RgImageState::COLOR_ATTACHMENT_READ_WRITE,

            (RgResourceType::DepthStencilAttachment, Read) => RgImageState::DEPTH_READ_ONLY,
            (RgResourceType::DepthStencilAttachment, Write) => RgImageState::DEPTH_ATTACHMENT_WRITE,
            (RgResourceType::DepthStencilAttachment, ReadWrite) => RgImageState::DEPTH_ATTACHMENT_READ_WRITE,

            (RgResourceType::SampledImage, _) if compute => RgImageState::SHADER_READ_COMPUTE,
            (RgResourceType::SampledImage, _) => RgImageState::SHADER_READ_FRAGMENT,

            (RgResourceType::StorageImage, Read) if compute => RgImageState::STORAGE_READ_COMPUTE,
            (RgResourceType::StorageImage, Write) if compute => RgImageState::STORAGE_WRITE_COMPUTE,
            (RgResourceType::StorageImage, ReadWrite) if compute => RgImageState::STORAGE_READ_WRITE_COMPUTE,
            (RgResourceType::StorageImage, Read) => RgImageState::STORAGE_READ_FRAGMENT,
            (RgResourceType::StorageImage, Write) => RgImageState::STORAGE_WRITE_FRAGMENT,
            (RgResourceType::StorageImage, ReadWrite) => RgImageState::STORAGE_READ_WRITE_FRAGMENT,

            (RgResourceType::TransferSrc, _) => RgImageState::TRANSFER_SRC,
            (RgResourceType::TransferDst, _) => RgImageState::TRANSFER_DST,

            // buffer 类型不会走到这里
            _ => RgImageState::UNDEFINED,
        }
    }

    /// 这次使用要求 buffer 处于的状态
    pub fn required_buffer_state(&self, stage: RgPassStage) -> RgBufferState {
        use RgResourceAccess::*;
        let compute = stage != RgPassStage::Graphics;
        match (self.resource_type, self.access) {
            (RgResourceType::UniformBuffer, _) if compute => RgBufferState::UNIFORM_COMPUTE,
            (RgResourceType::UniformBuffer, _) => RgBufferState::UNIFORM_GRAPHICS,

            (RgResourceType::StorageBuffer, Read) if compute => RgBufferState::STORAGE_READ_COMPUTE,
            (RgResourceType::StorageBuffer, Write) if compute => RgBufferState::STORAGE_WRITE_COMPUTE,
            (RgResourceType::StorageBuffer, ReadWrite) if compute => RgBufferState::STORAGE_READ_WRITE_COMPUTE,
            (RgResourceType::StorageBuffer, Read) => RgBufferState::STORAGE_READ_GRAPHICS,
            (RgResourceType::StorageBuffer, Write) => RgBufferState::STORAGE_WRITE_GRAPHICS,
            (RgResourceType::StorageBuffer, ReadWrite) => RgBufferState::STORAGE_READ_WRITE_GRAPHICS,

            (RgResourceType::IndirectBuffer, _) => RgBufferState::INDIRECT_BUFFER,
            (RgResourceType::VertexBuffer, _) => RgBufferState::VERTEX_BUFFER,

            _ => RgBufferState::UNDEFINED,
        }
    }
}

/// 一个逻辑 pass 的元数据
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RgPassMeta {
    pub pass_index: RgPassIndex,
    pub name: String,
    pub stage: RgPassStage,
    pub resource_usages: Vec<RgResourceUsage>,
}

// new & init
impl RgPassMeta {
    pub fn new(pass_index: RgPassIndex, name: impl Into<String>, stage: RgPassStage) -> Self {
        Self {
            pass_index,
            name: name.into(),
            stage,
            resource_usages: Vec::new(),
        }
    }

    /// builder
    #[inline]
    pub fn with_usage(mut self, usage: RgResourceUsage) -> Self {
        self.resource_usages.push(usage);
        self
    }
}

// tools
impl RgPassMeta {
    /// 与 usage 声明顺序无关的 attachment 签名
    ///
    /// 只有 attachment 参与签名，两个 pass 的签名文本相等才能共享一个 render pass
    pub fn attachment_signature(&self) -> String {
        self.resource_usages
            .iter()
            .filter(|usage| usage.is_attachment)
            .map(RgResourceUsage::signature_token)
            .sorted()
            .join("|")
    }

    #[inline]
    pub fn touches_swapchain(&self) -> bool {
        self.resource_usages.iter().any(RgResourceUsage::is_swapchain)
    }
}
