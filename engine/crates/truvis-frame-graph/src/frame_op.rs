//! 帧操作
//!
//! 帧生产者在遍历场景时追加的扁平操作流，每个操作带有所属的逻辑 pass 和调度上下文。
//! 操作只在当前帧内存活，被 recorder 消费一次之后丢弃。

use std::fmt;

use ash::vk;

use crate::allocator::RgMeshRenderer;
use crate::pass_meta::RgPassIndex;

/// 离屏渲染目标的句柄，由资源分配器解析
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RgTargetHandle(pub u32);

/// 渲染目标 surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgSurface {
    /// 可呈现的 swapchain image
    Swapchain,
    Offscreen(RgTargetHandle),
}

/// 调度上下文
///
/// 两个操作的上下文相等，才可以共享同一个打开的 render pass
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgFrameOpContext {
    /// 不透明的分组标识：同一组的操作之间不会插入其它组的 render pass 状态
    pub scheduling_identity: u64,
    pub target: RgSurface,
}

impl RgFrameOpContext {
    #[inline]
    pub fn new(scheduling_identity: u64, target: RgSurface) -> Self {
        Self {
            scheduling_identity,
            target,
        }
    }

    #[inline]
    pub fn targets_swapchain(&self) -> bool {
        self.target == RgSurface::Swapchain
    }
}

/// 在打开的 render pass 内清除 attachment 的一个区域
#[derive(Clone, Copy, Debug)]
pub struct RgClearOp {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
    pub clear_color: glam::Vec4,
    pub clear_depth: f32,
    pub clear_stencil: u32,
    pub rect: vk::Rect2D,
}

impl RgClearOp {
    /// 需要清除的 attachment
    pub fn clear_attachments(&self) -> Vec<vk::ClearAttachment> {
        let mut attachments = Vec::with_capacity(2);
        if self.color {
            attachments.push(vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                color_attachment: 0,
                clear_value: vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: self.clear_color.to_array(),
                    },
                },
            });
        }

        let mut depth_stencil_aspect = vk::ImageAspectFlags::empty();
        if self.depth {
            depth_stencil_aspect |= vk::ImageAspectFlags::DEPTH;
        }
        if self.stencil {
            depth_stencil_aspect |= vk::ImageAspectFlags::STENCIL;
        }
        if !depth_stencil_aspect.is_empty() {
            attachments.push(vk::ClearAttachment {
                aspect_mask: depth_stencil_aspect,
                color_attachment: vk::ATTACHMENT_UNUSED,
                clear_value: vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: self.clear_depth,
                        stencil: self.clear_stencil,
                    },
                },
            });
        }
        attachments
    }
}

/// 每次绘制的动态状态快照
///
/// viewport / scissor 每次绘制都重新设置，不继承 pass 的默认值，
/// 这样多个相机可以共享同一个 render pass
#[derive(Clone, Copy, Debug)]
pub struct RgDrawState {
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,
    pub pipeline: vk::Pipeline,
}

/// 由拥有该 mesh 的 renderer 录制的绘制
#[derive(Clone, Copy)]
pub struct RgMeshDrawOp<'a> {
    pub draw_state: RgDrawState,
    pub renderer: &'a dyn RgMeshRenderer,
}

impl fmt::Debug for RgMeshDrawOp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RgMeshDrawOp").field("draw_state", &self.draw_state).finish_non_exhaustive()
    }
}

/// surface 之间的 blit
#[derive(Clone, Debug)]
pub struct RgBlitOp {
    pub src: RgSurface,
    pub dst: RgSurface,
    pub regions: Vec<vk::ImageBlit>,
    pub linear_filter: bool,
}

/// 参数来自 GPU buffer 的绘制，buffer 已经由上层解析
#[derive(Clone, Copy, Debug)]
pub struct RgIndirectDrawOp {
    pub draw_state: RgDrawState,
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub draw_count: u32,
    pub stride: u32,
    pub indexed: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct RgComputeDispatchOp {
    pub pipeline: vk::Pipeline,
    pub group_count: glam::UVec3,
}

#[derive(Clone, Debug)]
pub enum RgFrameOpKind<'a> {
    Clear(RgClearOp),
    MeshDraw(RgMeshDrawOp<'a>),
    Blit(RgBlitOp),
    IndirectDraw(RgIndirectDrawOp),
    ComputeDispatch(RgComputeDispatchOp),
}

/// 操作类型，用于 secondary bucket 划分
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgFrameOpType {
    Clear,
    MeshDraw,
    Blit,
    IndirectDraw,
    ComputeDispatch,
}

impl RgFrameOpType {
    /// 录制时不依赖交错的 render pass 状态，可以放进 secondary command buffer
    #[inline]
    pub fn is_secondary_eligible(&self) -> bool {
        matches!(self, Self::Blit | Self::IndirectDraw | Self::ComputeDispatch)
    }
}

/// 一个帧操作
///
/// Clear / MeshDraw / IndirectDraw 的渲染目标是 `context.target`
#[derive(Clone, Debug)]
pub struct RgFrameOp<'a> {
    pub pass_index: RgPassIndex,
    pub context: RgFrameOpContext,
    pub kind: RgFrameOpKind<'a>,
}

// new & init
impl<'a> RgFrameOp<'a> {
    #[inline]
    pub fn new(pass_index: RgPassIndex, context: RgFrameOpContext, kind: RgFrameOpKind<'a>) -> Self {
        Self {
            pass_index,
            context,
            kind,
        }
    }

    pub fn clear(pass_index: RgPassIndex, context: RgFrameOpContext, clear: RgClearOp) -> Self {
        Self::new(pass_index, context, RgFrameOpKind::Clear(clear))
    }

    pub fn mesh_draw(
        pass_index: RgPassIndex,
        context: RgFrameOpContext,
        draw_state: RgDrawState,
        renderer: &'a dyn RgMeshRenderer,
    ) -> Self {
        Self::new(pass_index, context, RgFrameOpKind::MeshDraw(RgMeshDrawOp { draw_state, renderer }))
    }

    pub fn blit(pass_index: RgPassIndex, context: RgFrameOpContext, blit: RgBlitOp) -> Self {
        Self::new(pass_index, context, RgFrameOpKind::Blit(blit))
    }

    pub fn indirect_draw(pass_index: RgPassIndex, context: RgFrameOpContext, draw: RgIndirectDrawOp) -> Self {
        Self::new(pass_index, context, RgFrameOpKind::IndirectDraw(draw))
    }

    pub fn compute_dispatch(pass_index: RgPassIndex, context: RgFrameOpContext, dispatch: RgComputeDispatchOp) -> Self {
        Self::new(pass_index, context, RgFrameOpKind::ComputeDispatch(dispatch))
    }
}

// getters
impl RgFrameOp<'_> {
    #[inline]
    pub fn op_type(&self) -> RgFrameOpType {
        match &self.kind {
            RgFrameOpKind::Clear(_) => RgFrameOpType::Clear,
            RgFrameOpKind::MeshDraw(_) => RgFrameOpType::MeshDraw,
            RgFrameOpKind::Blit(_) => RgFrameOpType::Blit,
            RgFrameOpKind::IndirectDraw(_) => RgFrameOpType::IndirectDraw,
            RgFrameOpKind::ComputeDispatch(_) => RgFrameOpType::ComputeDispatch,
        }
    }

    #[inline]
    pub fn targets_swapchain(&self) -> bool {
        self.context.targets_swapchain()
    }

    /// 这个操作需要解析的 surface
    pub fn referenced_surfaces(&self) -> impl Iterator<Item = RgSurface> {
        let (first, second) = match &self.kind {
            RgFrameOpKind::Clear(_) | RgFrameOpKind::MeshDraw(_) | RgFrameOpKind::IndirectDraw(_) => {
                (Some(self.context.target), None)
            }
            RgFrameOpKind::Blit(blit) => (Some(blit.src), Some(blit.dst)),
            RgFrameOpKind::ComputeDispatch(_) => (None, None),
        };
        first.into_iter().chain(second)
    }
}
