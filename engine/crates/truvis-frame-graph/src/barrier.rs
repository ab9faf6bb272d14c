//! Barrier 规划
//!
//! 按编译后的 pass 顺序跟踪每个资源组的最后已知状态，
//! 在 pass 边界上生成把资源切换到下一次使用所需状态的 barrier。
//!
//! 本帧对某个资源组的第一次使用是入口 barrier：编译期不知道资源上一帧留下的状态，
//! 前置状态先用 `UNDEFINED` 占位，录制时由分配器报告的实际状态替换。

use std::collections::HashMap;

use ash::vk;
use truvis_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};

use crate::compiler::RgPassBatch;
use crate::pass_meta::{RG_SWAPCHAIN_PSEUDO_PASS, RgPassIndex, RgPassMeta};
use crate::resource_registry::{RgResourceGroupHandle, RgResourceRegistry};
use crate::resource_state::{RgBufferState, RgImageState};

/// 规划好的图像 barrier
#[derive(Clone, Debug, PartialEq)]
pub struct RgPlannedImageBarrier {
    pub group: RgResourceGroupHandle,
    pub previous_state: RgImageState,
    pub next_state: RgImageState,
    pub aspect: vk::ImageAspectFlags,
    /// 本帧第一次使用，`previous_state` 是占位值
    pub entry: bool,
}

impl RgPlannedImageBarrier {
    /// 用实际的 image 和前置状态生成 barrier
    pub fn to_gfx_barrier(
        &self,
        image: vk::Image,
        previous_state: RgImageState,
        aspect: vk::ImageAspectFlags,
    ) -> GfxImageBarrier {
        GfxImageBarrier::new()
            .image(image)
            .layout_transfer(previous_state.layout, self.next_state.layout)
            .src_mask(previous_state.stage, previous_state.src_access())
            .dst_mask(self.next_state.stage, self.next_state.access)
            .image_aspect_flag(aspect)
    }
}

/// 规划好的缓冲区 barrier
#[derive(Clone, Debug, PartialEq)]
pub struct RgPlannedBufferBarrier {
    pub group: RgResourceGroupHandle,
    pub previous_state: RgBufferState,
    pub next_state: RgBufferState,
    pub entry: bool,
}

impl RgPlannedBufferBarrier {
    pub fn to_gfx_barrier(&self, buffer: vk::Buffer, previous_state: RgBufferState) -> GfxBufferBarrier {
        GfxBufferBarrier::new()
            .buffer(buffer, 0, vk::WHOLE_SIZE)
            .src_mask(previous_state.stage, previous_state.src_access())
            .dst_mask(self.next_state.stage, self.next_state.access)
    }
}

/// 一个 pass 边界上需要的 barrier
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RgPassBarriers {
    pub image_barriers: Vec<RgPlannedImageBarrier>,
    pub buffer_barriers: Vec<RgPlannedBufferBarrier>,
}

impl RgPassBarriers {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.image_barriers.is_empty() && self.buffer_barriers.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.image_barriers.len() + self.buffer_barriers.len()
    }

    /// 只保留入口 barrier
    pub fn entries_only(&self) -> Self {
        Self {
            image_barriers: self.image_barriers.iter().filter(|b| b.entry).cloned().collect(),
            buffer_barriers: self.buffer_barriers.iter().filter(|b| b.entry).cloned().collect(),
        }
    }

    /// 去掉入口 barrier
    pub fn without_entries(&self) -> Self {
        Self {
            image_barriers: self.image_barriers.iter().filter(|b| !b.entry).cloned().collect(),
            buffer_barriers: self.buffer_barriers.iter().filter(|b| !b.entry).cloned().collect(),
        }
    }
}

/// 同步计划：pass index（包括 swapchain 伪 pass）到 barrier 集合
#[derive(Clone, Debug, Default)]
pub struct RgSyncInfo {
    /// 按规划顺序保存，保证日志和提升后的入口 barrier 顺序稳定
    boundaries: Vec<(RgPassIndex, RgPassBarriers)>,
    lookup: HashMap<RgPassIndex, usize>,
}

// getters
impl RgSyncInfo {
    #[inline]
    pub fn barriers_for(&self, pass_index: RgPassIndex) -> Option<&RgPassBarriers> {
        self.lookup.get(&pass_index).map(|&slot| &self.boundaries[slot].1)
    }

    /// 第一个使用 swapchain 的 pass 之前需要的 barrier
    #[inline]
    pub fn swapchain_barriers(&self) -> Option<&RgPassBarriers> {
        self.barriers_for(RG_SWAPCHAIN_PSEUDO_PASS).filter(|barriers| !barriers.is_empty())
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (RgPassIndex, &RgPassBarriers)> {
        self.boundaries.iter().map(|(pass_index, barriers)| (*pass_index, barriers))
    }

    /// 所有 pass 的入口 barrier 合并成一个集合
    pub fn entry_barriers(&self) -> RgPassBarriers {
        let mut merged = RgPassBarriers::default();
        for (_, barriers) in &self.boundaries {
            let entries = barriers.entries_only();
            merged.image_barriers.extend(entries.image_barriers);
            merged.buffer_barriers.extend(entries.buffer_barriers);
        }
        merged
    }

    pub fn total_barrier_count(&self) -> usize {
        self.boundaries.iter().map(|(_, barriers)| barriers.len()).sum()
    }
}

// update
impl RgSyncInfo {
    /// 深度 aspect 可能由后面的 pass 才注册上，规划结束后按最终的资源组回填
    fn resolve_aspects(&mut self, registry: &RgResourceRegistry) {
        let image_barriers = self.boundaries.iter_mut().flat_map(|(_, barriers)| barriers.image_barriers.iter_mut());
        for barrier in image_barriers {
            if let Some(group) = registry.get(barrier.group) {
                barrier.aspect = group.aspect;
            }
        }
    }

    fn boundary_mut(&mut self, pass_index: RgPassIndex) -> &mut RgPassBarriers {
        let slot = *self.lookup.entry(pass_index).or_insert_with(|| {
            self.boundaries.push((pass_index, RgPassBarriers::default()));
            self.boundaries.len() - 1
        });
        &mut self.boundaries[slot].1
    }
}

/// 资源组在规划过程中的最后已知状态
#[derive(Clone, Copy)]
enum TrackedState {
    Image(RgImageState),
    Buffer(RgBufferState),
}

/// 同一个 pass 对同一个资源组的需求
#[derive(Clone, Copy)]
enum Requirement {
    Image(RgImageState, bool),
    Buffer(RgBufferState),
}

/// Barrier 规划器
pub struct RgSyncPlanner;

impl RgSyncPlanner {
    /// 按 `ordered_passes` 的顺序规划 barrier，顺带把所有资源名注册到 `registry`
    ///
    /// 同一个 batch 内的 pass 共享一个 render pass：同 layout 的 attachment 之间不规划 barrier，
    /// 光栅化顺序已经保证了 render pass 内的先后
    pub fn plan(
        ordered_passes: &[RgPassMeta],
        batches: &[RgPassBatch],
        registry: &mut RgResourceRegistry,
    ) -> RgSyncInfo {
        let batch_of: HashMap<RgPassIndex, usize> = batches
            .iter()
            .flat_map(|batch| batch.pass_indices.iter().map(move |&pass_index| (pass_index, batch.batch_index)))
            .collect();

        let mut sync_info = RgSyncInfo::default();
        let mut tracked: HashMap<RgResourceGroupHandle, TrackedState> = HashMap::new();
        // 资源组最后一次作为 attachment 使用时所在的 batch
        let mut attachment_batch: HashMap<RgResourceGroupHandle, usize> = HashMap::new();

        for pass in ordered_passes {
            let pass_batch = batch_of.get(&pass.pass_index).copied();
            for (group, requirement) in Self::collect_requirements(pass, registry) {
                let is_swapchain = registry.get(group).is_some_and(|g| g.is_swapchain);
                // aspect 在所有 pass 注册完之后统一回填
                let aspect = vk::ImageAspectFlags::COLOR;

                let is_attachment = matches!(requirement, Requirement::Image(_, true));
                let same_render_pass =
                    is_attachment && pass_batch.is_some() && attachment_batch.get(&group).copied() == pass_batch;
                match (is_attachment, pass_batch) {
                    (true, Some(batch_index)) => {
                        attachment_batch.insert(group, batch_index);
                    }
                    _ => {
                        attachment_batch.remove(&group);
                    }
                }

                match (tracked.get(&group).copied(), requirement) {
                    // 入口
                    (None, Requirement::Image(next, _)) => {
                        let key = if is_swapchain { RG_SWAPCHAIN_PSEUDO_PASS } else { pass.pass_index };
                        sync_info.boundary_mut(key).image_barriers.push(RgPlannedImageBarrier {
                            group,
                            previous_state: RgImageState::UNDEFINED,
                            next_state: next,
                            aspect,
                            entry: true,
                        });
                        tracked.insert(group, TrackedState::Image(next));
                    }
                    (None, Requirement::Buffer(next)) => {
                        sync_info.boundary_mut(pass.pass_index).buffer_barriers.push(RgPlannedBufferBarrier {
                            group,
                            previous_state: RgBufferState::UNDEFINED,
                            next_state: next,
                            entry: true,
                        });
                        tracked.insert(group, TrackedState::Buffer(next));
                    }

                    (Some(TrackedState::Image(previous)), Requirement::Image(next, _))
                        if same_render_pass && previous.layout == next.layout =>
                    {
                        tracked.insert(
                            group,
                            TrackedState::Image(RgImageState::new(
                                previous.stage | next.stage,
                                previous.access | next.access,
                                next.layout,
                            )),
                        );
                    }
                    (Some(TrackedState::Image(previous)), Requirement::Image(next, _)) => {
                        if previous.needs_barrier_to(&next) {
                            sync_info.boundary_mut(pass.pass_index).image_barriers.push(RgPlannedImageBarrier {
                                group,
                                previous_state: previous,
                                next_state: next,
                                aspect,
                                entry: false,
                            });
                            tracked.insert(group, TrackedState::Image(next));
                        } else {
                            tracked.insert(group, TrackedState::Image(previous.merge_reader(&next)));
                        }
                    }
                    (Some(TrackedState::Buffer(previous)), Requirement::Buffer(next)) => {
                        if previous.needs_barrier_to(&next) {
                            sync_info.boundary_mut(pass.pass_index).buffer_barriers.push(RgPlannedBufferBarrier {
                                group,
                                previous_state: previous,
                                next_state: next,
                                entry: false,
                            });
                            tracked.insert(group, TrackedState::Buffer(next));
                        } else {
                            tracked.insert(group, TrackedState::Buffer(previous.merge_reader(&next)));
                        }
                    }

                    _ => {
                        log::warn!(
                            "resource \"{}\" is used both as image and buffer, pass {} skips its barrier",
                            registry.name_of(group),
                            pass.name
                        );
                    }
                }
            }
        }

        sync_info.resolve_aspects(registry);
        sync_info
    }

    /// 合并一个 pass 内对同一资源组的多次使用
    ///
    /// 同 layout 的需求合并 stage/access；layout 冲突时 attachment 的需求优先
    fn collect_requirements(
        pass: &RgPassMeta,
        registry: &mut RgResourceRegistry,
    ) -> Vec<(RgResourceGroupHandle, Requirement)> {
        let mut requirements: Vec<(RgResourceGroupHandle, Requirement)> = Vec::new();

        for usage in &pass.resource_usages {
            let group = registry.register_usage(usage);
            let is_image = registry.get(group).is_some_and(|g| g.is_image);
            let requirement = if is_image {
                Requirement::Image(usage.required_image_state(pass.stage), usage.is_attachment)
            } else {
                Requirement::Buffer(usage.required_buffer_state(pass.stage))
            };

            let Some((_, existing)) = requirements.iter_mut().find(|(g, _)| *g == group) else {
                requirements.push((group, requirement));
                continue;
            };

            *existing = match (*existing, requirement) {
                (Requirement::Image(a, a_att), Requirement::Image(b, b_att)) if a.layout == b.layout => {
                    Requirement::Image(
                        RgImageState::new(a.stage | b.stage, a.access | b.access, a.layout),
                        a_att || b_att,
                    )
                }
                (Requirement::Image(a, a_att), Requirement::Image(b, b_att)) => {
                    log::warn!(
                        "pass {} uses \"{}\" in conflicting layouts {:?} and {:?}",
                        pass.name,
                        usage.resource_name,
                        a.layout,
                        b.layout
                    );
                    if b_att && !a_att { Requirement::Image(b, b_att) } else { Requirement::Image(a, a_att) }
                }
                (Requirement::Buffer(a), Requirement::Buffer(b)) => {
                    Requirement::Buffer(RgBufferState::new(a.stage | b.stage, a.access | b.access))
                }
                (kept, _) => kept,
            };
        }

        requirements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::RgGraphCompiler;
    use crate::pass_meta::{RG_SWAPCHAIN_RESOURCE, RgPassStage, RgResourceType, RgResourceUsage};

    fn color_pass(index: u32, resource: &str) -> RgPassMeta {
        RgPassMeta::new(index, format!("color-{index}"), RgPassStage::Graphics).with_usage(
            RgResourceUsage::attachment(
                RgResourceType::ColorAttachment,
                resource,
                vk::AttachmentLoadOp::CLEAR,
                vk::AttachmentStoreOp::STORE,
            ),
        )
    }

    #[test]
    fn test_write_then_sample_emits_transition() {
        let passes = vec![
            color_pass(0, "hdr"),
            RgPassMeta::new(1, "tonemap", RgPassStage::Compute)
                .with_usage(RgResourceUsage::read(RgResourceType::SampledImage, "hdr")),
        ];
        let mut registry = RgResourceRegistry::new();
        let sync = RgSyncPlanner::plan(&passes, &[], &mut registry);

        let entry = &sync.barriers_for(0).unwrap().image_barriers[0];
        assert!(entry.entry);
        assert_eq!(entry.previous_state, RgImageState::UNDEFINED);
        assert_eq!(entry.next_state, RgImageState::COLOR_ATTACHMENT_WRITE);

        let transition = &sync.barriers_for(1).unwrap().image_barriers[0];
        assert!(!transition.entry);
        assert_eq!(transition.previous_state, RgImageState::COLOR_ATTACHMENT_WRITE);
        assert_eq!(transition.next_state, RgImageState::SHADER_READ_COMPUTE);
    }

    #[test]
    fn test_read_after_read_merges_into_later_writer() {
        let passes = vec![
            color_pass(0, "gbuffer"),
            RgPassMeta::new(1, "lighting", RgPassStage::Graphics)
                .with_usage(RgResourceUsage::read(RgResourceType::SampledImage, "gbuffer")),
            RgPassMeta::new(2, "ssao", RgPassStage::Compute)
                .with_usage(RgResourceUsage::read(RgResourceType::SampledImage, "gbuffer")),
            color_pass(3, "gbuffer"),
        ];
        let mut registry = RgResourceRegistry::new();
        let sync = RgSyncPlanner::plan(&passes, &[], &mut registry);

        assert!(sync.barriers_for(2).is_none());
        let war = &sync.barriers_for(3).unwrap().image_barriers[0];
        assert!(war.previous_state.stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert!(war.previous_state.stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
        assert_eq!(war.previous_state.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_swapchain_entry_goes_to_pseudo_pass() {
        let passes = vec![color_pass(7, "hdr"), color_pass(8, RG_SWAPCHAIN_RESOURCE)];
        let mut registry = RgResourceRegistry::new();
        let sync = RgSyncPlanner::plan(&passes, &[], &mut registry);

        let swapchain = sync.swapchain_barriers().unwrap();
        assert_eq!(swapchain.image_barriers.len(), 1);
        assert_eq!(swapchain.image_barriers[0].group, registry.find(RG_SWAPCHAIN_RESOURCE).unwrap());
        assert!(sync.barriers_for(8).is_none());
        assert_eq!(sync.entry_barriers().image_barriers.len(), 2);
    }

    #[test]
    fn test_same_batch_attachments_share_render_pass() {
        let load_pass = |index: u32| {
            RgPassMeta::new(index, format!("load-{index}"), RgPassStage::Graphics).with_usage(
                RgResourceUsage::attachment(
                    RgResourceType::ColorAttachment,
                    RG_SWAPCHAIN_RESOURCE,
                    vk::AttachmentLoadOp::LOAD,
                    vk::AttachmentStoreOp::STORE,
                ),
            )
        };
        let graph = RgGraphCompiler::compile(&[load_pass(0), load_pass(1), sample_after(2)]).unwrap();
        assert_eq!(graph.batches()[0].pass_indices, vec![0, 1]);

        let sync = graph.synchronization();
        assert!(sync.barriers_for(1).is_none());
        assert_eq!(sync.swapchain_barriers().unwrap().len(), 1);

        // batch 结束之后的使用仍然需要 barrier
        let after = &sync.barriers_for(2).unwrap().image_barriers[0];
        assert_eq!(after.previous_state.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(after.next_state, RgImageState::SHADER_READ_COMPUTE);
    }

    fn sample_after(index: u32) -> RgPassMeta {
        RgPassMeta::new(index, "post", RgPassStage::Compute)
            .with_usage(RgResourceUsage::read(RgResourceType::SampledImage, RG_SWAPCHAIN_RESOURCE))
    }

    #[test]
    fn test_attachment_in_different_batch_keeps_barrier() {
        // 签名不同，不会合批
        let passes = vec![
            color_pass(0, "hdr"),
            color_pass(1, "hdr").with_usage(RgResourceUsage::attachment(
                RgResourceType::ColorAttachment,
                "normal",
                vk::AttachmentLoadOp::CLEAR,
                vk::AttachmentStoreOp::STORE,
            )),
        ];
        let graph = RgGraphCompiler::compile(&passes).unwrap();
        assert_eq!(graph.batches().len(), 2);

        let waw = &graph.synchronization().barriers_for(1).unwrap().image_barriers[0];
        assert_eq!(waw.previous_state, RgImageState::COLOR_ATTACHMENT_WRITE);
        assert_eq!(waw.next_state, RgImageState::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn test_depth_aspect_resolved_after_registration() {
        let passes = vec![
            RgPassMeta::new(0, "prev-depth", RgPassStage::Compute)
                .with_usage(RgResourceUsage::read(RgResourceType::SampledImage, "depth")),
            RgPassMeta::new(1, "depth-prepass", RgPassStage::Graphics).with_usage(RgResourceUsage::attachment(
                RgResourceType::DepthStencilAttachment,
                "depth",
                vk::AttachmentLoadOp::CLEAR,
                vk::AttachmentStoreOp::STORE,
            )),
        ];
        let mut registry = RgResourceRegistry::new();
        let sync = RgSyncPlanner::plan(&passes, &[], &mut registry);

        let depth_stencil = vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL;
        let entry = &sync.barriers_for(0).unwrap().image_barriers[0];
        assert!(entry.entry);
        assert_eq!(entry.aspect, depth_stencil);
        assert_eq!(sync.barriers_for(1).unwrap().image_barriers[0].aspect, depth_stencil);
    }

    #[test]
    fn test_buffer_barriers() {
        let passes = vec![
            RgPassMeta::new(0, "cull", RgPassStage::Compute)
                .with_usage(RgResourceUsage::write(RgResourceType::StorageBuffer, "draw-args")),
            RgPassMeta::new(1, "draw", RgPassStage::Graphics)
                .with_usage(RgResourceUsage::read(RgResourceType::IndirectBuffer, "draw-args")),
        ];
        let mut registry = RgResourceRegistry::new();
        let sync = RgSyncPlanner::plan(&passes, &[], &mut registry);

        let barrier = &sync.barriers_for(1).unwrap().buffer_barriers[0];
        assert_eq!(barrier.previous_state, RgBufferState::STORAGE_WRITE_COMPUTE);
        assert_eq!(barrier.next_state, RgBufferState::INDIRECT_BUFFER);
        assert_eq!(sync.total_barrier_count(), 2);
        assert!(sync.barriers_for(1).unwrap().without_entries().len() == 1);
    }
}
