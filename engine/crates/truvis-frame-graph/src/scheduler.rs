//! 帧操作调度
//!
//! 把生产者追加顺序的操作流整理成最终提交顺序：
//! 1. swapchain 上下文合并（必须在排序之前）
//! 2. 按 `(调度标识首次出现的位置, pass rank, 原始位置)` 稳定排序
//! 3. 可选：划分可以并行录制的 secondary bucket

use std::collections::HashMap;
use std::ops::Range;

use crate::compiler::RgCompiledGraph;
use crate::frame_op::{RgFrameOp, RgFrameOpContext, RgFrameOpType};
use crate::pass_meta::RgPassIndex;

/// 一段连续的、可以录制到独立 secondary command buffer 中的操作
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgSecondaryBucket {
    /// 在排序后操作数组中的范围
    pub range: Range<usize>,
    pub op_type: RgFrameOpType,
    pub pass_index: RgPassIndex,
    pub context: RgFrameOpContext,
}

/// 调度结果
pub struct RgScheduledFrame<'a> {
    pub ops: Vec<RgFrameOp<'a>>,
    pub buckets: Vec<RgSecondaryBucket>,
}

pub struct RgFrameScheduler;

impl RgFrameScheduler {
    pub fn schedule<'a>(
        mut ops: Vec<RgFrameOp<'a>>,
        graph: &RgCompiledGraph,
        build_buckets: bool,
    ) -> RgScheduledFrame<'a> {
        #[cfg(feature = "profiling")]
        let _span = tracy_client::span!("RgFrameScheduler::schedule");

        Self::coalesce_swapchain_contexts(&mut ops);
        let ops = Self::sort_ops(ops, graph);
        let buckets = if build_buckets { Self::build_secondary_buckets(&ops) } else { Vec::new() };

        RgScheduledFrame { ops, buckets }
    }

    /// 所有以 swapchain 为目标的操作改用第一个这类操作的上下文
    ///
    /// 多个生产者（3D 场景、2D overlay）可能各自以 swapchain 为目标，
    /// 保持各自的上下文会让 recorder 对每个生产者重新 begin 一次 render pass，
    /// 而 CLEAR / DONT_CARE 的 load op 会丢掉之前合成的像素
    pub fn coalesce_swapchain_contexts(ops: &mut [RgFrameOp<'_>]) {
        let Some(shared) = ops.iter().find(|op| op.targets_swapchain()).map(|op| op.context) else {
            return;
        };
        for op in ops.iter_mut().filter(|op| op.targets_swapchain()) {
            op.context = shared;
        }
    }

    /// 确定性排序
    ///
    /// 主键是调度标识第一次出现的位置而不是标识本身的数值：
    /// 既保留了不同分组之间的入队顺序（不透明几何在 UI 之前），又让同一分组的操作连续。
    /// 排序是稳定的，键相同的操作保持原始顺序。
    ///
    /// 长度不超过 1 时原样返回同一个数组
    pub fn sort_ops<'a>(mut ops: Vec<RgFrameOp<'a>>, graph: &RgCompiledGraph) -> Vec<RgFrameOp<'a>> {
        if ops.len() <= 1 {
            return ops;
        }

        let mut first_occurrence: HashMap<u64, usize> = HashMap::new();
        for op in &ops {
            let next_rank = first_occurrence.len();
            first_occurrence.entry(op.context.scheduling_identity).or_insert(next_rank);
        }

        ops.sort_by_cached_key(|op| {
            (first_occurrence[&op.context.scheduling_identity], graph.rank_or_lowest(op.pass_index))
        });
        ops
    }

    /// 划分 secondary bucket
    ///
    /// 每段极大连续区间满足：操作类型可以独立录制，且操作类型、pass index、上下文都相同。
    /// 不满足条件的操作或任意键变化都会结束当前区间
    pub fn build_secondary_buckets(ops: &[RgFrameOp<'_>]) -> Vec<RgSecondaryBucket> {
        let mut buckets = Vec::new();
        let mut current: Option<RgSecondaryBucket> = None;

        for (position, op) in ops.iter().enumerate() {
            let op_type = op.op_type();
            if !op_type.is_secondary_eligible() {
                buckets.extend(current.take());
                continue;
            }

            let extends_current = current.as_ref().is_some_and(|bucket| {
                bucket.op_type == op_type && bucket.pass_index == op.pass_index && bucket.context == op.context
            });
            if extends_current {
                if let Some(bucket) = current.as_mut() {
                    bucket.range.end = position + 1;
                }
            } else {
                buckets.extend(current.replace(RgSecondaryBucket {
                    range: position..position + 1,
                    op_type,
                    pass_index: op.pass_index,
                    context: op.context,
                }));
            }
        }
        buckets.extend(current);

        buckets
    }
}

#[cfg(test)]
mod tests {
    use ash::vk;

    use super::*;
    use crate::compiler::RgGraphCompiler;
    use crate::frame_op::{RgComputeDispatchOp, RgFrameOpKind, RgSurface, RgTargetHandle};
    use crate::pass_meta::{RgPassMeta, RgPassStage};
    use crate::test_utils::{MockMeshRenderer, clear_op, draw_state};

    fn dispatch(pass_index: RgPassIndex, context: RgFrameOpContext) -> RgFrameOp<'static> {
        RgFrameOp::compute_dispatch(
            pass_index,
            context,
            RgComputeDispatchOp {
                pipeline: vk::Pipeline::null(),
                group_count: glam::UVec3::new(8, 8, 1),
            },
        )
    }

    #[test]
    fn test_single_op_returns_same_array() {
        let graph = RgCompiledGraph::empty();
        let ops = vec![dispatch(0, RgFrameOpContext::new(1, RgSurface::Swapchain))];
        let ptr = ops.as_ptr();
        let sorted = RgFrameScheduler::sort_ops(ops, &graph);
        assert_eq!(sorted.as_ptr(), ptr);

        let empty: Vec<RgFrameOp<'static>> = Vec::new();
        assert!(RgFrameScheduler::sort_ops(empty, &graph).is_empty());
    }

    #[test]
    fn test_sort_by_identity_then_rank_then_original_index() {
        let graph = RgGraphCompiler::compile(&[
            RgPassMeta::new(7, "late", RgPassStage::Compute),
            RgPassMeta::new(3, "early", RgPassStage::Compute),
        ])
        .unwrap();
        // rank: 7 -> 0, 3 -> 1
        let offscreen = |identity| RgFrameOpContext::new(identity, RgSurface::Offscreen(RgTargetHandle(0)));

        let ops = vec![
            dispatch(3, offscreen(20)), // 0
            dispatch(3, offscreen(10)), // 1
            dispatch(7, offscreen(20)), // 2
            dispatch(42, offscreen(10)), // 3 未知 pass，排在同组最后
            dispatch(7, offscreen(10)), // 4
            dispatch(3, offscreen(20)), // 5
        ];
        let tagged = ops
            .into_iter()
            .enumerate()
            .map(|(i, mut op)| {
                if let RgFrameOpKind::ComputeDispatch(d) = &mut op.kind {
                    d.group_count.z = i as u32;
                }
                op
            })
            .collect::<Vec<_>>();

        let sorted = RgFrameScheduler::sort_ops(tagged, &graph);
        let order = sorted
            .iter()
            .map(|op| match &op.kind {
                RgFrameOpKind::ComputeDispatch(d) => d.group_count.z,
                _ => unreachable!(),
            })
            .collect::<Vec<_>>();
        assert_eq!(order, vec![2, 0, 5, 4, 1, 3]);
    }

    #[test]
    fn test_sort_is_deterministic() {
        let graph = RgCompiledGraph::empty();
        let make = || {
            (0..16)
                .map(|i| dispatch(i % 3, RgFrameOpContext::new((i % 4) as u64, RgSurface::Swapchain)))
                .collect::<Vec<_>>()
        };
        let a = RgFrameScheduler::sort_ops(make(), &graph);
        let b = RgFrameScheduler::sort_ops(make(), &graph);
        let key = |ops: &[RgFrameOp<'_>]| ops.iter().map(|op| (op.pass_index, op.context)).collect::<Vec<_>>();
        assert_eq!(key(&a), key(&b));
    }

    #[test]
    fn test_coalescing_is_idempotent() {
        let mut ops = vec![
            dispatch(0, RgFrameOpContext::new(5, RgSurface::Offscreen(RgTargetHandle(1)))),
            dispatch(0, RgFrameOpContext::new(9, RgSurface::Swapchain)),
            dispatch(0, RgFrameOpContext::new(2, RgSurface::Swapchain)),
        ];
        RgFrameScheduler::coalesce_swapchain_contexts(&mut ops);
        let once = ops.iter().map(|op| op.context).collect::<Vec<_>>();
        RgFrameScheduler::coalesce_swapchain_contexts(&mut ops);
        let twice = ops.iter().map(|op| op.context).collect::<Vec<_>>();

        assert_eq!(once, twice);
        assert_eq!(once[0].scheduling_identity, 5);
        assert_eq!(once[1], RgFrameOpContext::new(9, RgSurface::Swapchain));
        assert_eq!(once[2], RgFrameOpContext::new(9, RgSurface::Swapchain));
    }

    #[test]
    fn test_opaque_then_ui_keeps_enqueue_order() {
        let renderer = MockMeshRenderer::default();
        let graph = RgCompiledGraph::empty();
        let ops = vec![
            RgFrameOp::mesh_draw(0, RgFrameOpContext::new(1, RgSurface::Swapchain), draw_state(), &renderer),
            RgFrameOp::clear(1, RgFrameOpContext::new(2, RgSurface::Swapchain), clear_op()),
            RgFrameOp::mesh_draw(1, RgFrameOpContext::new(2, RgSurface::Swapchain), draw_state(), &renderer),
        ];

        let scheduled = RgFrameScheduler::schedule(ops, &graph, true);
        let types = scheduled.ops.iter().map(RgFrameOp::op_type).collect::<Vec<_>>();
        assert_eq!(types, vec![RgFrameOpType::MeshDraw, RgFrameOpType::Clear, RgFrameOpType::MeshDraw]);
        assert_eq!(scheduled.ops[0].pass_index, 0);
        assert!(scheduled.ops.iter().all(|op| op.context == scheduled.ops[0].context));
        assert!(scheduled.buckets.is_empty());
    }

    #[test]
    fn test_secondary_buckets() {
        let ctx_a = RgFrameOpContext::new(1, RgSurface::Offscreen(RgTargetHandle(0)));
        let ctx_b = RgFrameOpContext::new(2, RgSurface::Offscreen(RgTargetHandle(0)));
        let ops = vec![
            dispatch(0, ctx_a),
            dispatch(0, ctx_a),
            dispatch(1, ctx_a), // pass 变化
            RgFrameOp::clear(1, ctx_a, clear_op()), // 不可独立录制
            dispatch(1, ctx_a),
            dispatch(1, ctx_b), // 上下文变化
        ];

        let buckets = RgFrameScheduler::build_secondary_buckets(&ops);
        let ranges = buckets.iter().map(|b| b.range.clone()).collect::<Vec<_>>();
        assert_eq!(ranges, vec![0..2, 2..3, 4..5, 5..6]);
        assert_eq!(buckets[3].context, ctx_b);
        assert!(buckets.iter().all(|b| b.op_type == RgFrameOpType::ComputeDispatch));
    }
}
