//! Render graph 编译
//!
//! 依赖分析 + 稳定拓扑排序 + rank 表 + barrier 规划 + 贪心合批，
//! 产出不可变的 [`RgCompiledGraph`]。pass 拓扑不变时编译结果跨帧复用。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use itertools::Itertools;

use crate::barrier::{RgSyncInfo, RgSyncPlanner};
use crate::errors::{RgError, RgResult};
use crate::graph::RgDependencyAnalyzer;
use crate::pass_meta::{RgPassIndex, RgPassMeta, RgPassStage};
use crate::resource_registry::RgResourceRegistry;

/// 一组可以共享同一个 render pass 的相邻 pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgPassBatch {
    pub batch_index: usize,
    pub stage: RgPassStage,
    pub attachment_signature: String,
    pub pass_indices: Vec<RgPassIndex>,
}

/// 编译后的 render graph
#[derive(Default)]
pub struct RgCompiledGraph {
    ordered_passes: Vec<RgPassMeta>,
    /// pass index -> 拓扑 rank，`[0, ordered_passes.len())` 上的双射
    pass_order: HashMap<RgPassIndex, usize>,
    batches: Vec<RgPassBatch>,
    synchronization: RgSyncInfo,
    resources: RgResourceRegistry,
}

// new & init
impl RgCompiledGraph {
    /// 空 graph 的进程级单例
    pub fn empty() -> Arc<Self> {
        static EMPTY: OnceLock<Arc<RgCompiledGraph>> = OnceLock::new();
        EMPTY.get_or_init(|| Arc::new(Self::default())).clone()
    }
}

// getters
impl RgCompiledGraph {
    #[inline]
    pub fn ordered_passes(&self) -> &[RgPassMeta] {
        &self.ordered_passes
    }

    #[inline]
    pub fn pass_order(&self) -> &HashMap<RgPassIndex, usize> {
        &self.pass_order
    }

    #[inline]
    pub fn rank_of(&self, pass_index: RgPassIndex) -> Option<usize> {
        self.pass_order.get(&pass_index).copied()
    }

    /// 未知的 pass index 排在最后
    #[inline]
    pub fn rank_or_lowest(&self, pass_index: RgPassIndex) -> usize {
        self.rank_of(pass_index).unwrap_or(usize::MAX)
    }

    #[inline]
    pub fn batches(&self) -> &[RgPassBatch] {
        &self.batches
    }

    #[inline]
    pub fn synchronization(&self) -> &RgSyncInfo {
        &self.synchronization
    }

    #[inline]
    pub fn resources(&self) -> &RgResourceRegistry {
        &self.resources
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ordered_passes.is_empty()
    }
}

// tools
impl RgCompiledGraph {
    /// 打印执行计划：pass 顺序、合批结果和每个边界上的 barrier
    pub fn print_execution_plan(&self) {
        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║                 Frame Graph Execution Plan                       ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Total Passes: {}  |  Order: [{}]",
            self.ordered_passes.len(),
            self.ordered_passes.iter().map(|pass| pass.name.as_str()).join(" → ")
        );
        log::info!("║ Batches: {}  |  Barriers: {}", self.batches.len(), self.synchronization.total_barrier_count());
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for batch in &self.batches {
            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!(
                "│ Batch #{} ({:?}) passes {:?}",
                batch.batch_index,
                batch.stage,
                batch.pass_indices
            );
            if !batch.attachment_signature.is_empty() {
                log::info!("│ Attachments: {}", batch.attachment_signature);
            }
            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        for (pass_index, barriers) in self.synchronization.iter() {
            let pass_name = self
                .rank_of(pass_index)
                .map_or("<swapchain>", |rank| self.ordered_passes[rank].name.as_str());
            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!("│ Barriers before \"{}\": {} image, {} buffer", pass_name, barriers.image_barriers.len(), barriers.buffer_barriers.len());
            log::info!("├─────────────────────────────────────────────────────────────────┤");
            for barrier in &barriers.image_barriers {
                log::info!(
                    "│   🔒 Image \"{}\"{}",
                    self.resources.name_of(barrier.group),
                    if barrier.entry { " (entry)" } else { "" }
                );
                log::info!("│       Layout: {:?} → {:?}", barrier.previous_state.layout, barrier.next_state.layout);
                log::info!("│       Stage:  {:?} → {:?}", barrier.previous_state.stage, barrier.next_state.stage);
                log::info!("│       Access: {:?} → {:?}", barrier.previous_state.access, barrier.next_state.access);
                log::info!("│       Aspect: {:?}", barrier.aspect);
            }
            for barrier in &barriers.buffer_barriers {
                log::info!(
                    "│   🔒 Buffer \"{}\"{}",
                    self.resources.name_of(barrier.group),
                    if barrier.entry { " (entry)" } else { "" }
                );
                log::info!("│       Stage:  {:?} → {:?}", barrier.previous_state.stage, barrier.next_state.stage);
                log::info!("│       Access: {:?} → {:?}", barrier.previous_state.access, barrier.next_state.access);
            }
            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        log::info!("");
        log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
    }
}

/// Render graph 编译器
///
/// 保存上一次编译的输入和结果，pass 元数据不变时直接复用
#[derive(Default)]
pub struct RgGraphCompiler {
    cached_source: Vec<RgPassMeta>,
    cached_graph: Option<Arc<RgCompiledGraph>>,
}

// new & init
impl RgGraphCompiler {
    pub fn new() -> Self {
        Self::default()
    }
}

// compile
impl RgGraphCompiler {
    /// 编译 pass 元数据
    pub fn compile(passes: &[RgPassMeta]) -> RgResult<Arc<RgCompiledGraph>> {
        #[cfg(feature = "profiling")]
        let _span = tracy_client::span!("RgGraphCompiler::compile");

        if passes.is_empty() {
            return Ok(RgCompiledGraph::empty());
        }

        let mut seen = HashSet::with_capacity(passes.len());
        if let Some(duplicate) = passes.iter().find(|pass| !seen.insert(pass.pass_index)) {
            log::error!("pass index {} ({}) is declared more than once", duplicate.pass_index, duplicate.name);
            return Err(RgError::DuplicatePassIndex(duplicate.pass_index));
        }

        // 依赖分析 + 拓扑排序
        let dep_graph = RgDependencyAnalyzer::analyze(passes);
        let order = dep_graph.stable_topological_sort().map_err(|remaining| {
            let names = remaining.iter().map(|&position| passes[position].name.clone()).collect_vec();
            log::error!("frame graph dependency cycle: {:?}", names);
            RgError::DependencyCycle { passes: names }
        })?;

        let ordered_passes = order.iter().map(|&position| passes[position].clone()).collect_vec();
        let pass_order =
            ordered_passes.iter().enumerate().map(|(rank, pass)| (pass.pass_index, rank)).collect::<HashMap<_, _>>();

        let batches = Self::build_batches(&ordered_passes);

        let mut resources = RgResourceRegistry::new();
        let synchronization = RgSyncPlanner::plan(&ordered_passes, &batches, &mut resources);

        log::debug!(
            "frame graph compiled: {} passes, {} batches, {} barriers",
            ordered_passes.len(),
            batches.len(),
            synchronization.total_barrier_count()
        );

        Ok(Arc::new(RgCompiledGraph {
            ordered_passes,
            pass_order,
            batches,
            synchronization,
            resources,
        }))
    }

    /// 带缓存的编译
    ///
    /// # 返回
    /// `(graph, recompiled)`，pass 元数据与上一次相同时 `recompiled == false`
    pub fn compile_cached(&mut self, passes: &[RgPassMeta]) -> RgResult<(Arc<RgCompiledGraph>, bool)> {
        if let Some(graph) = &self.cached_graph {
            if self.cached_source.as_slice() == passes {
                return Ok((graph.clone(), false));
            }
        }

        let graph = Self::compile(passes)?;
        self.cached_source = passes.to_vec();
        self.cached_graph = Some(graph.clone());
        Ok((graph, true))
    }

    /// 丢弃缓存，下一次必定重新编译
    pub fn invalidate(&mut self) {
        self.cached_source.clear();
        self.cached_graph = None;
    }

    /// 贪心合批：只看当前最后一个 batch，不做前瞻
    ///
    /// 两个相邻 pass 同为 Graphics 且 attachment 签名文本相等时合并
    fn build_batches(ordered_passes: &[RgPassMeta]) -> Vec<RgPassBatch> {
        let mut batches: Vec<RgPassBatch> = Vec::new();

        for pass in ordered_passes {
            let signature = pass.attachment_signature();
            match batches.last_mut() {
                Some(last)
                    if pass.stage == RgPassStage::Graphics
                        && last.stage == RgPassStage::Graphics
                        && last.attachment_signature == signature =>
                {
                    last.pass_indices.push(pass.pass_index);
                }
                _ => batches.push(RgPassBatch {
                    batch_index: batches.len(),
                    stage: pass.stage,
                    attachment_signature: signature,
                    pass_indices: vec![pass.pass_index],
                }),
            }
        }

        batches
    }
}
