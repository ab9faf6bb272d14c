//! 依赖图构建和拓扑排序
//!
//! 从 pass 的具名资源读写推导 pass 之间的依赖，构建 DAG 并做稳定拓扑排序。
//! 图中的节点是 pass 在输入数组中的位置，而不是 pass index。

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::pass_meta::RgPassMeta;

/// 依赖边：从 producer 到 consumer
#[derive(Clone, Debug)]
pub struct RgDependencyEdge {
    pub producer: usize,
    pub consumer: usize,
    /// 产生这条依赖的资源名
    pub resource_names: Vec<String>,
}

/// 依赖图
pub struct RgDependencyGraph {
    pass_count: usize,
    /// 出边邻接表
    adjacency: Vec<Vec<usize>>,
    in_degrees: Vec<usize>,
    edges: Vec<RgDependencyEdge>,
}

// new & init
impl RgDependencyGraph {
    pub fn new(pass_count: usize) -> Self {
        Self {
            pass_count,
            adjacency: vec![Vec::new(); pass_count],
            in_degrees: vec![0; pass_count],
            edges: Vec::new(),
        }
    }
}

// update
impl RgDependencyGraph {
    /// 添加依赖边，重复边只记录资源名
    pub fn add_edge(&mut self, producer: usize, consumer: usize, resource_name: &str) {
        if producer == consumer {
            return;
        }

        if self.adjacency[producer].contains(&consumer) {
            if let Some(edge) = self.edges.iter_mut().find(|e| e.producer == producer && e.consumer == consumer) {
                if !edge.resource_names.iter().any(|name| name == resource_name) {
                    edge.resource_names.push(resource_name.to_string());
                }
            }
            return;
        }

        self.adjacency[producer].push(consumer);
        self.in_degrees[consumer] += 1;
        self.edges.push(RgDependencyEdge {
            producer,
            consumer,
            resource_names: vec![resource_name.to_string()],
        });
    }
}

// getters
impl RgDependencyGraph {
    #[inline]
    pub fn pass_count(&self) -> usize {
        self.pass_count
    }

    #[inline]
    pub fn successors(&self, node: usize) -> &[usize] {
        &self.adjacency[node]
    }

    #[inline]
    pub fn edges(&self) -> &[RgDependencyEdge] {
        &self.edges
    }
}

// tools
impl RgDependencyGraph {
    /// 稳定拓扑排序
    ///
    /// Kahn 算法，就绪集合用按输入位置排序的小根堆：
    /// 没有依赖约束的 pass 保持声明顺序，帧与帧之间不会抖动。
    ///
    /// # 返回
    /// - `Ok(order)`: 排序后的输入位置
    /// - `Err(remaining)`: 存在环，返回没能排进去的节点（环上的节点及其下游）
    pub fn stable_topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degrees = self.in_degrees.clone();
        let mut ready: BinaryHeap<Reverse<usize>> =
            (0..self.pass_count).filter(|&node| in_degrees[node] == 0).map(Reverse).collect();
        let mut order = Vec::with_capacity(self.pass_count);

        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &next in &self.adjacency[node] {
                in_degrees[next] -= 1;
                if in_degrees[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() == self.pass_count {
            Ok(order)
        } else {
            Err((0..self.pass_count).filter(|&node| in_degrees[node] > 0).collect())
        }
    }
}

/// 依赖分析器
pub struct RgDependencyAnalyzer;

impl RgDependencyAnalyzer {
    /// 从 pass 元数据构建依赖图
    ///
    /// 对每个资源名，按声明顺序收集写入者：
    /// - 相邻写入者串成链（WAW，读写 pass 也因此依赖它前一个写入者）
    /// - 纯读取者依赖所有写入者，读到的是最终值
    pub fn analyze(passes: &[RgPassMeta]) -> RgDependencyGraph {
        let mut graph = RgDependencyGraph::new(passes.len());

        // 资源名 -> 声明顺序的 (位置, 是否写入)
        let mut users: HashMap<&str, Vec<(usize, bool)>> = HashMap::new();
        let mut resource_order: Vec<&str> = Vec::new();
        for (position, pass) in passes.iter().enumerate() {
            for usage in &pass.resource_usages {
                let name = usage.resource_name.as_str();
                let list = users.entry(name).or_insert_with(|| {
                    resource_order.push(name);
                    Vec::new()
                });
                // 同一个 pass 对同一资源的多次使用合并，任意一次写入即视为写入者
                match list.last_mut() {
                    Some((last, writes)) if *last == position => *writes |= usage.access.writes(),
                    _ => list.push((position, usage.access.writes())),
                }
            }
        }

        for name in resource_order {
            let list = &users[name];
            let writers = list.iter().filter(|(_, writes)| *writes).map(|(position, _)| *position).collect::<Vec<_>>();

            for pair in writers.windows(2) {
                graph.add_edge(pair[0], pair[1], name);
            }
            for &(reader, _) in list.iter().filter(|(_, writes)| !*writes) {
                for &writer in &writers {
                    graph.add_edge(writer, reader, name);
                }
            }
        }

        graph
    }
}
