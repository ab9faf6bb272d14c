//! Frame graph 的运行时配置，可以从 TOML 加载
//!
//! ```toml
//! record_policy = "when_dirty"
//! build_secondary_buckets = false
//! frames_in_flight = 2
//! ```

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// 什么时候重新录制一个 frame slot 的 command stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RgRecordPolicy {
    /// 每帧都重新录制
    #[default]
    Always,
    /// 只有 slot 被标记为 dirty 时才重新录制，其余帧重复提交之前的 stream
    WhenDirty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RgFrameGraphSettings {
    pub record_policy: RgRecordPolicy,

    /// 是否为 secondary 录制划分 bucket
    pub build_secondary_buckets: bool,

    /// graph 重新编译时打印执行计划
    pub print_plan_on_recompile: bool,

    /// in-flight frame slot 数量
    pub frames_in_flight: usize,
}

impl Default for RgFrameGraphSettings {
    fn default() -> Self {
        Self {
            record_policy: RgRecordPolicy::Always,
            build_secondary_buckets: true,
            print_plan_on_recompile: false,
            frames_in_flight: 3,
        }
    }
}

impl RgFrameGraphSettings {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(content).context("解析 frame graph 配置失败")?;
        anyhow::ensure!(settings.frames_in_flight > 0, "frames_in_flight 必须大于 0");
        Ok(settings)
    }

    /// 从 TOML 文件加载配置，缺省的字段使用默认值
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content).with_context(|| format!("加载配置失败: {:?}", path.as_ref()))
    }
}
