//! Truvis 工具集
//!
//! 目前只有带颜色的日志初始化，供可执行程序和各个 crate 的测试使用。

pub mod init_log;
