//! Vulkan GFX 抽象层
//!
//! 只保留 frame graph 录制需要的部分：
//! - `commands::barrier`: image / buffer / memory barrier 的 builder
//! - `commands::command_encoder`: 命令录制接口，frame graph 通过它发出所有命令
//! - `commands::command_buffer`: 基于 ash 的 `GfxCommandEncoder` 实现
//! - `commands::semaphore`: timeline semaphore 与设备丢失（device lost）守卫

pub mod basic;
pub mod commands;
