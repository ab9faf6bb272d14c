//! 每个 in-flight frame slot 一条预先分配的 command stream，以及对应的 dirty 标记
//!
//! dirty 为 `true` 表示该 slot 的 stream 需要重新录制。
//! 编译后的 graph 发生变化时所有 slot 都会被标记为 dirty。

use crate::errors::{RgError, RgResult};

pub struct RgCommandSlots<S> {
    streams: Vec<Option<S>>,
    dirty: Vec<bool>,
}

// new & init
impl<S> RgCommandSlots<S> {
    /// 所有 slot 都未分配，且都是 dirty 的
    pub fn new(slot_count: usize) -> Self {
        Self {
            streams: (0..slot_count).map(|_| None).collect(),
            dirty: vec![true; slot_count],
        }
    }

    /// 直接使用外部提供的数组，不做一致性检查；录制前由 [`Self::validate`] 检查
    pub fn from_parts(streams: Vec<Option<S>>, dirty: Vec<bool>) -> Self {
        Self { streams, dirty }
    }

    /// 改变 slot 数量（例如 swapchain 重建后 image 数量变化），所有 slot 标记为 dirty
    pub fn resize(&mut self, slot_count: usize) {
        self.streams.resize_with(slot_count, || None);
        self.dirty.clear();
        self.dirty.resize(slot_count, true);
    }

    /// 为 slot 设置 stream，返回之前的 stream 交给调用方销毁
    pub fn allocate(&mut self, slot: usize, stream: S) -> RgResult<Option<S>> {
        let slot_count = self.streams.len();
        let entry = self.streams.get_mut(slot).ok_or(RgError::SlotOutOfRange { slot, slot_count })?;
        let previous = entry.replace(stream);
        if let Some(dirty) = self.dirty.get_mut(slot) {
            *dirty = true;
        }
        Ok(previous)
    }
}

// getters
impl<S> RgCommandSlots<S> {
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.streams.len()
    }

    #[inline]
    pub fn is_dirty(&self, slot: usize) -> bool {
        self.dirty.get(slot).copied().unwrap_or(true)
    }

    /// slot 的 stream，未分配时返回错误
    pub fn stream(&self, slot: usize) -> RgResult<&S> {
        let slot_count = self.streams.len();
        self.streams
            .get(slot)
            .ok_or(RgError::SlotOutOfRange { slot, slot_count })?
            .as_ref()
            .ok_or(RgError::StreamNotAllocated(slot))
    }

    /// dirty 数组与 stream 数组长度一致
    pub fn validate(&self) -> RgResult<()> {
        if self.dirty.len() != self.streams.len() {
            return Err(RgError::InconsistentDirtyFlags {
                flags: self.dirty.len(),
                streams: self.streams.len(),
            });
        }
        Ok(())
    }
}

// update
impl<S> RgCommandSlots<S> {
    #[inline]
    pub fn mark_all_dirty(&mut self) {
        self.dirty.fill(true);
    }

    #[inline]
    pub fn clear_dirty(&mut self, slot: usize) {
        if let Some(dirty) = self.dirty.get_mut(slot) {
            *dirty = false;
        }
    }

    /// 取走所有已分配的 stream，用于销毁
    pub fn take_all(&mut self) -> Vec<S> {
        self.dirty.fill(true);
        self.streams.iter_mut().filter_map(Option::take).collect()
    }
}
