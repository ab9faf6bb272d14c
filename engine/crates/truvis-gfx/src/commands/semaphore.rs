use std::sync::atomic::{AtomicBool, Ordering};

use ash::prelude::VkResult;
use ash::vk;

/// 进程级的设备丢失标记
///
/// 一旦置位，render loop 不应再录制或提交任何命令，直到整个 renderer 被销毁重建。
static DEVICE_LOST: AtomicBool = AtomicBool::new(false);

/// 设备是否已经丢失
#[inline]
pub fn is_device_lost() -> bool {
    DEVICE_LOST.load(Ordering::Acquire)
}

/// 标记设备丢失
#[inline]
pub fn mark_device_lost() {
    if !DEVICE_LOST.swap(true, Ordering::AcqRel) {
        log::error!("GPU device lost, all further frame recording is disabled");
    }
}

/// renderer 完整重建之后调用
#[inline]
pub fn clear_device_lost() {
    DEVICE_LOST.store(false, Ordering::Release);
}

/// # Destroy
/// 不实现 Drop，因为可以 Clone，需要手动 destroy
#[derive(Clone)]
pub struct GfxSemaphore {
    device: ash::Device,
    semaphore: vk::Semaphore,
}

// 创建与销毁
impl GfxSemaphore {
    pub fn new_timeline(device: ash::Device, initial_value: u64, debug_name: &str) -> VkResult<Self> {
        let mut timeline_type_ci = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let timeline_semaphore_ci = vk::SemaphoreCreateInfo::default().push_next(&mut timeline_type_ci);
        let semaphore = unsafe { device.create_semaphore(&timeline_semaphore_ci, None)? };
        log::debug!("create timeline semaphore: {}", debug_name);
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

// getters
impl GfxSemaphore {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

// tools
impl GfxSemaphore {
    /// 阻塞等待 timeline 达到指定值
    #[inline]
    pub fn wait_timeline(&self, timeline_value: u64, timeout_ns: u64) -> VkResult<()> {
        let wait_semaphore = [self.semaphore];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&wait_semaphore)
            .values(std::slice::from_ref(&timeline_value));
        unsafe { self.device.wait_semaphores(&wait_info, timeout_ns) }
    }
}

/// 每个 frame slot 的 timeline 等待值
///
/// 在录制某个 slot 之前，先等待上一次使用该 slot 的提交完成。
/// 等待失败且错误为 `ERROR_DEVICE_LOST` 时，置位全局标记并把所有 pending 值清零，
/// 之后的等待都会直接返回，不会再阻塞在一个永远不会到来的 signal 上。
pub struct GfxFrameTimeline {
    pending_values: Vec<u64>,
    timeout_ns: u64,
}

// new & init
impl GfxFrameTimeline {
    pub fn new(slot_count: usize, timeout_ns: u64) -> Self {
        Self {
            pending_values: vec![0; slot_count],
            timeout_ns,
        }
    }
}

// getters
impl GfxFrameTimeline {
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.pending_values.len()
    }

    #[inline]
    pub fn pending_value(&self, slot: usize) -> u64 {
        self.pending_values[slot]
    }
}

// update
impl GfxFrameTimeline {
    /// 记录 slot 本次提交将会 signal 的值
    #[inline]
    pub fn set_pending(&mut self, slot: usize, value: u64) {
        self.pending_values[slot] = value;
    }

    /// 在 `semaphore` 上等待 slot 的 pending 值
    pub fn wait_slot_on(&mut self, slot: usize, semaphore: &GfxSemaphore) -> VkResult<()> {
        let timeout_ns = self.timeout_ns;
        self.wait_slot(slot, |value| semaphore.wait_timeline(value, timeout_ns))
    }

    /// 使用任意等待原语等待 slot 的 pending 值
    ///
    /// pending 值为 0 表示该 slot 从未提交过，直接返回
    pub fn wait_slot(&mut self, slot: usize, wait: impl FnOnce(u64) -> VkResult<()>) -> VkResult<()> {
        if is_device_lost() {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }

        let value = self.pending_values[slot];
        if value == 0 {
            return Ok(());
        }

        match wait(value) {
            Err(vk::Result::ERROR_DEVICE_LOST) => {
                mark_device_lost();
                self.pending_values.fill(0);
                Err(vk::Result::ERROR_DEVICE_LOST)
            }
            other => other,
        }
    }
}
