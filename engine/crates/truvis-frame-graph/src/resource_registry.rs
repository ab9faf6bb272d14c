use std::collections::HashMap;

use ash::vk;
use slotmap::SlotMap;

use crate::pass_meta::{RG_SWAPCHAIN_RESOURCE, RgResourceType, RgResourceUsage};

slotmap::new_key_type! {
    /// 资源组句柄
    ///
    /// 一个资源组对应 pass 元数据中的一个资源名，编译期间分配，录制时交给分配器解析成物理资源
    pub struct RgResourceGroupHandle;
}

/// 具名资源组
///
/// 后备 image / buffer 由 [`RgResourceAllocator`](crate::RgResourceAllocator) 在第一次被 barrier 引用时惰性创建
#[derive(Clone, Debug)]
pub struct RgResourceGroup {
    pub name: String,
    /// 第一次声明时的资源类型
    pub resource_type: RgResourceType,
    pub is_image: bool,
    /// 从资源类型推断的 aspect
    pub aspect: vk::ImageAspectFlags,
    pub is_swapchain: bool,
}

/// 资源注册表
///
/// 资源名到资源组的映射，使用 SlotMap 保证句柄稳定
#[derive(Default)]
pub struct RgResourceRegistry {
    groups: SlotMap<RgResourceGroupHandle, RgResourceGroup>,
    name_to_handle: HashMap<String, RgResourceGroupHandle>,
}

// new & init
impl RgResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

// register
impl RgResourceRegistry {
    /// 注册一次资源使用，同名资源返回同一个句柄
    pub fn register_usage(&mut self, usage: &RgResourceUsage) -> RgResourceGroupHandle {
        if let Some(&handle) = self.name_to_handle.get(&usage.resource_name) {
            let group = &mut self.groups[handle];
            // 同一张 image 既可能被当作采样纹理，也可能被当作深度附件，深度 aspect 优先
            if usage.resource_type == RgResourceType::DepthStencilAttachment {
                group.aspect = usage.resource_type.default_aspect();
            }
            return handle;
        }

        let handle = self.groups.insert(RgResourceGroup {
            name: usage.resource_name.clone(),
            resource_type: usage.resource_type,
            is_image: usage.resource_type.is_image(),
            aspect: usage.resource_type.default_aspect(),
            is_swapchain: usage.resource_name == RG_SWAPCHAIN_RESOURCE,
        });
        self.name_to_handle.insert(usage.resource_name.clone(), handle);
        handle
    }
}

// getter & iter
impl RgResourceRegistry {
    #[inline]
    pub fn get(&self, handle: RgResourceGroupHandle) -> Option<&RgResourceGroup> {
        self.groups.get(handle)
    }

    #[inline]
    pub fn find(&self, name: &str) -> Option<RgResourceGroupHandle> {
        self.name_to_handle.get(name).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (RgResourceGroupHandle, &RgResourceGroup)> {
        self.groups.iter()
    }

    /// 资源组名字，用于日志
    #[inline]
    pub fn name_of(&self, handle: RgResourceGroupHandle) -> &str {
        self.groups.get(handle).map_or("<unknown>", |group| group.name.as_str())
    }
}
