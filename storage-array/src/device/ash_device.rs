// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{ArrayDevice, DeviceLimits, MemoryProperties, MemoryRequirements};
use crate::{vk, DeviceSize, VulkanError};
use std::{fmt, ptr::NonNull};

/// An [`ArrayDevice`] backed by an `ash::Device`.
///
/// The limits and memory properties of the physical device are read once, when the `AshDevice`
/// is created.
pub struct AshDevice {
    device: ash::Device,
    limits: DeviceLimits,
    memory_properties: MemoryProperties,
}

impl AshDevice {
    /// Wraps `device`, which was created from `physical_device`.
    ///
    /// # Safety
    ///
    /// - `physical_device` must have been enumerated from `instance`, and `device` must have been
    ///   created from `physical_device`.
    /// - `device` must not be destroyed while the returned `AshDevice`, or any array created from
    ///   it, is alive.
    pub unsafe fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
    ) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        AshDevice {
            device,
            limits: DeviceLimits::from(&properties.limits),
            memory_properties: MemoryProperties::from(memory_properties),
        }
    }

    /// Returns the wrapped device.
    #[inline]
    pub fn device(&self) -> &ash::Device {
        &self.device
    }
}

impl fmt::Debug for AshDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AshDevice")
            .field("handle", &self.device.handle())
            .field("limits", &self.limits)
            .field("memory_properties", &self.memory_properties)
            .finish()
    }
}

unsafe impl ArrayDevice for AshDevice {
    #[inline]
    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    #[inline]
    fn memory_properties(&self) -> &MemoryProperties {
        &self.memory_properties
    }

    unsafe fn create_buffer(
        &self,
        size: DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<vk::Buffer, VulkanError> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        unsafe { self.device.create_buffer(&create_info, None) }.map_err(VulkanError::from)
    }

    #[inline]
    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) };
    }

    #[inline]
    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> MemoryRequirements {
        unsafe { self.device.get_buffer_memory_requirements(buffer) }.into()
    }

    unsafe fn create_buffer_view(
        &self,
        buffer: vk::Buffer,
        format: vk::Format,
        offset: DeviceSize,
        range: DeviceSize,
    ) -> Result<vk::BufferView, VulkanError> {
        let create_info = vk::BufferViewCreateInfo::default()
            .buffer(buffer)
            .format(format)
            .offset(offset)
            .range(range);

        unsafe { self.device.create_buffer_view(&create_info, None) }.map_err(VulkanError::from)
    }

    #[inline]
    unsafe fn destroy_buffer_view(&self, view: vk::BufferView) {
        unsafe { self.device.destroy_buffer_view(view, None) };
    }

    unsafe fn allocate_memory(
        &self,
        size: DeviceSize,
        memory_type_index: u32,
    ) -> Result<vk::DeviceMemory, VulkanError> {
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type_index);

        unsafe { self.device.allocate_memory(&allocate_info, None) }.map_err(VulkanError::from)
    }

    #[inline]
    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) };
    }

    #[inline]
    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: DeviceSize,
    ) -> Result<(), VulkanError> {
        unsafe { self.device.bind_buffer_memory(buffer, memory, offset) }
            .map_err(VulkanError::from)
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<NonNull<u8>, VulkanError> {
        let ptr = unsafe {
            self.device
                .map_memory(memory, offset, size, vk::MemoryMapFlags::empty())
        }
        .map_err(VulkanError::from)?;

        match NonNull::new(ptr.cast::<u8>()) {
            Some(ptr) => Ok(ptr),
            None => {
                unsafe { self.device.unmap_memory(memory) };

                Err(VulkanError::Unknown)
            }
        }
    }

    #[inline]
    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) };
    }
}
