// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Owned device objects. Each wrapper destroys its handle when dropped, so a partially built
//! configuration is released by dropping whatever was created so far.

use crate::{
    device::{ArrayDevice, MemoryRequirements},
    vk, DeviceSize, VulkanError,
};
use std::{marker::PhantomData, ptr::NonNull, slice, sync::Arc};

/// A buffer without any memory guarantees.
pub(crate) struct RawBuffer {
    handle: vk::Buffer,
    device: Arc<dyn ArrayDevice>,
    size: DeviceSize,
}

impl RawBuffer {
    pub(crate) fn new(
        device: &Arc<dyn ArrayDevice>,
        size: DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self, VulkanError> {
        debug_assert_ne!(size, 0);
        let handle = unsafe { device.create_buffer(size, usage) }?;

        Ok(RawBuffer {
            handle,
            device: device.clone(),
            size,
        })
    }

    #[inline]
    pub(crate) fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub(crate) fn size(&self) -> DeviceSize {
        self.size
    }

    #[inline]
    pub(crate) fn memory_requirements(&self) -> MemoryRequirements {
        unsafe { self.device.buffer_memory_requirements(self.handle) }
    }

    /// Binds `memory` to the buffer, starting at `offset`.
    ///
    /// # Safety
    ///
    /// - `offset` must honor the alignment and size of [`memory_requirements`], and the memory
    ///   type of `memory` must be one of its allowed types.
    /// - The buffer must not be bound already.
    ///
    /// [`memory_requirements`]: Self::memory_requirements
    pub(crate) unsafe fn bind_memory(
        &self,
        memory: &RawMemory,
        offset: DeviceSize,
    ) -> Result<(), VulkanError> {
        unsafe {
            self.device
                .bind_buffer_memory(self.handle, memory.handle, offset)
        }
    }
}

impl Drop for RawBuffer {
    #[inline]
    fn drop(&mut self) {
        unsafe { self.device.destroy_buffer(self.handle) };
    }
}

/// A view of a range of a buffer, through a format.
pub(crate) struct RawBufferView {
    handle: vk::BufferView,
    device: Arc<dyn ArrayDevice>,
}

impl RawBufferView {
    /// # Safety
    ///
    /// - `buffer` must be bound to memory.
    /// - `offset` must be a multiple of the texel buffer offset alignment, and `range` must be a
    ///   multiple of the size of a texel of `format`.
    pub(crate) unsafe fn new(
        buffer: &RawBuffer,
        format: vk::Format,
        offset: DeviceSize,
        range: DeviceSize,
    ) -> Result<Self, VulkanError> {
        debug_assert!(offset + range <= buffer.size);
        let handle = unsafe {
            buffer
                .device
                .create_buffer_view(buffer.handle, format, offset, range)
        }?;

        Ok(RawBufferView {
            handle,
            device: buffer.device.clone(),
        })
    }

    #[inline]
    pub(crate) fn handle(&self) -> vk::BufferView {
        self.handle
    }
}

impl Drop for RawBufferView {
    #[inline]
    fn drop(&mut self) {
        unsafe { self.device.destroy_buffer_view(self.handle) };
    }
}

/// One allocation of device memory.
pub(crate) struct RawMemory {
    handle: vk::DeviceMemory,
    device: Arc<dyn ArrayDevice>,
    size: DeviceSize,
    memory_type_index: u32,
}

impl RawMemory {
    pub(crate) fn allocate(
        device: &Arc<dyn ArrayDevice>,
        size: DeviceSize,
        memory_type_index: u32,
    ) -> Result<Self, VulkanError> {
        let handle = unsafe { device.allocate_memory(size, memory_type_index) }?;

        Ok(RawMemory {
            handle,
            device: device.clone(),
            size,
            memory_type_index,
        })
    }

    #[inline]
    pub(crate) fn device(&self) -> &Arc<dyn ArrayDevice> {
        &self.device
    }

    #[inline]
    pub(crate) fn size(&self) -> DeviceSize {
        self.size
    }

    #[inline]
    pub(crate) fn memory_type_index(&self) -> u32 {
        self.memory_type_index
    }

    /// Maps `size` bytes starting at `offset`. The range is unmapped when the returned value is
    /// dropped.
    ///
    /// Taking `&mut self` guarantees that the memory is mapped at most once at a time.
    pub(crate) fn map(
        &mut self,
        offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<MappedRange<'_>, VulkanError> {
        debug_assert!(offset + size <= self.size);
        let len = usize::try_from(size).map_err(|_| VulkanError::OutOfHostMemory)?;
        let ptr = unsafe { self.device.map_memory(self.handle, offset, size) }?;

        Ok(MappedRange {
            ptr,
            len,
            memory: self,
            _marker: PhantomData,
        })
    }
}

impl Drop for RawMemory {
    #[inline]
    fn drop(&mut self) {
        unsafe { self.device.free_memory(self.handle) };
    }
}

/// A range of [`RawMemory`] mapped into host address space.
pub(crate) struct MappedRange<'a> {
    ptr: NonNull<u8>,
    len: usize,
    memory: &'a RawMemory,
    _marker: PhantomData<&'a mut [u8]>,
}

impl MappedRange<'_> {
    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: `ArrayDevice::map_memory` returns a pointer valid for `len` bytes until the
        // memory is unmapped, and the memory stays borrowed mutably for as long as `self` lives.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MappedRange<'_> {
    #[inline]
    fn drop(&mut self) {
        unsafe { self.memory.device.unmap_memory(self.memory.handle) };
    }
}
