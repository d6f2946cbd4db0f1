// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

#![cfg(test)]

use crate::{
    alignment::{align_up, DeviceAlignment},
    device::{
        ArrayDevice, DeviceLimits, MemoryHeap, MemoryProperties, MemoryRequirements, MemoryType,
    },
    logger::{ArrayLogger, MessageSeverity},
    vk::{self, Handle},
    DeviceSize, VulkanError,
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    fmt,
    ptr::NonNull,
};

/// Creates a `MockDevice`, a `RecordingLogger` and a `StorageArray` using both.
macro_rules! mock_array {
    () => {
        mock_array!($crate::tests::MockDevice::default())
    };
    ($device:expr) => {{
        let device = std::sync::Arc::new($device);
        let logger = std::sync::Arc::new($crate::tests::RecordingLogger::default());
        let array = $crate::StorageArray::new(
            device.clone(),
            $crate::StorageArrayCreateInfo {
                logger: logger.clone(),
                ..Default::default()
            },
        );

        (device, logger, array)
    }};
}

/// Asserts that `$expr` returned an error matching `$pattern`.
macro_rules! assert_err {
    ($expr:expr, $pattern:pat) => {
        match $expr {
            Err($pattern) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    };
}

/// Calls of the `MockDevice` that should fail.
///
/// Indices count the calls made since the failures were set, starting at zero.
#[derive(Clone, Debug, Default)]
pub(crate) struct Failures {
    pub(crate) create_buffer: Option<usize>,
    pub(crate) create_buffer_view: Option<usize>,
    pub(crate) allocate_memory: bool,
    pub(crate) bind_buffer_memory: Option<usize>,
    /// Mapping more than this many bytes at once returns `MemoryMapFailed`.
    pub(crate) max_map_size: Option<DeviceSize>,
    /// Every mapping returns `MemoryMapFailed`, whatever its size.
    pub(crate) map_memory: bool,
}

#[derive(Default)]
struct MockState {
    next_handle: u64,
    failures: Failures,
    buffer_calls: usize,
    view_calls: usize,
    bind_calls: usize,
    map_calls: usize,
    /// Size, memory type bits and binding of each live buffer.
    buffers: HashMap<u64, (DeviceSize, u32, Option<(u64, DeviceSize)>)>,
    views: HashSet<u64>,
    /// Contents and memory type index of each live allocation.
    memories: HashMap<u64, (Box<[u8]>, u32)>,
    mapped: HashSet<u64>,
    allocations: Vec<(DeviceSize, u32)>,
}

/// A software implementation of `ArrayDevice` whose memory lives on the host.
pub(crate) struct MockDevice {
    limits: DeviceLimits,
    memory_properties: MemoryProperties,
    buffer_alignment: DeviceAlignment,
    /// Memory type bits reported for the buffers, in creation order. Cycles when exhausted.
    memory_type_bits: Vec<u32>,
    state: Mutex<MockState>,
}

impl Default for MockDevice {
    fn default() -> Self {
        MockDevice::new(DeviceLimits {
            min_storage_buffer_offset_alignment: DeviceAlignment::new(16).unwrap(),
            min_uniform_buffer_offset_alignment: DeviceAlignment::new(64).unwrap(),
            min_texel_buffer_offset_alignment: DeviceAlignment::new(16).unwrap(),
            max_storage_buffer_range: 1 << 20,
            max_uniform_buffer_range: 16384,
            max_texel_buffer_elements: 65536,
            min_memory_map_alignment: DeviceAlignment::new(64).unwrap(),
            ..Default::default()
        })
    }
}

impl MockDevice {
    /// Memory type 0 is device-local, 1 is host-visible and 2 is both. Types 0 and 2 share the
    /// first heap.
    pub(crate) fn new(limits: DeviceLimits) -> Self {
        let host_visible =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        MockDevice {
            limits,
            memory_properties: MemoryProperties {
                memory_types: vec![
                    MemoryType {
                        property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                        heap_index: 0,
                    },
                    MemoryType {
                        property_flags: host_visible,
                        heap_index: 1,
                    },
                    MemoryType {
                        property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL | host_visible,
                        heap_index: 0,
                    },
                ],
                memory_heaps: vec![
                    MemoryHeap {
                        size: 1 << 30,
                        flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
                    },
                    MemoryHeap {
                        size: 1 << 30,
                        flags: vk::MemoryHeapFlags::empty(),
                    },
                ],
            },
            buffer_alignment: DeviceAlignment::new(256).unwrap(),
            memory_type_bits: vec![0b111],
            state: Mutex::default(),
        }
    }

    pub(crate) fn with_memory_type_bits(mut self, memory_type_bits: Vec<u32>) -> Self {
        assert!(!memory_type_bits.is_empty());
        self.memory_type_bits = memory_type_bits;
        self
    }

    pub(crate) fn with_buffer_alignment(mut self, alignment: DeviceSize) -> Self {
        self.buffer_alignment = DeviceAlignment::new(alignment).unwrap();
        self
    }

    /// Replaces the injected failures and resets the call counters they refer to.
    pub(crate) fn set_failures(&self, failures: Failures) {
        let mut state = self.state.lock();
        state.failures = failures;
        state.buffer_calls = 0;
        state.view_calls = 0;
        state.bind_calls = 0;
    }

    pub(crate) fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub(crate) fn live_views(&self) -> usize {
        self.state.lock().views.len()
    }

    pub(crate) fn live_memories(&self) -> usize {
        self.state.lock().memories.len()
    }

    pub(crate) fn map_calls(&self) -> usize {
        self.state.lock().map_calls
    }

    /// The size and memory type index of every allocation ever made.
    pub(crate) fn allocations(&self) -> Vec<(DeviceSize, u32)> {
        self.state.lock().allocations.clone()
    }

    /// The offset at which `buffer` is bound in its memory.
    pub(crate) fn binding_offset(&self, buffer: vk::Buffer) -> Option<DeviceSize> {
        self.state
            .lock()
            .buffers
            .get(&buffer.as_raw())
            .and_then(|&(_, _, binding)| binding)
            .map(|(_, offset)| offset)
    }
}

impl MockState {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

unsafe impl ArrayDevice for MockDevice {
    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn memory_properties(&self) -> &MemoryProperties {
        &self.memory_properties
    }

    unsafe fn create_buffer(
        &self,
        size: DeviceSize,
        _usage: vk::BufferUsageFlags,
    ) -> Result<vk::Buffer, VulkanError> {
        assert_ne!(size, 0);
        let mut state = self.state.lock();
        let call = state.buffer_calls;
        state.buffer_calls += 1;

        if state.failures.create_buffer == Some(call) {
            return Err(VulkanError::OutOfDeviceMemory);
        }

        let memory_type_bits = self.memory_type_bits[call % self.memory_type_bits.len()];
        let handle = state.next_handle();
        state.buffers.insert(handle, (size, memory_type_bits, None));

        Ok(vk::Buffer::from_raw(handle))
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.state.lock();
        assert!(state.buffers.remove(&buffer.as_raw()).is_some());
    }

    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> MemoryRequirements {
        let state = self.state.lock();
        let &(size, memory_type_bits, _) = &state.buffers[&buffer.as_raw()];

        MemoryRequirements {
            size: align_up(size, self.buffer_alignment),
            alignment: self.buffer_alignment,
            memory_type_bits,
        }
    }

    unsafe fn create_buffer_view(
        &self,
        buffer: vk::Buffer,
        format: vk::Format,
        offset: DeviceSize,
        range: DeviceSize,
    ) -> Result<vk::BufferView, VulkanError> {
        assert_ne!(format, vk::Format::UNDEFINED);
        let mut state = self.state.lock();
        let &(size, _, binding) = &state.buffers[&buffer.as_raw()];
        assert!(binding.is_some(), "views can only be created on bound buffers");
        assert!(offset + range <= size);

        let call = state.view_calls;
        state.view_calls += 1;

        if state.failures.create_buffer_view == Some(call) {
            return Err(VulkanError::FormatNotSupported);
        }

        let handle = state.next_handle();
        state.views.insert(handle);

        Ok(vk::BufferView::from_raw(handle))
    }

    unsafe fn destroy_buffer_view(&self, view: vk::BufferView) {
        let mut state = self.state.lock();
        assert!(state.views.remove(&view.as_raw()));
    }

    unsafe fn allocate_memory(
        &self,
        size: DeviceSize,
        memory_type_index: u32,
    ) -> Result<vk::DeviceMemory, VulkanError> {
        let mut state = self.state.lock();
        state.allocations.push((size, memory_type_index));

        if state.failures.allocate_memory {
            return Err(VulkanError::OutOfDeviceMemory);
        }

        let handle = state.next_handle();
        let contents = vec![0; size as usize].into_boxed_slice();
        state.memories.insert(handle, (contents, memory_type_index));

        Ok(vk::DeviceMemory::from_raw(handle))
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state.lock();
        assert!(!state.mapped.contains(&memory.as_raw()));
        assert!(state.memories.remove(&memory.as_raw()).is_some());
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: DeviceSize,
    ) -> Result<(), VulkanError> {
        let mut state = self.state.lock();
        let call = state.bind_calls;
        state.bind_calls += 1;

        if state.failures.bind_buffer_memory == Some(call) {
            return Err(VulkanError::OutOfDeviceMemory);
        }

        let memory_len = state.memories[&memory.as_raw()].0.len() as DeviceSize;
        let buffer_alignment = self.buffer_alignment;
        let entry = state.buffers.get_mut(&buffer.as_raw()).unwrap();
        assert!(entry.2.is_none(), "buffer bound twice");
        assert_eq!(offset % buffer_alignment.as_devicesize(), 0);
        assert!(offset + align_up(entry.0, buffer_alignment) <= memory_len);
        entry.2 = Some((memory.as_raw(), offset));

        Ok(())
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<NonNull<u8>, VulkanError> {
        let mut state = self.state.lock();
        state.map_calls += 1;

        if state.failures.map_memory
            || state.failures.max_map_size.is_some_and(|max| size > max)
        {
            return Err(VulkanError::MemoryMapFailed);
        }

        assert!(state.mapped.insert(memory.as_raw()), "memory mapped twice");
        let (contents, memory_type_index) = state.memories.get_mut(&memory.as_raw()).unwrap();
        assert!(self.memory_properties.memory_types[*memory_type_index as usize]
            .property_flags
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(offset + size <= contents.len() as DeviceSize);

        Ok(NonNull::new(unsafe { contents.as_mut_ptr().add(offset as usize) }).unwrap())
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state.lock();
        assert!(state.mapped.remove(&memory.as_raw()), "memory was not mapped");
    }
}

/// A logger that keeps every message it receives.
#[derive(Default)]
pub(crate) struct RecordingLogger {
    messages: Mutex<Vec<(MessageSeverity, String)>>,
}

impl RecordingLogger {
    pub(crate) fn messages(&self) -> Vec<(MessageSeverity, String)> {
        self.messages.lock().clone()
    }

    pub(crate) fn count(&self, severity: MessageSeverity) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|(s, _)| *s == severity)
            .count()
    }

    pub(crate) fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl ArrayLogger for RecordingLogger {
    fn log(&self, severity: MessageSeverity, args: fmt::Arguments<'_>) {
        self.messages.lock().push((severity, args.to_string()));
    }
}
