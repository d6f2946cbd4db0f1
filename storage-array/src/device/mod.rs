// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The part of a Vulkan device that a [`StorageArray`] consumes.
//!
//! A `StorageArray` doesn't create instances, devices or queues. It is handed an object
//! implementing [`ArrayDevice`], which exposes buffer creation, memory requirement queries,
//! memory allocation and binding, host mapping and buffer view creation, together with the
//! handful of device limits that decide how buffers are laid out.
//!
//! [`AshDevice`] implements the trait for an `ash::Device`.
//!
//! # Memory types and heaps
//!
//! A physical device is composed of one or more **memory heaps**. A memory heap is a pool of
//! memory that can be allocated. Memory is allocated from a **memory type**, each of which
//! belongs to one heap and has a set of properties. A memory type may or may not be visible to
//! the host, and may or may not be device-local.
//!
//! Memory types are ordered from "best" to "worse". Selecting a memory type is therefore done by
//! enumerating them and taking the first one that matches the criteria, which is what
//! [`MemoryProperties::find_memory_type_index`] does.
//!
//! [`StorageArray`]: crate::StorageArray

pub use self::ash_device::AshDevice;
use crate::{alignment::DeviceAlignment, vk, DeviceSize, NonExhaustive, VulkanError};
use std::ptr::NonNull;

pub mod ash_device;

/// The device operations needed by a [`StorageArray`].
///
/// Handles returned by the `create_*` and `allocate_*` methods are owned by the caller, which
/// destroys them with the matching `destroy_*`/`free_*` method.
///
/// # Safety
///
/// - [`map_memory`] must return a pointer that is valid for reads and writes of `size` bytes,
///   and stays valid until [`unmap_memory`] is called for the same memory.
/// - [`buffer_memory_requirements`] must return an alignment and a size that, when honored,
///   let the buffer be bound with [`bind_buffer_memory`].
/// - [`limits`] and [`memory_properties`] must always return the same values.
///
/// [`StorageArray`]: crate::StorageArray
/// [`map_memory`]: ArrayDevice::map_memory
/// [`unmap_memory`]: ArrayDevice::unmap_memory
/// [`buffer_memory_requirements`]: ArrayDevice::buffer_memory_requirements
/// [`bind_buffer_memory`]: ArrayDevice::bind_buffer_memory
/// [`limits`]: ArrayDevice::limits
/// [`memory_properties`]: ArrayDevice::memory_properties
pub unsafe trait ArrayDevice: Send + Sync {
    /// Returns the limits that govern buffer layout.
    fn limits(&self) -> &DeviceLimits;

    /// Returns the memory types and heaps of the physical device.
    fn memory_properties(&self) -> &MemoryProperties;

    /// Creates a buffer of `size` bytes. `size` is never zero.
    unsafe fn create_buffer(
        &self,
        size: DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<vk::Buffer, VulkanError>;

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer);

    /// Returns the memory requirements of a buffer created with [`create_buffer`].
    ///
    /// [`create_buffer`]: ArrayDevice::create_buffer
    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> MemoryRequirements;

    /// Creates a view of `range` bytes of `buffer`, starting at `offset`, interpreting the data as
    /// `format`.
    unsafe fn create_buffer_view(
        &self,
        buffer: vk::Buffer,
        format: vk::Format,
        offset: DeviceSize,
        range: DeviceSize,
    ) -> Result<vk::BufferView, VulkanError>;

    unsafe fn destroy_buffer_view(&self, view: vk::BufferView);

    /// Allocates `size` bytes of memory from the memory type with index `memory_type_index`.
    unsafe fn allocate_memory(
        &self,
        size: DeviceSize,
        memory_type_index: u32,
    ) -> Result<vk::DeviceMemory, VulkanError>;

    unsafe fn free_memory(&self, memory: vk::DeviceMemory);

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: DeviceSize,
    ) -> Result<(), VulkanError>;

    /// Maps `size` bytes of `memory` starting at `offset` into host address space.
    ///
    /// Returns [`VulkanError::MemoryMapFailed`] if the range couldn't be mapped as a whole. Any
    /// other error means that mapping is not possible at all.
    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<NonNull<u8>, VulkanError>;

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory);
}

/// Device limits that affect how buffers are laid out.
///
/// The default values are the minimum guarantees that every Vulkan implementation provides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Required alignment of offsets into storage buffers.
    pub min_storage_buffer_offset_alignment: DeviceAlignment,

    /// Required alignment of offsets into uniform buffers.
    pub min_uniform_buffer_offset_alignment: DeviceAlignment,

    /// Required alignment of offsets into texel buffers.
    pub min_texel_buffer_offset_alignment: DeviceAlignment,

    /// Largest range, in bytes, of a storage buffer binding.
    pub max_storage_buffer_range: DeviceSize,

    /// Largest range, in bytes, of a uniform buffer binding.
    pub max_uniform_buffer_range: DeviceSize,

    /// Largest number of texels addressable through a buffer view.
    pub max_texel_buffer_elements: DeviceSize,

    /// Alignment of pointers returned by mapping memory. Buffer sizes are rounded up to it, and
    /// it is the window size used when a range can't be mapped as a whole.
    pub min_memory_map_alignment: DeviceAlignment,

    pub _ne: NonExhaustive,
}

impl Default for DeviceLimits {
    #[inline]
    fn default() -> Self {
        DeviceLimits {
            min_storage_buffer_offset_alignment: alignment_from(256),
            min_uniform_buffer_offset_alignment: alignment_from(256),
            min_texel_buffer_offset_alignment: alignment_from(256),
            max_storage_buffer_range: 1 << 27,
            max_uniform_buffer_range: 16384,
            max_texel_buffer_elements: 65536,
            min_memory_map_alignment: alignment_from(64),
            _ne: NonExhaustive(()),
        }
    }
}

impl From<&vk::PhysicalDeviceLimits> for DeviceLimits {
    fn from(val: &vk::PhysicalDeviceLimits) -> Self {
        DeviceLimits {
            min_storage_buffer_offset_alignment: alignment_from(
                val.min_storage_buffer_offset_alignment,
            ),
            min_uniform_buffer_offset_alignment: alignment_from(
                val.min_uniform_buffer_offset_alignment,
            ),
            min_texel_buffer_offset_alignment: alignment_from(
                val.min_texel_buffer_offset_alignment,
            ),
            max_storage_buffer_range: val.max_storage_buffer_range.into(),
            max_uniform_buffer_range: val.max_uniform_buffer_range.into(),
            max_texel_buffer_elements: val.max_texel_buffer_elements.into(),
            min_memory_map_alignment: alignment_from(val.min_memory_map_alignment as DeviceSize),
            _ne: NonExhaustive(()),
        }
    }
}

/// Turns an alignment reported by the implementation into a `DeviceAlignment`. The Vulkan
/// specification requires these to be powers of two; anything else is rounded up to one.
pub(crate) fn alignment_from(val: DeviceSize) -> DeviceAlignment {
    val.max(1)
        .checked_next_power_of_two()
        .and_then(DeviceAlignment::new)
        .unwrap_or(DeviceAlignment::MAX)
}

/// Properties of the memory in a physical device.
#[derive(Clone, Debug, Default)]
pub struct MemoryProperties {
    /// The available memory types.
    pub memory_types: Vec<MemoryType>,

    /// The available memory heaps.
    pub memory_heaps: Vec<MemoryHeap>,
}

impl From<vk::PhysicalDeviceMemoryProperties> for MemoryProperties {
    #[inline]
    fn from(val: vk::PhysicalDeviceMemoryProperties) -> Self {
        Self {
            memory_types: val.memory_types[0..val.memory_type_count as usize]
                .iter()
                .map(|vk_memory_type| MemoryType {
                    property_flags: vk_memory_type.property_flags,
                    heap_index: vk_memory_type.heap_index,
                })
                .collect(),
            memory_heaps: val.memory_heaps[0..val.memory_heap_count as usize]
                .iter()
                .map(|vk_memory_heap| MemoryHeap {
                    size: vk_memory_heap.size,
                    flags: vk_memory_heap.flags,
                })
                .collect(),
        }
    }
}

impl MemoryProperties {
    /// Returns the index of the best memory type for an allocation of `size` bytes.
    ///
    /// Only memory types whose bit is set in `memory_type_bits`, that have every flag in
    /// `filter.required_flags` and whose heap can hold `size` bytes are considered. Among those,
    /// the types missing the fewest `preferred_flags` and having the fewest
    /// `not_preferred_flags` win, with earlier types winning ties.
    pub fn find_memory_type_index(
        &self,
        memory_type_bits: u32,
        filter: MemoryTypeFilter,
        size: DeviceSize,
    ) -> Option<u32> {
        let MemoryTypeFilter {
            required_flags,
            preferred_flags,
            not_preferred_flags,
        } = filter;

        self.memory_types
            .iter()
            .enumerate()
            .take(u32::BITS as usize)
            // Filter out memory types which are supported by the memory type bits and have the
            // required flags set.
            .filter(|&(index, memory_type)| {
                memory_type_bits & (1 << index) != 0
                    && memory_type.property_flags.contains(required_flags)
            })
            .filter(|(_, memory_type)| {
                self.memory_heaps
                    .get(memory_type.heap_index as usize)
                    .is_some_and(|heap| heap.size >= size)
            })
            // Rank memory types with more of the preferred flags higher, and ones with more of the
            // not preferred flags lower.
            .min_by_key(|&(index, memory_type)| {
                let flags = memory_type.property_flags;

                (
                    (preferred_flags & !flags).as_raw().count_ones()
                        + (not_preferred_flags & flags).as_raw().count_ones(),
                    index,
                )
            })
            .map(|(index, _)| index as u32)
    }
}

/// A memory type in a physical device.
#[derive(Clone, Debug)]
pub struct MemoryType {
    /// The properties of this memory type.
    pub property_flags: vk::MemoryPropertyFlags,

    /// The index of the memory heap that this memory type corresponds to.
    pub heap_index: u32,
}

/// A memory heap in a physical device.
#[derive(Clone, Debug)]
pub struct MemoryHeap {
    /// The size of the heap in bytes.
    pub size: DeviceSize,

    /// Attributes of the heap.
    pub flags: vk::MemoryHeapFlags,
}

/// Describes what memory property flags are required, preferred and not preferred when picking a
/// memory type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryTypeFilter {
    pub required_flags: vk::MemoryPropertyFlags,
    pub preferred_flags: vk::MemoryPropertyFlags,
    pub not_preferred_flags: vk::MemoryPropertyFlags,
}

/// Represents requirements expressed by the implementation when it comes to binding memory to a
/// buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryRequirements {
    /// Number of bytes of memory the buffer needs.
    pub size: DeviceSize,

    /// Required alignment of the buffer's offset within its memory.
    pub alignment: DeviceAlignment,

    /// Indicates which memory types can be used. Each bit that is set to 1 means that the memory
    /// type whose index is the same as the position of the bit can be used.
    pub memory_type_bits: u32,
}

impl From<vk::MemoryRequirements> for MemoryRequirements {
    #[inline]
    fn from(val: vk::MemoryRequirements) -> Self {
        MemoryRequirements {
            size: val.size,
            alignment: alignment_from(val.alignment),
            memory_type_bits: val.memory_type_bits,
        }
    }
}
