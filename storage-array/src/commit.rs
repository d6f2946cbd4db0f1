// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Turning a pending configuration into device objects.
//!
//! Committing happens in two steps. [`plan`] computes the layout of every buffer and checks it
//! against the device limits without touching the device. [`build`] then creates the buffers,
//! allocates a single block of memory for all of them, binds them and creates the buffer views.
//! Every object created by `build` is owned by a local value until the very end, so returning
//! early on error releases everything that was created by the attempt.

use crate::{
    alignment::{checked_align_up, DeviceAlignment},
    config::{BufferCreateInfo, BufferKind, HostAccess},
    device::{ArrayDevice, DeviceLimits},
    resource::{RawBuffer, RawBufferView, RawMemory},
    vk, ArrayError, DeviceSize, Validated, ValidationError, VulkanError,
};
use smallvec::SmallVec;
use std::sync::Arc;

/// Where a buffer and its subbuffers go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BufferLayout {
    pub(crate) kind: BufferKind,
    pub(crate) alignment: DeviceAlignment,
    /// Sum of the aligned subbuffer sizes, rounded up to the memory map alignment. This is the
    /// size the buffer is created with.
    pub(crate) size: DeviceSize,
    pub(crate) subbuffers: SmallVec<[SubbufferLayout; 4]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SubbufferLayout {
    /// Size of the data, rounded up to the buffer's alignment.
    pub(crate) size: DeviceSize,
    pub(crate) offset: DeviceSize,
    pub(crate) format: Option<vk::Format>,
    /// Size of the data itself. Buffer views cover this many bytes.
    pub(crate) data_size: DeviceSize,
}

/// Computes the layout of every buffer in `buffers` and checks it against `limits`.
///
/// The subbuffers must not be empty, and must have passed `BufferCreateInfo::validate`.
pub(crate) fn plan(
    limits: &DeviceLimits,
    buffers: &[BufferCreateInfo],
) -> Result<Vec<BufferLayout>, Box<ValidationError>> {
    buffers
        .iter()
        .enumerate()
        .map(|(index, create_info)| {
            plan_buffer(limits, create_info)
                .map_err(|err| err.add_context(format!("buffers[{}]", index)))
        })
        .collect()
}

fn plan_buffer(
    limits: &DeviceLimits,
    create_info: &BufferCreateInfo,
) -> Result<BufferLayout, Box<ValidationError>> {
    let &BufferCreateInfo {
        kind,
        ref subbuffers,
    } = create_info;
    let alignment = kind.alignment(limits);
    let overflow = || ValidationError::new("", "the size of the buffer overflows");

    let mut subbuffer_layouts = SmallVec::with_capacity(subbuffers.len());
    let mut end: DeviceSize = 0;

    for (index, subbuffer) in subbuffers.iter().enumerate() {
        debug_assert!(!subbuffer.is_empty());

        if kind.is_texel() && subbuffer.element_count > limits.max_texel_buffer_elements {
            return Err(ValidationError::new(
                format!("subbuffers[{}].element_count", index),
                format!(
                    "is {}, which exceeds the `max_texel_buffer_elements` limit ({})",
                    subbuffer.element_count, limits.max_texel_buffer_elements,
                ),
            ));
        }

        let data_size = subbuffer.size().ok_or_else(overflow)?;
        let size = checked_align_up(data_size, alignment).ok_or_else(overflow)?;

        subbuffer_layouts.push(SubbufferLayout {
            size,
            offset: end,
            format: subbuffer.format,
            data_size,
        });
        end = end.checked_add(size).ok_or_else(overflow)?;
    }

    if let Some(max_range) = kind.max_range(limits) {
        if end > max_range {
            return Err(ValidationError::new(
                "",
                format!(
                    "the total size of the subbuffers ({} bytes) exceeds the maximum range of a \
                    {:?} buffer ({} bytes)",
                    end, kind, max_range,
                ),
            ));
        }
    }

    let size = checked_align_up(end, limits.min_memory_map_alignment).ok_or_else(overflow)?;

    Ok(BufferLayout {
        kind,
        alignment,
        size,
        subbuffers: subbuffer_layouts,
    })
}

/// The device objects of a committed configuration.
///
/// Fields are ordered so that views are destroyed before their buffer, and buffers before the
/// memory they are bound to.
pub(crate) struct Committed {
    pub(crate) buffers: Vec<CommittedBuffer>,
    pub(crate) memory: RawMemory,
    pub(crate) host_access: HostAccess,
}

pub(crate) struct CommittedBuffer {
    pub(crate) views: SmallVec<[Option<RawBufferView>; 4]>,
    pub(crate) buffer: RawBuffer,
    pub(crate) layout: BufferLayout,
    /// Offset of the buffer in the memory block.
    pub(crate) offset: DeviceSize,
}

/// Creates the device objects described by `layouts`.
pub(crate) fn build(
    device: &Arc<dyn ArrayDevice>,
    host_access: HostAccess,
    layouts: Vec<BufferLayout>,
) -> Result<Committed, Validated<ArrayError>> {
    let mut buffers = Vec::with_capacity(layouts.len());

    for layout in &layouts {
        buffers.push(RawBuffer::new(device, layout.size, layout.kind.usage())?);
    }

    let mut offsets = Vec::with_capacity(buffers.len());
    let mut memory_type_bits = u32::MAX;
    let mut end: DeviceSize = 0;

    for buffer in &buffers {
        let requirements = buffer.memory_requirements();
        debug_assert!(requirements.size >= buffer.size());
        let offset = checked_align_up(end, requirements.alignment)
            .ok_or(VulkanError::OutOfDeviceMemory)?;

        offsets.push(offset);
        memory_type_bits &= requirements.memory_type_bits;
        end = offset
            .checked_add(requirements.size)
            .ok_or(VulkanError::OutOfDeviceMemory)?;
    }

    let memory_type_index = device
        .memory_properties()
        .find_memory_type_index(memory_type_bits, host_access.memory_type_filter(), end)
        .ok_or(ArrayError::NoSuitableMemoryType { memory_type_bits })?;
    let memory = RawMemory::allocate(device, end, memory_type_index)?;

    for (buffer, &offset) in buffers.iter().zip(&offsets) {
        // SAFETY: the offsets honor each buffer's requirements, the memory type is in the
        // intersection of their allowed types, and each buffer is bound once.
        unsafe { buffer.bind_memory(&memory, offset) }?;
    }

    let mut committed_buffers = Vec::with_capacity(buffers.len());

    for ((buffer, layout), offset) in buffers.into_iter().zip(layouts).zip(offsets) {
        let mut views = SmallVec::with_capacity(layout.subbuffers.len());

        for subbuffer in &layout.subbuffers {
            let view = match subbuffer.format {
                // SAFETY: the buffer is bound, subbuffer offsets of texel buffers are multiples
                // of the texel offset alignment, and the range holds whole elements.
                Some(format) => Some(unsafe {
                    RawBufferView::new(&buffer, format, subbuffer.offset, subbuffer.data_size)
                }?),
                None => None,
            };
            views.push(view);
        }

        committed_buffers.push(CommittedBuffer {
            views,
            buffer,
            layout,
            offset,
        });
    }

    Ok(Committed {
        buffers: committed_buffers,
        memory,
        host_access,
    })
}

impl Committed {
    /// Returns the number of bytes of the memory block.
    #[inline]
    pub(crate) fn total_size(&self) -> DeviceSize {
        self.memory.size()
    }
}
