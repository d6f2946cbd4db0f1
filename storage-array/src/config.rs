// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Descriptions of the buffers a [`StorageArray`] should contain.
//!
//! A configuration is a list of [`BufferCreateInfo`]s. Each one becomes a single `VkBuffer`,
//! subdivided into the subbuffers described by its [`SubbufferCreateInfo`]s. Subbuffers are
//! packed in the order they are given, each starting at an offset that is a multiple of the
//! minimum offset alignment of the buffer's [`BufferKind`].
//!
//! [`StorageArray`]: crate::StorageArray

use crate::{
    alignment::DeviceAlignment,
    device::{DeviceLimits, MemoryTypeFilter},
    vk, DeviceSize, ValidationError,
};
use smallvec::SmallVec;
use std::mem::size_of;

/// How a buffer is going to be used by shaders. This decides its usage flags, the alignment of
/// its subbuffers and the limit on its size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// A storage buffer.
    Storage,

    /// A uniform buffer.
    Uniform,

    /// A vertex or instance buffer.
    Vertex,

    /// An index buffer.
    Index,

    /// A storage texel buffer. Every subbuffer must have a format and is given a buffer view.
    StorageTexel,

    /// A uniform texel buffer. Every subbuffer must have a format and is given a buffer view.
    UniformTexel,
}

impl BufferKind {
    /// Returns the usage flags a buffer of this kind is created with. Every buffer can
    /// additionally be the source and destination of transfer commands.
    #[inline]
    pub fn usage(self) -> vk::BufferUsageFlags {
        let usage = match self {
            BufferKind::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
            BufferKind::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferKind::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferKind::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferKind::StorageTexel => vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER,
            BufferKind::UniformTexel => vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER,
        };

        usage | vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST
    }

    /// Returns the alignment that subbuffer offsets must have for a buffer of this kind.
    #[inline]
    pub fn alignment(self, limits: &DeviceLimits) -> DeviceAlignment {
        match self {
            BufferKind::Storage => limits.min_storage_buffer_offset_alignment,
            BufferKind::Uniform => limits.min_uniform_buffer_offset_alignment,
            BufferKind::StorageTexel | BufferKind::UniformTexel => {
                limits.min_texel_buffer_offset_alignment
            }
            BufferKind::Vertex | BufferKind::Index => DeviceAlignment::MIN,
        }
    }

    /// Returns the largest range, in bytes, a buffer of this kind can be bound with, or [`None`]
    /// if the kind has no such limit. Texel buffers are limited per subbuffer, in elements,
    /// instead; see [`DeviceLimits::max_texel_buffer_elements`].
    #[inline]
    pub fn max_range(self, limits: &DeviceLimits) -> Option<DeviceSize> {
        match self {
            BufferKind::Storage => Some(limits.max_storage_buffer_range),
            BufferKind::Uniform => Some(limits.max_uniform_buffer_range),
            _ => None,
        }
    }

    /// Returns whether subbuffers of this kind are viewed through a format.
    #[inline]
    pub fn is_texel(self) -> bool {
        matches!(self, BufferKind::StorageTexel | BufferKind::UniformTexel)
    }
}

/// Whether the memory of a [`StorageArray`] should be accessible from the host.
///
/// [`StorageArray`]: crate::StorageArray
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HostAccess {
    /// The memory is host-visible and host-coherent, and can be read and written through the
    /// array.
    #[default]
    HostVisible,

    /// The memory is device-local and can only be accessed by the device.
    DeviceLocal,
}

impl HostAccess {
    /// Returns whether the memory can be mapped.
    #[inline]
    pub fn is_host_visible(self) -> bool {
        matches!(self, HostAccess::HostVisible)
    }

    /// Returns the filter used to pick the memory type of the array's memory block.
    #[inline]
    pub fn memory_type_filter(self) -> MemoryTypeFilter {
        match self {
            HostAccess::HostVisible => MemoryTypeFilter {
                required_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT,
                preferred_flags: vk::MemoryPropertyFlags::empty(),
                not_preferred_flags: vk::MemoryPropertyFlags::empty(),
            },
            HostAccess::DeviceLocal => MemoryTypeFilter {
                required_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                preferred_flags: vk::MemoryPropertyFlags::empty(),
                not_preferred_flags: vk::MemoryPropertyFlags::HOST_VISIBLE,
            },
        }
    }
}

/// Parameters to create a subbuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubbufferCreateInfo {
    /// The number of elements the subbuffer holds.
    pub element_count: DeviceSize,

    /// The size in bytes of one element.
    pub element_size: DeviceSize,

    /// The format of the elements, if the subbuffer is viewed as a texel buffer.
    ///
    /// Must be `Some` for subbuffers of texel buffers, and `None` otherwise.
    pub format: Option<vk::Format>,
}

impl SubbufferCreateInfo {
    /// Returns a `SubbufferCreateInfo` for `element_count` elements of type `T`.
    #[inline]
    pub fn new<T>(element_count: DeviceSize) -> Self {
        SubbufferCreateInfo {
            element_count,
            element_size: size_of::<T>() as DeviceSize,
            format: None,
        }
    }

    /// Returns a `SubbufferCreateInfo` for `element_count` texels of `element_size` bytes each,
    /// interpreted as `format`.
    #[inline]
    pub fn with_format(
        element_count: DeviceSize,
        element_size: DeviceSize,
        format: vk::Format,
    ) -> Self {
        SubbufferCreateInfo {
            element_count,
            element_size,
            format: Some(format),
        }
    }

    /// Returns the unaligned size in bytes, or [`None`] on overflow.
    #[inline]
    pub fn size(&self) -> Option<DeviceSize> {
        self.element_count.checked_mul(self.element_size)
    }

    /// Returns whether the subbuffer would hold no data.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.element_count == 0 || self.element_size == 0
    }
}

/// Parameters to create one buffer of a [`StorageArray`].
///
/// [`StorageArray`]: crate::StorageArray
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferCreateInfo {
    /// How the buffer is going to be used.
    pub kind: BufferKind,

    /// The subbuffers, in the order they are laid out in the buffer.
    pub subbuffers: SmallVec<[SubbufferCreateInfo; 4]>,
}

impl BufferCreateInfo {
    /// Returns a `BufferCreateInfo` with the given kind and subbuffers.
    #[inline]
    pub fn new(
        kind: BufferKind,
        subbuffers: impl IntoIterator<Item = SubbufferCreateInfo>,
    ) -> Self {
        BufferCreateInfo {
            kind,
            subbuffers: subbuffers.into_iter().collect(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        let &BufferCreateInfo {
            kind,
            ref subbuffers,
        } = self;

        for (index, subbuffer) in subbuffers.iter().enumerate() {
            // Empty requests are dropped before the configuration is committed.
            if subbuffer.is_empty() {
                continue;
            }

            match (kind.is_texel(), subbuffer.format) {
                (true, None) => {
                    return Err(ValidationError::new(
                        format!("subbuffers[{}].format", index),
                        "is `None`, but `kind` is a texel buffer kind",
                    ));
                }
                (false, Some(_)) => {
                    return Err(ValidationError::new(
                        format!("subbuffers[{}].format", index),
                        "is `Some`, but `kind` is not a texel buffer kind",
                    ));
                }
                (true, Some(vk::Format::UNDEFINED)) => {
                    return Err(ValidationError::new(
                        format!("subbuffers[{}].format", index),
                        "is `Format::UNDEFINED`",
                    ));
                }
                _ => (),
            }

            if subbuffer.size().is_none() {
                return Err(ValidationError::new(
                    format!("subbuffers[{}]", index),
                    "`element_count * element_size` overflows",
                ));
            }
        }

        Ok(())
    }
}

/// The configuration being built between `start_config` and `end_config`.
#[derive(Debug, Default)]
pub(crate) struct PendingConfig {
    pub(crate) host_access: HostAccess,
    pub(crate) buffers: Vec<BufferCreateInfo>,
}

impl PendingConfig {
    pub(crate) fn reset(&mut self, host_access: HostAccess) {
        self.host_access = host_access;
        self.buffers.clear();
    }
}
