// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Groups many logically independent GPU buffers into a single device memory allocation.
//!
//! # Brief summary
//!
//! - A [`StorageArray`] is created on top of an [`ArrayDevice`], the narrow slice of a Vulkan
//!   device that the array needs: buffer creation, memory requirements, memory allocation,
//!   binding, mapping and typed buffer views. [`AshDevice`] implements it for a real
//!   `ash::Device`.
//!
//! - The array is configured in two phases. [`StorageArray::start_config`] opens a new pending
//!   configuration, [`StorageArray::add_buffer`] appends one *buffer* (a physical `VkBuffer`)
//!   made of one or more *subbuffers*, and [`StorageArray::end_config`] commits the whole
//!   configuration at once.
//!
//! - Committing creates every buffer and view, allocates one block of device memory for all of
//!   them and binds them into it. Either everything succeeds and the new set of buffers replaces
//!   the previous one, or nothing changes. Readers never observe a half-built configuration.
//!
//! - If the memory is host-visible, whole buffers or single subbuffers can be read and written
//!   from the host with [`StorageArray::read_buffer`], [`StorageArray::write_buffer`],
//!   [`StorageArray::read_subbuffer`] and [`StorageArray::write_subbuffer`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use storage_array::{
//!     ArrayDevice, BufferCreateInfo, BufferKind, HostAccess, StorageArray,
//!     StorageArrayCreateInfo, SubbufferCreateInfo,
//! };
//!
//! # fn example(device: Arc<dyn ArrayDevice>) -> Result<(), Box<dyn std::error::Error>> {
//! let array = StorageArray::new(device, StorageArrayCreateInfo::default());
//!
//! array.start_config(HostAccess::HostVisible);
//! array.add_buffer(BufferCreateInfo::new(
//!     BufferKind::Storage,
//!     [
//!         SubbufferCreateInfo::new::<f32>(256),
//!         SubbufferCreateInfo::new::<f32>(256),
//!     ],
//! ))?;
//! array.end_config()?;
//!
//! array.write_subbuffer(0, 1, &[6.0f32; 256])?;
//! let data: Vec<f32> = array.read_subbuffer(0, 1)?;
//! assert_eq!(data, [6.0; 256]);
//! # Ok(())
//! # }
//! ```

pub use crate::{
    alignment::DeviceAlignment,
    array::{BufferInfo, StorageArray, StorageArrayCreateInfo, SubbufferInfo},
    config::{BufferCreateInfo, BufferKind, HostAccess, SubbufferCreateInfo},
    device::{
        ash_device::AshDevice, ArrayDevice, DeviceLimits, MemoryHeap, MemoryProperties,
        MemoryRequirements, MemoryType,
    },
    logger::{ArrayLogger, LogForwarder, MessageSeverity, NoopLogger},
};
pub use ash::vk;
use std::{
    borrow::Cow,
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
    num::NonZeroU64,
};

#[macro_use]
mod tests;
mod access;
pub mod alignment;
mod array;
mod commit;
pub mod config;
pub mod device;
pub mod logger;
mod resource;

/// Represents memory size and offset values on a Vulkan device.
/// Analogous to the Rust `usize` type on the host.
pub use ash::vk::DeviceSize;

/// A [`DeviceSize`] that is known not to equal zero.
pub type NonZeroDeviceSize = NonZeroU64;

/// A helper type for non-exhaustive structs.
///
/// This type cannot be constructed outside this crate. Structures with a field of this type can
/// only be constructed by calling a constructor function or `Default::default()`. The effect is
/// similar to the standard Rust `#[non_exhaustive]` attribute, except that it does not prevent
/// update syntax from being used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NonExhaustive(pub(crate) ());

/// Error type returned by the device when a call fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum VulkanError {
    OutOfHostMemory,
    OutOfDeviceMemory,
    InitializationFailed,
    DeviceLost,
    /// Mapping of a memory object has failed.
    ///
    /// When this is returned for a host access to a [`StorageArray`], the array retries the access
    /// one small window at a time.
    MemoryMapFailed,
    TooManyObjects,
    FormatNotSupported,
    Unknown,
    /// A `VkResult` that has no dedicated variant.
    Unnamed(vk::Result),
}

impl From<vk::Result> for VulkanError {
    fn from(val: vk::Result) -> Self {
        match val {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => Self::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Self::OutOfDeviceMemory,
            vk::Result::ERROR_INITIALIZATION_FAILED => Self::InitializationFailed,
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            vk::Result::ERROR_MEMORY_MAP_FAILED => Self::MemoryMapFailed,
            vk::Result::ERROR_TOO_MANY_OBJECTS => Self::TooManyObjects,
            vk::Result::ERROR_FORMAT_NOT_SUPPORTED => Self::FormatNotSupported,
            vk::Result::ERROR_UNKNOWN => Self::Unknown,
            result => Self::Unnamed(result),
        }
    }
}

impl Error for VulkanError {}

impl Display for VulkanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            VulkanError::OutOfHostMemory => write!(f, "A host memory allocation has failed."),
            VulkanError::OutOfDeviceMemory => write!(f, "A device memory allocation has failed."),
            VulkanError::InitializationFailed => write!(
                f,
                "Initialization of an object could not be completed for \
                implementation-specific reasons.",
            ),
            VulkanError::DeviceLost => write!(f, "The logical or physical device has been lost."),
            VulkanError::MemoryMapFailed => write!(f, "Mapping of a memory object has failed."),
            VulkanError::TooManyObjects => write!(
                f,
                "Too many objects of the type have already been created.",
            ),
            VulkanError::FormatNotSupported => write!(
                f,
                "A requested format is not supported on this device.",
            ),
            VulkanError::Unknown => write!(
                f,
                "An unknown error has occurred; either the application has provided invalid \
                input, or an implementation failure has occurred.",
            ),
            VulkanError::Unnamed(result) => write!(
                f,
                "Unnamed error, VkResult value {}",
                result.as_raw(),
            ),
        }
    }
}

/// A wrapper for error types of functions that can return validation errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validated<E> {
    /// A non-validation error occurred.
    Error(E),

    /// A validation error occurred.
    ValidationError(Box<ValidationError>),
}

impl<E> Validated<E> {
    /// Maps the inner `Error` value using the provided function, or does nothing if the value is
    /// `ValidationError`.
    #[inline]
    pub fn map<F>(self, f: impl FnOnce(E) -> F) -> Validated<F> {
        match self {
            Self::Error(err) => Validated::Error(f(err)),
            Self::ValidationError(err) => Validated::ValidationError(err),
        }
    }

    /// Returns the inner `Error` value, or panics if it contains `ValidationError`.
    #[inline(always)]
    #[track_caller]
    pub fn unwrap(self) -> E {
        match self {
            Self::Error(err) => err,
            Self::ValidationError(err) => {
                panic!(
                    "called `Validated::unwrap` on a `ValidationError` value: {:?}",
                    err
                )
            }
        }
    }

    /// Returns whether the value is a `ValidationError`.
    #[inline]
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::ValidationError(_))
    }
}

impl<E> Error for Validated<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Error(err) => Some(err),
            Self::ValidationError(err) => Some(err),
        }
    }
}

impl<E> Display for Validated<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::Error(_) => write!(f, "a non-validation error occurred"),
            Self::ValidationError(_) => write!(f, "a validation error occurred"),
        }
    }
}

impl<E> From<Box<ValidationError>> for Validated<E> {
    #[inline]
    fn from(err: Box<ValidationError>) -> Self {
        Self::ValidationError(err)
    }
}

impl From<ArrayError> for Validated<ArrayError> {
    #[inline]
    fn from(err: ArrayError) -> Self {
        Self::Error(err)
    }
}

impl From<VulkanError> for Validated<ArrayError> {
    #[inline]
    fn from(err: VulkanError) -> Self {
        Self::Error(ArrayError::VulkanError(err))
    }
}

/// The arguments or state of a call were invalid. These are programmer errors: they are detected
/// before any call is made to the device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationError {
    /// The context in which the problem exists (e.g. a specific parameter).
    pub context: Cow<'static, str>,

    /// A description of the problem.
    pub problem: Cow<'static, str>,
}

impl ValidationError {
    pub(crate) fn new(
        context: impl Into<Cow<'static, str>>,
        problem: impl Into<Cow<'static, str>>,
    ) -> Box<Self> {
        Box::new(ValidationError {
            context: context.into(),
            problem: problem.into(),
        })
    }

    pub(crate) fn add_context(
        mut self: Box<Self>,
        context: impl Into<Cow<'static, str>>,
    ) -> Box<Self> {
        let context = context.into();

        if self.context.is_empty() {
            self.context = context;
        } else {
            self.context = format!("{}.{}", context, self.context).into();
        }

        self
    }
}

impl Error for ValidationError {}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        if self.context.is_empty() {
            write!(f, "{}", self.problem)
        } else {
            write!(f, "{}: {}", self.context, self.problem)
        }
    }
}

/// Error that can happen while committing a configuration or accessing the memory of a
/// [`StorageArray`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrayError {
    /// A call to the device failed.
    VulkanError(VulkanError),

    /// No memory type is compatible with every buffer of the configuration, has the properties
    /// required by the requested [`HostAccess`], and belongs to a heap large enough for the whole
    /// memory block.
    NoSuitableMemoryType {
        /// The memory types that every buffer could have been bound to.
        memory_type_bits: u32,
    },

    /// Host access was requested, but the committed memory is not host-visible.
    NotHostVisible,

    /// Host access was requested, but no configuration has been committed yet.
    NotCommitted,
}

impl Error for ArrayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::VulkanError(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for ArrayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::VulkanError(_) => write!(f, "a runtime error occurred"),
            Self::NoSuitableMemoryType { memory_type_bits } => write!(
                f,
                "no suitable memory type was found among the compatible types {:#034b}",
                memory_type_bits,
            ),
            Self::NotHostVisible => write!(f, "the committed memory is not host-visible"),
            Self::NotCommitted => write!(f, "no configuration has been committed"),
        }
    }
}

impl From<VulkanError> for ArrayError {
    #[inline]
    fn from(err: VulkanError) -> Self {
        Self::VulkanError(err)
    }
}
