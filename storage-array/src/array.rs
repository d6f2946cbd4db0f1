// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use crate::{
    access,
    alignment::DeviceAlignment,
    commit::{self, Committed, CommittedBuffer},
    config::{BufferCreateInfo, BufferKind, HostAccess, PendingConfig},
    device::ArrayDevice,
    logger::{array_log, ArrayLogger, LogForwarder},
    resource::RawMemory,
    vk, ArrayError, DeviceSize, NonExhaustive, Validated, ValidationError, VulkanError,
};
use bytemuck::Pod;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::{fmt, mem::size_of, sync::Arc};

/// A set of buffers sharing one allocation of device memory.
///
/// The buffers are described in two phases. A configuration is opened with
/// [`start_config`](Self::start_config), filled with [`add_buffer`](Self::add_buffer) and then
/// committed with [`end_config`](Self::end_config), which creates every buffer at once and
/// replaces the previously committed ones. A commit either fully succeeds or leaves the array
/// exactly as it was.
///
/// Describing a configuration and accessing the committed buffers are guarded by two separate
/// locks. Reads and writes can keep going while another thread describes the next configuration,
/// and only wait for the short moment when a finished commit is swapped in.
pub struct StorageArray {
    device: Arc<dyn ArrayDevice>,
    logger: Arc<dyn ArrayLogger>,
    chunked_mapping: bool,
    pending: Mutex<PendingConfig>,
    committed: Mutex<Option<Committed>>,
}

impl StorageArray {
    /// Creates an array without any buffer.
    pub fn new(device: Arc<dyn ArrayDevice>, create_info: StorageArrayCreateInfo) -> Self {
        let StorageArrayCreateInfo {
            logger,
            chunked_mapping,
            _ne: _,
        } = create_info;

        StorageArray {
            device,
            logger,
            chunked_mapping,
            pending: Mutex::default(),
            committed: Mutex::new(None),
        }
    }

    /// Returns the device that the array was created with.
    #[inline]
    pub fn device(&self) -> &Arc<dyn ArrayDevice> {
        &self.device
    }

    /// Discards the pending configuration and starts a new one, whose memory will be accessible
    /// according to `host_access`. The committed buffers are not affected.
    pub fn start_config(&self, host_access: HostAccess) {
        self.pending.lock().reset(host_access);
    }

    /// Adds a buffer to the pending configuration.
    ///
    /// Subbuffers with no elements, or elements of size zero, are dropped. If no subbuffer is
    /// left, the buffer itself is dropped. Both cases are reported as warnings to the logger.
    ///
    /// Nothing is created on the device until [`end_config`](Self::end_config) is called.
    pub fn add_buffer(&self, create_info: BufferCreateInfo) -> Result<(), Box<ValidationError>> {
        create_info
            .validate()
            .map_err(|err| err.add_context("create_info"))?;

        let BufferCreateInfo {
            kind,
            mut subbuffers,
        } = create_info;
        let mut pending = self.pending.lock();
        let buffer_index = pending.buffers.len();
        let mut subbuffer_index = 0;

        subbuffers.retain(|subbuffer| {
            let is_empty = subbuffer.is_empty();

            if is_empty {
                array_log!(
                    self.logger,
                    Warning,
                    "dropped subbuffer {} of buffer request {}: {} elements of {} bytes hold no \
                    data",
                    subbuffer_index,
                    buffer_index,
                    subbuffer.element_count,
                    subbuffer.element_size,
                );
            }

            subbuffer_index += 1;

            !is_empty
        });

        if subbuffers.is_empty() {
            array_log!(
                self.logger,
                Warning,
                "discarded buffer request {} ({:?}): it has no subbuffers holding data",
                buffer_index,
                kind,
            );

            return Ok(());
        }

        pending.buffers.push(BufferCreateInfo { kind, subbuffers });

        Ok(())
    }

    /// Discards the pending configuration. The committed buffers are not affected.
    pub fn clear_config(&self) {
        self.pending.lock().buffers.clear();
    }

    /// Returns the number of buffers in the pending configuration.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().buffers.len()
    }

    /// Commits the pending configuration.
    ///
    /// All the buffers are created, a single block of memory is allocated for them, and they
    /// are bound into it. Texel buffers additionally get one buffer view per subbuffer. On
    /// success the new buffers replace the committed ones, which are destroyed, and the pending
    /// configuration is cleared.
    ///
    /// If anything fails, everything created by the attempt is destroyed, and both the committed
    /// buffers and the pending configuration are left unchanged.
    ///
    /// Committing an empty configuration does nothing.
    pub fn end_config(&self) -> Result<(), Validated<ArrayError>> {
        let mut pending = self.pending.lock();

        if pending.buffers.is_empty() {
            return Ok(());
        }

        let host_access = pending.host_access;
        let committed = commit::plan(self.device.limits(), &pending.buffers)
            .map_err(Validated::<ArrayError>::from)
            .and_then(|layouts| {
                for (index, layout) in layouts.iter().enumerate() {
                    array_log!(
                        self.logger,
                        Debug,
                        "buffer {}: {:?}, {} bytes, subbuffers at {:?}",
                        index,
                        layout.kind,
                        layout.size,
                        layout
                            .subbuffers
                            .iter()
                            .map(|subbuffer| (subbuffer.offset, subbuffer.size))
                            .collect::<SmallVec<[_; 4]>>(),
                    );
                }

                commit::build(&self.device, host_access, layouts)
            });

        let committed = match committed {
            Ok(committed) => committed,
            Err(err) => {
                array_log!(
                    self.logger,
                    Error,
                    "configuration of {} buffers was not committed: {}",
                    pending.buffers.len(),
                    ErrorChain(&err),
                );

                return Err(err);
            }
        };

        array_log!(
            self.logger,
            Info,
            "committed {} buffers in {} bytes of memory type {}",
            committed.buffers.len(),
            committed.total_size(),
            committed.memory.memory_type_index(),
        );

        let previous = self.committed.lock().replace(committed);
        pending.buffers.clear();
        drop(pending);
        drop(previous);

        Ok(())
    }

    /// Returns the number of committed buffers.
    pub fn len(&self) -> usize {
        self.committed
            .lock()
            .as_ref()
            .map_or(0, |committed| committed.buffers.len())
    }

    /// Returns whether no buffer is committed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the access mode of the committed memory, or `None` if nothing was committed.
    pub fn host_access(&self) -> Option<HostAccess> {
        self.committed
            .lock()
            .as_ref()
            .map(|committed| committed.host_access)
    }

    /// Returns the size in bytes of the committed memory block, or 0 if nothing was committed.
    pub fn total_size(&self) -> DeviceSize {
        self.committed
            .lock()
            .as_ref()
            .map_or(0, Committed::total_size)
    }

    /// Returns the layout of the committed buffer at `buffer_index`.
    pub fn buffer_info(&self, buffer_index: usize) -> Option<BufferInfo> {
        let committed = self.committed.lock();
        let buffer = committed.as_ref()?.buffers.get(buffer_index)?;

        Some(BufferInfo::from(buffer))
    }

    /// Returns the handle of the committed buffer at `buffer_index`.
    ///
    /// The handle stays valid until the next successful commit or until the array is dropped.
    pub fn buffer_handle(&self, buffer_index: usize) -> Option<vk::Buffer> {
        let committed = self.committed.lock();
        let buffer = committed.as_ref()?.buffers.get(buffer_index)?;

        Some(buffer.buffer.handle())
    }

    /// Returns the buffer view of a subbuffer of a texel buffer.
    ///
    /// The handle stays valid until the next successful commit or until the array is dropped.
    pub fn buffer_view_handle(
        &self,
        buffer_index: usize,
        subbuffer_index: usize,
    ) -> Option<vk::BufferView> {
        let committed = self.committed.lock();
        let buffer = committed.as_ref()?.buffers.get(buffer_index)?;

        buffer
            .views
            .get(subbuffer_index)?
            .as_ref()
            .map(|view| view.handle())
    }

    /// Returns the range of a subbuffer, ready to be written to a descriptor set.
    pub fn descriptor_buffer_info(
        &self,
        buffer_index: usize,
        subbuffer_index: usize,
    ) -> Option<vk::DescriptorBufferInfo> {
        let committed = self.committed.lock();
        let buffer = committed.as_ref()?.buffers.get(buffer_index)?;
        let subbuffer = buffer.layout.subbuffers.get(subbuffer_index)?;

        Some(
            vk::DescriptorBufferInfo::default()
                .buffer(buffer.buffer.handle())
                .offset(subbuffer.offset)
                .range(subbuffer.size),
        )
    }

    /// Reads the whole committed buffer at `buffer_index`.
    ///
    /// The returned `Vec` holds as many elements as needed to cover the buffer. If the size of
    /// the buffer isn't a multiple of the size of `T`, the last element is padded with zeros.
    pub fn read_buffer<T: Pod>(
        &self,
        buffer_index: usize,
    ) -> Result<Vec<T>, Validated<ArrayError>> {
        validate_element::<T>()?;

        self.with_range(buffer_index, None, |memory, offset, size, logger| {
            access::read(memory, offset, size, self.chunked_mapping, logger)
        })
    }

    /// Writes `data` at the start of the committed buffer at `buffer_index`.
    ///
    /// If `data` is larger than the buffer, the excess is discarded and a warning is logged. If
    /// it is smaller, the rest of the buffer keeps its contents.
    pub fn write_buffer<T: Pod>(
        &self,
        buffer_index: usize,
        data: &[T],
    ) -> Result<(), Validated<ArrayError>> {
        validate_element::<T>()?;

        self.with_range(buffer_index, None, |memory, offset, size, logger| {
            access::write(memory, offset, size, data, self.chunked_mapping, logger)
        })
    }

    /// Reads subbuffer `subbuffer_index` of the committed buffer at `buffer_index`.
    ///
    /// The size read is the aligned size of the subbuffer; see
    /// [`read_buffer`](Self::read_buffer).
    pub fn read_subbuffer<T: Pod>(
        &self,
        buffer_index: usize,
        subbuffer_index: usize,
    ) -> Result<Vec<T>, Validated<ArrayError>> {
        validate_element::<T>()?;

        self.with_range(
            buffer_index,
            Some(subbuffer_index),
            |memory, offset, size, logger| {
                access::read(memory, offset, size, self.chunked_mapping, logger)
            },
        )
    }

    /// Writes `data` at the start of subbuffer `subbuffer_index` of the committed buffer at
    /// `buffer_index`. Neighboring subbuffers are never written to; see
    /// [`write_buffer`](Self::write_buffer).
    pub fn write_subbuffer<T: Pod>(
        &self,
        buffer_index: usize,
        subbuffer_index: usize,
        data: &[T],
    ) -> Result<(), Validated<ArrayError>> {
        validate_element::<T>()?;

        self.with_range(
            buffer_index,
            Some(subbuffer_index),
            |memory, offset, size, logger| {
                access::write(memory, offset, size, data, self.chunked_mapping, logger)
            },
        )
    }

    /// Locks the committed state, checks that the range can be accessed from the host, and
    /// calls `f` with the memory block and the range within it.
    fn with_range<R>(
        &self,
        buffer_index: usize,
        subbuffer_index: Option<usize>,
        f: impl FnOnce(
            &mut RawMemory,
            DeviceSize,
            DeviceSize,
            &dyn ArrayLogger,
        ) -> Result<R, VulkanError>,
    ) -> Result<R, Validated<ArrayError>> {
        let mut committed = self.committed.lock();
        let committed = committed.as_mut().ok_or(ArrayError::NotCommitted)?;
        let buffer_count = committed.buffers.len();
        let buffer = committed.buffers.get(buffer_index).ok_or_else(|| {
            ValidationError::new(
                "buffer_index",
                format!(
                    "is {}, but only {} buffers are committed",
                    buffer_index, buffer_count,
                ),
            )
        })?;

        let (offset, size) = match subbuffer_index {
            None => (buffer.offset, buffer.layout.size),
            Some(subbuffer_index) => {
                let subbuffers = &buffer.layout.subbuffers;
                let subbuffer = subbuffers.get(subbuffer_index).ok_or_else(|| {
                    ValidationError::new(
                        "subbuffer_index",
                        format!(
                            "is {}, but buffer {} only has {} subbuffers",
                            subbuffer_index,
                            buffer_index,
                            subbuffers.len(),
                        ),
                    )
                })?;

                (buffer.offset + subbuffer.offset, subbuffer.size)
            }
        };

        if !committed.host_access.is_host_visible() {
            return Err(ArrayError::NotHostVisible.into());
        }

        f(&mut committed.memory, offset, size, &*self.logger).map_err(Validated::from)
    }
}

impl fmt::Debug for StorageArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageArray")
            .field("len", &self.len())
            .field("pending_len", &self.pending_len())
            .field("chunked_mapping", &self.chunked_mapping)
            .finish_non_exhaustive()
    }
}

fn validate_element<T>() -> Result<(), Box<ValidationError>> {
    if size_of::<T>() == 0 {
        return Err(ValidationError::new(
            "T",
            "is a zero-sized type, data can't be read as such elements",
        ));
    }

    Ok(())
}

/// Displays an error followed by its sources.
struct ErrorChain<'a>(&'a (dyn std::error::Error + 'static));

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();

        while let Some(err) = source {
            write!(f, ": {}", err)?;
            source = err.source();
        }

        Ok(())
    }
}

/// Parameters to create a new `StorageArray`.
#[derive(Clone)]
pub struct StorageArrayCreateInfo {
    /// Receives the diagnostic messages of the array.
    ///
    /// The default value is [`LogForwarder`].
    pub logger: Arc<dyn ArrayLogger>,

    /// Whether host accesses fall back to mapping the memory in small windows when the
    /// implementation fails to map a whole range. If `false`, such accesses return
    /// [`VulkanError::MemoryMapFailed`](crate::VulkanError::MemoryMapFailed).
    ///
    /// The default value is `true`.
    pub chunked_mapping: bool,

    pub _ne: NonExhaustive,
}

impl Default for StorageArrayCreateInfo {
    #[inline]
    fn default() -> Self {
        StorageArrayCreateInfo {
            logger: Arc::new(LogForwarder),
            chunked_mapping: true,
            _ne: NonExhaustive(()),
        }
    }
}

impl fmt::Debug for StorageArrayCreateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageArrayCreateInfo")
            .field("chunked_mapping", &self.chunked_mapping)
            .finish_non_exhaustive()
    }
}

/// The layout of a committed buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferInfo {
    /// How the buffer is used.
    pub kind: BufferKind,

    /// The alignment of the subbuffer offsets.
    pub alignment: DeviceAlignment,

    /// The size of the buffer in bytes. This is a multiple of the memory map alignment.
    pub size: DeviceSize,

    /// The offset of the buffer in the memory block.
    pub offset: DeviceSize,

    /// The subbuffers, in the order they were added.
    pub subbuffers: SmallVec<[SubbufferInfo; 4]>,
}

impl From<&CommittedBuffer> for BufferInfo {
    fn from(buffer: &CommittedBuffer) -> Self {
        BufferInfo {
            kind: buffer.layout.kind,
            alignment: buffer.layout.alignment,
            size: buffer.layout.size,
            offset: buffer.offset,
            subbuffers: buffer
                .layout
                .subbuffers
                .iter()
                .zip(&buffer.views)
                .map(|(subbuffer, view)| SubbufferInfo {
                    size: subbuffer.size,
                    offset: subbuffer.offset,
                    format: subbuffer.format,
                    has_view: view.is_some(),
                })
                .collect(),
        }
    }
}

/// The layout of a committed subbuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubbufferInfo {
    /// The size of the subbuffer in bytes, rounded up to the buffer's alignment.
    pub size: DeviceSize,

    /// The offset of the subbuffer in its buffer.
    pub offset: DeviceSize,

    /// The format of the texels, for subbuffers of texel buffers.
    pub format: Option<vk::Format>,

    /// Whether a buffer view was created for the subbuffer.
    pub has_view: bool,
}
