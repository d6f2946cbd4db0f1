// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Host access to ranges of the memory block.
//!
//! A range is mapped as a whole when possible. If the implementation can't map that much memory
//! at once and reports [`VulkanError::MemoryMapFailed`], the range is visited one window of
//! `min_memory_map_alignment` bytes at a time instead.

use crate::{
    logger::{array_log, ArrayLogger},
    resource::RawMemory,
    DeviceSize, VulkanError,
};
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

/// Maps `size` bytes of `memory` starting at `offset` and calls `f` with each mapped window and
/// the position of the window in the range.
pub(crate) fn visit_range(
    memory: &mut RawMemory,
    offset: DeviceSize,
    size: DeviceSize,
    chunked_mapping: bool,
    logger: &dyn ArrayLogger,
    mut f: impl FnMut(usize, &mut [u8]),
) -> Result<(), VulkanError> {
    match memory.map(offset, size) {
        Ok(mut mapped) => {
            f(0, mapped.as_mut_slice());

            return Ok(());
        }
        Err(VulkanError::MemoryMapFailed) if chunked_mapping => {}
        Err(err) => return Err(err),
    }

    let window = memory
        .device()
        .limits()
        .min_memory_map_alignment
        .as_devicesize();
    array_log!(
        logger,
        Warning,
        "mapping {} bytes at offset {} failed, falling back to windows of {} bytes",
        size,
        offset,
        window,
    );

    let mut position = 0;

    while position < size {
        let len = window.min(size - position);
        let mut mapped = memory.map(offset + position, len)?;
        f(position as usize, mapped.as_mut_slice());
        position += len;
    }

    Ok(())
}

/// Reads `size` bytes as a `Vec<T>`. The last element is zero-padded if `size` is not a multiple
/// of the size of `T`.
pub(crate) fn read<T: Pod>(
    memory: &mut RawMemory,
    offset: DeviceSize,
    size: DeviceSize,
    chunked_mapping: bool,
    logger: &dyn ArrayLogger,
) -> Result<Vec<T>, VulkanError> {
    debug_assert_ne!(size_of::<T>(), 0);
    let len = usize::try_from(size.div_ceil(size_of::<T>() as DeviceSize))
        .map_err(|_| VulkanError::OutOfHostMemory)?;
    let mut data = vec![T::zeroed(); len];
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut data);

    visit_range(memory, offset, size, chunked_mapping, logger, |position, window| {
        bytes[position..position + window.len()].copy_from_slice(window);
    })?;

    Ok(data)
}

/// Writes `data` to a range of `capacity` bytes. Data that doesn't fit is discarded; bytes of
/// the range past the end of `data` keep their contents.
pub(crate) fn write<T: Pod>(
    memory: &mut RawMemory,
    offset: DeviceSize,
    capacity: DeviceSize,
    data: &[T],
    chunked_mapping: bool,
    logger: &dyn ArrayLogger,
) -> Result<(), VulkanError> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let copy_len = usize::try_from(capacity).map_or(bytes.len(), |capacity| {
        capacity.min(bytes.len())
    });

    if copy_len < bytes.len() {
        array_log!(
            logger,
            Warning,
            "{} bytes of data were written to a range of {} bytes, the last {} bytes were \
            discarded",
            bytes.len(),
            capacity,
            bytes.len() - copy_len,
        );
    }

    let bytes = &bytes[..copy_len];

    visit_range(memory, offset, capacity, chunked_mapping, logger, |position, window| {
        if position < bytes.len() {
            let len = window.len().min(bytes.len() - position);
            window[..len].copy_from_slice(&bytes[position..position + len]);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::ArrayDevice,
        logger::MessageSeverity,
        tests::{Failures, MockDevice, RecordingLogger},
    };
    use std::sync::Arc;

    fn memory(size: DeviceSize) -> (Arc<MockDevice>, RawMemory) {
        let mock = Arc::new(MockDevice::default());
        let device: Arc<dyn ArrayDevice> = mock.clone();
        let memory = RawMemory::allocate(&device, size, 1).unwrap();

        (mock, memory)
    }

    #[test]
    fn whole_range_is_mapped_once() {
        let (mock, mut memory) = memory(1024);
        let logger = RecordingLogger::default();

        write(&mut memory, 256, 512, &[3u32; 128], true, &logger).unwrap();
        let data: Vec<u32> = read(&mut memory, 256, 512, true, &logger).unwrap();

        assert_eq!(data, [3; 128]);
        assert_eq!(mock.map_calls(), 2);
        assert!(logger.messages().is_empty());
    }

    #[test]
    fn partial_elements_are_padded() {
        let (_mock, mut memory) = memory(64);
        let logger = RecordingLogger::default();

        write(&mut memory, 0, 64, &[0xffu8; 10], true, &logger).unwrap();
        let data: Vec<u32> = read(&mut memory, 0, 10, true, &logger).unwrap();

        assert_eq!(data, [u32::MAX, u32::MAX, 0xffff]);
    }

    #[test]
    fn excess_data_is_discarded() {
        let (_mock, mut memory) = memory(64);
        let logger = RecordingLogger::default();

        write(&mut memory, 16, 16, &[1u16; 12], true, &logger).unwrap();
        let data: Vec<u16> = read(&mut memory, 0, 64, true, &logger).unwrap();

        assert!(data[..8].iter().all(|&x| x == 0));
        assert!(data[8..16].iter().all(|&x| x == 1));
        assert!(data[16..].iter().all(|&x| x == 0));
        assert_eq!(logger.count(MessageSeverity::Warning), 1);
    }

    #[test]
    fn short_writes_keep_the_rest_of_the_range() {
        let (_mock, mut memory) = memory(64);
        let logger = RecordingLogger::default();

        write(&mut memory, 0, 64, &[9u8; 64], true, &logger).unwrap();
        write(&mut memory, 0, 64, &[1u8; 4], true, &logger).unwrap();
        let data: Vec<u8> = read(&mut memory, 0, 64, true, &logger).unwrap();

        assert_eq!(data[..4], [1; 4]);
        assert!(data[4..].iter().all(|&x| x == 9));
    }

    #[test]
    fn chunked_fallback() {
        let (mock, mut memory) = memory(1024);
        let logger = RecordingLogger::default();
        mock.set_failures(Failures {
            max_map_size: Some(64),
            ..Default::default()
        });

        let values: Vec<u32> = (0..50).collect();
        write(&mut memory, 128, 200, &values, true, &logger).unwrap();
        // One failed attempt, then windows of 64, 64, 64 and 8 bytes.
        assert_eq!(mock.map_calls(), 5);

        let data: Vec<u32> = read(&mut memory, 128, 200, true, &logger).unwrap();
        assert_eq!(data, values);
        assert_eq!(mock.map_calls(), 10);
        assert_eq!(logger.count(MessageSeverity::Warning), 2);
    }

    #[test]
    fn fallback_can_be_disabled() {
        let (mock, mut memory) = memory(1024);
        let logger = RecordingLogger::default();
        mock.set_failures(Failures {
            max_map_size: Some(64),
            ..Default::default()
        });

        assert_eq!(
            read::<u8>(&mut memory, 0, 128, false, &logger),
            Err(VulkanError::MemoryMapFailed),
        );
        assert_eq!(mock.map_calls(), 1);
    }

    #[test]
    fn failing_windows_are_fatal() {
        let (mock, mut memory) = memory(1024);
        let logger = RecordingLogger::default();
        mock.set_failures(Failures {
            map_memory: true,
            ..Default::default()
        });

        assert_eq!(
            write(&mut memory, 0, 128, &[0u8; 128], true, &logger),
            Err(VulkanError::MemoryMapFailed),
        );
        assert_eq!(mock.map_calls(), 2);
    }
}
