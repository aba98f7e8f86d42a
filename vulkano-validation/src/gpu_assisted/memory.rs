//! The device memory that GPU-assisted validation records into.
//!
//! The validator doesn't allocate device memory itself. The layer injects a
//! [`DeviceMemoryService`], which hands out buffers with a device address that instrumented
//! shaders can write to, and copies their contents between the host and the device.

use crate::{DeviceAddress, DeviceSize};
use ash::vk::{self, Handle};
use foldhash::HashMap;
use parking_lot::Mutex;
use std::{
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
    sync::atomic::{AtomicU64, Ordering},
};

/// Allocates and accesses the buffers used by GPU-assisted validation.
///
/// Reads and writes are only issued while the device is not accessing the buffer: writes
/// before the submission that uses the buffer, reads after it has completed.
pub trait DeviceMemoryService: Send + Sync {
    /// Allocates a buffer of `size` bytes with a device address. The contents are zeroed.
    fn allocate(&self, size: DeviceSize) -> Result<DeviceAllocation, MemoryError>;

    /// Copies `data` into the buffer, starting at `offset`.
    fn write(
        &self,
        allocation: &DeviceAllocation,
        offset: DeviceSize,
        data: &[u8],
    ) -> Result<(), MemoryError>;

    /// Copies `size` bytes out of the buffer, starting at `offset`.
    fn read(
        &self,
        allocation: &DeviceAllocation,
        offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<Vec<u8>, MemoryError>;

    /// Releases the buffer.
    fn free(&self, allocation: DeviceAllocation);
}

/// A buffer that was allocated by a [`DeviceMemoryService`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceAllocation {
    pub buffer: vk::Buffer,
    pub device_address: DeviceAddress,
    pub size: DeviceSize,
}

/// An error returned by a [`DeviceMemoryService`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryError {
    /// There is not enough device memory left for the allocation.
    OutOfDeviceMemory,

    /// The allocation is not known to the service. It may have been freed already.
    UnknownAllocation,

    /// The access falls outside the allocation.
    OutOfRange {
        offset: DeviceSize,
        size: DeviceSize,
        allocation_size: DeviceSize,
    },
}

impl Error for MemoryError {}

impl Display for MemoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::OutOfDeviceMemory => write!(f, "not enough device memory is available"),
            Self::UnknownAllocation => write!(f, "the allocation does not exist"),
            Self::OutOfRange {
                offset,
                size,
                allocation_size,
            } => write!(
                f,
                "the range of {} bytes at offset {} is outside the allocation of {} bytes",
                size, offset, allocation_size,
            ),
        }
    }
}

/// A [`DeviceMemoryService`] that keeps the buffers in host memory.
///
/// This is useful for testing, and for drivers where the validation buffers are mapped
/// host-visible memory that the layer accesses directly.
#[derive(Debug)]
pub struct HostMemoryService {
    allocations: Mutex<HashMap<vk::Buffer, Vec<u8>>>,
    next_handle: AtomicU64,
    capacity: DeviceSize,
}

impl HostMemoryService {
    /// The base of the fake device addresses that the service hands out.
    const ADDRESS_BASE: DeviceAddress = 1 << 32;

    /// Returns a new `HostMemoryService` without a limit on the memory it can allocate.
    #[inline]
    pub fn new() -> Self {
        Self::with_capacity(DeviceSize::MAX)
    }

    /// Returns a new `HostMemoryService` that fails allocations once `capacity` bytes are
    /// allocated.
    pub fn with_capacity(capacity: DeviceSize) -> Self {
        HostMemoryService {
            allocations: Mutex::new(HashMap::default()),
            next_handle: AtomicU64::new(1),
            capacity,
        }
    }

    /// Returns the number of allocations that have not been freed yet.
    #[inline]
    pub fn live_allocations(&self) -> usize {
        self.allocations.lock().len()
    }

    fn check_range(
        bytes: &[u8],
        offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<std::ops::Range<usize>, MemoryError> {
        let allocation_size = bytes.len() as DeviceSize;

        match offset.checked_add(size) {
            Some(end) if end <= allocation_size => Ok(offset as usize..end as usize),
            _ => Err(MemoryError::OutOfRange {
                offset,
                size,
                allocation_size,
            }),
        }
    }
}

impl Default for HostMemoryService {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceMemoryService for HostMemoryService {
    fn allocate(&self, size: DeviceSize) -> Result<DeviceAllocation, MemoryError> {
        let mut allocations = self.allocations.lock();
        let allocated: DeviceSize = allocations
            .values()
            .map(|bytes| bytes.len() as DeviceSize)
            .sum();

        if allocated.saturating_add(size) > self.capacity {
            return Err(MemoryError::OutOfDeviceMemory);
        }

        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let buffer = vk::Buffer::from_raw(raw);
        allocations.insert(buffer, vec![0; size as usize]);

        Ok(DeviceAllocation {
            buffer,
            device_address: Self::ADDRESS_BASE + (raw << 20),
            size,
        })
    }

    fn write(
        &self,
        allocation: &DeviceAllocation,
        offset: DeviceSize,
        data: &[u8],
    ) -> Result<(), MemoryError> {
        let mut allocations = self.allocations.lock();
        let bytes = allocations
            .get_mut(&allocation.buffer)
            .ok_or(MemoryError::UnknownAllocation)?;
        let range = Self::check_range(bytes, offset, data.len() as DeviceSize)?;
        bytes[range].copy_from_slice(data);

        Ok(())
    }

    fn read(
        &self,
        allocation: &DeviceAllocation,
        offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<Vec<u8>, MemoryError> {
        let allocations = self.allocations.lock();
        let bytes = allocations
            .get(&allocation.buffer)
            .ok_or(MemoryError::UnknownAllocation)?;
        let range = Self::check_range(bytes, offset, size)?;

        Ok(bytes[range].to_vec())
    }

    fn free(&self, allocation: DeviceAllocation) {
        self.allocations.lock().remove(&allocation.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceMemoryService, HostMemoryService, MemoryError};

    #[test]
    fn write_read_free() {
        let memory = HostMemoryService::new();
        let allocation = memory.allocate(16).unwrap();
        assert_eq!(memory.live_allocations(), 1);

        memory.write(&allocation, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(memory.read(&allocation, 2, 4).unwrap(), [0, 0, 1, 2]);
        assert!(matches!(
            memory.read(&allocation, 14, 4),
            Err(MemoryError::OutOfRange { .. }),
        ));

        memory.free(allocation);
        assert_eq!(memory.live_allocations(), 0);
        assert_eq!(
            memory.read(&allocation, 0, 4),
            Err(MemoryError::UnknownAllocation),
        );
    }

    #[test]
    fn capacity() {
        let memory = HostMemoryService::with_capacity(32);
        let first = memory.allocate(24).unwrap();
        assert_eq!(memory.allocate(16), Err(MemoryError::OutOfDeviceMemory));

        memory.free(first);
        assert!(memory.allocate(16).is_ok());
    }
}
