//! Device memory management: shared-ownership buffers and the resource
//! manager that allocates them.
//!
//! A [`DeviceBuffer`] is a typed, reference-counted handle to one device
//! allocation. The allocation is released exactly once, only after the last
//! handle drops, and always through the runtime that created it; an atomic
//! guard keeps the explicit and automatic release paths idempotent.

use crate::error::LinalgCoreError;
use crate::runtime::{AcceleratorRuntime, DeviceId, DevicePtr, QueueHandle};
use crate::stream::DeviceStream;
use bytemuck::{Pod, Zeroable};
use cfg_if::cfg_if;
use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct BufferInner {
    ptr: DevicePtr,
    bytes: usize,
    queue: QueueHandle,
    runtime: Arc<dyn AcceleratorRuntime>,
    released: AtomicBool,
}

impl BufferInner {
    /// Releases the allocation if it has not been released yet.
    ///
    /// Returns whether this call performed the release.
    fn release(&self) -> Result<bool, LinalgCoreError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        self.runtime.free(self.ptr)?;
        Ok(true)
    }
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        match self.release() {
            Ok(true) => log::trace!(
                "released {} bytes on device {}",
                self.bytes,
                self.queue.device()
            ),
            Ok(false) => {}
            // Drop must not panic; a failed release is only logged.
            Err(e) => log::error!("device buffer release failed: {}", e),
        }
    }
}

/// Typed, shared-ownership handle to device memory.
///
/// Cloning a handle shares the underlying allocation and increments the
/// reference count; the memory is freed when the last handle drops.
#[derive(Debug)]
pub struct DeviceBuffer<T: Pod> {
    inner: Arc<BufferInner>,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> Clone for DeviceBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            len: self.len,
            _marker: PhantomData,
        }
    }
}

impl<T: Pod> DeviceBuffer<T> {
    pub(crate) fn new_internal(
        ptr: DevicePtr,
        len: usize,
        queue: QueueHandle,
        runtime: Arc<dyn AcceleratorRuntime>,
    ) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                ptr,
                bytes: len * mem::size_of::<T>(),
                queue,
                runtime,
                released: AtomicBool::new(false),
            }),
            len,
            _marker: PhantomData,
        }
    }

    /// Number of elements the buffer holds.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the allocation in bytes.
    pub fn size_bytes(&self) -> usize {
        self.inner.bytes
    }

    /// The device the allocation resides on.
    pub fn device(&self) -> DeviceId {
        self.inner.queue.device()
    }

    /// Number of live handles sharing this allocation.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub(crate) fn ptr(&self) -> DevicePtr {
        self.inner.ptr
    }

    pub(crate) fn queue(&self) -> QueueHandle {
        self.inner.queue
    }

    pub(crate) fn runtime(&self) -> &Arc<dyn AcceleratorRuntime> {
        &self.inner.runtime
    }

    /// Deep-copies this buffer into a fresh allocation on the same device.
    pub(crate) fn duplicate(&self) -> Result<DeviceBuffer<T>, LinalgCoreError> {
        let runtime = Arc::clone(self.runtime());
        let ptr = runtime.allocate(self.queue(), self.size_bytes())?;
        let copy = DeviceBuffer::new_internal(ptr, self.len, self.queue(), runtime);
        copy.copy_contents_from(self)?;
        Ok(copy)
    }

    /// Copies the contents of `source` into this buffer in place.
    pub(crate) fn copy_contents_from(
        &self,
        source: &DeviceBuffer<T>,
    ) -> Result<(), LinalgCoreError> {
        if source.len != self.len {
            return Err(LinalgCoreError::InvalidDimensions(format!(
                "buffer lengths for device copy mismatch: {} != {}",
                self.len, source.len
            )));
        }
        if self.device() != source.device() {
            return Err(LinalgCoreError::UnsupportedOperation(format!(
                "cannot copy between devices {} and {}",
                source.device(),
                self.device()
            )));
        }
        if self.len == 0 {
            return Ok(());
        }
        self.runtime()
            .copy_on_device(self.queue(), source.ptr(), self.ptr(), self.size_bytes())
    }
}

/// Transfer statistics of a [`ResourceManager`].
#[derive(Debug, Clone, Copy)]
pub struct TransferStats {
    pub bytes_to_device: u64,
    pub bytes_from_device: u64,
}

/// Entry point for accelerator resources: device enumeration, buffer
/// allocation, shared-ownership wrapping of raw device pointers, and
/// instrumented host/device transfers.
#[derive(Debug)]
pub struct ResourceManager {
    runtime: Arc<dyn AcceleratorRuntime>,
    /// Tracks bytes transferred to the device via instrumented methods.
    bytes_to_device: AtomicU64,
    /// Tracks bytes transferred back to the host via instrumented methods.
    bytes_from_device: AtomicU64,
}

impl ResourceManager {
    /// Creates a manager on the preferred backend: the CUDA runtime when it
    /// is compiled in and a device is present, the host runtime otherwise.
    pub fn new() -> Result<Self, LinalgCoreError> {
        cfg_if! {
            if #[cfg(feature = "cuda")] {
                if crate::runtime::CudaRuntime::is_available() {
                    log::info!("resource manager using the cuda backend");
                    return Ok(Self::with_runtime(Arc::new(
                        crate::runtime::CudaRuntime::new(),
                    )));
                }
                log::warn!("CUDA backend unavailable, falling back to the host runtime");
            }
        }
        log::info!("resource manager using the host backend");
        Ok(Self::host())
    }

    /// Creates a manager on the host runtime.
    pub fn host() -> Self {
        Self::with_runtime(Arc::new(crate::runtime::HostRuntime::new()))
    }

    /// Creates a manager on an explicit runtime.
    pub fn with_runtime(runtime: Arc<dyn AcceleratorRuntime>) -> Self {
        Self {
            runtime,
            bytes_to_device: AtomicU64::new(0),
            bytes_from_device: AtomicU64::new(0),
        }
    }

    /// Short name of the backend in use.
    pub fn backend_name(&self) -> &'static str {
        self.runtime.backend_name()
    }

    /// Number of usable devices.
    pub fn device_count(&self) -> Result<usize, LinalgCoreError> {
        self.runtime.device_count()
    }

    pub(crate) fn runtime(&self) -> &Arc<dyn AcceleratorRuntime> {
        &self.runtime
    }

    /// Reserves a zero-initialized buffer of `len` elements on the device
    /// the stream is bound to.
    ///
    /// Fails with [`LinalgCoreError::OutOfDeviceMemory`] if the accelerator
    /// reports insufficient memory.
    pub fn allocate<T: Pod>(
        &self,
        len: usize,
        stream: &DeviceStream,
    ) -> Result<DeviceBuffer<T>, LinalgCoreError> {
        if len == 0 {
            return Err(LinalgCoreError::InvalidDimensions(
                "cannot allocate a device buffer of length 0".to_string(),
            ));
        }
        let bytes = len * mem::size_of::<T>();
        let ptr = self.runtime.allocate(stream.queue(), bytes)?;
        log::debug!("allocated {} bytes on device {}", bytes, stream.device());
        Ok(DeviceBuffer::new_internal(
            ptr,
            len,
            stream.queue(),
            Arc::clone(&self.runtime),
        ))
    }

    /// Wraps a raw device pointer allocated elsewhere (for example by a
    /// native library) into a shared-ownership handle.
    ///
    /// The memory is released through the runtime exactly once, when the
    /// last handle drops, regardless of how many handles exist.
    pub fn wrap_raw<T: Pod>(
        &self,
        stream: &DeviceStream,
        raw: u64,
        len: usize,
    ) -> Result<DeviceBuffer<T>, LinalgCoreError> {
        let bytes = len * mem::size_of::<T>();
        let ptr = self.runtime.adopt_raw(stream.device(), raw, bytes)?;
        log::debug!(
            "wrapped raw device pointer {:#x} ({} bytes) on device {}",
            raw,
            bytes,
            stream.device()
        );
        Ok(DeviceBuffer::new_internal(
            ptr,
            len,
            stream.queue(),
            Arc::clone(&self.runtime),
        ))
    }

    /// Releases one handle to a buffer.
    ///
    /// The underlying memory is freed when this was the last handle; if the
    /// allocation was already released the call is a no-op.
    pub fn deallocate<T: Pod>(&self, buffer: DeviceBuffer<T>) {
        log::trace!(
            "deallocate handle for {} bytes on device {} ({} handle(s) before drop)",
            buffer.size_bytes(),
            buffer.device(),
            buffer.handle_count()
        );
        drop(buffer);
    }

    /// Allocates a buffer on the stream's device and fills it from `data`.
    pub fn upload<T: Pod>(
        &self,
        stream: &DeviceStream,
        data: &[T],
    ) -> Result<DeviceBuffer<T>, LinalgCoreError> {
        let buffer = self.allocate::<T>(data.len(), stream)?;
        self.write_buffer(stream, &buffer, data)?;
        Ok(buffer)
    }

    /// Writes `data` into an existing buffer. Tracks the transfer size.
    pub fn write_buffer<T: Pod>(
        &self,
        stream: &DeviceStream,
        buffer: &DeviceBuffer<T>,
        data: &[T],
    ) -> Result<(), LinalgCoreError> {
        if data.len() != buffer.len() {
            return Err(LinalgCoreError::InvalidDimensions(format!(
                "data length ({}) does not match buffer length ({})",
                data.len(),
                buffer.len()
            )));
        }
        if buffer.device() != stream.device() {
            return Err(LinalgCoreError::UnsupportedOperation(format!(
                "buffer resides on device {} but the stream is bound to device {}",
                buffer.device(),
                stream.device()
            )));
        }
        let byte_len = buffer.size_bytes() as u64;
        if byte_len == 0 {
            log::debug!("skipping write for 0 bytes");
            return Ok(());
        }
        self.runtime
            .copy_to_device(stream.queue(), buffer.ptr(), bytemuck::cast_slice(data))?;
        self.bytes_to_device.fetch_add(byte_len, Ordering::Relaxed);
        log::trace!(
            "bytes_to_device incremented by {}, now: {}",
            byte_len,
            self.bytes_to_device.load(Ordering::Relaxed)
        );
        Ok(())
    }

    /// Reads a buffer's contents back to the host. Tracks the transfer size.
    pub fn download<T: Pod + Zeroable>(
        &self,
        stream: &DeviceStream,
        buffer: &DeviceBuffer<T>,
    ) -> Result<Vec<T>, LinalgCoreError> {
        if buffer.device() != stream.device() {
            return Err(LinalgCoreError::UnsupportedOperation(format!(
                "buffer resides on device {} but the stream is bound to device {}",
                buffer.device(),
                stream.device()
            )));
        }
        if buffer.is_empty() {
            log::debug!("skipping readback for 0 bytes");
            return Ok(Vec::new());
        }
        let mut out = vec![T::zeroed(); buffer.len()];
        self.runtime.copy_to_host(
            stream.queue(),
            buffer.ptr(),
            bytemuck::cast_slice_mut(&mut out),
        )?;
        let byte_len = buffer.size_bytes() as u64;
        self.bytes_from_device.fetch_add(byte_len, Ordering::Relaxed);
        log::trace!(
            "bytes_from_device incremented by {}, now: {}",
            byte_len,
            self.bytes_from_device.load(Ordering::Relaxed)
        );
        Ok(out)
    }

    /// Returns the current transfer statistics.
    pub fn transfer_stats(&self) -> TransferStats {
        TransferStats {
            bytes_to_device: self.bytes_to_device.load(Ordering::Relaxed),
            bytes_from_device: self.bytes_from_device.load(Ordering::Relaxed),
        }
    }

    /// Resets the transfer statistics counters to zero.
    pub fn reset_transfer_stats(&self) {
        self.bytes_to_device.store(0, Ordering::Relaxed);
        self.bytes_from_device.store(0, Ordering::Relaxed);
        log::info!("transfer counters reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::HostRuntime;
    use crate::stream::DeviceStream;
    use std::sync::Arc;

    fn setup() -> (Arc<HostRuntime>, ResourceManager) {
        let runtime = Arc::new(HostRuntime::new());
        let rt: Arc<dyn crate::runtime::AcceleratorRuntime> = runtime.clone();
        let manager = ResourceManager::with_runtime(rt);
        (runtime, manager)
    }

    #[test]
    fn test_shared_handles_free_exactly_once() {
        let (runtime, manager) = setup();
        let stream = DeviceStream::new(&manager).unwrap();
        let buffer = manager.allocate::<f64>(64, &stream).unwrap();

        let extra: Vec<_> = (0..4).map(|_| buffer.clone()).collect();
        assert_eq!(buffer.handle_count(), 5);
        assert_eq!(runtime.live_allocations(), 1);

        drop(extra);
        assert_eq!(runtime.free_count(), 0);
        assert_eq!(runtime.live_allocations(), 1);

        drop(buffer);
        assert_eq!(runtime.free_count(), 1);
        assert_eq!(runtime.live_allocations(), 0);
    }

    #[test]
    fn test_explicit_deallocate_is_release_of_one_handle() {
        let (runtime, manager) = setup();
        let stream = DeviceStream::new(&manager).unwrap();
        let buffer = manager.allocate::<f32>(16, &stream).unwrap();
        let alias = buffer.clone();

        manager.deallocate(alias);
        assert_eq!(runtime.free_count(), 0);

        manager.deallocate(buffer);
        assert_eq!(runtime.free_count(), 1);
    }

    #[test]
    fn test_wrap_raw_frees_exactly_once() {
        let (runtime, manager) = setup();
        let stream = DeviceStream::new(&manager).unwrap();
        let wrapped = manager.wrap_raw::<f64>(&stream, 0xdead_beef, 32).unwrap();
        let alias = wrapped.clone();

        drop(wrapped);
        drop(alias);
        assert_eq!(runtime.free_count(), 1);
        assert_eq!(runtime.live_allocations(), 0);
    }

    #[test]
    fn test_zero_length_allocation_is_rejected() {
        let (_runtime, manager) = setup();
        let stream = DeviceStream::new(&manager).unwrap();
        assert!(manager.allocate::<f64>(0, &stream).is_err());
    }

    #[test]
    fn test_upload_download_round_trip_and_counters() {
        let (_runtime, manager) = setup();
        let stream = DeviceStream::new(&manager).unwrap();
        let data = vec![1.0f64, 2.0, 3.0, 4.0];

        let buffer = manager.upload(&stream, &data).unwrap();
        let read = manager.download(&stream, &buffer).unwrap();
        assert_eq!(read, data);

        let stats = manager.transfer_stats();
        assert_eq!(stats.bytes_to_device, 32);
        assert_eq!(stats.bytes_from_device, 32);

        manager.reset_transfer_stats();
        let stats = manager.transfer_stats();
        assert_eq!(stats.bytes_to_device, 0);
        assert_eq!(stats.bytes_from_device, 0);
    }

    #[test]
    fn test_duplicate_is_independent() {
        let (runtime, manager) = setup();
        let stream = DeviceStream::new(&manager).unwrap();
        let data = vec![1.0f64, 2.0, 3.0];
        let buffer = manager.upload(&stream, &data).unwrap();

        let copy = buffer.duplicate().unwrap();
        assert_eq!(runtime.live_allocations(), 2);

        manager
            .write_buffer(&stream, &buffer, &[9.0, 9.0, 9.0])
            .unwrap();
        let read = manager.download(&stream, &copy).unwrap();
        assert_eq!(read, data);
    }

    #[test]
    fn test_out_of_device_memory_surfaces() {
        let runtime = Arc::new(HostRuntime::with_capacity(1, 64));
        let manager = ResourceManager::with_runtime(runtime);
        let stream = DeviceStream::new(&manager).unwrap();

        let _held = manager.allocate::<f64>(8, &stream).unwrap();
        match manager.allocate::<f64>(8, &stream) {
            Err(LinalgCoreError::OutOfDeviceMemory(_)) => {}
            other => panic!("expected OutOfDeviceMemory, got {:?}", other),
        }
    }
}
