//! CUDA implementation of [`AcceleratorRuntime`], backed by `cudarc`.
//!
//! Queues map to CUDA streams and allocations to stream-ordered device
//! buffers. Every native failure is funneled through
//! [`crate::status::check_runtime`] so the raw driver code enters the
//! crate's error taxonomy exactly once.

use crate::error::LinalgCoreError;
use crate::runtime::{AcceleratorRuntime, DeviceId, DevicePtr, QueueHandle};
use crate::status;
use cudarc::driver::{CudaContext, CudaSlice, CudaStream, DriverError};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Converts a driver error into the crate taxonomy via the status checker.
fn into_error(err: DriverError) -> LinalgCoreError {
    match status::check_runtime(err.0 as i32) {
        Err(converted) => converted,
        Ok(()) => LinalgCoreError::Internal(format!(
            "native call failed without a status code: {:?}",
            err
        )),
    }
}

#[derive(Debug)]
enum CudaAllocation {
    /// Allocated by this runtime; dropping the slice releases the memory.
    Owned(CudaSlice<u8>),
    /// Allocated by a third party; released through the raw driver call.
    Foreign { device: DeviceId, raw: u64 },
}

#[derive(Debug, Default)]
struct CudaState {
    contexts: HashMap<DeviceId, Arc<CudaContext>>,
    streams: HashMap<u64, Arc<CudaStream>>,
    default_queues: HashMap<DeviceId, u64>,
    buffers: HashMap<u64, CudaAllocation>,
    next_queue: u64,
    next_ptr: u64,
}

/// CUDA-backed implementation of [`AcceleratorRuntime`].
#[derive(Debug)]
pub struct CudaRuntime {
    state: Mutex<CudaState>,
}

impl Default for CudaRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl CudaRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CudaState::default()),
        }
    }

    /// Whether a CUDA driver and at least one device are present.
    pub fn is_available() -> bool {
        static AVAILABLE: OnceCell<bool> = OnceCell::new();
        *AVAILABLE.get_or_init(|| {
            if cudarc::driver::result::init().is_err() {
                return false;
            }
            matches!(cudarc::driver::result::device::get_count(), Ok(n) if n > 0)
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, CudaState>, LinalgCoreError> {
        self.state
            .lock()
            .map_err(|_| LinalgCoreError::Internal("cuda runtime state poisoned".to_string()))
    }

    fn context(
        state: &mut CudaState,
        device: DeviceId,
    ) -> Result<Arc<CudaContext>, LinalgCoreError> {
        if let Some(ctx) = state.contexts.get(&device) {
            return Ok(Arc::clone(ctx));
        }
        let ctx = CudaContext::new(device).map_err(|e| {
            LinalgCoreError::DeviceError(format!(
                "failed to acquire a context on device {}: {:?}",
                device, e
            ))
        })?;
        state.contexts.insert(device, Arc::clone(&ctx));
        log::info!("created CUDA context on device {}", device);
        Ok(ctx)
    }

    fn stream(
        state: &CudaState,
        queue: QueueHandle,
    ) -> Result<Arc<CudaStream>, LinalgCoreError> {
        state.streams.get(&queue.id).cloned().ok_or_else(|| {
            LinalgCoreError::Internal(format!("unknown queue {} on device {}", queue.id, queue.device))
        })
    }

    fn owned_slice_mut<'a>(
        state: &'a mut CudaState,
        ptr: DevicePtr,
    ) -> Result<&'a mut CudaSlice<u8>, LinalgCoreError> {
        match state.buffers.get_mut(&ptr.0) {
            Some(CudaAllocation::Owned(slice)) => Ok(slice),
            Some(CudaAllocation::Foreign { .. }) => Err(LinalgCoreError::UnsupportedOperation(
                "copies on adopted raw device pointers are not supported".to_string(),
            )),
            None => Err(LinalgCoreError::Internal(format!(
                "unknown device pointer {:?}",
                ptr
            ))),
        }
    }
}

impl AcceleratorRuntime for CudaRuntime {
    fn backend_name(&self) -> &'static str {
        "cuda"
    }

    fn device_count(&self) -> Result<usize, LinalgCoreError> {
        cudarc::driver::result::init().map_err(into_error)?;
        let count = cudarc::driver::result::device::get_count().map_err(into_error)?;
        Ok(count.max(0) as usize)
    }

    fn default_queue(&self, device: DeviceId) -> Result<QueueHandle, LinalgCoreError> {
        let mut state = self.lock()?;
        if let Some(&id) = state.default_queues.get(&device) {
            return Ok(QueueHandle { id, device });
        }
        let ctx = Self::context(&mut state, device)?;
        let stream = ctx.default_stream();
        let id = state.next_queue;
        state.next_queue += 1;
        state.streams.insert(id, stream);
        state.default_queues.insert(device, id);
        Ok(QueueHandle { id, device })
    }

    fn create_queue(&self, device: DeviceId) -> Result<QueueHandle, LinalgCoreError> {
        let mut state = self.lock()?;
        let ctx = Self::context(&mut state, device)?;
        let stream = ctx.new_stream().map_err(|e| {
            LinalgCoreError::DeviceError(format!(
                "failed to create a stream on device {}: {:?}",
                device, e
            ))
        })?;
        let id = state.next_queue;
        state.next_queue += 1;
        state.streams.insert(id, stream);
        log::debug!("created CUDA stream {} on device {}", id, device);
        Ok(QueueHandle { id, device })
    }

    fn destroy_queue(&self, queue: QueueHandle) -> Result<(), LinalgCoreError> {
        let mut state = self.lock()?;
        if state.default_queues.get(&queue.device) == Some(&queue.id) {
            return Err(LinalgCoreError::Internal(
                "the default stream is owned by the runtime and cannot be destroyed".to_string(),
            ));
        }
        // Dropping the last Arc releases the underlying stream.
        if state.streams.remove(&queue.id).is_none() {
            return Err(LinalgCoreError::Internal(format!(
                "queue {} destroyed twice or never created",
                queue.id
            )));
        }
        log::debug!("destroyed CUDA stream {}", queue.id);
        Ok(())
    }

    fn synchronize(&self, queue: QueueHandle) -> Result<(), LinalgCoreError> {
        let stream = {
            let state = self.lock()?;
            Self::stream(&state, queue)?
        };
        stream.synchronize().map_err(into_error)
    }

    fn allocate(&self, queue: QueueHandle, bytes: usize) -> Result<DevicePtr, LinalgCoreError> {
        let stream = {
            let state = self.lock()?;
            Self::stream(&state, queue)?
        };
        let slice = stream.alloc_zeros::<u8>(bytes).map_err(into_error)?;
        let mut state = self.lock()?;
        let ptr = state.next_ptr;
        state.next_ptr += 1;
        state.buffers.insert(ptr, CudaAllocation::Owned(slice));
        log::debug!("allocated {} bytes on device {}", bytes, queue.device);
        Ok(DevicePtr(ptr))
    }

    fn adopt_raw(
        &self,
        device: DeviceId,
        raw: u64,
        bytes: usize,
    ) -> Result<DevicePtr, LinalgCoreError> {
        let mut state = self.lock()?;
        // Make sure a context exists so the eventual free targets the
        // device that performed the third-party allocation.
        Self::context(&mut state, device)?;
        let ptr = state.next_ptr;
        state.next_ptr += 1;
        state
            .buffers
            .insert(ptr, CudaAllocation::Foreign { device, raw });
        log::debug!(
            "adopted raw device pointer {:#x} ({} bytes) on device {}",
            raw,
            bytes,
            device
        );
        Ok(DevicePtr(ptr))
    }

    fn free(&self, ptr: DevicePtr) -> Result<(), LinalgCoreError> {
        let allocation = {
            let mut state = self.lock()?;
            state.buffers.remove(&ptr.0).ok_or_else(|| {
                LinalgCoreError::Internal(format!(
                    "pointer {:?} freed twice or never allocated",
                    ptr
                ))
            })?
        };
        match allocation {
            // Dropping the slice releases the memory through the driver.
            CudaAllocation::Owned(slice) => drop(slice),
            CudaAllocation::Foreign { device, raw } => {
                let ctx = {
                    let mut state = self.lock()?;
                    Self::context(&mut state, device)?
                };
                ctx.bind_to_thread().map_err(into_error)?;
                unsafe { cudarc::driver::result::free_sync(raw) }.map_err(into_error)?;
            }
        }
        Ok(())
    }

    fn copy_to_device(
        &self,
        queue: QueueHandle,
        dst: DevicePtr,
        src: &[u8],
    ) -> Result<(), LinalgCoreError> {
        let stream = {
            let state = self.lock()?;
            Self::stream(&state, queue)?
        };
        let mut state = self.lock()?;
        let slice = Self::owned_slice_mut(&mut state, dst)?;
        if slice.len() < src.len() {
            return Err(LinalgCoreError::Internal(format!(
                "target buffer size ({}) is smaller than data size ({})",
                slice.len(),
                src.len()
            )));
        }
        stream.memcpy_htod(src, slice).map_err(into_error)
    }

    fn copy_to_host(
        &self,
        queue: QueueHandle,
        src: DevicePtr,
        dst: &mut [u8],
    ) -> Result<(), LinalgCoreError> {
        let stream = {
            let state = self.lock()?;
            Self::stream(&state, queue)?
        };
        let mut state = self.lock()?;
        let slice = Self::owned_slice_mut(&mut state, src)?;
        if slice.len() < dst.len() {
            return Err(LinalgCoreError::Internal(format!(
                "source buffer size ({}) is smaller than requested size ({})",
                slice.len(),
                dst.len()
            )));
        }
        stream.memcpy_dtoh(slice, dst).map_err(into_error)
    }

    fn copy_on_device(
        &self,
        queue: QueueHandle,
        src: DevicePtr,
        dst: DevicePtr,
        bytes: usize,
    ) -> Result<(), LinalgCoreError> {
        let stream = {
            let state = self.lock()?;
            Self::stream(&state, queue)?
        };
        let mut state = self.lock()?;
        if !state.buffers.contains_key(&src.0) {
            return Err(LinalgCoreError::Internal(format!(
                "copy from unknown pointer {:?}",
                src
            )));
        }
        if !state.buffers.contains_key(&dst.0) {
            return Err(LinalgCoreError::Internal(format!(
                "copy into unknown pointer {:?}",
                dst
            )));
        }
        let both_owned = matches!(state.buffers.get(&src.0), Some(CudaAllocation::Owned(_)))
            && matches!(state.buffers.get(&dst.0), Some(CudaAllocation::Owned(_)));
        if !both_owned {
            return Err(LinalgCoreError::UnsupportedOperation(
                "copies on adopted raw device pointers are not supported".to_string(),
            ));
        }
        // Take both allocations out of the table so the copy can borrow the
        // source immutably and the destination mutably at the same time;
        // both entries are reinserted before returning.
        let (src_slice, mut dst_slice) = match (
            state.buffers.remove(&src.0),
            state.buffers.remove(&dst.0),
        ) {
            (Some(CudaAllocation::Owned(s)), Some(CudaAllocation::Owned(d))) => (s, d),
            _ => {
                return Err(LinalgCoreError::Internal(
                    "device allocation table changed during copy".to_string(),
                ))
            }
        };
        let copied = if src_slice.len() < bytes || dst_slice.len() < bytes {
            Err(LinalgCoreError::Internal(format!(
                "device copy of {} bytes exceeds buffer sizes ({} / {})",
                bytes,
                src_slice.len(),
                dst_slice.len()
            )))
        } else {
            stream
                .memcpy_dtod(&src_slice, &mut dst_slice)
                .map_err(into_error)
        };
        state.buffers.insert(src.0, CudaAllocation::Owned(src_slice));
        state.buffers.insert(dst.0, CudaAllocation::Owned(dst_slice));
        copied
    }
}
