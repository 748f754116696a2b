//! Host (main memory) accelerator runtime.
//!
//! The host backend executes every operation synchronously in process
//! memory, which trivially satisfies the in-order queue contract. It backs
//! the crate on machines without an accelerator and is the reference
//! implementation the lifecycle tests observe: it counts live allocations
//! and completed frees, and it can emulate several devices and a per-device
//! memory capacity.

use crate::error::LinalgCoreError;
use crate::runtime::{AcceleratorRuntime, DeviceId, DevicePtr, QueueHandle};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct HostAllocation {
    device: DeviceId,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct HostState {
    allocations: HashMap<u64, HostAllocation>,
    queues: HashMap<u64, DeviceId>,
    used: Vec<usize>,
    frees: u64,
    next_ptr: u64,
    next_queue: u64,
}

/// In-process implementation of [`AcceleratorRuntime`].
#[derive(Debug)]
pub struct HostRuntime {
    devices: usize,
    capacity: Option<usize>,
    state: Mutex<HostState>,
}

impl Default for HostRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRuntime {
    /// A host runtime presenting a single device with unlimited capacity.
    pub fn new() -> Self {
        Self::with_devices(1)
    }

    /// A host runtime presenting `devices` emulated devices.
    pub fn with_devices(devices: usize) -> Self {
        Self::build(devices, None)
    }

    /// A host runtime with a byte capacity per emulated device.
    ///
    /// Allocations beyond the capacity fail with
    /// [`LinalgCoreError::OutOfDeviceMemory`].
    pub fn with_capacity(devices: usize, bytes_per_device: usize) -> Self {
        Self::build(devices, Some(bytes_per_device))
    }

    fn build(devices: usize, capacity: Option<usize>) -> Self {
        let devices = devices.max(1);
        let mut state = HostState {
            used: vec![0; devices],
            next_queue: devices as u64,
            ..HostState::default()
        };
        // Queue ids below `devices` are the per-device default queues.
        for device in 0..devices {
            state.queues.insert(device as u64, device);
        }
        log::debug!(
            "host runtime created with {} device(s), capacity {:?}",
            devices,
            capacity
        );
        Self {
            devices,
            capacity,
            state: Mutex::new(state),
        }
    }

    /// Number of allocations currently alive.
    pub fn live_allocations(&self) -> usize {
        self.state.lock().map(|s| s.allocations.len()).unwrap_or(0)
    }

    /// Number of allocations released so far.
    pub fn free_count(&self) -> u64 {
        self.state.lock().map(|s| s.frees).unwrap_or(0)
    }

    /// Bytes currently allocated on the given device.
    pub fn bytes_in_use(&self, device: DeviceId) -> usize {
        self.state
            .lock()
            .map(|s| s.used.get(device).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HostState>, LinalgCoreError> {
        self.state
            .lock()
            .map_err(|_| LinalgCoreError::Internal("host runtime state poisoned".to_string()))
    }

    fn check_device(&self, device: DeviceId) -> Result<(), LinalgCoreError> {
        if device >= self.devices {
            return Err(LinalgCoreError::DeviceError(format!(
                "invalid device id {} ({} device(s) present)",
                device, self.devices
            )));
        }
        Ok(())
    }
}

impl AcceleratorRuntime for HostRuntime {
    fn backend_name(&self) -> &'static str {
        "host"
    }

    fn device_count(&self) -> Result<usize, LinalgCoreError> {
        Ok(self.devices)
    }

    fn default_queue(&self, device: DeviceId) -> Result<QueueHandle, LinalgCoreError> {
        self.check_device(device)?;
        Ok(QueueHandle {
            id: device as u64,
            device,
        })
    }

    fn create_queue(&self, device: DeviceId) -> Result<QueueHandle, LinalgCoreError> {
        self.check_device(device)?;
        let mut state = self.lock()?;
        let id = state.next_queue;
        state.next_queue += 1;
        state.queues.insert(id, device);
        log::debug!("created host queue {} on device {}", id, device);
        Ok(QueueHandle { id, device })
    }

    fn destroy_queue(&self, queue: QueueHandle) -> Result<(), LinalgCoreError> {
        if queue.id < self.devices as u64 {
            return Err(LinalgCoreError::Internal(
                "the default queue is owned by the runtime and cannot be destroyed".to_string(),
            ));
        }
        let mut state = self.lock()?;
        if state.queues.remove(&queue.id).is_none() {
            return Err(LinalgCoreError::Internal(format!(
                "queue {} destroyed twice or never created",
                queue.id
            )));
        }
        log::debug!("destroyed host queue {}", queue.id);
        Ok(())
    }

    fn synchronize(&self, queue: QueueHandle) -> Result<(), LinalgCoreError> {
        let state = self.lock()?;
        if !state.queues.contains_key(&queue.id) {
            return Err(LinalgCoreError::Internal(format!(
                "synchronize on unknown queue {}",
                queue.id
            )));
        }
        // Host operations complete at submission; nothing to wait on.
        Ok(())
    }

    fn allocate(&self, queue: QueueHandle, bytes: usize) -> Result<DevicePtr, LinalgCoreError> {
        let device = queue.device;
        self.check_device(device)?;
        let mut state = self.lock()?;
        if let Some(capacity) = self.capacity {
            let used = state.used[device];
            if used + bytes > capacity {
                return Err(LinalgCoreError::OutOfDeviceMemory(format!(
                    "requested {} bytes on device {} with {} of {} bytes in use",
                    bytes, device, used, capacity
                )));
            }
        }
        let ptr = state.next_ptr;
        state.next_ptr += 1;
        state.allocations.insert(
            ptr,
            HostAllocation {
                device,
                bytes: vec![0u8; bytes],
            },
        );
        state.used[device] += bytes;
        log::debug!("allocated {} bytes on host device {}", bytes, device);
        Ok(DevicePtr(ptr))
    }

    fn adopt_raw(
        &self,
        device: DeviceId,
        raw: u64,
        bytes: usize,
    ) -> Result<DevicePtr, LinalgCoreError> {
        self.check_device(device)?;
        let mut state = self.lock()?;
        let ptr = state.next_ptr;
        state.next_ptr += 1;
        state.allocations.insert(
            ptr,
            HostAllocation {
                device,
                bytes: vec![0u8; bytes],
            },
        );
        state.used[device] += bytes;
        log::debug!(
            "adopted raw pointer {:#x} ({} bytes) on host device {}",
            raw,
            bytes,
            device
        );
        Ok(DevicePtr(ptr))
    }

    fn free(&self, ptr: DevicePtr) -> Result<(), LinalgCoreError> {
        let mut state = self.lock()?;
        let allocation = state.allocations.remove(&ptr.0).ok_or_else(|| {
            LinalgCoreError::Internal(format!(
                "pointer {:?} freed twice or never allocated",
                ptr
            ))
        })?;
        state.used[allocation.device] -= allocation.bytes.len();
        state.frees += 1;
        log::debug!(
            "freed {} bytes on host device {}",
            allocation.bytes.len(),
            allocation.device
        );
        Ok(())
    }

    fn copy_to_device(
        &self,
        queue: QueueHandle,
        dst: DevicePtr,
        src: &[u8],
    ) -> Result<(), LinalgCoreError> {
        let _ = queue;
        let mut state = self.lock()?;
        let allocation = state.allocations.get_mut(&dst.0).ok_or_else(|| {
            LinalgCoreError::Internal(format!("copy into unknown pointer {:?}", dst))
        })?;
        if allocation.bytes.len() < src.len() {
            return Err(LinalgCoreError::Internal(format!(
                "target buffer size ({}) is smaller than data size ({})",
                allocation.bytes.len(),
                src.len()
            )));
        }
        allocation.bytes[..src.len()].copy_from_slice(src);
        Ok(())
    }

    fn copy_to_host(
        &self,
        queue: QueueHandle,
        src: DevicePtr,
        dst: &mut [u8],
    ) -> Result<(), LinalgCoreError> {
        let _ = queue;
        let state = self.lock()?;
        let allocation = state.allocations.get(&src.0).ok_or_else(|| {
            LinalgCoreError::Internal(format!("copy from unknown pointer {:?}", src))
        })?;
        if allocation.bytes.len() < dst.len() {
            return Err(LinalgCoreError::Internal(format!(
                "source buffer size ({}) is smaller than requested size ({})",
                allocation.bytes.len(),
                dst.len()
            )));
        }
        dst.copy_from_slice(&allocation.bytes[..dst.len()]);
        Ok(())
    }

    fn copy_on_device(
        &self,
        queue: QueueHandle,
        src: DevicePtr,
        dst: DevicePtr,
        bytes: usize,
    ) -> Result<(), LinalgCoreError> {
        let _ = queue;
        let mut state = self.lock()?;
        let contents = {
            let source = state.allocations.get(&src.0).ok_or_else(|| {
                LinalgCoreError::Internal(format!("copy from unknown pointer {:?}", src))
            })?;
            if source.bytes.len() < bytes {
                return Err(LinalgCoreError::Internal(format!(
                    "source buffer size ({}) is smaller than requested size ({})",
                    source.bytes.len(),
                    bytes
                )));
            }
            source.bytes[..bytes].to_vec()
        };
        let target = state.allocations.get_mut(&dst.0).ok_or_else(|| {
            LinalgCoreError::Internal(format!("copy into unknown pointer {:?}", dst))
        })?;
        if target.bytes.len() < bytes {
            return Err(LinalgCoreError::Internal(format!(
                "target buffer size ({}) is smaller than requested size ({})",
                target.bytes.len(),
                bytes
            )));
        }
        target.bytes[..bytes].copy_from_slice(&contents);
        Ok(())
    }
}
