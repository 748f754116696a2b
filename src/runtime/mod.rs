//! The narrow interface the core consumes from an accelerator runtime.
//!
//! The resource and stream layers are written against [`AcceleratorRuntime`]
//! so their lifecycle guarantees (in-order queues, free-exactly-once buffer
//! release, error funneling) do not depend on one backend. The host backend
//! is always available; the CUDA backend is compiled in with the `cuda`
//! feature.

use crate::error::LinalgCoreError;
use std::fmt::Debug;

#[cfg(feature = "cuda")]
pub mod cuda;
pub mod host;

pub use host::HostRuntime;

#[cfg(feature = "cuda")]
pub use cuda::CudaRuntime;

/// Device ordinal.
pub type DeviceId = usize;

/// Opaque handle to one device-resident allocation.
///
/// Handles are only meaningful to the runtime that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr(pub(crate) u64);

/// Handle to one in-order execution queue, bound to a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueHandle {
    pub(crate) id: u64,
    pub(crate) device: DeviceId,
}

impl QueueHandle {
    /// The device this queue is bound to.
    pub fn device(&self) -> DeviceId {
        self.device
    }
}

/// Operations the core requires from an accelerator runtime.
///
/// Contract:
/// - operations submitted against one queue complete in submission order;
///   distinct queues are unordered with respect to each other,
/// - `allocate` reports exhaustion as
///   [`LinalgCoreError::OutOfDeviceMemory`],
/// - `free` releases an allocation through the same runtime that created it
///   (including allocations adopted via `adopt_raw`),
/// - copies are whole-buffer and queue-ordered,
/// - implementations funnel every native status code through
///   [`crate::status`] before it surfaces.
pub trait AcceleratorRuntime: Debug + Send + Sync {
    /// Short name of the backend, for logs.
    fn backend_name(&self) -> &'static str;

    /// Number of usable devices.
    fn device_count(&self) -> Result<usize, LinalgCoreError>;

    /// The device's default queue. Owned by the runtime; never destroyed by
    /// stream teardown.
    fn default_queue(&self, device: DeviceId) -> Result<QueueHandle, LinalgCoreError>;

    /// Creates a new queue on the given device.
    fn create_queue(&self, device: DeviceId) -> Result<QueueHandle, LinalgCoreError>;

    /// Destroys a queue previously created with `create_queue`.
    fn destroy_queue(&self, queue: QueueHandle) -> Result<(), LinalgCoreError>;

    /// Blocks until all work submitted to the queue has completed.
    fn synchronize(&self, queue: QueueHandle) -> Result<(), LinalgCoreError>;

    /// Reserves `bytes` of zero-initialized memory on the queue's device.
    fn allocate(&self, queue: QueueHandle, bytes: usize) -> Result<DevicePtr, LinalgCoreError>;

    /// Adopts memory allocated outside this crate (for example by a native
    /// library) so that `free` releases it through the owning runtime.
    fn adopt_raw(
        &self,
        device: DeviceId,
        raw: u64,
        bytes: usize,
    ) -> Result<DevicePtr, LinalgCoreError>;

    /// Releases an allocation. Each pointer may be freed at most once.
    fn free(&self, ptr: DevicePtr) -> Result<(), LinalgCoreError>;

    /// Copies `src` into the allocation behind `dst`.
    fn copy_to_device(
        &self,
        queue: QueueHandle,
        dst: DevicePtr,
        src: &[u8],
    ) -> Result<(), LinalgCoreError>;

    /// Copies the allocation behind `src` into `dst`.
    fn copy_to_host(
        &self,
        queue: QueueHandle,
        src: DevicePtr,
        dst: &mut [u8],
    ) -> Result<(), LinalgCoreError>;

    /// Copies `bytes` from one device allocation to another on the same
    /// device.
    fn copy_on_device(
        &self,
        queue: QueueHandle,
        src: DevicePtr,
        dst: DevicePtr,
        bytes: usize,
    ) -> Result<(), LinalgCoreError>;
}
