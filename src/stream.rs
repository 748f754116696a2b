//! Execution streams.
//!
//! A [`DeviceStream`] owns (or references) one in-order execution queue on
//! one accelerator device. Operations submitted against a stream execute in
//! submission order; operations on different streams are unordered unless
//! explicitly synchronized.

use crate::error::LinalgCoreError;
use crate::memory::ResourceManager;
use crate::runtime::{AcceleratorRuntime, DeviceId, QueueHandle};
use std::sync::Arc;

/// Requests how a stream attaches to an execution queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSpec {
    /// Attach to the device's default queue. The queue outlives the stream
    /// and is not destroyed when the stream is dropped.
    Default,
    /// Create a new queue owned by the stream.
    New,
}

/// One in-order execution queue bound to a single device for its lifetime.
#[derive(Debug)]
pub struct DeviceStream {
    runtime: Arc<dyn AcceleratorRuntime>,
    device: DeviceId,
    queue: QueueHandle,
    owned: bool,
}

impl DeviceStream {
    /// Binds to the default device (ordinal 0) and creates a new queue.
    pub fn new(manager: &ResourceManager) -> Result<Self, LinalgCoreError> {
        Self::on_device(manager, 0)
    }

    /// Creates or attaches a stream on the default device per `spec`.
    pub fn with_spec(manager: &ResourceManager, spec: StreamSpec) -> Result<Self, LinalgCoreError> {
        let runtime = Arc::clone(manager.runtime());
        let (queue, owned) = match spec {
            StreamSpec::Default => (runtime.default_queue(0)?, false),
            StreamSpec::New => (runtime.create_queue(0)?, true),
        };
        log::debug!(
            "stream attached to queue {} on device 0 (owned: {})",
            queue.id,
            owned
        );
        Ok(Self {
            runtime,
            device: 0,
            queue,
            owned,
        })
    }

    /// Binds to an explicit device and creates a new queue on it.
    ///
    /// Fails with [`LinalgCoreError::DeviceError`] if the device id is
    /// invalid or the runtime cannot create a queue.
    pub fn on_device(manager: &ResourceManager, device: DeviceId) -> Result<Self, LinalgCoreError> {
        let runtime = Arc::clone(manager.runtime());
        let queue = runtime.create_queue(device)?;
        log::debug!("stream created queue {} on device {}", queue.id, device);
        Ok(Self {
            runtime,
            device,
            queue,
            owned: true,
        })
    }

    /// The device this stream is bound to.
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Whether dropping this stream releases the underlying queue.
    pub fn owns_queue(&self) -> bool {
        self.owned
    }

    /// Blocks until all work submitted to this stream has completed.
    pub fn synchronize(&self) -> Result<(), LinalgCoreError> {
        self.runtime.synchronize(self.queue)
    }

    pub(crate) fn queue(&self) -> QueueHandle {
        self.queue
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        // Drop must not panic; a failed queue teardown is only logged.
        if let Err(e) = self.runtime.destroy_queue(self.queue) {
            log::error!(
                "failed to destroy queue {} on device {}: {}",
                self.queue.id,
                self.device,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::HostRuntime;
    use std::sync::Arc;

    fn manager_with(runtime: Arc<HostRuntime>) -> ResourceManager {
        ResourceManager::with_runtime(runtime)
    }

    #[test]
    fn test_default_construction_binds_device_zero() {
        let manager = manager_with(Arc::new(HostRuntime::new()));
        let stream = DeviceStream::new(&manager).unwrap();
        assert_eq!(stream.device(), 0);
        assert!(stream.owns_queue());
        stream.synchronize().unwrap();
    }

    #[test]
    fn test_spec_default_does_not_own_queue() {
        let manager = manager_with(Arc::new(HostRuntime::new()));
        let stream = DeviceStream::with_spec(&manager, StreamSpec::Default).unwrap();
        assert!(!stream.owns_queue());
        drop(stream);

        // The default queue survives stream teardown and stays usable.
        let again = DeviceStream::with_spec(&manager, StreamSpec::Default).unwrap();
        again.synchronize().unwrap();
    }

    #[test]
    fn test_spec_new_owns_queue() {
        let manager = manager_with(Arc::new(HostRuntime::new()));
        let stream = DeviceStream::with_spec(&manager, StreamSpec::New).unwrap();
        assert!(stream.owns_queue());
    }

    #[test]
    fn test_on_device_binds_requested_device() {
        let manager = manager_with(Arc::new(HostRuntime::with_devices(3)));
        let stream = DeviceStream::on_device(&manager, 2).unwrap();
        assert_eq!(stream.device(), 2);
    }

    #[test]
    fn test_invalid_device_id_fails() {
        let manager = manager_with(Arc::new(HostRuntime::with_devices(1)));
        match DeviceStream::on_device(&manager, 5) {
            Err(LinalgCoreError::DeviceError(msg)) => {
                assert!(msg.contains("invalid device id"))
            }
            other => panic!("expected DeviceError, got {:?}", other),
        }
    }
}
