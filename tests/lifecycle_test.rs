use linalg_core::{
    Dense, DeviceStream, HostRuntime, LinalgCoreError, Matrix, ResourceManager, Sparse,
};
use std::sync::Arc;

fn setup() -> (Arc<HostRuntime>, ResourceManager) {
    let _ = env_logger::builder().is_test(true).try_init();
    let runtime = Arc::new(HostRuntime::new());
    let rt: Arc<dyn linalg_core::AcceleratorRuntime> = runtime.clone();
    let manager = ResourceManager::with_runtime(rt);
    (runtime, manager)
}

#[test]
fn test_shared_buffer_lifecycle() -> Result<(), LinalgCoreError> {
    let (runtime, manager) = setup();

    // 1. Stream bound to device 0
    let stream = DeviceStream::on_device(&manager, 0)?;
    assert_eq!(stream.device(), 0);

    // 2. A 1024-element buffer on it, wrapped in shared ownership twice
    let buffer = manager.allocate::<f64>(1024, &stream)?;
    let first = buffer.clone();
    let second = buffer.clone();
    drop(buffer);
    assert_eq!(first.handle_count(), 2);

    // 3. Dropping both references frees the memory exactly once
    drop(first);
    assert_eq!(runtime.free_count(), 0);
    drop(second);
    assert_eq!(runtime.free_count(), 1);
    assert_eq!(runtime.live_allocations(), 0);

    Ok(())
}

#[test]
fn test_dense_clone_into_empty_handle() -> Result<(), LinalgCoreError> {
    let _ = env_logger::builder().is_test(true).try_init();

    // 1. A 4x4 double-precision real matrix
    let values: Vec<f64> = (0..16).map(|v| v as f64).collect();
    let source = Dense::from_vec(values.clone(), 4, 4)?;

    // 2. clone_from into a freshly constructed empty handle
    let mut destination = Dense::new();
    destination.clone_from(&source)?;

    // 3. Destination ends with shape 4x4 and identical element values
    assert_eq!(destination.dims(), (4, 4));
    assert_eq!(destination.host_values().unwrap(), &values[..]);
    Ok(())
}

#[test]
fn test_matrix_lifecycle_on_device() -> Result<(), LinalgCoreError> {
    let (runtime, manager) = setup();
    let stream = DeviceStream::new(&manager)?;

    // Matrices request memory through the manager and release it with the
    // last handle.
    let dense = Dense::from_vec(vec![1.0f64, 2.0, 3.0, 4.0], 2, 2)?;
    let on_device = dense.to_device(&manager, &stream)?;
    assert_eq!(runtime.live_allocations(), 1);

    let sparse = Sparse::from_dense(&dense)?;
    let sparse_on_device = sparse.to_device(&manager, &stream)?;
    assert_eq!(runtime.live_allocations(), 4);

    stream.synchronize()?;

    drop(on_device);
    drop(sparse_on_device);
    assert_eq!(runtime.live_allocations(), 0);
    assert_eq!(runtime.free_count(), 4);

    // Transfers were counted.
    let stats = manager.transfer_stats();
    assert!(stats.bytes_to_device > 0);
    Ok(())
}

#[test]
fn test_streams_are_device_bound_and_enumerable() -> Result<(), LinalgCoreError> {
    let _ = env_logger::builder().is_test(true).try_init();
    let runtime = Arc::new(HostRuntime::with_devices(2));
    let rt: Arc<dyn linalg_core::AcceleratorRuntime> = runtime.clone();
    let manager = ResourceManager::with_runtime(rt);

    assert_eq!(manager.device_count()?, 2);

    let first = DeviceStream::on_device(&manager, 0)?;
    let second = DeviceStream::on_device(&manager, 1)?;
    assert_eq!(first.device(), 0);
    assert_eq!(second.device(), 1);

    // Buffers are bound to the device of their allocating stream.
    let buffer = manager.allocate::<f32>(16, &second)?;
    assert_eq!(buffer.device(), 1);

    assert!(DeviceStream::on_device(&manager, 2).is_err());
    Ok(())
}
