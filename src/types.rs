//! Shared enumerations for storage locations, orders and matrix properties.

/// Storage locations.
///
/// Matrix handles and device buffers are either resident in main memory or
/// on one accelerator device, identified by its ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Main memory.
    Host,
    /// Accelerator device with the given ordinal.
    Device(usize),
}

impl Location {
    pub fn is_host(self) -> bool {
        matches!(self, Location::Host)
    }

    pub fn is_device(self) -> bool {
        matches!(self, Location::Device(_))
    }
}

/// Dense storage orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Column major (Fortran layout: `[a_00, a_10, a_20, ...]`).
    ColMajor,
    /// Row major (C layout: `[a_00, a_01, a_02, ...]`).
    RowMajor,
}

/// Matrix property flags, stored as a bitfield on dense handles.
pub mod property {
    pub const GENERAL: u8 = 0x01;
    pub const SYMMETRIC: u8 = 0x02;
    pub const HERMITIAN: u8 = 0x04;
}
