//! Concrete `EnergySource` implementations — the out-of-scope vendor
//! sensor I/O collaborators the core consumes only through its trait.

pub mod gpu;
pub mod platform;
pub mod qat;
pub mod rapl;
