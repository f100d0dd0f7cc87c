pub mod detection;
pub mod gpu;
pub mod profiles;

pub use detection::{
    detect_hardware, CpuInfo, GpuInfo, HardwareSnapshot, RamInfo, RAM_SUFFICIENCY_BYTES,
};
pub use gpu::{query_devices, DeviceMemory};
pub use profiles::{select_profile, select_tier, ExecutionProfile, ExpectedTime, Tier};
