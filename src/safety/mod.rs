pub mod monitor;
pub mod probe;

pub use monitor::{
    classify_ram, classify_vram, propose_downgrade, DowngradeProposal, RecommendedAction,
    ResourceStatus, SafetyLevel, SafetyMonitor,
};
pub use probe::{RamReading, ResourceProbe, SystemProbe, VramReading};
