pub mod constants;
pub mod device;
pub mod episode;
pub mod health;

pub use device::{DeviceIdentity, DeviceTarget};
pub use episode::{exit_code_of, CrashEpisode};
pub use health::{HealthState, RecoveryCounter};
