//! Connection lifecycle for the robot's USB serial link

pub mod machine;
pub mod state;

pub use machine::{
    LinkConfig, LinkHandle, LinkNotice, LinkStatus, SerialLink, DEFAULT_SUPPORTED_VENDOR_IDS,
};
pub use state::{is_valid_transition, LinkState, PermissionState};
