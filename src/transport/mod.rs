pub mod traits;
pub mod usb;

pub use traits::{LinkStream, SerialBackend, SerialParams};
pub use usb::UsbSerialBackend;
