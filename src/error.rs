//! Error types for the serial link

use thiserror::Error;

/// Errors surfaced by the link service
///
/// None of these are fatal: every failure path returns the state machine to
/// `Idle`, ready for a future attach event.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Devices are attached, but none carries an allow-listed vendor ID
    #[error("no supported USB device found")]
    NoSupportedDevice,

    /// The OS permission broker denied access to the device
    #[error("permission denied for device")]
    PermissionDenied,

    /// The device could not be opened
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// The device was opened but no serial interface could be configured
    #[error("serial port unavailable: {0}")]
    PortUnavailable(String),

    /// A command was submitted while no connection exists
    #[error("serial link not connected")]
    NotConnected,

    /// The link service task has shut down
    #[error("link service closed")]
    ChannelClosed,

    /// I/O error on the serial stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port layer error
    #[error("serial error: {0}")]
    Serial(#[from] tokio_serial::Error),
}
