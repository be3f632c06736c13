//! Link State Machine
//!
//! Defines the connection lifecycle states and which transitions between
//! them are valid.

/// Lifecycle state of the serial link
///
/// `Idle` is both the initial state and the only state reachable after
/// teardown; a new attach event restarts discovery from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No device selected, nothing open
    Idle,
    /// Enumerating attached devices
    Discovering,
    /// Permission request issued, waiting for the grant/deny callback
    PermissionRequested,
    /// Permission granted, port setup in progress
    PermissionGranted,
    /// Serial connection open and read loop running
    Connected,
}

/// Progress of the OS permission handshake, derived from the link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    NotRequested,
    Requested,
    Granted,
}

impl LinkState {
    /// Is this the idle (fully torn down) state?
    pub fn is_idle(&self) -> bool {
        matches!(self, LinkState::Idle)
    }

    /// Does the machine hold a selected device in this state?
    pub fn holds_device(&self) -> bool {
        matches!(
            self,
            LinkState::PermissionRequested | LinkState::PermissionGranted | LinkState::Connected
        )
    }

    /// Is a permission grant/deny callback expected in this state?
    pub fn awaits_permission(&self) -> bool {
        matches!(self, LinkState::PermissionRequested)
    }

    /// Derive the permission handshake progress
    pub fn permission(&self) -> PermissionState {
        match self {
            LinkState::Idle | LinkState::Discovering => PermissionState::NotRequested,
            LinkState::PermissionRequested => PermissionState::Requested,
            LinkState::PermissionGranted | LinkState::Connected => PermissionState::Granted,
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LinkState::Idle => "idle",
            LinkState::Discovering => "discovering",
            LinkState::PermissionRequested => "permission-requested",
            LinkState::PermissionGranted => "permission-granted",
            LinkState::Connected => "connected",
        };
        write!(f, "{}", name)
    }
}

/// Check if a transition from one state to another is valid
pub fn is_valid_transition(from: LinkState, to: LinkState) -> bool {
    use LinkState::*;

    match (from, to) {
        // Same state is always valid
        (a, b) if a == b => true,

        // Teardown returns to Idle from anywhere
        (_, Idle) => true,

        // Forward path through the handshake
        (Idle, Discovering) => true,
        (Discovering, PermissionRequested) => true,
        (PermissionRequested, PermissionGranted) => true,
        (PermissionGranted, Connected) => true,

        _ => false,
    }
}
