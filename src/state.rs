//! Connection lifecycle state.

/// Current state of the connection to the server.
///
/// Exactly one instance per bot process, mutated only by the
/// connection loop and the dispatcher in response to protocol events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected; the retry loop owns the next step.
    #[default]
    Disconnected,
    /// Transport established, registration commands not yet sent.
    Connecting,
    /// Registration sent, awaiting the welcome numeric.
    Registering,
    /// SASL credential exchange in flight.
    Authenticating,
    /// Received 001, normal operation.
    Registered,
}

impl ConnectionState {
    /// Check whether registration has completed.
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered)
    }
}
