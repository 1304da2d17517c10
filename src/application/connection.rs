// Push channel connection state machine
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    ServerInitiated,
    TransportClose,
    ClientInitiated,
    PingTimeout,
    Other(String),
}

impl DisconnectReason {
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "io server disconnect" | "server-initiated" => DisconnectReason::ServerInitiated,
            "transport close" | "transport error" => DisconnectReason::TransportClose,
            "io client disconnect" | "client-initiated" => DisconnectReason::ClientInitiated,
            "ping timeout" => DisconnectReason::PingTimeout,
            other => DisconnectReason::Other(other.to_string()),
        }
    }

    /// Only server-side and transport-level closes are worth reconnecting after
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DisconnectReason::ServerInitiated | DisconnectReason::TransportClose
        )
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub reconnect_delay: Duration,
    pub fallback_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            reconnect_delay: Duration::from_secs(5),
            fallback_delay: Duration::from_secs(1),
        }
    }
}

/// Timers the owner has to schedule after a transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Followups {
    pub reconnect: Option<Duration>,
    pub fallback_pull: Option<Duration>,
}

#[derive(Debug)]
pub struct ConnectionTracker {
    state: ConnectionState,
    attempts: u32,
    policy: ReconnectPolicy,
}

impl ConnectionTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Connecting,
            attempts: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// A consumer forced a brand new connection
    pub fn begin_fresh(&mut self) {
        self.attempts = 0;
        self.state = ConnectionState::Connecting;
    }

    /// Start a scheduled reconnect. Returns false once the attempt budget is spent.
    pub fn begin_reconnect(&mut self) -> bool {
        if self.attempts >= self.policy.max_attempts {
            return false;
        }
        self.attempts += 1;
        self.state = ConnectionState::Connecting;
        true
    }

    pub fn on_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
    }

    pub fn on_handshake_failed(&mut self) -> Followups {
        if self.state != ConnectionState::Connecting {
            return Followups::default();
        }
        self.enter_error()
    }

    pub fn on_transport_error(&mut self) -> Followups {
        if self.state != ConnectionState::Connected {
            return Followups::default();
        }
        self.enter_error()
    }

    pub fn on_disconnect(&mut self, reason: &DisconnectReason) -> Followups {
        if self.state != ConnectionState::Connected {
            return Followups::default();
        }
        self.state = ConnectionState::Disconnected;
        Followups {
            reconnect: (reason.is_recoverable() && self.can_retry())
                .then_some(self.policy.reconnect_delay),
            fallback_pull: None,
        }
    }

    fn enter_error(&mut self) -> Followups {
        self.state = ConnectionState::Error;
        Followups {
            reconnect: self.can_retry().then_some(self.policy.reconnect_delay),
            fallback_pull: Some(self.policy.fallback_delay),
        }
    }

    fn can_retry(&self) -> bool {
        self.attempts < self.policy.max_attempts
    }
}
