//! Bounded event log consumed by presentation layers.

use crate::request::{Request, RequestStatus};
use crate::ring::RingBuffer;
use serde::{Deserialize, Serialize};

/// What an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A request reached `status`.
    Request(RequestStatus),
    LeaderChanged,
    HealthChanged,
    BalancerToggled,
    CircuitOpened,
    ConfigChanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time_ms: u64,
    pub request_id: Option<u64>,
    pub kind: EventKind,
    pub message: String,
    pub server_id: Option<u32>,
    pub lb_id: Option<u32>,
}

impl LogEntry {
    /// Entry for a request in its current status.
    pub fn for_request(request: &Request, time_ms: u64, message: String) -> Self {
        Self {
            time_ms,
            request_id: Some(request.id),
            kind: EventKind::Request(request.status),
            message,
            server_id: request.server_id,
            lb_id: request.lb_id,
        }
    }

    pub fn system(time_ms: u64, kind: EventKind, message: String) -> Self {
        Self {
            time_ms,
            request_id: None,
            kind,
            message,
            server_id: None,
            lb_id: None,
        }
    }

    pub fn with_server(mut self, server_id: u32) -> Self {
        self.server_id = Some(server_id);
        self
    }

    pub fn with_lb(mut self, lb_id: u32) -> Self {
        self.lb_id = Some(lb_id);
        self
    }
}

pub type EventLog = RingBuffer<LogEntry>;
