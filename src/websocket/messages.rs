//! WebSocket Message Types
//!
//! Every frame is an envelope `{"type": <tag>, "data": <payload>}`.
//! Client requests carry no payload; server messages always do.

use serde::{Deserialize, Serialize};

use crate::provider::{
    SectionOccupancy, Snapshot, SpaceDetail, SpaceFreedEvent, SpaceOccupiedEvent, Ticket,
};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Full dashboard snapshot
    #[serde(rename = "request-full-snapshot", alias = "get_dashboard")]
    RequestSnapshot,
    /// Spaces grouped by section
    #[serde(rename = "request-section-breakdown", alias = "get_espacios_por_seccion")]
    RequestSectionBreakdown,
    /// Free spaces
    #[serde(rename = "request-available-spaces", alias = "get_espacios_disponibles")]
    RequestAvailableSpaces,
    /// Tickets without an exit time
    #[serde(rename = "request-active-tickets", alias = "get_tickets_activos")]
    RequestActiveTickets,
    /// Any tag this server does not know
    #[serde(other)]
    Unknown,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Aggregate snapshot, pushed on every tick and on request
    DashboardUpdate(Snapshot),
    /// Per-section breakdown
    #[serde(rename = "espacios_por_seccion")]
    SectionBreakdown(Vec<SectionOccupancy>),
    /// Free spaces
    #[serde(rename = "espacios_disponibles")]
    AvailableSpaces(Vec<SpaceDetail>),
    /// Active tickets
    #[serde(rename = "tickets_activos")]
    ActiveTickets(Vec<Ticket>),
    /// Request could not be served
    Error(ErrorPayload),
    /// A space was taken
    #[serde(rename = "espacio_ocupado")]
    SpaceOccupied(SpaceOccupiedEvent),
    /// A space was released
    #[serde(rename = "espacio_liberado")]
    SpaceFreed(SpaceFreedEvent),
}

/// Payload of an `error` envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl ServerMessage {
    /// Build an error envelope
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Envelope tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::DashboardUpdate(_) => "dashboard_update",
            ServerMessage::SectionBreakdown(_) => "espacios_por_seccion",
            ServerMessage::AvailableSpaces(_) => "espacios_disponibles",
            ServerMessage::ActiveTickets(_) => "tickets_activos",
            ServerMessage::Error(_) => "error",
            ServerMessage::SpaceOccupied(_) => "espacio_ocupado",
            ServerMessage::SpaceFreed(_) => "espacio_liberado",
        }
    }

    /// Serialize to the wire format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
