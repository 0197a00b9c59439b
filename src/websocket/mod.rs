//! WebSocket Real-Time Dashboard
//!
//! Pushes parking dashboard state to browser clients over WebSocket.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: the set of live connections plus the periodic
//!   snapshot refresh and fan-out
//! - **Connection**: one peer, its bounded outbound queue and its read and
//!   write activities
//! - **Handler**: Origin check and upgrade, then hands the socket to the hub
//! - **Messages**: the `{"type", "data"}` envelopes on the wire
//!
//! ## Usage
//!
//! Every connected client receives a `dashboard_update` on connect and then
//! once per refresh interval. Clients can also ask for a view at any time:
//! - `request-full-snapshot` - answered with `dashboard_update`
//! - `request-section-breakdown` - answered with `espacios_por_seccion`
//! - `request-available-spaces` - answered with `espacios_disponibles`
//! - `request-active-tickets` - answered with `tickets_activos`
//!
//! Messages already queued for a client are written in one frame, separated
//! by `\n`.
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8080/ws');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'request-available-spaces'}));
//! };
//!
//! ws.onmessage = (event) => {
//!   for (const line of event.data.split('\n')) {
//!     const msg = JSON.parse(line);
//!     console.log(msg.type, msg.data);
//!   }
//! };
//! ```

mod connection;
mod handler;
mod hub;
mod messages;

pub use connection::{Connection, ConnectionError, ConnectionId, ConnectionTimings, EnqueueError};
pub use handler::{handle_socket, origin_allowed, websocket_handler};
pub use hub::{ConnectionHub, HubConfig, HubError, HubState};
pub use messages::{ClientMessage, ErrorPayload, ServerMessage};
