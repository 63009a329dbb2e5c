//! HTTP and WebSocket routing layer.
//!
//! A thin adapter over [`SessionRegistry`](crate::session::SessionRegistry):
//! it parses requests, forwards them to the session's coordinator and maps
//! results to status codes.
//!
//! ## Endpoints
//!
//! ### Health & Info
//! - `GET /health` - Health check
//! - `GET /api/v1/` - API information
//!
//! ### Polls
//! - `POST /api/v1/polls` - Create a poll
//! - `GET /api/v1/polls/{id}` - View a poll (voter token via `x-voter-token`)
//! - `POST /api/v1/polls/{id}/votes` - Cast a ballot
//! - `POST /api/v1/polls/{id}/close` - Close a poll
//! - `GET /api/v1/polls/{id}/export` - Poll with totals and percentages
//! - `WS /api/v1/polls/{id}/ws` - Live `init` / `update` / `closed` events
//!
//! ## Example
//!
//! ```no_run
//! use live_poll::api::{serve, AppState, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> live_poll::Result<()> {
//!     let config = ServerConfig::new("127.0.0.1", 3000);
//!     serve(config, AppState::default()).await
//! }
//! ```

pub mod handlers;
pub mod router;
pub mod types;
pub mod websocket;

pub use handlers::{api_error, ApiError, AppState};
pub use router::{create_router, create_router_with_state, serve, ServerConfig};
pub use types::{
    CreatePollResponse, ErrorResponse, ExportResponse, OptionTally, SubmitVoteRequest,
    VOTER_TOKEN_HEADER,
};
