//! Cirro Core - roster, routing and cache primitives for distributed static
//! file serving across an origin node and caching edge nodes

pub mod cache;
pub mod error;
pub mod fetch;
pub mod roster;
pub mod routing;

pub use cache::{normalize_request_path, CacheStore, FillGuard};
pub use error::{CirroError, Result};
pub use fetch::{OriginClient, CDN_REQUEST_HEADER, REGISTER_PATH};
pub use roster::EdgeRoster;
pub use routing::{RouteDecision, RoutePolicy};
