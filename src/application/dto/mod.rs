//! Data Transfer Objects
//!
//! DTOs for API request/response serialization. The archive RPC body types
//! live next to their client in `infrastructure::archive_client`.

pub mod request;
pub mod response;

pub use request::CreateChannelRequest;
pub use response::{ChannelListResponse, MessageResponse};
