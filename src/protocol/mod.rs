// Protocol module: wire message types, error codes, and input validation

pub mod error_codes;
pub mod messages;
pub mod types;
pub mod validation;

pub use error_codes::ErrorCode;

pub use types::{
    ClientRole, ConnectionId, ListingStatus, RoomId, RoomListing, RoomStatus, SignalKind,
    SignalPayload, DEFAULT_MAX_ROOM_ID_LENGTH,
};

pub use messages::{ClientMessage, ServerMessage, INBOUND_MESSAGE_TYPES};
