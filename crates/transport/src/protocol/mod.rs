//! Core protocol abstractions.
//!
//! This module holds everything the state machine and the codecs exchange:
//!
//! - **Message model**: [`HttpMessage`], its head ([`MessageHead`],
//!   [`RequestHeader`], [`ResponseHead`]) and its streaming body
//!   ([`body::MessageBody`]), with body pieces represented as [`PayloadItem`]
//! - **Frame events** ([`InboundFrame`], [`OutboundFrame`], [`ControlFrame`])
//!   addressed by [`StreamId`], which every codec produces and consumes
//! - **Errors**: [`ParseError`] for inbound framing, [`SendError`] for
//!   outbound encoding, [`TransportError`] for the terminal outcome of a
//!   stream and [`HttpError`] for the connection drivers

mod message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::MessageHead;
pub use response::ResponseHead;

mod frame;
pub use frame::ConnectionId;
pub use frame::ControlFrame;
pub use frame::InboundFrame;
pub use frame::OutboundFrame;
pub use frame::StreamId;
pub use frame::StreamIdentity;

mod http_message;
pub use http_message::HttpMessage;

mod error;
pub use error::ErrorPhase;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
pub use error::TransportError;

pub mod body;
