//! An asynchronous HTTP transport engine for HTTP/1.1, HTTP/2 and HTTP/3
//!
//! This crate provides the per-stream plumbing between a byte transport and an
//! application: one duplex state machine per logical stream, one frame codec
//! per protocol generation, and connection drivers for both the server and the
//! client side built on top of tokio.
//!
//! # Features
//!
//! - HTTP/1.1 with keep-alive, chunked bodies, trailers and `100 Continue`
//! - HTTP/2 framing with HPACK header compression
//! - HTTP/3 framing over QUIC stream frames with QPACK header compression
//! - Independent inbound and outbound progress per stream
//! - Streaming, back-pressured request and response bodies
//! - Idle timeouts and abrupt closures reported with the phase they hit
//! - Single-assignment completion signals per exchange
//! - Route identity and a reference-counted connection pool
//!
//! # Example
//!
//! ```no_run
//! use std::error::Error;
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use http::{Request, Response, StatusCode};
//! use http_body_util::{BodyExt, Full};
//! use micro_transport::config::TransportConfig;
//! use micro_transport::connection::ServerConnection;
//! use micro_transport::handler::make_handler;
//! use micro_transport::protocol::body::MessageBody;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     let config = TransportConfig::default();
//!     let tcp_listener = match TcpListener::bind(("127.0.0.1", config.port)).await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let handler = Arc::new(make_handler(echo));
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = Arc::clone(&handler);
//!         let (reader, writer) = tcp_stream.into_split();
//!         let connection = ServerConnection::new(reader, writer, &config);
//!         tokio::spawn(async move {
//!             match connection.process(handler).await {
//!                 Ok(()) => info!("finished process, connection shutdown"),
//!                 Err(e) => error!(cause = %e, "connection failed"),
//!             }
//!         });
//!     }
//! }
//!
//! async fn echo(request: Request<MessageBody>) -> Result<Response<Full<Bytes>>, Box<dyn Error + Send + Sync>> {
//!     let body = request.into_body().collect().await?.to_bytes();
//!     Ok(Response::builder().status(StatusCode::OK).body(Full::new(body))?)
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: the message model, protocol-independent frame events and
//!   the error taxonomy
//! - [`codec`]: one frame codec per protocol generation
//! - [`state`]: the per-stream duplex state machine
//! - [`future`]: single-assignment completion signals
//! - [`connection`]: the server and client connection drivers
//! - [`route`]: endpoint identity and connection pooling
//! - [`handler`]: the dispatch boundary towards the application
//! - [`config`]: connection setup configuration
//!
//! ## Streams and state
//!
//! HTTP/1.1 carries a single stream per connection; HTTP/2 and HTTP/3 carry
//! many. Either way every stream gets its own context holding two state slots,
//! one for the message being received and one for the message being sent.
//! Events for one stream are always handled on the task driving its
//! connection, so state transitions never race.
//!
//! ## Error Handling
//!
//! - [`protocol::ParseError`]: malformed inbound bytes
//! - [`protocol::SendError`]: outbound encoding and write failures
//! - [`protocol::TransportError`]: the terminal outcome of one exchange
//! - [`protocol::HttpError`]: the error a connection driver returns
//!
//! # Limitations
//!
//! - HTTP/3 runs over an already established, ordered byte transport; QUIC
//!   itself is not implemented
//! - No TLS support, TLS settings only take part in route identity
//! - Outbound flow control windows are not enforced

pub mod codec;
pub mod config;
pub mod connection;
pub mod future;
pub mod handler;
pub mod protocol;
pub mod route;
pub mod state;

mod utils;
pub(crate) use utils::ensure;

#[cfg(test)]
mod mock;
