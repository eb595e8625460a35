use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use micro_transport::config::TransportConfig;
use micro_transport::connection::ServerConnection;
use micro_transport::handler::Handler;
use micro_transport::protocol::body::MessageBody;
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Usage: `echo_server [config.json]`
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = match std::env::args().nth(1) {
        Some(path) => serde_json::from_str::<TransportConfig>(&std::fs::read_to_string(path)?)?,
        None => TransportConfig::default(),
    };

    info!(port = config.port, version = ?config.version, "start listening");
    let tcp_listener = match TcpListener::bind(("127.0.0.1", config.port)).await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return Err(e.into());
        }
    };

    let handler = Arc::new(EchoHandler);
    loop {
        let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let handler = Arc::clone(&handler);
        let (reader, writer) = tcp_stream.into_split();
        let connection = ServerConnection::new(reader, writer, &config);
        tokio::spawn(async move {
            let id = connection.id();
            match connection.process(handler).await {
                Ok(()) => info!(connection = %id, %remote_addr, "connection shutdown"),
                Err(e) => error!(connection = %id, cause = %e, "connection failed"),
            }
        });
    }
}

struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    type RespBody = Full<Bytes>;
    type Error = Box<dyn Error + Send + Sync>;

    async fn call(&self, request: Request<MessageBody>) -> Result<Response<Self::RespBody>, Self::Error> {
        let path = request.uri().path().to_owned();
        let body = request.into_body().collect().await?.to_bytes();
        info!(path = %path, size = body.len(), "echo request body");

        Ok(Response::builder().status(StatusCode::OK).body(Full::new(body))?)
    }
}
