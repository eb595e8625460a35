use std::error::Error;

use bytes::Bytes;
use http::{Request, Uri};
use http_body_util::{BodyExt, Empty};
use micro_transport::config::TransportConfig;
use micro_transport::connection::{SendRequest, handshake};
use micro_transport::route::{ConnectionPool, HttpRoute};
use tokio::net::TcpStream;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Usage: `fetch <uri> [times]`, fetches the uri over one pooled connection.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let uri: Uri = std::env::args().nth(1).unwrap_or_else(|| "http://127.0.0.1:8080/".to_owned()).parse()?;
    let times: usize = std::env::args().nth(2).map_or(Ok(3), |times| times.parse())?;

    let config = TransportConfig::default();
    let route = HttpRoute::from_uri(&uri, &config)?;
    let pool: ConnectionPool<SendRequest<Empty<Bytes>>> = ConnectionPool::new();

    for _ in 0..times {
        let lease = match pool.acquire(&route) {
            Some(lease) => lease,
            None => {
                info!(%route, "open connection");
                let (reader, writer) = TcpStream::connect((route.host(), route.port())).await?.into_split();
                let (sender, connection) = handshake(reader, writer, &config);
                tokio::spawn(async move {
                    if let Err(e) = connection.run().await {
                        error!(cause = %e, "client connection failed");
                    }
                });
                let capacity = if config.version.is_multiplexed() { config.max_concurrent_streams } else { 1 };
                pool.insert(route.clone(), sender, capacity)
            }
        };

        let request = Request::builder().uri(uri.clone()).body(Empty::new())?;
        let mut sender = (*lease).clone();
        let response = sender.send_request(request).await.await?.into_response().map_err(|_message| "peer sent a request")?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();
        info!(%status, size = body.len(), "fetched");
    }

    info!(evicted = pool.evict(&route), "done");
    Ok(())
}
