//! The dispatch boundary between a server connection and the application.
//!
//! A request is handed over as soon as its head is complete; its
//! [`MessageBody`] keeps streaming while the handler runs. Whatever the handler
//! returns is written back through the stream's state machine.

use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use http::{Request, Response};
use http_body::Body;

use crate::protocol::body::MessageBody;

#[async_trait]
pub trait Handler: Send + Sync {
    type RespBody: Body;
    type Error: Into<Box<dyn Error + Send + Sync>>;

    async fn call(&self, req: Request<MessageBody>) -> Result<Response<Self::RespBody>, Self::Error>;
}

#[async_trait]
impl<H: Handler> Handler for Arc<H> {
    type RespBody = H::RespBody;
    type Error = H::Error;

    async fn call(&self, req: Request<MessageBody>) -> Result<Response<Self::RespBody>, Self::Error> {
        (**self).call(req).await
    }
}

/// A [`Handler`] backed by an async function.
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<RespBody, Err, F, Fut> Handler for HandlerFn<F>
where
    RespBody: Body,
    F: Fn(Request<MessageBody>) -> Fut + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>>,
    Fut: Future<Output = Result<Response<RespBody>, Err>> + Send,
{
    type RespBody = RespBody;
    type Error = Err;

    async fn call(&self, req: Request<MessageBody>) -> Result<Response<Self::RespBody>, Self::Error> {
        (self.f)(req).await
    }
}

pub fn make_handler<F, RespBody, Err, Ret>(f: F) -> HandlerFn<F>
where
    RespBody: Body,
    Err: Into<Box<dyn Error + Send + Sync>>,
    Ret: Future<Output = Result<Response<RespBody>, Err>>,
    F: Fn(Request<MessageBody>) -> Ret,
{
    HandlerFn { f }
}
