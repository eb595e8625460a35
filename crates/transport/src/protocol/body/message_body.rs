use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};

use crate::protocol::body::IoFailure;
use crate::protocol::{PayloadItem, PayloadSize, TransportError};

/// The entity body of an inbound message.
///
/// Yields the data chunks in arrival order, then one trailers frame if the
/// peer sent trailers, then ends. If the stream failed before its last chunk
/// arrived, the recorded failure is returned after the chunks that did arrive.
#[derive(Debug)]
pub struct MessageBody {
    receiver: Option<mpsc::Receiver<PayloadItem>>,
    trailers: Option<HeaderMap>,
    payload_size: PayloadSize,
    failure: IoFailure,
}

impl MessageBody {
    pub(crate) fn new(receiver: mpsc::Receiver<PayloadItem>, payload_size: PayloadSize, failure: IoFailure) -> Self {
        Self { receiver: Some(receiver), trailers: None, payload_size, failure }
    }

    /// A body that is already complete.
    pub fn empty() -> Self {
        Self { receiver: None, trailers: None, payload_size: PayloadSize::Empty, failure: IoFailure::new() }
    }

    fn finish(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
        }
    }

    fn on_last(&mut self, data: Bytes, trailers: HeaderMap) -> Poll<Option<Result<Frame<Bytes>, TransportError>>> {
        self.finish();
        let trailers = (!trailers.is_empty()).then_some(trailers);

        if !data.is_empty() {
            self.trailers = trailers;
            return Poll::Ready(Some(Ok(Frame::data(data))));
        }

        Poll::Ready(trailers.map(|trailers| Ok(Frame::trailers(trailers))))
    }
}

impl Default for MessageBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl Body for MessageBody {
    type Data = Bytes;
    type Error = TransportError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if let Some(trailers) = this.trailers.take() {
            return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
        }

        let Some(receiver) = this.receiver.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(receiver.poll_next_unpin(cx)) {
            Some(PayloadItem::Chunk(bytes)) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            Some(PayloadItem::Last { data, trailers }) => this.on_last(data, trailers),
            None => {
                this.finish();
                let error = this.failure.get().cloned().unwrap_or(TransportError::Abandoned);
                Poll::Ready(Some(Err(error)))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.receiver.is_none() && self.trailers.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        self.payload_size.into()
    }
}
