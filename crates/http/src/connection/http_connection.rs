use std::future;
use std::net::IpAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tracing::{debug, error, info, warn};

use crate::codec::RequestParser;
use crate::handler::Dispatcher;
use crate::protocol::{HttpError, Outbound, ParseError, Request, SendError, Transport, TransportReceiver};

/// Initial capacity of the read buffer
const READ_BUFFER_SIZE: usize = 8 * 1024;

const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n";

/// A single HTTP exchange over a pair of async streams.
///
/// The connection owns the socket. It feeds incoming bytes through a
/// [`RequestParser`] into a [`Request`], hands the completed request to a
/// [`Dispatcher`], and copies everything queued on the request's
/// [`Transport`] to the writer until the transport is closed.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
pub struct HttpConnection<R, W> {
    reader: R,
    writer: W,
    remote_ip: IpAddr,
    buffer: BytesMut,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, remote_ip: IpAddr) -> Self {
        Self { reader, writer, remote_ip, buffer: BytesMut::with_capacity(READ_BUFFER_SIZE) }
    }

    pub async fn process<D>(mut self, dispatcher: Arc<D>) -> Result<(), HttpError>
    where
        D: Dispatcher + ?Sized,
    {
        let (transport, receiver) = Transport::channel();
        let mut request = Request::new(transport, self.remote_ip);

        if !self.read_request(&mut request).await? {
            dispatcher.on_connection_closed();
            return Ok(());
        }

        request.attach_response(dispatcher.response_defaults());
        self.do_process(request, receiver, dispatcher.as_ref()).await
    }

    /// Reads until the request is complete; returns `false` on a premature EOF.
    async fn read_request(&mut self, request: &mut Request) -> Result<bool, HttpError> {
        let mut parser = RequestParser::new();
        loop {
            let read = self.reader.read_buf(&mut self.buffer).await.map_err(ParseError::io)?;
            if read == 0 {
                if parser.is_idle() {
                    debug!("peer closed the connection without sending a request");
                } else {
                    info!("cant read more request, break this connection down");
                }
                return Ok(false);
            }

            let data = self.buffer.split();
            if let Err(e) = parser.feed(&data, request) {
                error!("can't receive next request, cause {}", e);
                self.writer.write_all(BAD_REQUEST).await.map_err(SendError::io)?;
                self.writer.shutdown().await.map_err(SendError::io)?;
                return Err(e.into());
            }

            if parser.is_complete() {
                return Ok(true);
            }
        }
    }

    async fn do_process<D>(&mut self, request: Request, mut receiver: TransportReceiver, dispatcher: &D) -> Result<(), HttpError>
    where
        D: Dispatcher + ?Sized,
    {
        let cancellation = request.cancellation().clone();
        let timeout = dispatcher.request_timeout();

        tokio::pin! {
            let dispatch_future = dispatcher.dispatch(request);
            let deadline = async move {
                match timeout {
                    Some(timeout) => tokio::time::sleep(timeout).await,
                    None => future::pending().await,
                }
            };
        }

        let mut dispatched = false;
        loop {
            select! {
                // write out queued frames before polling the dispatcher again
                biased;
                outbound = receiver.recv() => match outbound {
                    Some(Outbound::Data(bytes)) => {
                        self.writer.write_all(&bytes).await.map_err(SendError::io)?;
                    }
                    // closed explicitly, or every transport handle was dropped
                    Some(Outbound::Close) | None => break,
                },
                _ = &mut dispatch_future, if !dispatched => {
                    dispatched = true;
                }
                _ = &mut deadline, if !cancellation.is_cancelled() => {
                    warn!(?timeout, "request timed out, cancelling");
                    cancellation.cancel();
                }
            }
        }

        self.writer.flush().await.map_err(SendError::io)?;
        self.writer.shutdown().await.map_err(SendError::io)?;

        // the request may still have bookkeeping to do after it was finished
        if !dispatched {
            dispatch_future.await;
        }
        Ok(())
    }
}
