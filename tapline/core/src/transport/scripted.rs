//! Scripted Transport
//!
//! In-process transport that plays back a fixed list of body chunks, or
//! forwards whatever a test pushes through a channel. Used to drive sessions
//! without a backend.
//!
//! # Usage
//!
//! ```ignore
//! let transport = ScriptedTransport::from_chunks([
//!     "data: {\"content\":\"Hel\"}\n\n",
//!     "data: {\"done\":true}\n\n",
//! ]);
//!
//! let handle = StreamSession::open(Arc::new(transport), request, variant, handler, options);
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::traits::{ByteStream, StreamRequest, Transport, TransportError};

/// Default buffer of [`ScriptedTransport::channel`]
const CHANNEL_CAPACITY: usize = 64;

/// One step of a scripted response body
#[derive(Clone, Debug)]
pub enum ScriptStep {
    /// Deliver a body chunk
    Chunk(Bytes),
    /// Fail the read; nothing after this step is delivered
    Fail(TransportError),
    /// Stop delivering and never reach end-of-body
    Stall,
}

impl ScriptStep {
    /// Chunk step from anything byte-like
    pub fn chunk(bytes: impl Into<Bytes>) -> Self {
        Self::Chunk(bytes.into())
    }
}

/// Where the body comes from
enum Body {
    /// Replayed on every open
    Script(Vec<ScriptStep>),
    /// Handed out on the first open
    Channel(Option<mpsc::Receiver<Result<Bytes, TransportError>>>),
}

/// Transport backed by a script or a channel
pub struct ScriptedTransport {
    body: Mutex<Body>,
    /// Returned from `open` instead of a body, if set
    open_error: Option<TransportError>,
    /// Every request passed to `open`, in order
    requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedTransport {
    /// Play back `steps` on every open
    #[must_use]
    pub fn from_steps(steps: Vec<ScriptStep>) -> Self {
        Self {
            body: Mutex::new(Body::Script(steps)),
            open_error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Play back `chunks` and then end the body
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self::from_steps(chunks.into_iter().map(ScriptStep::chunk).collect())
    }

    /// Fail every open with `error`
    #[must_use]
    pub fn failing(error: TransportError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::from_steps(Vec::new())
        }
    }

    /// Transport fed from a channel
    ///
    /// The body ends when the sender is dropped. Only the first open gets the
    /// body; later opens fail with [`TransportError::Connect`].
    #[must_use]
    pub fn channel() -> (Self, mpsc::Sender<Result<Bytes, TransportError>>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let transport = Self {
            body: Mutex::new(Body::Channel(Some(rx))),
            open_error: None,
            requests: Mutex::new(Vec::new()),
        };
        (transport, tx)
    }

    /// Requests seen so far
    #[must_use]
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().clone()
    }
}

/// Turn a script into a body stream
fn play(steps: &[ScriptStep]) -> ByteStream {
    let mut items = Vec::with_capacity(steps.len());
    let mut stall = false;

    for step in steps {
        match step {
            ScriptStep::Chunk(bytes) => items.push(Ok(bytes.clone())),
            ScriptStep::Fail(error) => {
                items.push(Err(error.clone()));
                break;
            }
            ScriptStep::Stall => {
                stall = true;
                break;
            }
        }
    }

    let head = stream::iter(items);
    if stall {
        Box::pin(head.chain(stream::pending()))
    } else {
        Box::pin(head)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError> {
        self.requests.lock().push(request.clone());

        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }

        let mut body = self.body.lock();
        match &mut *body {
            Body::Script(steps) => Ok(play(steps)),
            Body::Channel(rx) => match rx.take() {
                Some(rx) => Ok(Box::pin(ReceiverStream::new(rx))),
                None => Err(TransportError::Connect(
                    "scripted channel already opened".to_string(),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(stream: ByteStream) -> Vec<Result<Bytes, TransportError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_replays_chunks() {
        let transport = ScriptedTransport::from_chunks(["a", "b"]);
        let request = StreamRequest::empty("/x");

        for _ in 0..2 {
            let items = collect(transport.open(&request).await.unwrap()).await;
            assert_eq!(
                items,
                vec![Ok(Bytes::from_static(b"a")), Ok(Bytes::from_static(b"b"))]
            );
        }
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_fail_ends_body() {
        let transport = ScriptedTransport::from_steps(vec![
            ScriptStep::chunk("a"),
            ScriptStep::Fail(TransportError::Read("reset".to_string())),
            ScriptStep::chunk("never"),
        ]);
        let items = collect(transport.open(&StreamRequest::empty("/x")).await.unwrap()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], Err(TransportError::Read("reset".to_string())));
    }

    #[test]
    fn test_stall_never_ends() {
        let transport =
            ScriptedTransport::from_steps(vec![ScriptStep::chunk("a"), ScriptStep::Stall]);
        let mut stream =
            tokio_test::block_on(transport.open(&StreamRequest::empty("/x"))).unwrap();

        let mut next = tokio_test::task::spawn(stream.next());
        assert!(tokio_test::assert_ready!(next.poll()).is_some());
        drop(next);

        let mut next = tokio_test::task::spawn(stream.next());
        tokio_test::assert_pending!(next.poll());
    }

    #[tokio::test]
    async fn test_failing_open() {
        let transport = ScriptedTransport::failing(TransportError::Connect("refused".to_string()));
        let result = transport.open(&StreamRequest::empty("/x")).await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_channel_single_open() {
        let (transport, tx) = ScriptedTransport::channel();
        let request = StreamRequest::empty("/x");
        let stream = transport.open(&request).await.unwrap();

        tx.send(Ok(Bytes::from_static(b"hi"))).await.unwrap();
        drop(tx);
        assert_eq!(collect(stream).await, vec![Ok(Bytes::from_static(b"hi"))]);

        assert!(transport.open(&request).await.is_err());
    }
}
