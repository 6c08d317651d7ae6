//! Per-address mailbox loops.

use std::{any::Any, fmt, future::Future, panic::AssertUnwindSafe};

use futures::{FutureExt, StreamExt};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error};

use crate::postbox::Request;

/// Type-erased reply: always a boxed `Result<R::Response, R::Error>`
pub(crate) type Reply = Box<dyn Any + Send>;

/// Per-call token correlating a request with its reply channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CallToken(pub(crate) u64);

impl fmt::Display for CallToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A request in flight, as it sits in a mailbox
pub(crate) struct Envelope {
    pub call: CallToken,
    pub payload: Box<dyn Any + Send>,
    pub reply: oneshot::Sender<Reply>,
}

/// Mailbox settings chosen at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxOptions {
    /// Handler invocations allowed to run at once. Messages are still taken
    /// from the mailbox in FIFO order; with more than one in flight their
    /// replies may complete out of order.
    pub max_in_flight: usize,
}

impl Default for MailboxOptions {
    fn default() -> Self {
        Self { max_in_flight: 1 }
    }
}

impl MailboxOptions {
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }
}

/// Spawn the loop draining one address's mailbox.
///
/// The loop ends once every sender is gone and the queue is empty, so
/// messages queued before deregistration are still answered.
pub(crate) fn spawn<R, F, Fut>(
    address: &'static str,
    receiver: mpsc::UnboundedReceiver<Envelope>,
    options: MailboxOptions,
    handler: F,
) -> JoinHandle<()>
where
    R: Request,
    F: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R::Response, R::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        UnboundedReceiverStream::new(receiver)
            .for_each_concurrent(options.max_in_flight.max(1), |envelope| {
                deliver::<R, F, Fut>(address, envelope, &handler)
            })
            .await;

        debug!(address, "Mailbox closed");
    })
}

async fn deliver<R, F, Fut>(address: &'static str, envelope: Envelope, handler: &F)
where
    R: Request,
    F: Fn(R) -> Fut,
    Fut: Future<Output = Result<R::Response, R::Error>>,
{
    let Envelope {
        call,
        payload,
        reply,
    } = envelope;

    let request = match payload.downcast::<R>() {
        Ok(request) => *request,
        Err(_) => {
            // the bus checks request types before enqueueing
            error!(address, %call, "Mailbox received a foreign payload");
            return;
        }
    };

    debug!(address, %call, ?request, "Handling request");

    let outcome = match AssertUnwindSafe(async { handler(request).await })
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            error!(address, %call, "Handler panicked, request dropped");
            return;
        }
    };

    if let Err(ref e) = outcome {
        debug!(address, %call, error = %e, "Handler failed");
    }

    if reply.send(Box::new(outcome)).is_err() {
        debug!(address, %call, "Caller stopped waiting, reply discarded");
    }
}
