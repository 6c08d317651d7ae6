//! Address registry and request/reply.

use std::{
    any::{TypeId, type_name},
    collections::HashMap,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::RwLock;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::{BusError, RegisterError},
    mailbox::{self, CallToken, Envelope, MailboxOptions},
    postbox::{Postbox, Request},
};

/// A bound address: the mailbox sender plus the request type it accepts
struct Binding {
    sender: mpsc::UnboundedSender<Envelope>,
    request_type: TypeId,
    request_type_name: &'static str,
    task: JoinHandle<()>,
}

struct BusInner {
    bindings: RwLock<HashMap<&'static str, Binding>>,
    next_call: AtomicU64,
}

/// The process-local message bus.
///
/// Cloning is cheap; every clone talks to the same registry. Workers receive a
/// clone at construction, bind their addresses on start and unbind them on
/// stop.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                bindings: RwLock::new(HashMap::new()),
                next_call: AtomicU64::new(1),
            }),
        }
    }

    /// Bind `handler` to the postbox's address with default mailbox options.
    ///
    /// Must be called from within a tokio runtime: the mailbox loop is
    /// spawned immediately.
    pub fn register<R, F, Fut>(&self, postbox: &Postbox<R>, handler: F) -> Result<(), RegisterError>
    where
        R: Request,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Response, R::Error>> + Send + 'static,
    {
        self.register_with(postbox, MailboxOptions::default(), handler)
    }

    /// Bind `handler` to the postbox's address.
    ///
    /// Fails with [`RegisterError::AddressInUse`] if the address is already
    /// bound; the existing handler stays in place.
    pub fn register_with<R, F, Fut>(
        &self,
        postbox: &Postbox<R>,
        options: MailboxOptions,
        handler: F,
    ) -> Result<(), RegisterError>
    where
        R: Request,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Response, R::Error>> + Send + 'static,
    {
        let address = postbox.address();
        let mut bindings = self.inner.bindings.write();

        if bindings.contains_key(address) {
            warn!(address, "Refusing to bind a second handler");
            return Err(RegisterError::AddressInUse(address.to_string()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let task = mailbox::spawn::<R, F, Fut>(address, receiver, options, handler);

        bindings.insert(
            address,
            Binding {
                sender,
                request_type: TypeId::of::<R>(),
                request_type_name: type_name::<R>(),
                task,
            },
        );

        info!(
            address,
            request = type_name::<R>(),
            max_in_flight = options.max_in_flight,
            "Handler registered"
        );

        Ok(())
    }

    /// Unbind an address and wait for its mailbox to drain.
    ///
    /// Requests already queued are still answered; new requests fail with
    /// [`BusError::NoHandlerBound`]. Returns `false` if nothing was bound.
    pub async fn deregister(&self, address: &str) -> bool {
        let binding = self.inner.bindings.write().remove(address);

        match binding {
            Some(binding) => {
                drain(address, binding).await;
                true
            }
            None => false,
        }
    }

    /// Unbind every address and wait for all mailboxes to drain.
    pub async fn shutdown(&self) {
        let bindings: Vec<_> = self.inner.bindings.write().drain().collect();

        for (address, binding) in bindings {
            drain(address, binding).await;
        }
    }

    /// Check whether an address currently has a handler
    pub fn is_bound(&self, address: &str) -> bool {
        self.inner.bindings.read().contains_key(address)
    }

    /// All bound addresses, sorted
    pub fn addresses(&self) -> Vec<&'static str> {
        let mut addresses: Vec<_> = self.inner.bindings.read().keys().copied().collect();
        addresses.sort_unstable();
        addresses
    }

    /// Send `payload` to the handler bound at the postbox's address and wait
    /// up to `timeout` for its reply.
    ///
    /// A timeout abandons only this caller's wait; the handler runs to
    /// completion and its reply is discarded.
    pub async fn request<R: Request>(
        &self,
        postbox: &Postbox<R>,
        payload: R,
        timeout: Duration,
    ) -> Result<R::Response, BusError<R::Error>> {
        let address = postbox.address();

        let sender = {
            let bindings = self.inner.bindings.read();
            let binding = bindings
                .get(address)
                .ok_or_else(|| BusError::NoHandlerBound(address.to_string()))?;

            if binding.request_type != TypeId::of::<R>() {
                return Err(BusError::PayloadMismatch {
                    address: address.to_string(),
                    expected: binding.request_type_name,
                    actual: type_name::<R>(),
                });
            }

            binding.sender.clone()
        };

        let call = CallToken(self.inner.next_call.fetch_add(1, Ordering::Relaxed));
        let (reply_tx, reply_rx) = oneshot::channel();

        debug!(address, %call, "Sending request");

        let envelope = Envelope {
            call,
            payload: Box::new(payload),
            reply: reply_tx,
        };

        // the mailbox may have closed between lookup and send
        if sender.send(envelope).is_err() {
            return Err(BusError::NoHandlerBound(address.to_string()));
        }
        drop(sender);

        let reply = match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                warn!(address, %call, "Handler dropped request without replying");
                return Err(BusError::Dropped(address.to_string()));
            }
            Err(_) => {
                warn!(address, %call, timeout_ms = timeout.as_millis() as u64, "Request timed out");
                return Err(BusError::Timeout {
                    address: address.to_string(),
                    timeout,
                });
            }
        };

        match reply.downcast::<Result<R::Response, R::Error>>() {
            Ok(outcome) => (*outcome).map_err(|cause| BusError::HandlerFailed {
                address: address.to_string(),
                cause,
            }),
            Err(_) => Err(BusError::PayloadMismatch {
                address: address.to_string(),
                expected: type_name::<Result<R::Response, R::Error>>(),
                actual: "unknown reply",
            }),
        }
    }
}

async fn drain(address: &str, binding: Binding) {
    let Binding { sender, task, .. } = binding;
    drop(sender);

    if let Err(e) = task.await {
        warn!(address, error = %e, "Mailbox loop ended abnormally");
    }

    info!(address, "Handler deregistered");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use futures::future::join_all;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Echo {
        n: u32,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct EchoRes {
        n: u32,
    }

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("refused {0}")]
    struct Refused(u32);

    impl Request for Echo {
        type Response = EchoRes;
        type Error = Refused;
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Other;

    impl Request for Other {
        type Response = EchoRes;
        type Error = Refused;
    }

    const ECHO: Postbox<Echo> = Postbox::new("test.echo");
    const SLOW: Postbox<Echo> = Postbox::new("test.slow");

    const WAIT: Duration = Duration::from_secs(1);

    fn echo_bus() -> Bus {
        let bus = Bus::new();
        bus.register(&ECHO, |req: Echo| async move { Ok(EchoRes { n: req.n }) })
            .unwrap();
        bus
    }

    #[tokio::test]
    async fn test_request_reaches_registered_handler() {
        let bus = echo_bus();

        let res = bus.request(&ECHO, Echo { n: 7 }, WAIT).await.unwrap();
        assert_eq!(res, EchoRes { n: 7 });
        assert!(bus.is_bound("test.echo"));
        assert_eq!(bus.addresses(), vec!["test.echo"]);
    }

    #[tokio::test]
    async fn test_register_twice_fails_and_keeps_first_handler() {
        let bus = echo_bus();

        let result = bus.register(&ECHO, |_req: Echo| async move { Err(Refused(0)) });
        assert_eq!(
            result,
            Err(RegisterError::AddressInUse("test.echo".to_string()))
        );

        // the first handler still answers
        let res = bus.request(&ECHO, Echo { n: 3 }, WAIT).await.unwrap();
        assert_eq!(res.n, 3);
    }

    #[tokio::test]
    async fn test_unbound_address_fails_without_waiting() {
        let bus = Bus::new();

        let result = tokio::time::timeout(
            Duration::from_millis(100),
            bus.request(&ECHO, Echo { n: 1 }, Duration::from_secs(3600)),
        )
        .await
        .expect("request to an unbound address must not hang");

        assert!(matches!(result, Err(BusError::NoHandlerBound(addr)) if addr == "test.echo"));
    }

    #[tokio::test]
    async fn test_handler_error_is_propagated_verbatim() {
        let bus = Bus::new();
        bus.register(&ECHO, |req: Echo| async move { Err(Refused(req.n)) })
            .unwrap();

        let err = bus.request(&ECHO, Echo { n: 42 }, WAIT).await.unwrap_err();
        assert_eq!(err.cause(), Some(&Refused(42)));
        assert_eq!(err.address(), "test.echo");
        assert_eq!(err.to_string(), "refused 42");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_does_not_cancel_handler() {
        let bus = Bus::new();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        bus.register(&SLOW, move |req: Echo| {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(EchoRes { n: req.n })
            }
        })
        .unwrap();

        let err = bus.request(&SLOW, Echo { n: 1 }, WAIT).await.unwrap_err();
        assert!(matches!(err, BusError::Timeout { timeout, .. } if timeout == WAIT));
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_concurrent_callers_receive_only_their_own_reply() {
        let bus = Bus::new();
        bus.register_with(
            &ECHO,
            MailboxOptions::default().with_max_in_flight(8),
            |req: Echo| async move {
                // finish out of order
                tokio::time::sleep(Duration::from_millis(u64::from(20 - req.n % 20))).await;
                Ok(EchoRes { n: req.n * 2 })
            },
        )
        .unwrap();

        let calls = (0..64).map(|n| {
            let bus = bus.clone();
            tokio::spawn(async move { (n, bus.request(&ECHO, Echo { n }, WAIT).await) })
        });

        for joined in join_all(calls).await {
            let (n, res) = joined.unwrap();
            assert_eq!(res.unwrap(), EchoRes { n: n * 2 });
        }
    }

    #[tokio::test]
    async fn test_mailbox_is_fifo_per_sender() {
        let bus = Bus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        bus.register(&ECHO, move |req: Echo| {
            log.lock().push(req.n);
            async move { Ok(EchoRes { n: req.n }) }
        })
        .unwrap();

        let calls: Vec<_> = (0..20)
            .map(|n| bus.request(&ECHO, Echo { n }, WAIT))
            .collect();
        for res in join_all(calls).await {
            res.unwrap();
        }

        assert_eq!(*seen.lock(), (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_slow_address_does_not_starve_another() {
        let bus = echo_bus();
        bus.register(&SLOW, |req: Echo| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(EchoRes { n: req.n })
        })
        .unwrap();

        let stuck = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.request(&SLOW, Echo { n: 0 }, Duration::from_secs(120)).await })
        };

        let res = bus.request(&ECHO, Echo { n: 9 }, WAIT).await.unwrap();
        assert_eq!(res.n, 9);

        stuck.abort();
    }

    #[tokio::test]
    async fn test_deregister_unbinds_address() {
        let bus = echo_bus();

        assert!(bus.deregister("test.echo").await);
        assert!(!bus.is_bound("test.echo"));
        assert!(!bus.deregister("test.echo").await);

        let result = bus.request(&ECHO, Echo { n: 1 }, WAIT).await;
        assert!(matches!(result, Err(BusError::NoHandlerBound(_))));

        // the address can be bound again
        bus.register(&ECHO, |req: Echo| async move { Ok(EchoRes { n: req.n + 1 }) })
            .unwrap();
        assert_eq!(bus.request(&ECHO, Echo { n: 1 }, WAIT).await.unwrap().n, 2);
    }

    #[tokio::test]
    async fn test_deregister_answers_queued_requests() {
        let bus = Bus::new();
        bus.register(&SLOW, |req: Echo| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(EchoRes { n: req.n })
        })
        .unwrap();

        let pending: Vec<_> = (0..3)
            .map(|n| {
                let bus = bus.clone();
                tokio::spawn(async move { bus.request(&SLOW, Echo { n }, WAIT).await })
            })
            .collect();

        // let every request reach the mailbox before unbinding
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        bus.shutdown().await;

        for handle in pending {
            assert!(handle.await.unwrap().is_ok());
        }
        assert!(bus.addresses().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_handler_reports_dropped_and_keeps_serving() {
        let bus = Bus::new();
        bus.register(&ECHO, |req: Echo| async move {
            if req.n == 0 {
                panic!("handler bug");
            }
            Ok(EchoRes { n: req.n })
        })
        .unwrap();

        let err = bus.request(&ECHO, Echo { n: 0 }, WAIT).await.unwrap_err();
        assert!(matches!(err, BusError::Dropped(addr) if addr == "test.echo"));

        let res = bus.request(&ECHO, Echo { n: 5 }, WAIT).await.unwrap();
        assert_eq!(res.n, 5);
    }

    #[tokio::test]
    async fn test_request_type_mismatch_is_rejected() {
        let bus = echo_bus();
        let other: Postbox<Other> = Postbox::new("test.echo");

        let err = bus.request(&other, Other, WAIT).await.unwrap_err();
        match err {
            BusError::PayloadMismatch {
                address,
                expected,
                actual,
            } => {
                assert_eq!(address, "test.echo");
                assert!(expected.ends_with("Echo"));
                assert!(actual.ends_with("Other"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
