use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    oneshot,
};

/// Reply-to handle passed along with an actor request.
pub struct Rto<T> {
    tx: oneshot::Sender<anyhow::Result<T>>,
}

impl<T> Rto<T> {
    pub fn new() -> (Self, oneshot::Receiver<anyhow::Result<T>>) {
        let (tx, rx) = oneshot::channel();
        (Rto { tx }, rx)
    }

    /// Send a result back to the requester. A requester that stopped waiting is ignored.
    pub fn reply(self, result: anyhow::Result<T>) {
        let _ = self.tx.send(result);
    }
}

/// Cloneable handle used to send requests to an actor task.
pub struct ActorRef<T> {
    tx: UnboundedSender<T>,
}

impl<T> Clone for ActorRef<T> {
    fn clone(&self) -> Self {
        ActorRef {
            tx: self.tx.clone(),
        }
    }
}

impl<T> ActorRef<T> {
    pub fn new() -> (Self, UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ActorRef { tx }, rx)
    }

    pub fn send(&self, msg: T) -> anyhow::Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| anyhow::anyhow!("Actor is no longer running"))
    }
}

/// Send a request to an actor and wait for its reply.
///
/// `send_message!(actor, Request, Variant, args...)` builds `Request::Variant(args..., rto)`
/// and evaluates to the `anyhow::Result` the actor replied with.
#[macro_export]
macro_rules! send_message {
    ($actor:expr, $kind:ident, $variant:ident $(, $arg:expr)*) => {{
        let (rto, rx) = $crate::actor::Rto::new();
        match $actor.send($kind::$variant($($arg,)* rto)) {
            Ok(()) => match rx.await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("Actor dropped the request")),
            },
            Err(e) => Err(e),
        }
    }};
}
