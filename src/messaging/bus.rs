use crate::domain::message::{Channel, Message};
use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Consumer bound to one channel.
///
/// An `Err` return means the handler faulted; the bus then routes the case to
/// the dead-letter channel so it still terminates.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Result<()>;
}

pub type MessageHandlerArc = Arc<dyn MessageHandler>;

/// Cloneable, non-blocking entry point of the bus.
#[derive(Clone)]
pub struct Publisher {
    tx: mpsc::UnboundedSender<Message>,
}

impl Publisher {
    /// Hands `message` to the handler of `message.channel` without waiting for it.
    pub fn publish(&self, message: Message) -> Result<()> {
        debug!(key = %message.key, channel = %message.channel, "publish");
        self.tx.send(message).map_err(|_| AdapterError::BusClosed)
    }
}

/// Collects the channel-to-handler bindings before the bus accepts traffic.
///
/// Handlers that publish follow-up messages are constructed with
/// [`ChannelBusBuilder::publisher`], so the builder owns the queue from the start.
pub struct ChannelBusBuilder {
    handlers: HashMap<Channel, MessageHandlerArc>,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Default for ChannelBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBusBuilder {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handlers: HashMap::new(),
            tx,
            rx,
        }
    }

    pub fn publisher(&self) -> Publisher {
        Publisher {
            tx: self.tx.clone(),
        }
    }

    pub fn register(&mut self, channel: Channel, handler: MessageHandlerArc) -> Result<()> {
        if self.handlers.contains_key(&channel) {
            return Err(AdapterError::DuplicateHandler(channel));
        }
        self.handlers.insert(channel, handler);
        Ok(())
    }

    /// Fails unless every channel has exactly one handler.
    pub fn build(self) -> Result<ChannelBus> {
        if let Some(channel) = Channel::ALL
            .into_iter()
            .find(|channel| !self.handlers.contains_key(channel))
        {
            return Err(AdapterError::MissingHandler(channel));
        }
        Ok(ChannelBus {
            handlers: Arc::new(self.handlers),
            publisher: Publisher { tx: self.tx },
            rx: self.rx,
        })
    }
}

/// Validated bus, ready to dispatch.
pub struct ChannelBus {
    handlers: Arc<HashMap<Channel, MessageHandlerArc>>,
    publisher: Publisher,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl ChannelBus {
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Runs the dispatch loop until `shutdown` flips to `true`.
    ///
    /// Every message is handled on its own task, so handlers for different
    /// keys run in parallel.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let ChannelBus {
            handlers,
            publisher,
            mut rx,
        } = self;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    received = rx.recv() => {
                        let Some(message) = received else { break };
                        tokio::spawn(dispatch(Arc::clone(&handlers), publisher.clone(), message));
                    }
                }
            }
            debug!("channel bus stopped");
        })
    }
}

async fn dispatch(
    handlers: Arc<HashMap<Channel, MessageHandlerArc>>,
    publisher: Publisher,
    message: Message,
) {
    let channel = message.channel;
    let key = message.key.clone();
    let Some(handler) = handlers.get(&channel) else {
        error!(key = %key, channel = %channel, "no handler bound");
        return;
    };

    if let Err(err) = handler.handle(message).await {
        if channel == Channel::Dlq {
            error!(key = %key, error = %err, "dead-letter handler failed");
            return;
        }
        warn!(key = %key, channel = %channel, error = %err, "handler faulted, routing to dlq");
        if let Err(err) = publisher.publish(Message::fault(key.clone(), err.to_string())) {
            error!(key = %key, error = %err, "could not route fault");
        }
    }
}
