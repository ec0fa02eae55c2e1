use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error};
use serde::Deserialize;

use crate::entity::message::Message;
use crate::error::Error;
use crate::registry::Registry;
use crate::threads::listener;

pub mod decoder;
pub mod templates;

pub use decoder::Decoder;
pub use templates::{TemplateCatalog, TemplateField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

/// Configuration of one collecting process.
pub struct CollectorConfig {
    pub address: SocketAddr,
    pub transport: Transport,
    pub max_buffer_size: u16,
    pub template_ttl: Duration,
    pub iana_registry: Registry,
    pub enterprise_registry: Registry,
}

/// Parses incoming IPFIX messages off the transport, maintains the template
/// catalog and forwards every decoded message downstream.
pub struct CollectingProcess {
    decoder: Decoder,
    catalog: TemplateCatalog,
    address: SocketAddr,
    transport: Transport,
    max_buffer_size: u16,
    // every message decoded so far, in arrival order
    messages: Mutex<Vec<Message>>,
    sender: Sender<Message>,
    stopped: AtomicBool,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl CollectingProcess {
    pub fn new(config: CollectorConfig, sender: Sender<Message>) -> Result<Self, Error> {
        if config.max_buffer_size == 0 {
            return Err(Error::ConfigInvalid("max buffer size cannot be 0".to_string()));
        }

        // templates only age out over unreliable transports
        let catalog = match config.transport {
            Transport::Udp => TemplateCatalog::with_ttl(config.template_ttl),
            Transport::Tcp => TemplateCatalog::new(),
        };
        let (stop_tx, stop_rx) = bounded(1);

        Ok(CollectingProcess {
            decoder: Decoder::new(config.iana_registry, config.enterprise_registry),
            catalog,
            address: config.address,
            transport: config.transport,
            max_buffer_size: config.max_buffer_size,
            messages: Mutex::new(Vec::new()),
            sender,
            stopped: AtomicBool::new(false),
            stop_tx,
            stop_rx,
        })
    }

    /// Brings up the transport listener and blocks until [`stop`] is called.
    ///
    /// [`stop`]: CollectingProcess::stop
    pub fn start(self: &Arc<Self>) {
        let handle = {
            let cp = self.clone();
            match self.transport {
                Transport::Udp => thread::spawn(move || {
                    if let Err(e) = listener::listen_udp(&cp) {
                        error!("UDP listener on {} failed : {}", cp.address, e);
                    }
                }),
                Transport::Tcp => thread::spawn(move || {
                    if let Err(e) = listener::listen_tcp(&cp) {
                        error!("TCP listener on {} failed : {}", cp.address, e);
                    }
                }),
            }
        };

        let _ = self.stop_rx.recv();
        let _ = handle.join();
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        let _ = self.stop_tx.try_send(());
    }

    /// Decodes one message unit, appends it to the message list and forwards
    /// it to the downstream channel. Decode failures are returned to the
    /// caller, which logs and drops them; the collector keeps running.
    pub fn process_message(&self, buf: &[u8], exporter: IpAddr) -> Result<(), Error> {
        let message = self.decoder.decode_message(&self.catalog, buf, exporter)?;
        debug!("Decoded {}", message);

        self.messages
            .lock()
            .expect("message list mutex poisoned")
            .push(message.clone());
        // the receiver side may already be torn down during shutdown
        let _ = self.sender.send(message);
        Ok(())
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn max_buffer_size(&self) -> u16 {
        self.max_buffer_size
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    pub fn templates(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().expect("message list mutex poisoned").len()
    }
}
