use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error};

use crate::entity::message::Message;
use crate::error::Error;

/// One symmetric, stateless aggregation worker. Observes its stop signal
/// between messages, never mid-message.
pub(super) struct Worker {
    id: usize,
    stop_tx: Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl Worker {
    pub(super) fn spawn<F>(id: usize, messages: Receiver<Message>, aggregate: F) -> Self
    where
        F: Fn(Message) -> Result<(), Error> + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            debug!("Aggregation worker {} started", id);
            loop {
                crossbeam_channel::select! {
                    recv(stop_rx) -> _ => break,
                    recv(messages) -> message => match message {
                        Ok(message) => {
                            if let Err(e) = aggregate(message) {
                                error!("Failed to aggregate message : {}", e);
                            }
                        }
                        // every sender is gone
                        Err(_) => break,
                    },
                }
            }
            debug!("Aggregation worker {} stopped", id);
        });

        Worker { id, stop_tx, handle }
    }

    pub(super) fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            error!("Aggregation worker {} panicked", self.id);
        }
    }
}
