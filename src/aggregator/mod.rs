use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, RwLock};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{error, warn};

use crate::entity::ie::{FieldValue, InfoElementWithValue};
use crate::entity::message::{Message, SetType};
use crate::entity::record::Record;
use crate::error::Error;
use crate::registry::{Registry, IANA_ENTERPRISE_ID};

mod correlate;
mod worker;

pub mod flow_key;

pub use flow_key::FlowKey;

use worker::Worker;

const ORIGINAL_EXPORTER_ADDRESS: &str = "originalExporterIPv4Address";
const ORIGINAL_OBS_DOMAIN_ID: &str = "originalObservationDomainId";

/// Configuration of one aggregation process.
pub struct AggregatorConfig {
    /// Decoded messages, e.g. from a collecting process. Backpressure is the
    /// caller's choice of channel capacity.
    pub message_rx: Receiver<Message>,
    pub worker_count: usize,
    /// IE names to be filled while correlating.
    pub correlate_fields: Vec<String>,
}

/// Consumes decoded messages concurrently, extracts the flow key from each
/// data record and correlates source-side with destination-side records into
/// one list per key.
pub struct AggregationProcess {
    // each connection 5-tuple mapped to its records
    flow_key_record_map: RwLock<HashMap<FlowKey, Vec<Record>>>,
    message_rx: Receiver<Message>,
    worker_count: usize,
    workers: Mutex<Vec<Worker>>,
    correlate_fields: Vec<String>,
    iana: Registry,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl AggregationProcess {
    pub fn new(config: AggregatorConfig) -> Result<Self, Error> {
        if config.worker_count == 0 {
            return Err(Error::ConfigInvalid("worker count cannot be 0".to_string()));
        }

        // the exporter annotation cannot work without these two
        let iana = Registry::iana();
        iana.get_info_element(ORIGINAL_EXPORTER_ADDRESS, IANA_ENTERPRISE_ID)?;
        iana.get_info_element(ORIGINAL_OBS_DOMAIN_ID, IANA_ENTERPRISE_ID)?;

        let (stop_tx, stop_rx) = bounded(1);
        Ok(AggregationProcess {
            flow_key_record_map: RwLock::new(HashMap::new()),
            message_rx: config.message_rx,
            worker_count: config.worker_count,
            workers: Mutex::new(Vec::new()),
            correlate_fields: config.correlate_fields,
            iana,
            stop_tx,
            stop_rx,
        })
    }

    /// Spawns the workers and blocks until [`stop`] is called.
    ///
    /// [`stop`]: AggregationProcess::stop
    pub fn start(self: &Arc<Self>) {
        {
            let mut workers = self.workers.lock().expect("worker list mutex poisoned");
            for id in 0..self.worker_count {
                let ap = self.clone();
                workers.push(Worker::spawn(id, self.message_rx.clone(), move |message| {
                    ap.aggregate_msg_by_flow_key(message)
                }));
            }
        }
        let _ = self.stop_rx.recv();
    }

    /// Halts every worker cooperatively, then releases `start`. Messages
    /// still pending in the channel are dropped.
    pub fn stop(&self) {
        let workers: Vec<Worker> = {
            let mut guard = self.workers.lock().expect("worker list mutex poisoned");
            guard.drain(..).collect()
        };
        for worker in workers {
            worker.stop();
        }
        let _ = self.stop_tx.try_send(());
    }

    /// Annotates every record of the message with the exporter information,
    /// then correlates each data record into the flow record store. Template
    /// sets end after annotation.
    pub fn aggregate_msg_by_flow_key(&self, mut message: Message) -> Result<(), Error> {
        self.add_original_exporter_info(&mut message)?;
        if message.set.set_type() == SetType::Template {
            return Ok(());
        }

        for record in message.set.records {
            match FlowKey::from_record(&record) {
                Ok(flow_key) => self.correlate_records(flow_key, record),
                // an incomplete record is skipped, the rest of the message survives
                Err(e) => warn!("Skipping record without a flow key : {}", e),
            }
        }
        Ok(())
    }

    /// Runs `callback` for every (flow key, records) pair under the read
    /// lock. The callback must not touch the write lock. Its first error
    /// aborts the iteration and is returned verbatim.
    pub fn for_all_records_do<F>(&self, mut callback: F) -> Result<(), Error>
    where
        F: FnMut(&FlowKey, &[Record]) -> Result<(), Error>,
    {
        let map = self
            .flow_key_record_map
            .read()
            .expect("flow record map lock poisoned");
        for (flow_key, records) in map.iter() {
            if let Err(e) = callback(flow_key, records) {
                error!("Callback execution failed for flow with key {} : {}", flow_key, e);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn delete_flow_key(&self, flow_key: &FlowKey) {
        self.flow_key_record_map
            .write()
            .expect("flow record map lock poisoned")
            .remove(flow_key);
    }

    fn correlate_records(&self, flow_key: FlowKey, record: Record) {
        let mut map = self
            .flow_key_record_map
            .write()
            .expect("flow record map lock poisoned");
        let records = map.entry(flow_key).or_default();
        correlate::correlate(records, record, &self.correlate_fields);
    }

    /// Appends `originalExporterIPv4Address` and `originalObservationDomainId`
    /// to every record: schema-only on template sets, populated on data sets.
    /// Idempotent per pass, a record already carrying the IE is left alone.
    fn add_original_exporter_info(&self, message: &mut Message) -> Result<(), Error> {
        let set_type = message.set.set_type();
        let exporter = match message.export_address {
            IpAddr::V4(addr) => addr,
            IpAddr::V6(addr) => addr.to_ipv4().unwrap_or(Ipv4Addr::UNSPECIFIED),
        };

        for record in message.set.records.iter_mut() {
            if !record.has_info_element(ORIGINAL_EXPORTER_ADDRESS) {
                let element = self
                    .iana
                    .get_info_element(ORIGINAL_EXPORTER_ADDRESS, IANA_ENTERPRISE_ID)?
                    .clone();
                let value = match set_type {
                    SetType::Template => None,
                    SetType::Data => Some(FieldValue::Ipv4(exporter)),
                };
                record.add_info_element(InfoElementWithValue::new(element, value));
            }

            if !record.has_info_element(ORIGINAL_OBS_DOMAIN_ID) {
                let element = self
                    .iana
                    .get_info_element(ORIGINAL_OBS_DOMAIN_ID, IANA_ENTERPRISE_ID)?
                    .clone();
                let value = match set_type {
                    SetType::Template => None,
                    SetType::Data => Some(FieldValue::U32(message.obs_domain_id)),
                };
                record.add_info_element(InfoElementWithValue::new(element, value));
            }
        }
        Ok(())
    }
}
