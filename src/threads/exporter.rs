use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info};
use num_traits::FromPrimitive;

use crate::aggregator::AggregationProcess;
use crate::entity::ie::FlowEndReason;
use crate::entity::record::Record;

/// Periodically walks the flow record store and logs every correlated flow.
pub fn export(ap: &Arc<AggregationProcess>, interval: Duration) {
    loop {
        thread::sleep(interval);

        let result = ap.for_all_records_do(|flow_key, records| {
            for record in records {
                match end_reason(record) {
                    Some(reason) => info!("{} [{:?}] : {}", flow_key, reason, record),
                    None => info!("{} : {}", flow_key, record),
                }
            }
            Ok(())
        });
        if let Err(e) = result {
            error!("Flow export failed : {}", e);
        }
    }
}

fn end_reason(record: &Record) -> Option<FlowEndReason> {
    record
        .get_info_element_with_value("flowEndReason")
        .and_then(|iev| iev.value.as_ref())
        .and_then(|value| value.as_u8())
        .and_then(FlowEndReason::from_u8)
}
