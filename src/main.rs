use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;
use log::{info, warn};

use ipfix_collector::aggregator::{AggregationProcess, AggregatorConfig};
use ipfix_collector::collector::{CollectingProcess, CollectorConfig};
use ipfix_collector::registry::Registry;
use ipfix_collector::settings::Settings;
use ipfix_collector::{logger, threads};

fn main() {
    // read config from file and environment
    let settings = match Settings::init() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings : {}", e);
            process::exit(1);
        }
    };

    logger::init(&settings.log.level);
    warn! {"Starting ipfix-collector"}

    let address = match settings.collector.address.parse() {
        Ok(address) => address,
        Err(e) => {
            eprintln!("Invalid collector address {} : {}", settings.collector.address, e);
            process::exit(1);
        }
    };

    let (message_tx, message_rx) = unbounded();

    let collector = CollectingProcess::new(
        CollectorConfig {
            address,
            transport: settings.collector.transport,
            max_buffer_size: settings.collector.max_buffer_size,
            template_ttl: Duration::from_secs(settings.collector.template_ttl),
            iana_registry: Registry::iana(),
            enterprise_registry: Registry::enterprise(),
        },
        message_tx,
    )
    .map(Arc::new)
    .unwrap_or_else(|e| {
        eprintln!("Failed to create the collecting process : {}", e);
        process::exit(1);
    });

    let aggregator = AggregationProcess::new(AggregatorConfig {
        message_rx,
        worker_count: settings.aggregator.workers,
        correlate_fields: settings.aggregator.correlate_fields.clone(),
    })
    .map(Arc::new)
    .unwrap_or_else(|e| {
        eprintln!("Failed to create the aggregation process : {}", e);
        process::exit(1);
    });

    {
        let ap = aggregator.clone();
        thread::spawn(move || ap.start());
    }
    {
        let ap = aggregator.clone();
        let interval = Duration::from_secs(settings.aggregator.export_interval);
        thread::spawn(move || threads::exporter::export(&ap, interval));
    }

    collector.start();

    aggregator.stop();
    info! {"Closing ipfix-collector"}
}
