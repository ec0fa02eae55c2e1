use crate::entity::ie::InfoElementWithValue;
use crate::entity::record::Record;

/// Directional merge plus deduplication for one flow key. Must run under the
/// flow record store's write lock.
///
/// Source-side incoming records are filled from the first existing record
/// that supplies any correlate field; destination-side incoming records
/// enrich every existing source-side record instead. Afterwards the store
/// keeps only source-side records whenever at least one exists.
pub(super) fn correlate(records: &mut Vec<Record>, mut incoming: Record, correlate_fields: &[String]) {
    if incoming.is_from_source() {
        fill_incoming_from_existing(records, &mut incoming, correlate_fields);
    } else {
        fill_source_records_from_incoming(records, &incoming, correlate_fields);
    }

    // replaying an identical record must not grow the store
    if !records.iter().any(|existing| *existing == incoming) {
        records.push(incoming);
    }
    remove_duplicates(records);
}

fn fill_incoming_from_existing(records: &[Record], incoming: &mut Record, fields: &[String]) {
    for existing in records {
        let mut filled = false;
        for field in fields {
            if !incoming.has_info_element(field) {
                continue;
            }
            let value = existing
                .get_info_element_with_value(field)
                .and_then(|iev| iev.value.clone());
            if let Some(value) = value {
                if let Some(target) = incoming.get_info_element_with_value_mut(field) {
                    target.value = Some(value);
                    filled = true;
                }
            }
        }
        // one existing record is sufficient
        if filled {
            break;
        }
    }
}

fn fill_source_records_from_incoming(records: &mut [Record], incoming: &Record, fields: &[String]) {
    for existing in records.iter_mut().filter(|r| r.is_from_source()) {
        for field in fields {
            let incoming_iev = match incoming.get_info_element_with_value(field) {
                Some(iev) => iev,
                None => continue,
            };
            let value = match &incoming_iev.value {
                Some(value) => value.clone(),
                None => continue,
            };
            match existing.get_info_element_with_value_mut(field) {
                Some(target) => target.value = Some(value),
                None => existing.add_info_element(InfoElementWithValue::new(
                    incoming_iev.element.clone(),
                    Some(value),
                )),
            }
        }
    }
}

/// Once any source-side record exists under a key, destination-only records
/// are evicted.
fn remove_duplicates(records: &mut Vec<Record>) {
    if records.iter().any(|r| r.is_from_source()) {
        records.retain(|r| r.is_from_source());
    }
}
