use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use log::warn;

use crate::entity::record::Record;
use crate::error::Error;

/// Canonical 5-tuple identifying one conversation. Addresses are the standard
/// textual forms (IPv4 dotted-decimal, IPv6 RFC 5952), which makes equality
/// well-defined across every comparison; a key is never mixed-family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub source_address: String,
    pub destination_address: String,
    pub protocol: u8,
    pub source_port: u16,
    pub destination_port: u16,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} proto {}",
            self.source_address,
            self.source_port,
            self.destination_address,
            self.destination_port,
            self.protocol
        )
    }
}

impl FlowKey {
    /// Derives the flow key from a data record, preferring the IPv4 address
    /// pair and falling back to IPv6.
    pub fn from_record(record: &Record) -> Result<Self, Error> {
        let source_port = required_u16(record, "sourceTransportPort")?;
        let destination_port = required_u16(record, "destinationTransportPort")?;
        let protocol = required_u8(record, "protocolIdentifier")?;
        let (source_address, destination_address) = addresses(record)?;

        Ok(FlowKey {
            source_address,
            destination_address,
            protocol,
            source_port,
            destination_port,
        })
    }
}

fn required_u16(record: &Record, name: &'static str) -> Result<u16, Error> {
    match record.get_info_element_with_value(name) {
        Some(iev) => match &iev.value {
            Some(value) => value
                .as_u16()
                .ok_or_else(|| Error::TypeMismatch { name: name.to_string() }),
            None => Err(Error::FlowKeyIncomplete { name }),
        },
        None => Err(Error::FlowKeyIncomplete { name }),
    }
}

fn required_u8(record: &Record, name: &'static str) -> Result<u8, Error> {
    match record.get_info_element_with_value(name) {
        Some(iev) => match &iev.value {
            Some(value) => value
                .as_u8()
                .ok_or_else(|| Error::TypeMismatch { name: name.to_string() }),
            None => Err(Error::FlowKeyIncomplete { name }),
        },
        None => Err(Error::FlowKeyIncomplete { name }),
    }
}

fn optional_v4(record: &Record, name: &str) -> Result<Option<Ipv4Addr>, Error> {
    match record.get_info_element_with_value(name) {
        Some(iev) => match &iev.value {
            Some(value) => value
                .as_ipv4()
                .map(Some)
                .ok_or_else(|| Error::TypeMismatch { name: name.to_string() }),
            None => Ok(None),
        },
        None => Ok(None),
    }
}

fn optional_v6(record: &Record, name: &str) -> Result<Option<Ipv6Addr>, Error> {
    match record.get_info_element_with_value(name) {
        Some(iev) => match &iev.value {
            Some(value) => value
                .as_ipv6()
                .map(Some)
                .ok_or_else(|| Error::TypeMismatch { name: name.to_string() }),
            None => Ok(None),
        },
        None => Ok(None),
    }
}

/// IPv4 pair wins when complete. A direction that only offers the other
/// family than its counterpart gets a warning and its IPv6 value discarded,
/// which then fails the extraction as incomplete.
fn addresses(record: &Record) -> Result<(String, String), Error> {
    let src4 = optional_v4(record, "sourceIPv4Address")?;
    let dst4 = optional_v4(record, "destinationIPv4Address")?;

    match (src4, dst4) {
        (Some(src), Some(dst)) => Ok((src.to_string(), dst.to_string())),
        (Some(_), None) => {
            if optional_v6(record, "destinationIPv6Address")?.is_some() {
                warn!("Two ip versions (IPv4 and IPv6) are not supported for one flow key");
            }
            Err(Error::FlowKeyIncomplete { name: "destinationIPv4Address" })
        }
        (None, Some(_)) => {
            if optional_v6(record, "sourceIPv6Address")?.is_some() {
                warn!("Two ip versions (IPv4 and IPv6) are not supported for one flow key");
            }
            Err(Error::FlowKeyIncomplete { name: "sourceIPv4Address" })
        }
        (None, None) => {
            let src = optional_v6(record, "sourceIPv6Address")?
                .ok_or(Error::FlowKeyIncomplete { name: "sourceIPv6Address" })?;
            let dst = optional_v6(record, "destinationIPv6Address")?
                .ok_or(Error::FlowKeyIncomplete { name: "destinationIPv6Address" })?;
            Ok((src.to_string(), dst.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ie::{DataType, FieldValue, InfoElement, InfoElementWithValue};

    fn iev(name: &'static str, element_id: u16, data_type: DataType, value: FieldValue) -> InfoElementWithValue {
        InfoElementWithValue::new(InfoElement::new(name, element_id, 0, data_type, 0), Some(value))
    }

    fn five_tuple_elements() -> Vec<InfoElementWithValue> {
        vec![
            iev("sourceTransportPort", 7, DataType::Unsigned16, FieldValue::U16(1234)),
            iev("destinationTransportPort", 11, DataType::Unsigned16, FieldValue::U16(80)),
            iev("protocolIdentifier", 4, DataType::Unsigned8, FieldValue::U8(6)),
        ]
    }

    #[test]
    fn ipv4_key() {
        let mut elements = five_tuple_elements();
        elements.push(iev(
            "sourceIPv4Address",
            8,
            DataType::Ipv4Address,
            FieldValue::Ipv4(Ipv4Addr::new(10, 0, 0, 1)),
        ));
        elements.push(iev(
            "destinationIPv4Address",
            12,
            DataType::Ipv4Address,
            FieldValue::Ipv4(Ipv4Addr::new(10, 0, 0, 2)),
        ));
        let key = FlowKey::from_record(&Record::new_data(256, elements)).unwrap();
        assert_eq!(
            key,
            FlowKey {
                source_address: "10.0.0.1".to_string(),
                destination_address: "10.0.0.2".to_string(),
                protocol: 6,
                source_port: 1234,
                destination_port: 80,
            }
        );
    }

    #[test]
    fn ipv6_key_is_canonical() {
        let mut elements = five_tuple_elements();
        elements.push(iev(
            "sourceIPv6Address",
            27,
            DataType::Ipv6Address,
            FieldValue::Ipv6("2001:db8:0:0:0:0:0:1".parse().unwrap()),
        ));
        elements.push(iev(
            "destinationIPv6Address",
            28,
            DataType::Ipv6Address,
            FieldValue::Ipv6("0:0:0:0:0:0:0:1".parse().unwrap()),
        ));
        let key = FlowKey::from_record(&Record::new_data(256, elements)).unwrap();
        assert_eq!(key.source_address, "2001:db8::1");
        assert_eq!(key.destination_address, "::1");
    }

    #[test]
    fn missing_port_is_incomplete() {
        let mut elements = five_tuple_elements();
        elements.remove(0);
        let err = FlowKey::from_record(&Record::new_data(256, elements)).unwrap_err();
        assert!(matches!(
            err,
            Error::FlowKeyIncomplete { name: "sourceTransportPort" }
        ));
    }

    #[test]
    fn mistyped_protocol_is_a_mismatch() {
        let mut elements = five_tuple_elements();
        elements[2] = iev("protocolIdentifier", 4, DataType::Unsigned8, FieldValue::U16(6));
        let err = FlowKey::from_record(&Record::new_data(256, elements)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn mixed_families_discard_the_ipv6_side() {
        let mut elements = five_tuple_elements();
        elements.push(iev(
            "sourceIPv4Address",
            8,
            DataType::Ipv4Address,
            FieldValue::Ipv4(Ipv4Addr::new(10, 0, 0, 1)),
        ));
        elements.push(iev(
            "destinationIPv6Address",
            28,
            DataType::Ipv6Address,
            FieldValue::Ipv6("0:0:0:0:0:0:0:1".parse().unwrap()),
        ));
        let err = FlowKey::from_record(&Record::new_data(256, elements)).unwrap_err();
        assert!(matches!(
            err,
            Error::FlowKeyIncomplete { name: "destinationIPv4Address" }
        ));
    }
}
