use core::convert::TryInto;
use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use byteorder::{BigEndian, ReadBytesExt};

use crate::collector::templates::{TemplateCatalog, TemplateField};
use crate::entity::ie::{DataType, FieldValue, InfoElement, InfoElementWithValue};
use crate::entity::message::{Message, Set, SetHeader, SetType, MIN_DATA_SET_ID, TEMPLATE_SET_ID};
use crate::entity::record::Record;
use crate::error::Error;
use crate::registry::{Registry, IANA_ENTERPRISE_ID};

pub const VERSION: u16 = 10;

// enterprise bit on a template field specifier's element id
const ENTERPRISE_BIT: u16 = 0x8000;

// marker for variable-length encoding, which this collector does not accept
const VARIABLE_LENGTH: u16 = 0xffff;

/******************************** MSG HEADER ********************************/

/// from https://tools.ietf.org/html/rfc7011
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       Version Number          |            Length             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Export Time                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       Sequence Number                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                    Observation Domain ID                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug)]
pub struct MessageHeader {
    pub version: u16,       // Version of IPFIX to which this Message conforms
    pub length: u16,        // Total length of the IPFIX Message in octets, header included
    pub export_time: u32,   // Seconds since the UNIX epoch when the message left the exporter
    pub seq_number: u32,    // Incremental count modulo 2^32 of data records in this stream
    pub obs_domain_id: u32, // Observation Domain that metered the flows
}

impl MessageHeader {
    pub const SIZE: usize = 16;

    pub fn read(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < Self::SIZE {
            return Err(Error::MalformedMessage(format!(
                "Not enough space in buffer to read the IPFIX MessageHeader, required {} but received {}",
                Self::SIZE,
                buf.len()
            )));
        }

        Ok(MessageHeader {
            version: u16::from_be_bytes(buf[0..2].try_into().unwrap()),
            length: u16::from_be_bytes(buf[2..4].try_into().unwrap()),
            export_time: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            seq_number: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            obs_domain_id: u32::from_be_bytes(buf[12..16].try_into().unwrap()),
        })
    }
}

/******************************** DECODER ********************************/

/// Parses one IPFIX message off a byte buffer, resolving template fields
/// through the registries and data records through the template catalog.
pub struct Decoder {
    iana: Registry,
    enterprise: Registry,
}

impl Decoder {
    pub fn new(iana: Registry, enterprise: Registry) -> Self {
        Decoder { iana, enterprise }
    }

    /// Decodes the message starting at `buf[0]`. Never consumes more than the
    /// declared total length; fails if that length exceeds the buffer.
    pub fn decode_message(
        &self,
        catalog: &TemplateCatalog,
        buf: &[u8],
        export_address: IpAddr,
    ) -> Result<Message, Error> {
        let header = MessageHeader::read(buf)?;
        if header.version != VERSION {
            return Err(Error::MalformedMessage(format!(
                "Only IPFIX (v{}) is supported, received version {}",
                VERSION, header.version
            )));
        }

        let total_length = header.length as usize;
        if total_length > buf.len() {
            return Err(Error::MalformedMessage(format!(
                "Declared message length {} exceeds the {} byte buffer",
                total_length,
                buf.len()
            )));
        }
        if total_length < MessageHeader::SIZE + SetHeader::SIZE {
            return Err(Error::MalformedMessage(format!(
                "Declared message length {} cannot hold a set", total_length
            )));
        }
        let buf = &buf[..total_length];

        let set_header = SetHeader::read(&buf[MessageHeader::SIZE..])?;
        let content_start = MessageHeader::SIZE + SetHeader::SIZE;
        if (set_header.length as usize) < SetHeader::SIZE
            || content_start + set_header.content_size() > buf.len()
        {
            return Err(Error::MalformedMessage(format!(
                "Set length {} does not fit the message", set_header.length
            )));
        }
        let content = &buf[content_start..content_start + set_header.content_size()];

        let (set_type, records) = match set_header.id {
            TEMPLATE_SET_ID => (
                SetType::Template,
                self.decode_template_set(catalog, header.obs_domain_id, content)?,
            ),
            id if id >= MIN_DATA_SET_ID => (
                SetType::Data,
                self.decode_data_set(catalog, header.obs_domain_id, id, content)?,
            ),
            id => return Err(Error::UnsupportedSet(id)),
        };

        Ok(Message {
            version: header.version,
            length: header.length,
            export_time: header.export_time,
            seq_number: header.seq_number,
            obs_domain_id: header.obs_domain_id,
            set: Set { header: set_header, set_type, records },
            export_address,
        })
    }

    /// Template Record: template-id(2), field-count(2), then field specifiers.
    /// A set top bit on the element id announces a 4-byte enterprise id; the
    /// bit is cleared to obtain the true element id.
    fn decode_template_set(
        &self,
        catalog: &TemplateCatalog,
        obs_domain_id: u32,
        buf: &[u8],
    ) -> Result<Vec<Record>, Error> {
        let mut rdr = Cursor::new(buf);
        let mut records = Vec::new();

        while remaining(&rdr) >= 4 {
            let template_id = read_u16(&mut rdr)?;
            let field_count = read_u16(&mut rdr)?;
            if field_count == 0 {
                return Err(Error::MalformedMessage(format!(
                    "Template {} declares no fields", template_id
                )));
            }

            let mut fields = Vec::with_capacity(field_count as usize);
            for _ in 0..field_count {
                let element_id = read_u16(&mut rdr)?;
                let length = read_u16(&mut rdr)?;
                if length == VARIABLE_LENGTH {
                    return Err(Error::MalformedMessage(format!(
                        "Variable-length field {} in template {} is not supported",
                        element_id & !ENTERPRISE_BIT,
                        template_id
                    )));
                }

                let element = if element_id & ENTERPRISE_BIT != 0 {
                    let enterprise_id = read_u32(&mut rdr)?;
                    self.enterprise
                        .get_element_from_id(element_id ^ ENTERPRISE_BIT, enterprise_id)?
                        .clone()
                } else {
                    self.iana
                        .get_element_from_id(element_id, IANA_ENTERPRISE_ID)?
                        .clone()
                };
                fields.push(TemplateField { element, length });
            }

            catalog.add(obs_domain_id, template_id, fields.clone());
            records.push(Record::new_template(
                template_id,
                fields.into_iter().map(|f| f.element).collect(),
            ));
        }

        Ok(records)
    }

    /// Data records are positional: exactly the template's element length per
    /// field, no delimiters, repeated until the set is exhausted.
    fn decode_data_set(
        &self,
        catalog: &TemplateCatalog,
        obs_domain_id: u32,
        template_id: u16,
        buf: &[u8],
    ) -> Result<Vec<Record>, Error> {
        let fields = catalog.get(obs_domain_id, template_id)?;
        let record_length: usize = fields.iter().map(|f| f.length as usize).sum();
        if record_length == 0 || buf.len() < record_length {
            return Err(Error::MalformedMessage(format!(
                "Data set for template {} is shorter than one {} byte record",
                template_id, record_length
            )));
        }

        let mut records = Vec::new();
        let mut offset = 0;
        while buf.len() - offset >= record_length {
            let mut elements = Vec::with_capacity(fields.len());
            for field in &fields {
                let end = offset + field.length as usize;
                let value = decode_field_value(&field.element, &buf[offset..end])?;
                elements.push(InfoElementWithValue::new(field.element.clone(), Some(value)));
                offset = end;
            }
            records.push(Record::new_data(template_id, elements));
        }
        // anything left is set padding

        Ok(records)
    }
}

/// Interprets `buf` by the element's abstract data type.
fn decode_field_value(element: &InfoElement, buf: &[u8]) -> Result<FieldValue, Error> {
    let mismatch = || Error::TypeMismatch { name: element.name.to_string() };

    let value = match element.data_type {
        DataType::Unsigned8 => {
            let [v]: [u8; 1] = buf.try_into().map_err(|_| mismatch())?;
            FieldValue::U8(v)
        }
        DataType::Unsigned16 => {
            FieldValue::U16(u16::from_be_bytes(buf.try_into().map_err(|_| mismatch())?))
        }
        DataType::Unsigned32 => {
            FieldValue::U32(u32::from_be_bytes(buf.try_into().map_err(|_| mismatch())?))
        }
        DataType::Unsigned64 => {
            FieldValue::U64(u64::from_be_bytes(buf.try_into().map_err(|_| mismatch())?))
        }
        DataType::Ipv4Address => {
            let octets: [u8; 4] = buf.try_into().map_err(|_| mismatch())?;
            FieldValue::Ipv4(Ipv4Addr::from(octets))
        }
        DataType::Ipv6Address => {
            let octets: [u8; 16] = buf.try_into().map_err(|_| mismatch())?;
            FieldValue::Ipv6(Ipv6Addr::from(octets))
        }
        DataType::String => {
            FieldValue::Str(String::from_utf8(buf.to_vec()).map_err(|_| mismatch())?)
        }
        DataType::OctetArray => FieldValue::Bytes(buf.to_vec()),
        DataType::DateTimeSeconds => {
            FieldValue::Seconds(u32::from_be_bytes(buf.try_into().map_err(|_| mismatch())?))
        }
    };
    Ok(value)
}

#[inline]
fn remaining(rdr: &Cursor<&[u8]>) -> usize {
    rdr.get_ref().len() - rdr.position() as usize
}

fn read_u16(rdr: &mut Cursor<&[u8]>) -> Result<u16, Error> {
    rdr.read_u16::<BigEndian>()
        .map_err(|_| Error::MalformedMessage("Unexpected end of buffer".to_string()))
}

fn read_u32(rdr: &mut Cursor<&[u8]>) -> Result<u32, Error> {
    rdr.read_u32::<BigEndian>()
        .map_err(|_| Error::MalformedMessage("Unexpected end of buffer".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ie::FieldValue;
    use std::net::Ipv4Addr;

    fn decoder() -> Decoder {
        Decoder::new(Registry::iana(), Registry::enterprise())
    }

    fn exporter() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    /// Template for {sourceIPv4Address, destinationIPv4Address,
    /// protocolIdentifier, sourceTransportPort, destinationTransportPort,
    /// sourcePodName(pen 56506, 5 bytes)} under obs domain 1, template 256.
    fn template_packet() -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::new();
        buf.extend_from_slice(&10u16.to_be_bytes()); // version
        buf.extend_from_slice(&52u16.to_be_bytes()); // total length
        buf.extend_from_slice(&1_600_000_000u32.to_be_bytes()); // export time
        buf.extend_from_slice(&1u32.to_be_bytes()); // seq number
        buf.extend_from_slice(&1u32.to_be_bytes()); // obs domain id
        buf.extend_from_slice(&2u16.to_be_bytes()); // set id: template
        buf.extend_from_slice(&36u16.to_be_bytes()); // set length
        buf.extend_from_slice(&256u16.to_be_bytes()); // template id
        buf.extend_from_slice(&6u16.to_be_bytes()); // field count
        for (id, len) in [(8u16, 4u16), (12, 4), (4, 1), (7, 2), (11, 2)] {
            buf.extend_from_slice(&id.to_be_bytes());
            buf.extend_from_slice(&len.to_be_bytes());
        }
        // sourcePodName with the enterprise bit set
        buf.extend_from_slice(&(101u16 | 0x8000).to_be_bytes());
        buf.extend_from_slice(&5u16.to_be_bytes());
        buf.extend_from_slice(&56506u32.to_be_bytes());
        assert_eq!(buf.len(), 52);
        buf
    }

    /// Data record (10.0.0.1, 10.0.0.2, 6, 1234, 80, "pod-a") for template 256.
    fn data_packet() -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::new();
        buf.extend_from_slice(&10u16.to_be_bytes());
        buf.extend_from_slice(&38u16.to_be_bytes()); // total length
        buf.extend_from_slice(&1_600_000_100u32.to_be_bytes());
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&256u16.to_be_bytes()); // set id: data
        buf.extend_from_slice(&22u16.to_be_bytes()); // set length
        buf.extend_from_slice(&[10, 0, 0, 1]);
        buf.extend_from_slice(&[10, 0, 0, 2]);
        buf.push(6);
        buf.extend_from_slice(&1234u16.to_be_bytes());
        buf.extend_from_slice(&80u16.to_be_bytes());
        buf.extend_from_slice(b"pod-a");
        assert_eq!(buf.len(), 38);
        buf
    }

    #[test]
    fn template_then_data() {
        let decoder = decoder();
        let catalog = TemplateCatalog::new();

        let msg = decoder
            .decode_message(&catalog, &template_packet(), exporter())
            .unwrap();
        assert_eq!(msg.set.set_type, SetType::Template);
        assert_eq!(msg.set.records.len(), 1);
        let names: Vec<&str> = msg.set.records[0]
            .elements()
            .iter()
            .map(|iev| iev.element.name)
            .collect();
        assert_eq!(
            names,
            [
                "sourceIPv4Address",
                "destinationIPv4Address",
                "protocolIdentifier",
                "sourceTransportPort",
                "destinationTransportPort",
                "sourcePodName"
            ]
        );

        let msg = decoder
            .decode_message(&catalog, &data_packet(), exporter())
            .unwrap();
        assert_eq!(msg.set.set_type, SetType::Data);
        assert_eq!(msg.set.records.len(), 1);
        let record = &msg.set.records[0];

        // every template field appears, in template order
        let names: Vec<&str> = record.elements().iter().map(|iev| iev.element.name).collect();
        assert_eq!(
            names,
            [
                "sourceIPv4Address",
                "destinationIPv4Address",
                "protocolIdentifier",
                "sourceTransportPort",
                "destinationTransportPort",
                "sourcePodName"
            ]
        );
        assert_eq!(
            record.get_info_element_with_value("sourceIPv4Address").unwrap().value,
            Some(FieldValue::Ipv4(Ipv4Addr::new(10, 0, 0, 1)))
        );
        assert_eq!(
            record.get_info_element_with_value("sourceTransportPort").unwrap().value,
            Some(FieldValue::U16(1234))
        );
        assert_eq!(
            record.get_info_element_with_value("sourcePodName").unwrap().value,
            Some(FieldValue::Str("pod-a".to_string()))
        );
    }

    #[test]
    fn enterprise_bit_resolves_in_enterprise_registry() {
        let decoder = decoder();
        let catalog = TemplateCatalog::new();
        let msg = decoder
            .decode_message(&catalog, &template_packet(), exporter())
            .unwrap();

        let pod = msg.set.records[0]
            .get_info_element_with_value("sourcePodName")
            .unwrap();
        assert_eq!(pod.element.element_id, 101);
        assert_eq!(pod.element.enterprise_id, 56506);

        // the catalog kept the wire length, not the registry marker
        let fields = catalog.get(1, 256).unwrap();
        assert_eq!(fields[5].length, 5);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut packet = template_packet();
        packet[1] = 9;
        let err = decoder()
            .decode_message(&TemplateCatalog::new(), &packet, exporter())
            .unwrap_err();
        assert!(matches!(err, Error::MalformedMessage(_)));
    }

    #[test]
    fn rejects_length_past_buffer() {
        let packet = template_packet();
        let err = decoder()
            .decode_message(&TemplateCatalog::new(), &packet[..packet.len() - 1], exporter())
            .unwrap_err();
        assert!(matches!(err, Error::MalformedMessage(_)));
    }

    #[test]
    fn rejects_options_template_set() {
        let mut packet = template_packet();
        packet[17] = 3; // set id 2 -> 3
        let err = decoder()
            .decode_message(&TemplateCatalog::new(), &packet, exporter())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedSet(3)));
    }

    #[test]
    fn data_without_template_is_unknown() {
        let err = decoder()
            .decode_message(&TemplateCatalog::new(), &data_packet(), exporter())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownTemplate { obs_domain_id: 1, template_id: 256 }
        ));
    }

    #[test]
    fn unknown_element_fails_the_message() {
        let mut buf: Vec<u8> = Vec::new();
        buf.extend_from_slice(&10u16.to_be_bytes());
        buf.extend_from_slice(&28u16.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&2u16.to_be_bytes());
        buf.extend_from_slice(&12u16.to_be_bytes());
        buf.extend_from_slice(&256u16.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&9999u16.to_be_bytes()); // not registered
        buf.extend_from_slice(&2u16.to_be_bytes());

        let err = decoder()
            .decode_message(&TemplateCatalog::new(), &buf, exporter())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownElement { element_id: 9999, .. }));
    }

    #[test]
    fn expired_template_yields_unknown_template() {
        use std::time::Duration;

        let decoder = decoder();
        let catalog = TemplateCatalog::with_ttl(Duration::from_millis(50));
        decoder
            .decode_message(&catalog, &template_packet(), exporter())
            .unwrap();

        std::thread::sleep(Duration::from_millis(150));
        let err = decoder
            .decode_message(&catalog, &data_packet(), exporter())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTemplate { .. }));
    }

    #[test]
    fn decodes_every_record_in_a_data_set() {
        let decoder = decoder();
        let catalog = TemplateCatalog::new();
        decoder
            .decode_message(&catalog, &template_packet(), exporter())
            .unwrap();

        // two 18-byte records in one set
        let mut buf: Vec<u8> = Vec::new();
        buf.extend_from_slice(&10u16.to_be_bytes());
        buf.extend_from_slice(&56u16.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&256u16.to_be_bytes());
        buf.extend_from_slice(&40u16.to_be_bytes());
        for port in [1234u16, 5678] {
            buf.extend_from_slice(&[10, 0, 0, 1]);
            buf.extend_from_slice(&[10, 0, 0, 2]);
            buf.push(6);
            buf.extend_from_slice(&port.to_be_bytes());
            buf.extend_from_slice(&80u16.to_be_bytes());
            buf.extend_from_slice(b"pod-a");
        }
        assert_eq!(buf.len(), 56);

        let msg = decoder.decode_message(&catalog, &buf, exporter()).unwrap();
        assert_eq!(msg.set.records.len(), 2);
        assert_eq!(
            msg.set.records[1]
                .get_info_element_with_value("sourceTransportPort")
                .unwrap()
                .value,
            Some(FieldValue::U16(5678))
        );
    }
}
