use core::convert::TryInto;
use std::fmt;
use std::net::IpAddr;

use crate::entity::record::Record;
use crate::error::Error;

/******************************** SET HEADER ********************************/

/// from https://tools.ietf.org/html/rfc7011
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          Set ID               |          Length               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SetHeader {
    pub id: u16,     // Identifies the Set: 2 = template set, >= 256 = data set
    pub length: u16, // Total length of the Set in octets, including this header
}

impl SetHeader {
    pub const SIZE: usize = 4;

    pub fn read(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < Self::SIZE {
            return Err(Error::MalformedMessage(format!(
                "Not enough space in buffer to read the IPFIX SetHeader, required {} but received {}",
                Self::SIZE,
                buf.len()
            )));
        }

        Ok(SetHeader {
            id: u16::from_be_bytes(buf[0..2].try_into().unwrap()),
            length: u16::from_be_bytes(buf[2..4].try_into().unwrap()),
        })
    }

    #[inline]
    pub fn content_size(&self) -> usize {
        self.length as usize - Self::SIZE
    }
}

/******************************** SET ********************************/

pub const TEMPLATE_SET_ID: u16 = 2;
pub const MIN_DATA_SET_ID: u16 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetType {
    Template,
    Data,
}

/// One set of records. This library decodes exactly one set per message.
#[derive(Debug, Clone, PartialEq)]
pub struct Set {
    pub header: SetHeader,
    pub set_type: SetType,
    pub records: Vec<Record>,
}

impl Set {
    pub fn set_type(&self) -> SetType {
        self.set_type
    }
}

/******************************** MESSAGE ********************************/

/// A decoded IPFIX message: header fields, the single set it carried and the
/// address of the exporter it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub version: u16,      // always 10 once decoded
    pub length: u16,       // total message length in octets as declared on the wire
    pub export_time: u32,  // seconds since the UNIX epoch at the exporter
    pub seq_number: u32,   // per-stream data record counter modulo 2^32
    pub obs_domain_id: u32, // observation domain that metered the flows
    pub set: Set,
    pub export_address: IpAddr, // exporter source address on the transport socket
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "msg from {}: export_time: {}, seq_number: {}, obs_domain_id: {}, set id {} with {} record(s)",
            self.export_address,
            self.export_time,
            self.seq_number,
            self.obs_domain_id,
            self.set.header.id,
            self.set.records.len()
        )
    }
}
