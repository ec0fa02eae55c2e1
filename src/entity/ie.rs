use num_derive::FromPrimitive;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/******************************** DATA TYPE ********************************/

/// from https://www.iana.org/assignments/ipfix/ipfix.xhtml#ipfix-information-element-data-types
///
/// Only the abstract data types carried by the records this library decodes.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
#[repr(u8)]
pub enum DataType {
    OctetArray = 0,
    Unsigned8 = 1,
    Unsigned16 = 2,
    Unsigned32 = 3,
    Unsigned64 = 4,
    String = 13,
    DateTimeSeconds = 14,
    Ipv4Address = 18,
    Ipv6Address = 19,
}

/******************************** INFORMATION ELEMENT ********************************/

/// One catalog entry of an IE registry. Identity is (element_id, enterprise_id);
/// entries are immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoElement {
    pub name: &'static str,
    pub element_id: u16,   // id within the enterprise namespace
    pub enterprise_id: u32, // 0 = IANA
    pub data_type: DataType,
    pub length: u16, // registry length in octets, the wire template may override
}

impl InfoElement {
    pub const fn new(
        name: &'static str,
        element_id: u16,
        enterprise_id: u32,
        data_type: DataType,
        length: u16,
    ) -> Self {
        InfoElement { name, element_id, enterprise_id, data_type, length }
    }
}

impl fmt::Display for InfoElement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({}/{})", self.name, self.element_id, self.enterprise_id)
    }
}

/******************************** FIELD VALUE ********************************/

/// A decoded IE value, one variant per supported abstract data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Str(String),
    Bytes(Vec<u8>),
    Seconds(u32), // seconds since the UNIX epoch
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::U8(v) => v.fmt(f),
            FieldValue::U16(v) => v.fmt(f),
            FieldValue::U32(v) => v.fmt(f),
            FieldValue::U64(v) => v.fmt(f),
            FieldValue::Ipv4(v) => v.fmt(f),
            FieldValue::Ipv6(v) => v.fmt(f),
            FieldValue::Str(v) => v.fmt(f),
            FieldValue::Bytes(v) => write!(f, "{:02X?}", v),
            FieldValue::Seconds(v) => write!(f, "{}s", v),
        }
    }
}

impl FieldValue {
    pub fn as_u16(&self) -> Option<u16> {
        match self {
            FieldValue::U16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<u8> {
        match self {
            FieldValue::U8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        match self {
            FieldValue::Ipv4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ipv6(&self) -> Option<Ipv6Addr> {
        match self {
            FieldValue::Ipv6(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

/******************************** FLOW END REASON ********************************/

/// from http://www.iana.org/assignments/ipfix/ipfix.xml
#[derive(FromPrimitive, PartialEq, Eq, Debug, Copy, Clone)]
#[repr(u8)]
pub enum FlowEndReason {
    IdleTimeout = 1,
    ActiveTimeout = 2,
    EndOfFlowDetected = 3,
    ForcedEnd = 4,
    LackOfResources = 5,
}

/******************************** VALUE-BOUND IE ********************************/

/// An IE paired with its decoded value. Template records carry `None` values,
/// data records carry one value per schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoElementWithValue {
    pub element: InfoElement,
    pub value: Option<FieldValue>,
}

impl InfoElementWithValue {
    pub fn new(element: InfoElement, value: Option<FieldValue>) -> Self {
        InfoElementWithValue { element, value }
    }
}

impl fmt::Display for InfoElementWithValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}: {}", self.element.name, v),
            None => write!(f, "{}: -", self.element.name),
        }
    }
}
