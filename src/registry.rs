use std::collections::HashMap;

use crate::entity::ie::{DataType, InfoElement};
use crate::error::Error;

pub const IANA_ENTERPRISE_ID: u32 = 0;

/// Private enterprise number of the expected enterprise extension.
pub const ENTERPRISE_ID: u32 = 56506;

/// Variable-length IE marker in registry tables.
const VARIABLE: u16 = 0xffff;

/******************************** IANA TABLE ********************************/

/// from http://www.iana.org/assignments/ipfix/ipfix.xml
///
/// The subset of the IANA registry this collector meters and aggregates.
#[rustfmt::skip]
const IANA_ELEMENTS: &[InfoElement] = &[
    InfoElement::new("octetDeltaCount",              1, IANA_ENTERPRISE_ID, DataType::Unsigned64, 8),
    InfoElement::new("packetDeltaCount",             2, IANA_ENTERPRISE_ID, DataType::Unsigned64, 8),
    InfoElement::new("protocolIdentifier",           4, IANA_ENTERPRISE_ID, DataType::Unsigned8, 1),
    InfoElement::new("sourceTransportPort",          7, IANA_ENTERPRISE_ID, DataType::Unsigned16, 2),
    InfoElement::new("sourceIPv4Address",            8, IANA_ENTERPRISE_ID, DataType::Ipv4Address, 4),
    InfoElement::new("destinationTransportPort",    11, IANA_ENTERPRISE_ID, DataType::Unsigned16, 2),
    InfoElement::new("destinationIPv4Address",      12, IANA_ENTERPRISE_ID, DataType::Ipv4Address, 4),
    InfoElement::new("sourceIPv6Address",           27, IANA_ENTERPRISE_ID, DataType::Ipv6Address, 16),
    InfoElement::new("destinationIPv6Address",      28, IANA_ENTERPRISE_ID, DataType::Ipv6Address, 16),
    InfoElement::new("octetTotalCount",             85, IANA_ENTERPRISE_ID, DataType::Unsigned64, 8),
    InfoElement::new("packetTotalCount",            86, IANA_ENTERPRISE_ID, DataType::Unsigned64, 8),
    InfoElement::new("exporterIPv4Address",        130, IANA_ENTERPRISE_ID, DataType::Ipv4Address, 4),
    InfoElement::new("flowEndReason",              136, IANA_ENTERPRISE_ID, DataType::Unsigned8, 1),
    InfoElement::new("observationDomainId",        149, IANA_ENTERPRISE_ID, DataType::Unsigned32, 4),
    InfoElement::new("flowStartSeconds",           150, IANA_ENTERPRISE_ID, DataType::DateTimeSeconds, 4),
    InfoElement::new("flowEndSeconds",             151, IANA_ENTERPRISE_ID, DataType::DateTimeSeconds, 4),
    InfoElement::new("originalExporterIPv4Address", 403, IANA_ENTERPRISE_ID, DataType::Ipv4Address, 4),
    InfoElement::new("originalObservationDomainId", 405, IANA_ENTERPRISE_ID, DataType::Unsigned32, 4),
];

/******************************** ENTERPRISE TABLE ********************************/

/// Kubernetes context elements registered under the enterprise number.
#[rustfmt::skip]
const ENTERPRISE_ELEMENTS: &[InfoElement] = &[
    InfoElement::new("sourcePodNamespace",        100, ENTERPRISE_ID, DataType::String, VARIABLE),
    InfoElement::new("sourcePodName",             101, ENTERPRISE_ID, DataType::String, VARIABLE),
    InfoElement::new("destinationPodNamespace",   102, ENTERPRISE_ID, DataType::String, VARIABLE),
    InfoElement::new("destinationPodName",        103, ENTERPRISE_ID, DataType::String, VARIABLE),
    InfoElement::new("sourceNodeName",            104, ENTERPRISE_ID, DataType::String, VARIABLE),
    InfoElement::new("destinationNodeName",       105, ENTERPRISE_ID, DataType::String, VARIABLE),
    InfoElement::new("destinationClusterIPv4",    106, ENTERPRISE_ID, DataType::Ipv4Address, 4),
    InfoElement::new("destinationServicePort",    107, ENTERPRISE_ID, DataType::Unsigned16, 2),
];

/******************************** REGISTRY ********************************/

/// An IE registry indexed both by (element_id, enterprise_id) and by name.
#[derive(Debug, Clone)]
pub struct Registry {
    by_id: HashMap<(u16, u32), InfoElement>,
    by_name: HashMap<&'static str, InfoElement>,
}

impl Registry {
    fn from_elements(elements: &[InfoElement]) -> Self {
        let mut by_id = HashMap::with_capacity(elements.len());
        let mut by_name = HashMap::with_capacity(elements.len());
        for element in elements {
            by_id.insert((element.element_id, element.enterprise_id), element.clone());
            by_name.insert(element.name, element.clone());
        }
        Registry { by_id, by_name }
    }

    /// The IANA registry (enterprise id 0).
    pub fn iana() -> Self {
        Registry::from_elements(IANA_ELEMENTS)
    }

    /// The registry reserved for the expected enterprise extension.
    pub fn enterprise() -> Self {
        Registry::from_elements(ENTERPRISE_ELEMENTS)
    }

    pub fn get_element_from_id(
        &self,
        element_id: u16,
        enterprise_id: u32,
    ) -> Result<&InfoElement, Error> {
        self.by_id
            .get(&(element_id, enterprise_id))
            .ok_or(Error::UnknownElement { element_id, enterprise_id })
    }

    pub fn get_info_element(&self, name: &str, enterprise_id: u32) -> Result<&InfoElement, Error> {
        match self.by_name.get(name) {
            Some(element) if element.enterprise_id == enterprise_id => Ok(element),
            _ => Err(Error::UnknownElementName { name: name.to_string(), enterprise_id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iana_lookup_by_id_and_name() {
        let iana = Registry::iana();
        let by_id = iana.get_element_from_id(7, IANA_ENTERPRISE_ID).unwrap();
        assert_eq!(by_id.name, "sourceTransportPort");
        assert_eq!(by_id.data_type, DataType::Unsigned16);

        let by_name = iana.get_info_element("sourceTransportPort", IANA_ENTERPRISE_ID).unwrap();
        assert_eq!(by_name.element_id, 7);
    }

    #[test]
    fn annotation_elements_are_present_in_iana() {
        let iana = Registry::iana();
        assert!(iana.get_info_element("originalExporterIPv4Address", IANA_ENTERPRISE_ID).is_ok());
        assert!(iana.get_info_element("originalObservationDomainId", IANA_ENTERPRISE_ID).is_ok());
    }

    #[test]
    fn enterprise_lookup() {
        let enterprise = Registry::enterprise();
        let element = enterprise.get_element_from_id(101, ENTERPRISE_ID).unwrap();
        assert_eq!(element.name, "sourcePodName");

        match enterprise.get_element_from_id(101, IANA_ENTERPRISE_ID) {
            Err(Error::UnknownElement { element_id: 101, enterprise_id: 0 }) => {}
            other => panic!("expected UnknownElement, got {:?}", other),
        }
    }

    #[test]
    fn unknown_name_is_reported() {
        let iana = Registry::iana();
        match iana.get_info_element("noSuchElement", IANA_ENTERPRISE_ID) {
            Err(Error::UnknownElementName { name, .. }) => assert_eq!(name, "noSuchElement"),
            other => panic!("expected UnknownElementName, got {:?}", other),
        }
    }
}
