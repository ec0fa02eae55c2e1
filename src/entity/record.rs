use std::fmt;

use crate::entity::ie::{InfoElement, InfoElementWithValue};

/// Name of the IE whose non-empty value marks a record as exported from the
/// source side of the flow.
pub const SOURCE_POD_NAME: &str = "sourcePodName";

/******************************** RECORD ********************************/

/// A template or data record: an ordered sequence of value-bound IEs plus the
/// template id it was defined by or decoded against.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Template {
        template_id: u16,
        elements: Vec<InfoElementWithValue>,
    },
    Data {
        template_id: u16,
        elements: Vec<InfoElementWithValue>,
    },
}

impl Record {
    pub fn new_template(template_id: u16, fields: Vec<InfoElement>) -> Self {
        Record::Template {
            template_id,
            elements: fields
                .into_iter()
                .map(|e| InfoElementWithValue::new(e, None))
                .collect(),
        }
    }

    pub fn new_data(template_id: u16, elements: Vec<InfoElementWithValue>) -> Self {
        Record::Data { template_id, elements }
    }

    pub fn template_id(&self) -> u16 {
        match self {
            Record::Template { template_id, .. } | Record::Data { template_id, .. } => *template_id,
        }
    }

    pub fn elements(&self) -> &[InfoElementWithValue] {
        match self {
            Record::Template { elements, .. } | Record::Data { elements, .. } => elements,
        }
    }

    fn elements_mut(&mut self) -> &mut Vec<InfoElementWithValue> {
        match self {
            Record::Template { elements, .. } | Record::Data { elements, .. } => elements,
        }
    }

    /// Looks up a value-bound IE by element name.
    pub fn get_info_element_with_value(&self, name: &str) -> Option<&InfoElementWithValue> {
        self.elements().iter().find(|iev| iev.element.name == name)
    }

    pub fn get_info_element_with_value_mut(
        &mut self,
        name: &str,
    ) -> Option<&mut InfoElementWithValue> {
        self.elements_mut()
            .iter_mut()
            .find(|iev| iev.element.name == name)
    }

    pub fn has_info_element(&self, name: &str) -> bool {
        self.get_info_element_with_value(name).is_some()
    }

    /// Appends a value-bound IE at the end of the record.
    pub fn add_info_element(&mut self, iev: InfoElementWithValue) {
        self.elements_mut().push(iev);
    }

    /// A record carrying a non-empty `sourcePodName` was exported from the
    /// source side of the flow.
    pub fn is_from_source(&self) -> bool {
        match self.get_info_element_with_value(SOURCE_POD_NAME) {
            Some(iev) => match &iev.value {
                Some(v) => v.as_str().map_or(false, |s| !s.is_empty()),
                None => false,
            },
            None => false,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self {
            Record::Template { .. } => "template",
            Record::Data { .. } => "data",
        };
        write!(f, "{} record (id {}):", kind, self.template_id())?;
        for iev in self.elements() {
            write!(f, " {},", iev)?;
        }
        Ok(())
    }
}
