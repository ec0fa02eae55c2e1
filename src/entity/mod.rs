pub mod ie;
pub mod message;
pub mod record;

pub use ie::{DataType, FieldValue, InfoElement, InfoElementWithValue};
pub use message::{Message, Set, SetHeader, SetType, MIN_DATA_SET_ID, TEMPLATE_SET_ID};
pub use record::{Record, SOURCE_POD_NAME};
