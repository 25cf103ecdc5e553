pub mod builder;
mod decoder;
mod encoder;
pub mod error;
pub mod marshal;
pub mod millitime;
pub mod record;

pub use builder::TupleBuilder;
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{Result, TupleError};
pub use marshal::{Tuple, marshal, marshal_to, unmarshal, unmarshal_array};
pub use millitime::MilliTime;
pub use record::{DeviceRecord, ResultCode, ResultRecord, SubscriptionRecord};
