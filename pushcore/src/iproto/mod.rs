pub mod consts;
pub mod error;
pub mod request;
pub mod response;
pub mod schema;

pub use error::{ProtocolError, Result};
pub use request::Request;
pub use response::{Response, ResponseHeader, ServerError};
