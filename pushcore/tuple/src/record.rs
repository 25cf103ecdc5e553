use std::fmt;

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{Result, TupleError};
use crate::marshal::Tuple;
use crate::millitime::MilliTime;

/// Business outcome of a mutating remote procedure.
///
/// The numeric values are shared with the server-side procedures and must
/// not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok,
    UnknownDeviceId,
    UnknownSubscriptionId,
    MismatchingSubscriptionDeviceId,
    /// Assigned locally when a call fails before the server could answer.
    DatabaseError,
}

impl ResultCode {
    pub const fn as_i64(self) -> i64 {
        match self {
            ResultCode::Ok => 0,
            ResultCode::UnknownDeviceId => -1,
            ResultCode::UnknownSubscriptionId => -2,
            ResultCode::MismatchingSubscriptionDeviceId => -3,
            ResultCode::DatabaseError => -100,
        }
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl TryFrom<i64> for ResultCode {
    type Error = TupleError;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(ResultCode::Ok),
            -1 => Ok(ResultCode::UnknownDeviceId),
            -2 => Ok(ResultCode::UnknownSubscriptionId),
            -3 => Ok(ResultCode::MismatchingSubscriptionDeviceId),
            -100 => Ok(ResultCode::DatabaseError),
            other => Err(TupleError::UnknownResultCode(other)),
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultCode::Ok => "ok",
            ResultCode::UnknownDeviceId => "unknown device id",
            ResultCode::UnknownSubscriptionId => "unknown subscription id",
            ResultCode::MismatchingSubscriptionDeviceId => "subscription belongs to another device",
            ResultCode::DatabaseError => "database error",
        };
        write!(f, "{name} ({})", self.as_i64())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub device_id: String,
    pub auth_token: String,
    pub push_token: String,
    pub push_technology: String,
    pub ping_timestamp: MilliTime,
    pub change_timestamp: MilliTime,
    pub change_count: i64,
}

impl Tuple for DeviceRecord {
    const NAME: &'static str = "DeviceRecord";

    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.write_array_len(7)?;
        enc.write_str(&self.device_id)?;
        enc.write_str(&self.auth_token)?;
        enc.write_str(&self.push_token)?;
        enc.write_str(&self.push_technology)?;
        enc.write_millitime(self.ping_timestamp)?;
        enc.write_millitime(self.change_timestamp)?;
        enc.write_int(self.change_count)
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.read_tuple_len(Self::NAME, 7, 7)?;
        Ok(DeviceRecord {
            device_id: dec.read_str()?,
            auth_token: dec.read_str()?,
            push_token: dec.read_str()?,
            push_technology: dec.read_str()?,
            ping_timestamp: dec.read_millitime()?,
            change_timestamp: dec.read_millitime()?,
            change_count: dec.read_int()?,
        })
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[dev_id = {:?}, auth = {:?}, push_token = {:?}, push_tech = {:?}, ping_ts = {}, change_ts = {}, change_count = {}]",
            self.device_id,
            self.auth_token,
            self.push_token,
            self.push_technology,
            self.ping_timestamp,
            self.change_timestamp,
            self.change_count
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub subscription_id: String,
    /// Owning device. Never deleted through the subscription.
    pub device_id: String,
    pub ping_timestamp: MilliTime,
    pub change_timestamp: MilliTime,
}

impl Tuple for SubscriptionRecord {
    const NAME: &'static str = "SubscriptionRecord";

    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.write_array_len(4)?;
        enc.write_str(&self.subscription_id)?;
        enc.write_str(&self.device_id)?;
        enc.write_millitime(self.ping_timestamp)?;
        enc.write_millitime(self.change_timestamp)
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.read_tuple_len(Self::NAME, 4, 4)?;
        Ok(SubscriptionRecord {
            subscription_id: dec.read_str()?,
            device_id: dec.read_str()?,
            ping_timestamp: dec.read_millitime()?,
            change_timestamp: dec.read_millitime()?,
        })
    }
}

impl fmt::Display for SubscriptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[sub_id = {:?}, dev_id = {:?}, ping_ts = {}, change_ts = {}]",
            self.subscription_id, self.device_id, self.ping_timestamp, self.change_timestamp
        )
    }
}

/// Outcome of a mutating call that returns no entity. An absent message
/// decodes as empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub code: ResultCode,
    pub message: String,
}

impl ResultRecord {
    pub fn new(code: ResultCode) -> Self {
        Self {
            code,
            message: String::new(),
        }
    }

    pub fn with_message(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Tuple for ResultRecord {
    const NAME: &'static str = "ResultRecord";

    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.write_array_len(2)?;
        enc.write_int(self.code.as_i64())?;
        enc.write_str(&self.message)
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let len = dec.read_tuple_len(Self::NAME, 1, 2)?;
        let code = ResultCode::try_from(dec.read_int()?)?;
        let message = if len >= 2 {
            dec.read_str()?
        } else {
            String::new()
        };
        Ok(ResultRecord { code, message })
    }
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[code = {}, s = {:?}]", self.code, self.message)
    }
}
