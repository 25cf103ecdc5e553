use crate::error::BenchError;
use crate::service::{CallError, RemoteService};
use log::{debug, trace};
use pushcore::generator::PushTechnology;
use pushcore::iproto::ProtocolError;
use pushcore::tuple::{
    DeviceRecord, MilliTime, ResultCode, ResultRecord, Tuple, TupleBuilder, TupleError,
    unmarshal_array,
};
use std::sync::Arc;

pub const CREATE_DEVICE: &str = "push_CreateDev";
pub const CREATE_SUBSCRIPTION: &str = "push_CreateSub";
pub const PING_SUBSCRIPTION: &str = "push_PingSub";
pub const CHANGE_SUBSCRIPTION: &str = "push_ChangeSub";

pub const DEVICES_SPACE: &str = "devs";
pub const PRIMARY_INDEX: &str = "primary";
/// Operation name used in errors from the direct device lookup.
pub const LOOKUP_DEVICE: &str = "devs select";

/// Typed wrappers around the push procedures.
#[derive(Clone)]
pub struct PushDbModel {
    service: Arc<dyn RemoteService>,
}

impl PushDbModel {
    pub fn new(service: Arc<dyn RemoteService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<dyn RemoteService> {
        &self.service
    }

    /// Reads a device straight from its space by primary key.
    pub async fn lookup_device(&self, device_id: &str) -> Result<Option<DeviceRecord>, BenchError> {
        let key = encode_args(LOOKUP_DEVICE, TupleBuilder::new().str(device_id))?;
        let data = self
            .service
            .select(DEVICES_SPACE, PRIMARY_INDEX, key, 0, 1)
            .await
            .map_err(|e| BenchError::transport(LOOKUP_DEVICE, e))?;

        let mut devices = unmarshal_array::<DeviceRecord>(&data)
            .map_err(|e| BenchError::decode(LOOKUP_DEVICE, e))?;
        match devices.len() {
            0 => Ok(None),
            1 => Ok(devices.pop()),
            got => Err(BenchError::decode(
                LOOKUP_DEVICE,
                TupleError::ResultSet {
                    expected: "at most 1",
                    got,
                },
            )),
        }
    }

    pub async fn create_device(
        &self,
        device_id: &str,
        auth_token: &str,
        push_token: &str,
        push_technology: PushTechnology,
        now: MilliTime,
    ) -> Result<DeviceRecord, BenchError> {
        let args = TupleBuilder::new()
            .str(device_id)
            .str(auth_token)
            .str(push_token)
            .str(push_technology.as_str())
            .millitime(now);
        let device: DeviceRecord = self.call_single(CREATE_DEVICE, args).await?;
        trace!(target: "Model", "Created device {device}");
        Ok(device)
    }

    /// Returns the server's result code as is; a non-OK code is not an error
    /// here.
    pub async fn create_subscription(
        &self,
        device_id: &str,
        subscription_id: &str,
        now: MilliTime,
    ) -> Result<ResultCode, BenchError> {
        let args = TupleBuilder::new()
            .str(device_id)
            .str(subscription_id)
            .millitime(now);
        self.call_result(CREATE_SUBSCRIPTION, args).await
    }

    pub async fn ping_or_change_subscription(
        &self,
        device_id: &str,
        subscription_id: &str,
        is_change: bool,
        timestamp: MilliTime,
    ) -> Result<ResultCode, BenchError> {
        let function = if is_change {
            CHANGE_SUBSCRIPTION
        } else {
            PING_SUBSCRIPTION
        };
        let args = TupleBuilder::new()
            .str(device_id)
            .str(subscription_id)
            .millitime(timestamp);
        self.call_result(function, args).await
    }

    async fn call_result(
        &self,
        function: &'static str,
        args: TupleBuilder,
    ) -> Result<ResultCode, BenchError> {
        let result: ResultRecord = self.call_single(function, args).await?;
        if !result.code.is_ok() {
            debug!(target: "Model", "{function} returned {result}");
        }
        Ok(result.code)
    }

    async fn call_single<T: Tuple>(
        &self,
        function: &'static str,
        args: TupleBuilder,
    ) -> Result<T, BenchError> {
        let args = encode_args(function, args)?;
        let data = self
            .service
            .call(function, args)
            .await
            .map_err(|e| BenchError::transport(function, e))?;

        let mut records =
            unmarshal_array::<T>(&data).map_err(|e| BenchError::decode(function, e))?;
        if records.len() != 1 {
            return Err(BenchError::decode(
                function,
                TupleError::ResultSet {
                    expected: "exactly 1",
                    got: records.len(),
                },
            ));
        }
        records
            .pop()
            .ok_or_else(|| BenchError::decode(function, TupleError::UnexpectedEof))
    }
}

fn encode_args(operation: &'static str, args: TupleBuilder) -> Result<Vec<u8>, BenchError> {
    args.build().map_err(|e| encode_error(operation, e))
}

/// Arguments that fail to encode are a protocol error of the call itself.
fn encode_error(operation: &'static str, source: TupleError) -> BenchError {
    BenchError::transport(operation, CallError::Protocol(ProtocolError::from(source)))
}
