//! An in-process stand-in for the push procedures, used by `--dry-run` and
//! by tests. It keeps devices and subscriptions in maps and answers with the
//! same tuples and result codes the database procedures produce.

use crate::model::{
    CHANGE_SUBSCRIPTION, CREATE_DEVICE, CREATE_SUBSCRIPTION, DEVICES_SPACE, PING_SUBSCRIPTION,
    PRIMARY_INDEX,
};
use crate::service::{CallError, RemoteService};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use log::trace;
use pushcore::iproto::consts::ER_NO_SUCH_PROC;
use pushcore::iproto::{ProtocolError, ServerError};
use pushcore::tuple::{
    Decoder, DeviceRecord, Encoder, MilliTime, ResultCode, ResultRecord, SubscriptionRecord,
    Tuple, marshal_to,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Tables {
    devices: HashMap<String, DeviceRecord>,
    subscriptions: HashMap<String, SubscriptionRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryPushService {
    tables: Mutex<Tables>,
    calls: DashMap<String, u64>,
    failing: Mutex<Option<String>>,
}

impl InMemoryPushService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later request to `function` fail as if the socket dropped.
    pub fn fail_function(&self, function: impl Into<String>) {
        *self.lock_failing() = Some(function.into());
    }

    pub fn call_count(&self, function: &str) -> u64 {
        self.calls.get(function).map(|n| *n).unwrap_or(0)
    }

    pub fn device_count(&self) -> usize {
        self.lock_tables().devices.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.lock_tables().subscriptions.len()
    }

    pub fn subscription(&self, subscription_id: &str) -> Option<SubscriptionRecord> {
        self.lock_tables().subscriptions.get(subscription_id).cloned()
    }

    pub fn device(&self, device_id: &str) -> Option<DeviceRecord> {
        self.lock_tables().devices.get(device_id).cloned()
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_failing(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.failing.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_call(&self, function: &str) -> Result<(), CallError> {
        *self.calls.entry(function.to_string()).or_insert(0) += 1;
        if self.lock_failing().as_deref() == Some(function) {
            return Err(CallError::Disconnected);
        }
        Ok(())
    }

    fn create_device(&self, args: &mut Decoder<'_>) -> Result<Vec<u8>, CallError> {
        args.read_tuple_len(CREATE_DEVICE, 5, 5).map_err(ProtocolError::from)?;
        let device_id = read_str(args)?;
        let auth_token = read_str(args)?;
        let push_token = read_str(args)?;
        let push_technology = read_str(args)?;
        let now = read_time(args)?;

        let device = DeviceRecord {
            device_id: device_id.clone(),
            auth_token,
            push_token,
            push_technology,
            ping_timestamp: now,
            change_timestamp: now,
            change_count: 0,
        };
        self.lock_tables().devices.insert(device_id, device.clone());
        encode_set(&[device])
    }

    fn create_subscription(&self, args: &mut Decoder<'_>) -> Result<Vec<u8>, CallError> {
        args.read_tuple_len(CREATE_SUBSCRIPTION, 3, 3).map_err(ProtocolError::from)?;
        let device_id = read_str(args)?;
        let subscription_id = read_str(args)?;
        let now = read_time(args)?;

        let mut tables = self.lock_tables();
        let code = if !tables.devices.contains_key(&device_id) {
            ResultCode::UnknownDeviceId
        } else {
            match tables.subscriptions.get(&subscription_id) {
                Some(existing) if existing.device_id != device_id => {
                    ResultCode::MismatchingSubscriptionDeviceId
                }
                _ => {
                    tables.subscriptions.insert(
                        subscription_id.clone(),
                        SubscriptionRecord {
                            subscription_id,
                            device_id,
                            ping_timestamp: now,
                            change_timestamp: now,
                        },
                    );
                    ResultCode::Ok
                }
            }
        };
        encode_set(&[ResultRecord::new(code)])
    }

    fn touch_subscription(
        &self,
        function: &'static str,
        args: &mut Decoder<'_>,
        is_change: bool,
    ) -> Result<Vec<u8>, CallError> {
        args.read_tuple_len(function, 3, 3).map_err(ProtocolError::from)?;
        let device_id = read_str(args)?;
        let subscription_id = read_str(args)?;
        let timestamp = read_time(args)?;

        let mut tables = self.lock_tables();
        let Tables {
            devices,
            subscriptions,
        } = &mut *tables;
        let code = match subscriptions.get_mut(&subscription_id) {
            None => ResultCode::UnknownSubscriptionId,
            Some(sub) if sub.device_id != device_id => ResultCode::MismatchingSubscriptionDeviceId,
            Some(sub) => match devices.get_mut(&device_id) {
                None => ResultCode::UnknownDeviceId,
                Some(device) => {
                    sub.ping_timestamp = timestamp;
                    device.ping_timestamp = timestamp;
                    if is_change {
                        sub.change_timestamp = timestamp;
                        device.change_timestamp = timestamp;
                        device.change_count += 1;
                    }
                    ResultCode::Ok
                }
            },
        };
        encode_set(&[ResultRecord::new(code)])
    }
}

fn read_str(args: &mut Decoder<'_>) -> Result<String, CallError> {
    Ok(args.read_str().map_err(ProtocolError::from)?)
}

fn read_time(args: &mut Decoder<'_>) -> Result<MilliTime, CallError> {
    Ok(args.read_millitime().map_err(ProtocolError::from)?)
}

fn encode_set<T: Tuple>(records: &[T]) -> Result<Vec<u8>, CallError> {
    let mut enc = Encoder::new();
    enc.write_array_len(records.len() as u32)
        .map_err(ProtocolError::from)?;
    for record in records {
        marshal_to(record, &mut enc).map_err(ProtocolError::from)?;
    }
    Ok(enc.into_data())
}

#[async_trait]
impl RemoteService for InMemoryPushService {
    async fn call(&self, function: &str, args: Vec<u8>) -> Result<Bytes, CallError> {
        self.record_call(function)?;
        trace!(target: "Model", "dry-run call {function} ({} arg bytes)", args.len());

        let mut dec = Decoder::new(&args);
        let data = match function {
            CREATE_DEVICE => self.create_device(&mut dec)?,
            CREATE_SUBSCRIPTION => self.create_subscription(&mut dec)?,
            PING_SUBSCRIPTION => self.touch_subscription(PING_SUBSCRIPTION, &mut dec, false)?,
            CHANGE_SUBSCRIPTION => self.touch_subscription(CHANGE_SUBSCRIPTION, &mut dec, true)?,
            other => {
                return Err(CallError::Server(ServerError {
                    code: ER_NO_SUCH_PROC,
                    message: format!("Procedure '{other}' is not defined"),
                }));
            }
        };
        Ok(Bytes::from(data))
    }

    async fn select(
        &self,
        space: &str,
        index: &str,
        key: Vec<u8>,
        offset: u32,
        limit: u32,
    ) -> Result<Bytes, CallError> {
        if space != DEVICES_SPACE {
            return Err(CallError::UnknownName {
                kind: "space",
                name: space.to_string(),
            });
        }
        if index != PRIMARY_INDEX {
            return Err(CallError::UnknownName {
                kind: "index",
                name: index.to_string(),
            });
        }
        self.record_call(DEVICES_SPACE)?;

        let mut dec = Decoder::new(&key);
        dec.read_tuple_len("devs key", 1, 1)
            .map_err(ProtocolError::from)?;
        let device_id = read_str(&mut dec)?;

        let found: Vec<DeviceRecord> = self
            .lock_tables()
            .devices
            .get(&device_id)
            .cloned()
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(Bytes::from(encode_set(&found)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushcore::tuple::{TupleBuilder, unmarshal_array};

    fn sub_args(device_id: &str, subscription_id: &str) -> Vec<u8> {
        TupleBuilder::new()
            .str(device_id)
            .str(subscription_id)
            .millitime(MilliTime::from_millis(5))
            .build()
            .unwrap()
    }

    async fn result_code(service: &InMemoryPushService, function: &str, args: Vec<u8>) -> ResultCode {
        let data = service.call(function, args).await.unwrap();
        let results = unmarshal_array::<ResultRecord>(&data).unwrap();
        assert_eq!(results.len(), 1);
        results[0].code
    }

    #[tokio::test]
    async fn test_business_codes() {
        let service = InMemoryPushService::new();
        let create = TupleBuilder::new()
            .str("dev-a")
            .str("auth")
            .str("push")
            .str("g")
            .millitime(MilliTime::from_millis(1))
            .build()
            .unwrap();
        service.call(CREATE_DEVICE, create).await.unwrap();

        assert_eq!(
            result_code(&service, CREATE_SUBSCRIPTION, sub_args("dev-x", "sub-1")).await,
            ResultCode::UnknownDeviceId
        );
        assert_eq!(
            result_code(&service, CREATE_SUBSCRIPTION, sub_args("dev-a", "sub-1")).await,
            ResultCode::Ok
        );
        assert_eq!(
            result_code(&service, PING_SUBSCRIPTION, sub_args("dev-a", "sub-2")).await,
            ResultCode::UnknownSubscriptionId
        );
        assert_eq!(
            result_code(&service, CHANGE_SUBSCRIPTION, sub_args("dev-b", "sub-1")).await,
            ResultCode::MismatchingSubscriptionDeviceId
        );
        assert_eq!(
            result_code(&service, CHANGE_SUBSCRIPTION, sub_args("dev-a", "sub-1")).await,
            ResultCode::Ok
        );
        assert_eq!(service.device("dev-a").unwrap().change_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_procedure() {
        let service = InMemoryPushService::new();
        let err = service.call("push_Nope", Vec::new()).await.unwrap_err();
        assert!(matches!(
            err,
            CallError::Server(ServerError {
                code: ER_NO_SUCH_PROC,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let service = InMemoryPushService::new();
        service.fail_function(PING_SUBSCRIPTION);
        let err = service
            .call(PING_SUBSCRIPTION, sub_args("dev", "sub"))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Disconnected));
        assert_eq!(service.call_count(PING_SUBSCRIPTION), 1);
    }
}
