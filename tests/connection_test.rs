use pushcore::framing::FrameDecoder;
use pushcore::handshake::{build_greeting, scramble};
use pushcore::iproto::consts::{
    AUTH, CALL_16, ER_NO_SUCH_PROC, ER_PASSWORD_MISMATCH, ERROR_TYPE_FLAG, KEY_CODE, KEY_DATA,
    KEY_ERROR_24, KEY_FUNCTION_NAME, KEY_KEY, KEY_SCHEMA_VERSION, KEY_SPACE_ID, KEY_SYNC,
    KEY_TUPLE, KEY_USER_NAME, PING, SELECT, VINDEX_ID, VSPACE_ID,
};
use pushdb_bench::BenchError;
use pushdb_bench::client::{ConnectError, ConnectOptions, Connection, connect};
use pushdb_bench::generator::PushTechnology;
use pushdb_bench::model::PushDbModel;
use pushdb_bench::retry::RetryPolicy;
use pushdb_bench::service::{CallError, RemoteService};
use pushdb_bench::tuple::{MilliTime, ResultCode, TupleBuilder};
use rmpv::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const SALT: &[u8] = b"0123456789abcdefghijklmnopqrstuv";
const USER: &str = "bench";
const PASSWORD: &str = "secret";
const DEVS_ID: u64 = 512;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn field(map: &Value, key: u64) -> Option<&Value> {
    map.as_map()?
        .iter()
        .find(|(k, _)| k.as_u64() == Some(key))
        .map(|(_, v)| v)
}

fn str_arg(value: &Value) -> String {
    match value {
        Value::String(s) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
        other => panic!("expected string, got {other}"),
    }
}

fn packet(header: Value, body: Value) -> Vec<u8> {
    let mut payload = Vec::new();
    rmpv::encode::write_value(&mut payload, &header).unwrap();
    rmpv::encode::write_value(&mut payload, &body).unwrap();

    let mut out = Vec::new();
    rmp::encode::write_uint(&mut out, payload.len() as u64).unwrap();
    out.extend_from_slice(&payload);
    out
}

fn ok(sync: u64, data: Value) -> Vec<u8> {
    packet(
        Value::Map(vec![
            (Value::from(KEY_CODE), Value::from(0)),
            (Value::from(KEY_SYNC), Value::from(sync)),
            (Value::from(KEY_SCHEMA_VERSION), Value::from(80)),
        ]),
        Value::Map(vec![(Value::from(KEY_DATA), data)]),
    )
}

fn err(sync: u64, code: u32, message: &str) -> Vec<u8> {
    packet(
        Value::Map(vec![
            (Value::from(KEY_CODE), Value::from(ERROR_TYPE_FLAG | code)),
            (Value::from(KEY_SYNC), Value::from(sync)),
        ]),
        Value::Map(vec![(Value::from(KEY_ERROR_24), Value::from(message))]),
    )
}

fn device_row(device_id: &str) -> Value {
    Value::Array(vec![
        Value::from(device_id),
        Value::from("auth-token"),
        Value::from("push-token"),
        Value::from("g"),
        Value::from(1_500_000_000_000i64),
        Value::from(1_500_000_000_000i64),
        Value::from(0),
    ])
}

enum Reply {
    Send(Vec<u8>),
    Silent,
    Hangup,
}

/// Answers a request the way the push database would.
fn respond(header: &Value, body: &Value) -> Reply {
    let code = field(header, KEY_CODE).and_then(Value::as_u64).unwrap() as u32;
    let sync = field(header, KEY_SYNC).and_then(Value::as_u64).unwrap();

    match code {
        PING => Reply::Send(ok(sync, Value::Array(vec![]))),
        AUTH => {
            let user = str_arg(field(body, KEY_USER_NAME).unwrap());
            let tuple = field(body, KEY_TUPLE).and_then(Value::as_array).unwrap();
            let sent = match &tuple[1] {
                Value::String(s) => s.as_bytes().to_vec(),
                Value::Binary(b) => b.clone(),
                other => panic!("unexpected scramble {other}"),
            };
            if user == USER && sent == scramble(SALT, PASSWORD) {
                Reply::Send(ok(sync, Value::Array(vec![])))
            } else {
                Reply::Send(err(
                    sync,
                    ER_PASSWORD_MISMATCH,
                    &format!("Incorrect password supplied for user '{user}'"),
                ))
            }
        }
        CALL_16 => match str_arg(field(body, KEY_FUNCTION_NAME).unwrap()).as_str() {
            "push_CreateSub" | "push_PingSub" => Reply::Send(ok(
                sync,
                Value::Array(vec![Value::Array(vec![Value::from(0)])]),
            )),
            "push_ChangeSub" => Reply::Send(ok(
                sync,
                Value::Array(vec![Value::Array(vec![Value::from(-2), Value::from("no sub")])]),
            )),
            "push_Slow" => Reply::Silent,
            "push_Drop" => Reply::Hangup,
            other => Reply::Send(err(
                sync,
                ER_NO_SUCH_PROC,
                &format!("Procedure '{other}' is not defined"),
            )),
        },
        SELECT => {
            let space = field(body, KEY_SPACE_ID).and_then(Value::as_u64).unwrap();
            let key = field(body, KEY_KEY).and_then(Value::as_array).unwrap();
            let rows = match space as u32 {
                VSPACE_ID if str_arg(&key[0]) == "devs" => vec![Value::Array(vec![
                    Value::from(DEVS_ID),
                    Value::from(1),
                    Value::from("devs"),
                    Value::from("memtx"),
                ])],
                VINDEX_ID if str_arg(&key[1]) == "primary" => vec![Value::Array(vec![
                    Value::from(DEVS_ID),
                    Value::from(0),
                    Value::from("primary"),
                    Value::from("tree"),
                ])],
                _ if space == DEVS_ID && str_arg(&key[0]) == "dev-1" => vec![device_row("dev-1")],
                _ => vec![],
            };
            Reply::Send(ok(sync, Value::Array(rows)))
        }
        other => Reply::Send(err(sync, 48, &format!("Unknown request type {other}"))),
    }
}

async fn serve(mut stream: TcpStream) {
    if stream
        .write_all(&build_greeting("2.11.1", SALT))
        .await
        .is_err()
    {
        return;
    }

    let mut decoder = FrameDecoder::new();
    loop {
        match stream.read_buf(decoder.buffer_mut()).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        while let Some(frame) = decoder.decode_frame().unwrap() {
            let mut rd = &frame[..];
            let header = rmpv::decode::read_value(&mut rd).unwrap();
            let body = rmpv::decode::read_value(&mut rd).unwrap();
            match respond(&header, &body) {
                Reply::Send(bytes) => {
                    if stream.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
                Reply::Silent => {}
                Reply::Hangup => return,
            }
        }
    }
}

struct FakeServer {
    addr: String,
    accepted: Arc<AtomicUsize>,
}

impl FakeServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream));
            }
        });
        Self { addr, accepted }
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

fn options(pass: &str) -> ConnectOptions {
    ConnectOptions {
        timeout: Duration::from_millis(500),
        reconnect: Duration::from_millis(10),
        max_reconnects: 2,
        user: USER.to_string(),
        pass: pass.to_string(),
    }
}

#[tokio::test]
async fn test_authenticated_procedures_and_lookup() {
    init_logger();
    let server = FakeServer::start().await;
    let connection = connect(&server.addr, options(PASSWORD), &RetryPolicy::default())
        .await
        .unwrap();
    assert_eq!(connection.server_version().await.as_deref(), Some("2.11.1"));
    connection.ping().await.unwrap();

    let model = PushDbModel::new(connection.clone());
    let now = MilliTime::now();
    assert_eq!(
        model.create_subscription("dev-1", "sub-1", now).await.unwrap(),
        ResultCode::Ok
    );
    assert_eq!(
        model
            .ping_or_change_subscription("dev-1", "sub-1", true, now)
            .await
            .unwrap(),
        ResultCode::UnknownSubscriptionId
    );

    let device = model.lookup_device("dev-1").await.unwrap().unwrap();
    assert_eq!(device.device_id, "dev-1");
    assert_eq!(device.push_technology, PushTechnology::Gcm.as_str());
    assert_eq!(model.lookup_device("dev-2").await.unwrap(), None);
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn test_wrong_password_is_not_retried() {
    init_logger();
    let server = FakeServer::start().await;
    let err = connect(&server.addr, options("wrong"), &RetryPolicy::default())
        .await
        .err()
        .unwrap();

    match err {
        BenchError::Connection { source, .. } => {
            assert!(!source.is_not_ready());
            assert!(source.to_string().contains("Incorrect password"));
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn test_server_error_is_reported() {
    init_logger();
    let server = FakeServer::start().await;
    let connection = Connection::open(&server.addr, options(PASSWORD)).await.unwrap();

    let args = TupleBuilder::new().str("x").build().unwrap();
    let err = connection.call("push_Missing", args).await.unwrap_err();
    match err {
        CallError::Server(e) => {
            assert_eq!(e.code, ER_NO_SUCH_PROC);
            assert_eq!(e.message, "Procedure 'push_Missing' is not defined");
        }
        other => panic!("unexpected error {other}"),
    }
    // The session survives a server-side error.
    connection.ping().await.unwrap();
}

#[tokio::test]
async fn test_request_timeout() {
    init_logger();
    let server = FakeServer::start().await;
    let mut opts = options(PASSWORD);
    opts.timeout = Duration::from_millis(100);
    let connection = Connection::open(&server.addr, opts).await.unwrap();

    let model = PushDbModel::new(connection.clone());
    let err = model
        .service()
        .call("push_Slow", TupleBuilder::new().build().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Timeout(d) if d == Duration::from_millis(100)));
}

#[tokio::test]
async fn test_redials_after_socket_loss() {
    init_logger();
    let server = FakeServer::start().await;
    let connection = Connection::open(&server.addr, options(PASSWORD)).await.unwrap();

    let err = connection
        .call("push_Drop", TupleBuilder::new().build().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Disconnected));

    connection.ping().await.unwrap();
    assert_eq!(connection.reconnect_count(), 1);
    assert_eq!(server.accepted(), 2);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_socket() {
    init_logger();
    let server = FakeServer::start().await;
    let connection = Connection::open(&server.addr, options(PASSWORD)).await.unwrap();
    let model = PushDbModel::new(connection.clone());

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..32 {
        let model = model.clone();
        tasks.spawn(async move {
            model
                .create_subscription("dev-1", &format!("sub-{i}"), MilliTime::now())
                .await
        });
    }
    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap().unwrap(), ResultCode::Ok);
    }
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn test_bad_greeting_is_fatal() {
    init_logger();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.write_all(&[b'x'; 128]).await;
            let _ = stream.read(&mut [0u8; 16]).await;
        }
    });

    let err = Connection::open(&addr, options(PASSWORD)).await.err().unwrap();
    assert!(matches!(err, ConnectError::Handshake(_)));
    assert!(!err.is_not_ready());
}

#[tokio::test]
async fn test_refused_dial_is_not_ready() {
    init_logger();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = Connection::open(&addr, options(PASSWORD)).await.err().unwrap();
    assert!(matches!(err, ConnectError::Exhausted { attempts: 3, .. }));
    assert!(err.is_not_ready());
}
