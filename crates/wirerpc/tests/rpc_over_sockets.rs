use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use wirerpc::fury::{FieldDesc, ProtocolMethod, TypeDesc};
use wirerpc::transport::{connect, CodecConfig, Endpoint, EndpointListener};
use wirerpc::{
    Codec, Connection, ConnectionConfig, ConnectionError, ErrorEnvelope, FuryRpc, RequestContext,
    RpcServiceMap, ServiceRegistry,
};

fn services(codecs: Arc<Mutex<Vec<Codec>>>) -> RpcServiceMap {
    RpcServiceMap::new()
        .with(
            ProtocolMethod::new(
                "shortUrl",
                vec![FieldDesc::new("url", TypeDesc::String)],
                TypeDesc::String,
            ),
            move |args: Vec<Value>, ctx: RequestContext| {
                codecs.lock().unwrap().push(ctx.codec());
                async move {
                    let url = args.first().and_then(Value::as_str).unwrap_or_default();
                    Ok(json!(url.chars().take(10).collect::<String>()))
                }
            },
        )
        .with(
            ProtocolMethod::new(
                "stats",
                vec![FieldDesc::new(
                    "values",
                    TypeDesc::Array(Box::new(TypeDesc::Float64)),
                )],
                TypeDesc::Object(vec![
                    FieldDesc::new("count", TypeDesc::Int32),
                    FieldDesc::new("max", TypeDesc::Nullable(Box::new(TypeDesc::Float64))),
                ]),
            ),
            |args: Vec<Value>, _ctx: RequestContext| async move {
                let values: Vec<f64> = args
                    .first()
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(Value::as_f64).collect())
                    .unwrap_or_default();
                let max = values.iter().copied().reduce(f64::max);
                Ok(json!({"count": values.len(), "max": max}))
            },
        )
}

async fn serve(endpoint: &str) -> (Endpoint, Arc<Mutex<Vec<Codec>>>) {
    let endpoint: Endpoint = endpoint.parse().expect("endpoint should parse");
    let listener = EndpointListener::bind(&endpoint, CodecConfig::default())
        .await
        .expect("bind should succeed");
    let bound = listener.endpoint().clone();

    let codecs = Arc::new(Mutex::new(Vec::new()));
    let rpc = FuryRpc::new(services(Arc::clone(&codecs)));
    let registry = Arc::new(ServiceRegistry::new());
    registry.register("fail", |_args: Vec<Value>| {
        Err(ErrorEnvelope::new("CustomError", "x").with_extra("code", 42))
    });

    tokio::spawn(async move {
        // The listener lives as long as this task.
        while let Ok(channel) = listener.accept().await {
            let connection = Connection::new(channel);
            rpc.listen(&connection);
            connection.serve_registry(Arc::clone(&registry));
            if connection.listen().is_err() {
                break;
            }
            tokio::spawn(async move { connection.closed().await });
        }
    });

    (bound, codecs)
}

async fn client(endpoint: &Endpoint) -> Connection {
    let channel = connect(endpoint, CodecConfig::default())
        .await
        .expect("connect should succeed");
    let connection = Connection::with_config(
        channel,
        ConnectionConfig::default().with_request_timeout(Duration::from_secs(5)),
    );
    connection.listen().expect("listen should start");
    connection
}

#[tokio::test]
async fn typed_calls_over_tcp() {
    let (endpoint, codecs) = serve("tcp://127.0.0.1:0").await;
    let connection = client(&endpoint).await;

    let rpc = FuryRpc::new(RpcServiceMap::new());
    let proxy = rpc.invoke_proxy(&connection);

    let before = proxy
        .call("shortUrl", vec![json!("1234567890abcdefg")])
        .await
        .unwrap();
    assert_eq!(before, json!("1234567890"));

    rpc.load_protocol(services(Arc::default()).protocols().cloned());
    let after = proxy
        .call("shortUrl", vec![json!("1234567890abcdefg")])
        .await
        .unwrap();
    assert_eq!(after, json!("1234567890"));
    assert_eq!(*codecs.lock().unwrap(), vec![Codec::Json, Codec::Fury]);

    let stats = proxy
        .stub("stats")
        .call(vec![json!([1.5, 4.0, 2.0])])
        .await
        .unwrap();
    assert_eq!(stats, json!({"count": 3, "max": 4.0}));

    let empty = proxy.call("stats", vec![json!([])]).await.unwrap();
    assert_eq!(empty, json!({"count": 0, "max": null}));
}

#[tokio::test]
async fn errors_cross_the_socket_with_their_fields() {
    let (endpoint, _codecs) = serve("127.0.0.1:0").await;
    let connection = client(&endpoint).await;
    let proxy = FuryRpc::new(RpcServiceMap::new()).invoke_proxy(&connection);

    match proxy.call("fail", vec![]).await {
        Err(ConnectionError::Remote(remote)) => {
            assert_eq!(remote.name(), "CustomError");
            assert_eq!(remote.message(), "x");
            assert_eq!(remote.get("code"), Some(&json!(42)));
        }
        other => panic!("expected remote error, got {other:?}"),
    }

    assert!(matches!(
        proxy.call("missing", vec![]).await,
        Err(ConnectionError::MethodNotFound(method)) if method == "missing"
    ));
}

#[tokio::test]
async fn many_clients_share_one_listener() {
    let (endpoint, _codecs) = serve("tcp://127.0.0.1:0").await;

    let mut calls = Vec::new();
    for i in 0..4 {
        let endpoint = endpoint.clone();
        calls.push(tokio::spawn(async move {
            let connection = client(&endpoint).await;
            let proxy = FuryRpc::new(RpcServiceMap::new()).invoke_proxy(&connection);
            let url = format!("client-{i}-abcdefghijkl");
            let short = proxy.call("shortUrl", vec![json!(url)]).await.unwrap();
            (url, short)
        }));
    }

    for call in calls {
        let (url, short) = call.await.unwrap();
        assert_eq!(short, json!(&url[..10]));
    }
}

#[cfg(unix)]
#[tokio::test]
async fn typed_calls_over_unix_socket() {
    let dir = std::env::temp_dir().join(format!(
        "wirerpc-it-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    let path = dir.join("rpc.sock");

    let (endpoint, codecs) = serve(&format!("unix://{}", path.display())).await;
    let connection = client(&endpoint).await;

    let rpc = FuryRpc::new(RpcServiceMap::new());
    rpc.load_protocol(services(Arc::default()).protocols().cloned());
    let short = rpc
        .invoke_proxy(&connection)
        .call("shortUrl", vec![json!("1234567890abcdefg")])
        .await
        .unwrap();
    assert_eq!(short, json!("1234567890"));
    assert_eq!(*codecs.lock().unwrap(), vec![Codec::Fury]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn closing_a_client_releases_the_server_side() {
    let endpoint: Endpoint = "tcp://127.0.0.1:0".parse().expect("endpoint should parse");
    let listener = EndpointListener::bind(&endpoint, CodecConfig::default())
        .await
        .expect("bind should succeed");
    let bound = listener.endpoint().clone();

    let server = tokio::spawn(async move {
        let channel = listener.accept().await.expect("accept should succeed");
        let connection = Connection::new(channel);
        connection.listen().expect("listen should start");
        connection.closed().await;
        connection.is_closed()
    });

    let connection = client(&bound).await;
    connection.close();
    let server_closed = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server should see the socket close")
        .expect("server task should not panic");
    assert!(server_closed);
}
