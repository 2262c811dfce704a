//! End-to-end scenarios exercising rpc-core, rpc-server, and rpc-client
//! together over real loopback TCP connections.

use std::time::Duration;

use bytes::Bytes;
use rpc_client::Client;
use rpc_core::config::ServerConfig;
use rpc_core::framing::{put_i32, put_u64};
use rpc_core::Payload;
use rpc_server::Server;
use tokio::net::TcpStream;

async fn spawn_add2_server() -> u16 {
    let server = Server::init(&ServerConfig::default()).await.unwrap();
    let port = server.local_addr().unwrap().port();
    server
        .register("add2", |p: &Payload| {
            let lhs = p.data1;
            let rhs = p.data2().map(|b| b[0] as i32).unwrap_or(0);
            Some(Payload::new(lhs + rhs))
        })
        .unwrap();
    tokio::spawn(server.serve_all());
    tokio::time::sleep(Duration::from_millis(20)).await;
    port
}

#[tokio::test]
async fn scenario_add2_with_zero_and_one_hundred() {
    let port = spawn_add2_server().await;
    let mut client = Client::connect("::1", port).await.unwrap();
    let handle = client.find("add2").await.unwrap().expect("add2 registered");
    assert_eq!(handle.function_id, rpc_core::djb2(b"add2"));

    let payload = Payload::with_blob(0, Bytes::from_static(&[100]));
    let response = client.call(&handle, &payload).await.unwrap().unwrap();
    assert_eq!(response.data1, 100);
}

#[tokio::test]
async fn scenario_add2_with_one_and_one_hundred() {
    let port = spawn_add2_server().await;
    let mut client = Client::connect("::1", port).await.unwrap();
    let handle = client.find("add2").await.unwrap().unwrap();

    let payload = Payload::with_blob(1, Bytes::from_static(&[100]));
    let response = client.call(&handle, &payload).await.unwrap().unwrap();
    assert_eq!(response.data1, 101);
}

#[tokio::test]
async fn scenario_find_miss_then_find_hit_same_connection() {
    let port = spawn_add2_server().await;
    let mut client = Client::connect("::1", port).await.unwrap();

    assert!(client.find("nonexistent").await.unwrap().is_none());
    assert!(client.find("add2").await.unwrap().is_some());
}

#[tokio::test]
async fn scenario_two_concurrent_clients_distinct_operands() {
    let port = spawn_add2_server().await;

    let first = tokio::spawn(async move {
        let mut client = Client::connect("::1", port).await.unwrap();
        let handle = client.find("add2").await.unwrap().unwrap();
        let payload = Payload::with_blob(3, Bytes::from_static(&[4]));
        client.call(&handle, &payload).await.unwrap().unwrap().data1
    });
    let second = tokio::spawn(async move {
        let mut client = Client::connect("::1", port).await.unwrap();
        let handle = client.find("add2").await.unwrap().unwrap();
        let payload = Payload::with_blob(50, Bytes::from_static(&[9]));
        client.call(&handle, &payload).await.unwrap().unwrap().data1
    });

    let (a, b) = tokio::join!(first, second);
    assert_eq!(a.unwrap(), 7);
    assert_eq!(b.unwrap(), 59);
}

#[tokio::test]
async fn scenario_call_unregistered_handle_then_find_still_works() {
    let port = spawn_add2_server().await;
    let mut client = Client::connect("::1", port).await.unwrap();

    let bogus = rpc_client::Handle { function_id: 0x1234_5678_9abc_def0 };
    assert!(client.call(&bogus, &Payload::new(0)).await.unwrap().is_none());
    assert!(client.find("add2").await.unwrap().is_some());
}

#[tokio::test]
async fn scenario_disconnect_mid_call_server_keeps_accepting() {
    let port = spawn_add2_server().await;

    {
        let mut stream = TcpStream::connect(("::1", port)).await.unwrap();
        put_i32(&mut stream, 1).await.unwrap(); // CALL tag
        put_u64(&mut stream, rpc_core::djb2(b"add2")).await.unwrap();
        // drop before sending the payload or even reading the verification flag
    }

    // give the server a moment to notice the disconnect and clean up
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client = Client::connect("::1", port).await.unwrap();
    let handle = client.find("add2").await.unwrap().unwrap();
    let payload = Payload::with_blob(1, Bytes::from_static(&[1]));
    let response = client.call(&handle, &payload).await.unwrap().unwrap();
    assert_eq!(response.data1, 2);
}

#[tokio::test]
async fn ten_thousand_sequential_calls_on_one_connection() {
    let port = spawn_add2_server().await;
    let mut client = Client::connect("::1", port).await.unwrap();
    let handle = client.find("add2").await.unwrap().unwrap();

    for i in 0..10_000i32 {
        let payload = Payload::with_blob(i, Bytes::from_static(&[2]));
        let response = client.call(&handle, &payload).await.unwrap().unwrap();
        assert_eq!(response.data1, i + 2);
    }
}
