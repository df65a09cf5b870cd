//! Integration tests for the WebSocket client against an in-process server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hitbtc_sdk::ws::{Endpoint, FeedKind, WsClient, WsConfig, WsError};
use hitbtc_sdk::{Balance, Credential, NewOrder, OrderBook, Side};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_test::{assert_err, assert_ok};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type Frames = Arc<Mutex<Vec<Value>>>;

/// Reply that makes the test server close the connection.
const CLOSE: &str = "<close>";

/// Starts a server that accepts one connection and answers each request
/// with the frames returned by `script`. The script also gets the number
/// of earlier requests with the same method. A [`CLOSE`] reply closes the
/// connection.
async fn spawn_server<F>(script: F) -> (String, Frames)
where
    F: Fn(&Value, usize) -> Vec<String> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let frames: Frames = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&frames);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake");

        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            let frame: Value = serde_json::from_str(text.as_str()).expect("client json");
            let method = frame["method"].as_str().unwrap_or_default().to_string();

            let replies = {
                let mut recorded = recorded.lock().await;
                let seen = recorded
                    .iter()
                    .filter(|f| f["method"].as_str() == Some(method.as_str()))
                    .count();
                recorded.push(frame.clone());
                script(&frame, seen)
            };

            for reply in replies {
                if reply == CLOSE {
                    let _ = ws.close(None).await;
                    return;
                }
                if ws.send(Message::Text(reply.into())).await.is_err() {
                    return;
                }
            }
        }
    });

    (format!("ws://{}", addr), frames)
}

async fn next_frame(ws: &mut WebSocketStream<TcpStream>) -> Value {
    while let Some(msg) = ws.next().await {
        if let Message::Text(text) = msg.expect("client frame") {
            return serde_json::from_str(text.as_str()).expect("client json");
        }
    }
    panic!("client went away");
}

async fn wait_for_frames(frames: &Frames, count: usize) -> Vec<Value> {
    for _ in 0..200 {
        {
            let frames = frames.lock().await;
            if frames.len() >= count {
                return frames.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server did not receive {} frames", count);
}

fn ack(frame: &Value, result: Value) -> String {
    json!({"jsonrpc": "2.0", "id": frame["id"], "result": result}).to_string()
}

fn error(frame: &Value, code: i64, message: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": frame["id"],
        "error": {"code": code, "message": message, "description": "rejected by test server"}
    })
    .to_string()
}

fn book(method: &str, sequence: u64, ask: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": {
            "symbol": "ETHBTC",
            "sequence": sequence,
            "timestamp": "2018-11-19T05:00:28.193Z",
            "ask": [{"price": ask, "size": "1.0"}],
            "bid": [{"price": "0.0500", "size": "2.0"}]
        }
    })
    .to_string()
}

fn credential() -> Credential {
    Credential::new("test-key", "test-secret")
}

fn trading_config(url: &str) -> WsConfig {
    WsConfig::new(Endpoint::Trading)
        .with_url(url)
        .with_credential(credential())
        .with_auth_retry(5, Duration::from_millis(50))
}

/// Answers a login whose signature checks out.
fn login_reply(frame: &Value) -> Vec<String> {
    let params = &frame["params"];
    let timestamp: u64 = params["timestamp"]
        .as_str()
        .and_then(|ts| ts.parse().ok())
        .expect("timestamp string");
    let message = Credential::login_message(timestamp, params["window"].as_u64());
    let expected = credential().sign(message.as_bytes());

    if params["signature"].as_str() == Some(expected.as_str()) && params["type"] == "HS256" {
        vec![ack(frame, json!(true))]
    } else {
        vec![error(frame, 1002, "Authorization is required or has been failed")]
    }
}

#[tokio::test]
async fn test_login_then_privileged_call() {
    let (url, frames) = spawn_server(|frame, _| match frame["method"].as_str() {
        Some("login") => login_reply(frame),
        Some("spot_balances") => vec![ack(
            frame,
            json!([
                {"currency": "BTC", "available": "1.5", "reserved": "0.25"},
                {"currency": "ETH", "available": "10", "reserved": "0"}
            ]),
        )],
        _ => Vec::new(),
    })
    .await;

    let client = WsClient::new(trading_config(&url)).expect("client");
    client.connect().await.expect("connect");
    assert!(client.is_connected());
    assert!(client.is_authenticated());

    let balances: Vec<Balance> = assert_ok!(client.get_spot_balances().await);
    assert_eq!(balances.len(), 2);
    assert_eq!(balances[0].currency, "BTC");
    assert_eq!(balances[0].available, dec!(1.5));
    assert_eq!(balances[0].reserved, dec!(0.25));

    let frames = wait_for_frames(&frames, 2).await;
    assert_eq!(frames[0]["method"], "login");
    assert_eq!(frames[0]["id"], 2);
    assert_eq!(frames[1]["method"], "spot_balances");
    assert_eq!(frames[1]["id"], 3);
    assert_eq!(client.pending_requests(), 0);

    client.close().await;
}

#[tokio::test]
async fn test_login_rejected() {
    let (url, _frames) = spawn_server(|frame, _| match frame["method"].as_str() {
        Some("login") => vec![error(frame, 1002, "Authorization failed")],
        _ => Vec::new(),
    })
    .await;

    let client = WsClient::new(trading_config(&url)).expect("client");
    let result = client.connect().await;

    match result {
        Err(WsError::AuthRejected(e)) => {
            assert_eq!(e.code, 1002);
            assert_eq!(e.message, "Authorization failed");
        }
        other => panic!("expected AuthRejected, got {:?}", other),
    }
    assert!(!client.is_connected());
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_login_not_acknowledged() {
    let (url, frames) = spawn_server(|_, _| Vec::new()).await;

    let config = trading_config(&url).with_auth_retry(3, Duration::from_millis(30));
    let client = WsClient::new(config).expect("client");

    let result = client.connect().await;
    assert_eq!(result, Err(WsError::AuthTimeout));
    assert!(!client.is_connected());
    assert_eq!(client.pending_requests(), 0);

    let frames = wait_for_frames(&frames, 1).await;
    assert_eq!(frames[0]["method"], "login");
}

#[tokio::test]
async fn test_order_rejected_with_exchange_error() {
    let (url, _frames) = spawn_server(|frame, _| match frame["method"].as_str() {
        Some("login") => login_reply(frame),
        Some("spot_new_order") => vec![error(frame, 20001, "Insufficient funds")],
        _ => Vec::new(),
    })
    .await;

    let client = WsClient::new(trading_config(&url)).expect("client");
    client.connect().await.expect("connect");

    let order = NewOrder::limit("ETHBTC", Side::Buy, dec!(0.01), dec!(0.05));
    let reply = client.create_spot_order(&order).await.expect("sent");

    let err = reply.await.expect_err("order should be rejected");
    let exchange = err.exchange_error().expect("exchange error");
    assert_eq!(exchange.code, 20001);
    assert_eq!(
        exchange.full_message(),
        "Insufficient funds. rejected by test server"
    );
    assert_eq!(client.pending_requests(), 0);

    client.close().await;
}

#[tokio::test]
async fn test_order_book_gap_triggers_resubscribe() {
    let (url, frames) = spawn_server(|frame, seen| match frame["method"].as_str() {
        Some("subscribeOrderbook") if seen == 0 => vec![
            ack(frame, json!(true)),
            book("snapshotOrderbook", 100, "0.0550"),
            book("updateOrderbook", 101, "0.0549"),
            book("updateOrderbook", 103, "0.0548"),
        ],
        Some("subscribeOrderbook") => vec![
            ack(frame, json!(true)),
            book("snapshotOrderbook", 200, "0.0560"),
        ],
        _ => Vec::new(),
    })
    .await;

    let config = WsConfig::new(Endpoint::LegacyAccount).with_url(url);
    let client = WsClient::new(config).expect("client");
    client.connect().await.expect("connect");

    let (mut feed, ack) = client.subscribe_order_book("ETHBTC").await.expect("subscribe");
    assert_eq!(feed.key(), "orderbook:ETHBTC");
    assert_eq!(ack.await.expect("ack"), json!(true));

    let event = feed.next().await.expect("command");
    assert_eq!(event.kind(), FeedKind::Command);

    let event = feed.next().await.expect("snapshot");
    assert_eq!(event.kind(), FeedKind::Snapshot);
    assert_eq!(event.decode::<OrderBook>().expect("book").sequence, 100);

    let event = feed.next().await.expect("update");
    assert_eq!(event.kind(), FeedKind::Update);
    let updated: OrderBook = event.decode().expect("book");
    assert_eq!(updated.sequence, 101);
    assert_eq!(updated.asks.len(), 2);

    // Sequence 103 is dropped; the resubscribe ack arrives as a command.
    let event = feed.next().await.expect("resubscribe command");
    assert_eq!(event.kind(), FeedKind::Command);

    let event = feed.next().await.expect("fresh snapshot");
    assert_eq!(event.kind(), FeedKind::Snapshot);
    let fresh: OrderBook = event.decode().expect("book");
    assert_eq!(fresh.sequence, 200);
    assert_eq!(fresh.best_ask().expect("ask").price, dec!(0.0560));

    let frames = wait_for_frames(&frames, 2).await;
    assert_eq!(frames[1]["method"], "subscribeOrderbook");
    assert_eq!(frames[1]["params"], json!({"symbol": "ETHBTC"}));
    assert_ne!(frames[0]["id"], frames[1]["id"]);

    let book = client.order_book("ETHBTC").expect("book is updating");
    assert_eq!(book.sequence, 200);

    client.close().await;
}

#[tokio::test]
async fn test_channel_subscribe_and_unsubscribe() {
    let (url, frames) = spawn_server(|frame, _| match frame["method"].as_str() {
        Some("subscribe") => vec![
            ack(frame, json!({"ch": "trades", "subscriptions": ["BTCUSDT"]})),
            json!({"ch": "trades", "snapshot": {"BTCUSDT": [{"t": 1, "p": "30000", "q": "0.1", "s": "buy"}]}})
                .to_string(),
            json!({"ch": "trades", "update": {"BTCUSDT": [{"t": 2, "p": "30001", "q": "0.2", "s": "sell"}]}})
                .to_string(),
        ],
        Some("unsubscribe") => vec![ack(frame, json!({"ch": "trades", "subscriptions": []}))],
        _ => Vec::new(),
    })
    .await;

    let config = WsConfig::new(Endpoint::MarketData).with_url(url);
    let client = WsClient::new(config).expect("client");
    client.connect().await.expect("connect");
    assert!(!client.is_authenticated());

    let (mut trades, ack) = client.subscribe_trades(&["BTCUSDT"]).await.expect("subscribe");
    let ack: hitbtc_sdk::ws::SubscriptionAck =
        serde_json::from_value(ack.await.expect("ack")).expect("ack shape");
    assert_eq!(ack.subscriptions, vec!["BTCUSDT".to_string()]);

    let snapshot = trades.next().await.expect("snapshot");
    assert_eq!(snapshot.kind(), FeedKind::Snapshot);
    let update = trades.next().await.expect("update");
    assert_eq!(update.kind(), FeedKind::Update);
    assert_eq!(update.payload()["BTCUSDT"][0]["p"], "30001");
    assert_eq!(client.subscription_keys(), vec!["trades".to_string()]);

    let reply = client.unsubscribe_trades(&["BTCUSDT"]).await.expect("unsubscribe");
    reply.await.expect("unsubscribe ack");
    assert!(client.subscription_keys().is_empty());
    assert!(trades.next().await.is_none());

    let frames = wait_for_frames(&frames, 2).await;
    assert_eq!(frames[0]["ch"], "trades");
    assert_eq!(frames[0]["params"], json!({"symbols": ["BTCUSDT"]}));
    assert_eq!(frames[1]["method"], "unsubscribe");

    client.close().await;
}

#[tokio::test]
async fn test_close_fails_pending_requests() {
    let (url, _frames) = spawn_server(|_, _| Vec::new()).await;

    let config = WsConfig::new(Endpoint::MarketData).with_url(url);
    let client = WsClient::new(config).expect("client");
    client.connect().await.expect("connect");

    let first = client.request("public/ticker", json!({})).await.expect("first");
    let second = client.request("public/trades", json!({})).await.expect("second");
    assert_eq!(client.pending_requests(), 2);

    client.close().await;

    assert_eq!(first.await, Err(WsError::ConnectionClosed));
    assert_eq!(second.await, Err(WsError::ConnectionClosed));
    assert_eq!(client.pending_requests(), 0);
    assert!(!client.is_connected());

    let err = assert_err!(client.request("public/ticker", json!({})).await);
    assert_eq!(err, WsError::TransportClosed);
}

#[tokio::test]
async fn test_invalid_json_closes_connection() {
    let (url, _frames) = spawn_server(|frame, _| match frame["method"].as_str() {
        Some("poison") => vec!["this is not json".to_string()],
        _ => Vec::new(),
    })
    .await;

    let config = WsConfig::new(Endpoint::MarketData).with_url(url);
    let client = WsClient::new(config).expect("client");
    client.connect().await.expect("connect");

    let pending = client.request("poison", json!({})).await.expect("sent");
    assert_eq!(pending.await, Err(WsError::ConnectionClosed));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_second_connect_keeps_session() {
    let (url, frames) = spawn_server(|frame, _| match frame["method"].as_str() {
        Some("login") => login_reply(frame),
        Some("spot_balances") => vec![ack(frame, json!([]))],
        _ => Vec::new(),
    })
    .await;

    let client = WsClient::new(trading_config(&url)).expect("client");
    client.connect().await.expect("connect");

    let err = assert_err!(client.connect().await);
    assert!(matches!(err, WsError::Connection(_)));
    assert!(client.is_connected());
    assert!(client.is_authenticated());

    let balances: Vec<Balance> = assert_ok!(client.get_spot_balances().await);
    assert!(balances.is_empty());

    let frames = wait_for_frames(&frames, 2).await;
    let logins = frames.iter().filter(|f| f["method"] == "login").count();
    assert_eq!(logins, 1);

    client.close().await;
}

#[tokio::test]
async fn test_server_close_drops_login() {
    let (url, _frames) = spawn_server(|frame, _| match frame["method"].as_str() {
        Some("login") => login_reply(frame),
        Some("spot_fees") => vec![CLOSE.to_string()],
        _ => Vec::new(),
    })
    .await;

    let client = WsClient::new(trading_config(&url)).expect("client");
    client.connect().await.expect("connect");
    assert!(client.is_authenticated());

    let pending = client.request("spot_fees", json!({})).await.expect("sent");
    assert_eq!(pending.await, Err(WsError::ConnectionClosed));

    assert!(!client.is_connected());
    assert!(!client.is_authenticated());
    let err = assert_err!(client.get_spot_balances().await);
    assert_eq!(err, WsError::TransportClosed);
}

#[tokio::test]
async fn test_privileged_call_waits_for_login() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}", listener.local_addr().expect("addr"));

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake");

        let login = next_frame(&mut ws).await;
        // Hold the ack back; nothing else may arrive meanwhile.
        let early = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
        assert!(early.is_err(), "request sent before login was acknowledged");
        for reply in login_reply(&login) {
            ws.send(Message::Text(reply.into())).await.expect("send");
        }

        let request = next_frame(&mut ws).await;
        ws.send(Message::Text(ack(&request, json!([])).into()))
            .await
            .expect("send");
        vec![login["method"].clone(), request["method"].clone()]
    });

    let config = trading_config(&url).with_auth_retry(20, Duration::from_millis(50));
    let client = Arc::new(WsClient::new(config).expect("client"));
    let connecting = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.connect().await }
    });

    for _ in 0..200 {
        if client.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(client.is_connected());
    assert!(!client.is_authenticated());

    let balances: Vec<Balance> = assert_ok!(client.get_spot_balances().await);
    assert!(balances.is_empty());
    assert!(client.is_authenticated());
    assert_ok!(connecting.await.expect("connect task"));

    let methods = server.await.expect("server");
    assert_eq!(methods, vec![json!("login"), json!("spot_balances")]);

    client.close().await;
}

#[tokio::test]
async fn test_waiting_call_fails_when_connection_closes() {
    let (url, frames) = spawn_server(|_, _| Vec::new()).await;

    let config = trading_config(&url).with_auth_retry(20, Duration::from_millis(50));
    let client = Arc::new(WsClient::new(config).expect("client"));
    let connecting = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.connect().await }
    });
    wait_for_frames(&frames, 1).await;

    let waiting = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.get_spot_balances().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiting.is_finished());

    client.close().await;

    let err = assert_err!(waiting.await.expect("waiting task"));
    assert_eq!(err, WsError::ConnectionClosed);
    let err = assert_err!(connecting.await.expect("connect task"));
    assert_eq!(err, WsError::ConnectionClosed);
    assert!(!client.is_authenticated());

    let frames = wait_for_frames(&frames, 1).await;
    assert_eq!(frames.len(), 1);
}

#[tokio::test]
async fn test_order_book_unsubscribe_clears_state() {
    let (url, _frames) = spawn_server(|frame, _| match frame["method"].as_str() {
        Some("subscribeOrderbook") => vec![
            ack(frame, json!(true)),
            book("snapshotOrderbook", 100, "0.0550"),
        ],
        Some("unsubscribeOrderbook") => vec![
            ack(frame, json!(true)),
            book("updateOrderbook", 101, "0.0549"),
        ],
        Some("getSymbol") => vec![ack(frame, json!({"id": "ETHBTC"}))],
        _ => Vec::new(),
    })
    .await;

    let config = WsConfig::new(Endpoint::LegacyAccount).with_url(url);
    let client = WsClient::new(config).expect("client");
    client.connect().await.expect("connect");

    let (mut feed, ack) = client.subscribe_order_book("ETHBTC").await.expect("subscribe");
    ack.await.expect("ack");
    assert_eq!(feed.next().await.expect("command").kind(), FeedKind::Command);
    assert_eq!(feed.next().await.expect("snapshot").kind(), FeedKind::Snapshot);
    assert!(client.order_book("ETHBTC").is_some());

    let reply = client.unsubscribe_order_book("ETHBTC").await.expect("unsubscribe");
    reply.await.expect("unsubscribe ack");

    // The late diff is routed before this reply.
    let reply = client
        .request("getSymbol", json!({"symbol": "ETHBTC"}))
        .await
        .expect("sent");
    reply.await.expect("symbol");

    assert!(client.subscription_keys().is_empty());
    assert!(client.order_book("ETHBTC").is_none());
    assert_eq!(client.pending_requests(), 0);
    assert!(feed.next().await.is_none());

    client.close().await;
}
