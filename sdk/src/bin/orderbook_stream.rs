//! Order book stream binary.
//!
//! Subscribes to the legacy order-book feed of one symbol and prints the
//! top of the reconstructed book after every applied message.

use std::env;

use hitbtc_sdk::ws::{Endpoint, WsClient, WsConfig};
use hitbtc_sdk::OrderBook;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hitbtc_sdk=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let symbol = env::args()
        .nth(1)
        .or_else(|| env::var("HITBTC_SYMBOL").ok())
        .unwrap_or_else(|| "ETHBTC".to_string());

    let mut config = WsConfig::from_env(Endpoint::LegacyAccount);
    if let Ok(url) = env::var("HITBTC_WS_URL") {
        config = config.with_url(url);
    }

    let client = WsClient::new(config)?;
    client.connect().await?;

    let (mut feed, ack) = client.subscribe_order_book(&symbol).await?;
    tracing::info!("Subscribed to {}: {}", feed.key(), ack.await?);

    loop {
        tokio::select! {
            event = feed.next() => {
                let Some(event) = event else {
                    tracing::warn!("Order book feed ended");
                    break;
                };
                match event.decode::<OrderBook>() {
                    Ok(book) => print_top(&book),
                    Err(_) => tracing::debug!("{} event: {}", event.kind(), event.payload()),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    client.close().await;
    Ok(())
}

fn print_top(book: &OrderBook) {
    let bid = book
        .best_bid()
        .map_or_else(|| "-".to_string(), |l| format!("{} x {}", l.price, l.size));
    let ask = book
        .best_ask()
        .map_or_else(|| "-".to_string(), |l| format!("{} x {}", l.price, l.size));
    println!("{} #{}  bid {}  ask {}", book.symbol, book.sequence, bid, ask);
}
