//! # parley-demo
//!
//! Walks two local users through a conversation against the configured
//! document store and prints both chat lists.

use anyhow::Context;
use parley_client::{init_tracing, ChatClient, ClientConfig};
use parley_shared::constants::APP_NAME;
use parley_shared::UserId;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info,parley_client=debug,parley_store=info");
    info!("Starting {} demo v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let client = ChatClient::open(&config).context("failed to open document store")?;

    let ann = UserId::from("demo-ann");
    let bob = UserId::from("demo-bob");
    client
        .directory()
        .register(&ann, "ann", "Ann")
        .await
        .context("failed to register ann")?;
    client
        .directory()
        .register(&bob, "bob", "Bob")
        .await
        .context("failed to register bob")?;

    let thread = client
        .start_chat(&ann, &bob)
        .await
        .context("failed to start chat")?;

    let report = client
        .send_text(&thread, &ann, "Hi Bob! This message is long enough to be truncated.")
        .await
        .context("failed to send message")?;
    info!(?report, "Message delivered");

    client
        .send_text(&thread, &bob, "Hey Ann")
        .await
        .context("failed to send reply")?;

    for user in [&ann, &bob] {
        println!("Chats of {user}:");
        for entry in client.list_chats(user).await? {
            let marker = if entry.message_seen { ' ' } else { '*' };
            println!(
                "  {marker} {:<8} {:<36} {}",
                entry.user_data.name,
                entry.last_message,
                entry.updated_at.format("%H:%M:%S")
            );
        }
    }

    Ok(())
}
