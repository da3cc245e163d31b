//! Inbound client: dial FreeSWITCH, originate a call into an outbound
//! socket and print events until the call hangs up.
//!
//! Usage: cargo run --example client -- [host:port] [password] [destination]

use freeswitch_eventsocket::{EslConnection, EventFormat, DEFAULT_ESL_PORT};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SOCKET_DIALPLAN: &str = "&socket(127.0.0.1:9090 async)";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let addr = args
        .next()
        .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_ESL_PORT));
    let password = args
        .next()
        .unwrap_or_else(|| "ClueCon".to_string());
    let dest = args
        .next()
        .unwrap_or_else(|| "user/1011".to_string());

    let conn = EslConnection::dial(addr.as_str(), &password).await?;
    info!("Connected to {}", addr);

    conn.subscribe_events(EventFormat::Json, "ALL")
        .await?;
    let job = conn
        .bgapi(&format!("originate {} {}", dest, SOCKET_DIALPLAN))
        .await?;
    info!("Originate queued as job {}", job.job_uuid().unwrap_or("?"));

    loop {
        let event = conn
            .read_event()
            .await?;
        println!("\nNew event\n{}", event);
        if event.header("Answer-State") == Some("hangup") {
            break;
        }
    }

    conn.close()
        .await;
    Ok(())
}
