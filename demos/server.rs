//! Outbound server: FreeSWITCH connects here through the `socket`
//! application; each call is answered and played a file.
//!
//! Usage: cargo run --example server -- [listen-addr] [audio-file]
//!
//! Dialplan: `<action application="socket" data="127.0.0.1:9090 async full"/>`

use freeswitch_eventsocket::{EslConnection, EslListener, EslResult, EventFormat};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

async fn handle_call(conn: EslConnection, audio_file: String) -> EslResult<()> {
    println!("new client: {:?}", conn.remote_addr());

    let channel = conn
        .connect_session()
        .await?;
    info!(
        "Session {} from {}",
        channel
            .unique_id()
            .unwrap_or("?"),
        channel
            .header("Caller-Caller-ID-Number")
            .unwrap_or("unknown")
    );
    conn.linger(Some(10))
        .await?;
    conn.myevents(EventFormat::Plain)
        .await?;
    conn.execute("answer", "", false)
        .await?;
    let accepted = conn
        .execute("playback", &audio_file, true)
        .await?;
    println!("{}", accepted);

    loop {
        let event = conn
            .read_event()
            .await?;
        println!("\nNew event\n{}", event);
        if event.application() == Some("playback")
            && event.application_response() == Some("FILE PLAYED")
        {
            conn.exit()
                .await?;
        }
    }
}

#[tokio::main]
async fn main() -> EslResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let addr = args
        .next()
        .unwrap_or_else(|| "0.0.0.0:9090".to_string());
    let audio_file = args
        .next()
        .unwrap_or_else(|| "/tmp/freeswitch/welcome.wav".to_string());

    let listener = EslListener::bind(addr.as_str()).await?;
    info!("Waiting for FreeSWITCH on {}", listener.local_addr()?);

    listener
        .serve_with_shutdown(
            move |conn| {
                let audio_file = audio_file.clone();
                async move {
                    if let Err(e) = handle_call(conn, audio_file).await {
                        warn!("Session ended: {}", e);
                    }
                }
            },
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
        )
        .await
}
