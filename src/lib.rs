//! FreeSWITCH Event Socket engine for Rust
//!
//! Speaks the FreeSWITCH Event Socket protocol in both directions: dial
//! into FreeSWITCH (inbound mode) or accept the connections its `socket`
//! dialplan application makes (outbound mode). Either way you get an
//! [`EslConnection`] that issues commands and receives events.
//!
//! # Architecture
//!
//! Each connection runs one background reader task that parses frames and
//! routes them by `Content-Type`:
//! - `command/reply` and `api/response` go to the single outstanding
//!   command, which holds the writer lock until its reply arrives
//! - everything else (events, log lines, linger notices) is queued for
//!   [`EslConnection::read_event`]
//!
//! The first transport failure is final: every pending and later call
//! reports [`EslError::Disconnected`] with the same [`DisconnectReason`].
//!
//! # Examples
//!
//! ## Inbound Connection
//!
//! ```rust,no_run
//! use freeswitch_eventsocket::{EslConnection, EslError, EventFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EslError> {
//!     let conn = EslConnection::dial("localhost:8021", "ClueCon").await?;
//!
//!     conn.subscribe_events(EventFormat::Json, "ALL").await?;
//!     conn.bgapi("originate user/1011 &park()").await?;
//!
//!     loop {
//!         let event = conn.read_event().await?;
//!         println!("{}", event.event_name().unwrap_or("?"));
//!         if event.header("Answer-State") == Some("hangup") {
//!             break;
//!         }
//!     }
//!     conn.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Outbound Mode
//!
//! ```rust,no_run
//! use freeswitch_eventsocket::{listen_and_serve, EslConnection, EslError, EventFormat};
//!
//! async fn handle(conn: EslConnection) {
//!     let _ = conn.connect_session().await;
//!     let _ = conn.myevents(EventFormat::Plain).await;
//!     let _ = conn.linger(Some(10)).await;
//!     let _ = conn.execute("answer", "", false).await;
//!     let _ = conn.execute("playback", "ivr/ivr-welcome.wav", true).await;
//!     while let Ok(event) = conn.read_event().await {
//!         if event.application_response() == Some("FILE PLAYED") {
//!             let _ = conn.exit().await;
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EslError> {
//!     listen_and_serve("0.0.0.0:8040", handle).await
//! }
//! ```
//!
//! Configure FreeSWITCH to connect to your app:
//! ```xml
//! <action application="socket" data="127.0.0.1:8040 async full"/>
//! ```
//!
//! ## Custom Events
//!
//! ```rust,no_run
//! # async fn example(conn: freeswitch_eventsocket::EslConnection) -> Result<(), freeswitch_eventsocket::EslError> {
//! use freeswitch_eventsocket::Evt;
//!
//! let evt = Evt::new()
//!     .header("Event-Subclass", "myapp::notify")
//!     .header("Unique-ID", "");
//! conn.send_event("CUSTOM", &evt, "").await?.into_result()?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod connection;
pub mod error;
pub mod event;
pub mod headers;
pub mod listener;

pub(crate) mod buffer;
pub(crate) mod command;
pub mod constants;
pub(crate) mod protocol;

pub use command::{EslCommand, Evt, ReplyStatus};
pub use connection::{ConnectionStatus, DisconnectReason, EslConnectOptions, EslConnection};
pub use constants::DEFAULT_ESL_PORT;
pub use error::{EslError, EslResult};
pub use event::{EslEvent, EventFormat};
pub use headers::{EventHeader, ParseNameError};
pub use listener::{listen_and_serve, EslListener};
