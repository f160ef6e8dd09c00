//! Sleep-transition producer.
//!
//! Subscribes to the signal emitted by the systemd sleep hook and forwards
//! each `(stage, operation, extra)` triple into the reducer inbox. The
//! engine decides what to act on; this task only decodes and forwards.

use crate::event::{Event, SleepEvent};
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use zbus::message::Type as MessageType;
use zbus::{Connection, MatchRule, MessageStream};

const SLEEP_SIGNAL_PATH: &str = "/BatteryStats";
const SLEEP_SIGNAL_INTERFACE: &str = "BatteryStats.Sleep";
const SLEEP_SIGNAL_MEMBER: &str = "SystemdSleepEvent";

/// Sleep-signal producer task. Runs until shutdown or channel closure;
/// decoding failures propagate to the caller.
pub async fn run_sleep_monitor(
    conn: Connection,
    events: mpsc::Sender<Event>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), zbus::Error> {
    let rule = MatchRule::builder()
        .msg_type(MessageType::Signal)
        .path(SLEEP_SIGNAL_PATH)?
        .interface(SLEEP_SIGNAL_INTERFACE)?
        .member(SLEEP_SIGNAL_MEMBER)?
        .build();

    let mut stream = MessageStream::for_match_rule(rule, &conn, None).await?;
    info!("subscribed to sleep events");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("sleep monitor shutting down");
                    break;
                }
            }
            message = stream.next() => {
                let Some(message) = message else {
                    warn!("sleep signal stream ended");
                    break;
                };
                let message = message?;
                let (stage, operation, extra): (String, String, String) =
                    message.body().deserialize()?;

                let event = SleepEvent {
                    stage,
                    operation,
                    extra,
                };
                if events.send(Event::Sleep(event)).await.is_err() {
                    break;
                }
            }
        }
    }

    Ok(())
}
