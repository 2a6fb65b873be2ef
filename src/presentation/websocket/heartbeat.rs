//! Connection liveness.
//!
//! The writer pings every interval; any inbound frame, pongs included, counts
//! as a sign of life. A peer silent for two intervals is dropped.

use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// What the read side saw next.
#[derive(Debug)]
pub enum Inbound {
    Frame(Message),
    Closed,
    Failed(axum::Error),
    Expired,
}

pub struct Heartbeat {
    check: Interval,
    timeout: Duration,
    last_seen: Instant,
}

impl Heartbeat {
    pub fn new(every: Duration) -> Self {
        let now = Instant::now();
        let mut check = interval_at(now + every, every);
        check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            check,
            timeout: every * 2,
            last_seen: now,
        }
    }

    /// Wait for the next frame from the peer, or for the peer to go quiet.
    pub async fn next<S>(&mut self, receiver: &mut S) -> Inbound
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        loop {
            tokio::select! {
                msg = receiver.next() => {
                    return match msg {
                        Some(Ok(Message::Close(_))) | None => Inbound::Closed,
                        Some(Ok(message)) => {
                            self.last_seen = Instant::now();
                            Inbound::Frame(message)
                        }
                        Some(Err(e)) => Inbound::Failed(e),
                    };
                }
                _ = self.check.tick() => {
                    if self.last_seen.elapsed() >= self.timeout {
                        return Inbound::Expired;
                    }
                }
            }
        }
    }
}
