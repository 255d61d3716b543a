//! Heartbeat evaluation
//!
//! A pure function of the timing state and the heartbeat interval. The connection
//! evaluates it on every tick, so the caller must tick even when no bytes arrive.

/// Monotonic millisecond timestamps of the last traffic on a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    /// Last frame written
    pub last_send: u64,
    /// Last frame read
    pub last_receive: u64,
    /// Last keepalive ping written
    pub last_ping: u64,
}

impl Timing {
    /// Timing of a freshly opened connection
    pub fn opened(now: u64) -> Self {
        Timing {
            last_send: now,
            last_receive: now,
            last_ping: 0,
        }
    }
}

/// Outcome of a heartbeat evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing to do
    Idle,
    /// A ping should be sent now
    PingDue,
    /// No inbound traffic for more than 1.5 intervals; the link is dead
    Expired,
}

/// Decides what the heartbeat requires at `now` for an interval of `interval` ms
pub fn check(timing: &Timing, interval: u64, now: u64) -> Verdict {
    let since_receive = now.saturating_sub(timing.last_receive);
    if since_receive > interval + interval / 2 {
        return Verdict::Expired;
    }

    let since_ping = now.saturating_sub(timing.last_ping);
    let since_send = now.saturating_sub(timing.last_send);
    if since_ping > interval / 10 && (since_send > interval || since_receive > interval) {
        return Verdict::PingDue;
    }

    Verdict::Idle
}
