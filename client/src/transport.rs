//! Reconnecting WebSocket channel.
//!
//! The socket itself runs in a spawned task that reports back over an
//! unbounded channel; all state transitions happen inside
//! [`Transport::next_event`] on the owning task, so the transport needs no
//! locking. A close that was not requested schedules a reconnect after a
//! backoff delay; the timer handle lives on the transport and is aborted on a
//! successful open or an explicit close.

use crate::backoff::{Backoff, BackoffConfig};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Anything the synchronizer can hand an encoded frame to
pub trait Channel {
    /// Returns `false` when the frame could not be handed to an open channel
    fn send(&mut self, message: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// What the owner of a transport gets to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Data(String),
    Reconnecting { delay: Duration },
    Disconnected,
}

/// Reports from socket and timer tasks, tagged with the connection attempt
/// they belong to so late reports from an abandoned attempt are ignored.
#[derive(Debug)]
enum Signal {
    Opened {
        generation: u64,
        outbound: mpsc::UnboundedSender<Message>,
    },
    Frame {
        generation: u64,
        text: String,
    },
    Closed {
        generation: u64,
    },
    ReconnectDue {
        generation: u64,
    },
}

pub struct Transport {
    url: String,
    state: ChannelState,
    backoff: Backoff,
    explicit_close: bool,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    socket_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    queued: VecDeque<TransportEvent>,
}

impl Transport {
    pub fn new(url: impl Into<String>, backoff: BackoffConfig) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            state: ChannelState::Disconnected,
            backoff: Backoff::new(backoff),
            explicit_close: false,
            generation: 0,
            outbound: None,
            socket_task: None,
            reconnect_timer: None,
            signal_tx,
            signal_rx,
            queued: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Starts opening the channel unless an attempt is already under way
    pub fn connect(&mut self) {
        if matches!(
            self.state,
            ChannelState::Connecting | ChannelState::Connected
        ) {
            return;
        }
        self.explicit_close = false;
        self.cancel_reconnect_timer();
        self.generation += 1;
        self.state = ChannelState::Connecting;
        debug!("Opening {} (attempt {})", self.url, self.generation);

        let url = self.url.clone();
        let signals = self.signal_tx.clone();
        let generation = self.generation;
        self.socket_task = Some(tokio::spawn(run_socket(url, generation, signals)));
    }

    /// Hands a frame to the open socket. Never fails past this boundary.
    pub fn send(&self, message: &str) -> bool {
        if self.state != ChannelState::Connected {
            return false;
        }
        match &self.outbound {
            Some(outbound) => outbound.send(Message::Text(message.to_string())).is_ok(),
            None => false,
        }
    }

    /// Closes the channel for good; no reconnect follows
    pub fn close(&mut self) {
        self.explicit_close = true;
        self.cancel_reconnect_timer();
        match self.state {
            ChannelState::Connected => {
                // The socket task sends a close frame once its outbound queue ends.
                self.outbound = None;
            }
            ChannelState::Connecting => {
                if let Some(task) = self.socket_task.take() {
                    task.abort();
                }
                self.generation += 1;
                self.state = ChannelState::Disconnected;
                self.queued.push_back(TransportEvent::Disconnected);
            }
            ChannelState::Reconnecting => {
                self.state = ChannelState::Disconnected;
                self.queued.push_back(TransportEvent::Disconnected);
            }
            ChannelState::Disconnected => {}
        }
    }

    /// Waits for the next event. Returns `None` once the channel has been
    /// closed and every event has been delivered.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(event);
            }
            if self.state == ChannelState::Disconnected {
                return None;
            }
            let signal = self.signal_rx.recv().await?;
            if let Some(event) = self.handle_signal(signal) {
                return Some(event);
            }
        }
    }

    fn handle_signal(&mut self, signal: Signal) -> Option<TransportEvent> {
        match signal {
            Signal::Opened {
                generation,
                outbound,
            } if generation == self.generation && self.state == ChannelState::Connecting => {
                self.cancel_reconnect_timer();
                self.backoff.reset();
                self.outbound = Some(outbound);
                self.state = ChannelState::Connected;
                info!("Connected to {}", self.url);
                Some(TransportEvent::Connected)
            }
            Signal::Frame { generation, text }
                if generation == self.generation && self.state == ChannelState::Connected =>
            {
                Some(TransportEvent::Data(text))
            }
            Signal::Closed { generation } if generation == self.generation => {
                self.outbound = None;
                self.socket_task = None;
                if self.explicit_close {
                    self.state = ChannelState::Disconnected;
                    info!("Disconnected from {}", self.url);
                    return Some(TransportEvent::Disconnected);
                }
                let delay = self.backoff.fail();
                self.state = ChannelState::Reconnecting;
                warn!(
                    "Lost connection to {}, retrying in {}ms",
                    self.url,
                    delay.as_millis()
                );
                self.schedule_reconnect(delay);
                Some(TransportEvent::Reconnecting { delay })
            }
            Signal::ReconnectDue { generation }
                if generation == self.generation && self.state == ChannelState::Reconnecting =>
            {
                self.reconnect_timer = None;
                self.connect();
                None
            }
            other => {
                debug!("Ignoring stale transport signal {:?}", other);
                None
            }
        }
    }

    fn schedule_reconnect(&mut self, delay: Duration) {
        self.cancel_reconnect_timer();
        let signals = self.signal_tx.clone();
        let generation = self.generation;
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = signals.send(Signal::ReconnectDue { generation });
        }));
    }

    fn cancel_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

impl Channel for Transport {
    fn send(&mut self, message: &str) -> bool {
        Transport::send(self, message)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.cancel_reconnect_timer();
        if let Some(task) = self.socket_task.take() {
            task.abort();
        }
    }
}

/// Owns one socket for its whole life and reports what happens to it
async fn run_socket(url: String, generation: u64, signals: mpsc::UnboundedSender<Signal>) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            debug!("Failed to open {}: {}", url, e);
            let _ = signals.send(Signal::Closed { generation });
            return;
        }
    };
    let (mut write, mut read) = stream.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    if signals.send(Signal::Opened { generation, outbound }).is_err() {
        return;
    }

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => match outgoing {
                Some(message) => {
                    if let Err(e) = write.send(message).await {
                        debug!("Send on {} failed: {}", url, e);
                        break;
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if signals.send(Signal::Frame { generation, text }).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Receive on {} failed: {}", url, e);
                    break;
                }
            },
        }
    }

    let _ = signals.send(Signal::Closed { generation });
}
