//! Connection loop and application handle
//!
//! `Client` owns the transport and the session. A single task drives it: every
//! iteration writes pending frames, reads with a short timeout and then runs one
//! session tick whether or not bytes arrived, so heartbeat timing stays accurate on
//! an idle link. Application code outside handlers talks to the loop through a
//! cloneable `ClientHandle`.

mod connection;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::core::{Config, Error, Result};
use crate::dispatch::HandlerRegistry;
use crate::protocol::{ConnectionState, Message, Session};
use crate::util::Clock;

/// Messages a handle can queue before `send` reports a full queue
const MESSAGE_QUEUE_CAPACITY: usize = 100;

/// Handle for sending messages through the connection loop
#[derive(Debug, Clone)]
pub struct ClientHandle {
    message_tx: mpsc::Sender<Message>,
    stop: Arc<AtomicBool>,
}

impl ClientHandle {
    /// Queues a message for the connection loop.
    ///
    /// Queued messages are written on the next loop iteration while connected and
    /// wait while the login is in progress. Anything still queued when a new
    /// connection is opened is discarded, so messages sent while disconnected are
    /// dropped. Fails when the queue is full or the client is gone.
    pub fn send(&self, message: Message) -> Result<()> {
        self.message_tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => Error::network("message queue is full"),
            TrySendError::Closed(_) => Error::network("Client has been dropped"),
        })
    }

    pub fn virtual_write<P, I, V>(&self, pin: P, values: I) -> Result<()>
    where
        P: ToString,
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.send(Message::virtual_write(pin, values))
    }

    pub fn sync_virtual<I, P>(&self, pins: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: ToString,
    {
        self.send(Message::sync_virtual(pins))
    }

    pub fn set_property<P, I, V>(&self, pin: P, property: &str, values: I) -> Result<()>
    where
        P: ToString,
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.send(Message::set_property(pin, property, values))
    }

    pub fn notify(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::Notify(text.into()))
    }

    pub fn tweet(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::Tweet(text.into()))
    }

    pub fn email(
        &self,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<()> {
        self.send(Message::Email {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        })
    }

    pub fn log_event(&self, name: impl Into<String>, description: Option<&str>) -> Result<()> {
        self.send(Message::LogEvent {
            name: name.into(),
            description: description.map(str::to_owned),
        })
    }

    /// Asks the client to close. Safe to call at any time, any number of times.
    ///
    /// A running loop closes after its current iteration and `run` returns `Ok`.
    /// An `open` in progress, or the next one if the client is disconnected, is
    /// cancelled instead. The request is cleared once one of them acts on it.
    pub fn close(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_closing(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Blynk client over a byte-stream transport
pub struct Client<S = TcpStream> {
    /// Settings
    config: Config,
    /// Protocol state machine
    session: Session,
    /// Transport of the current connection
    stream: Option<S>,
    /// Session clock
    clock: Clock,
    /// Messages queued by handles
    message_rx: mpsc::Receiver<Message>,
    /// Template for new handles
    handle: ClientHandle,
    /// Buffer for socket reads
    read_buf: BytesMut,
}

impl<S> std::fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.config.endpoint())
            .field("state", &self.session.state())
            .field("latency", &self.session.latency())
            .finish()
    }
}

impl Client<TcpStream> {
    /// Creates a TCP client
    pub fn new(config: Config, handlers: HandlerRegistry) -> Self {
        Self::with_transport(config, handlers)
    }

    /// Creates a TCP client after validating `config`
    pub fn from_config(config: Config, handlers: HandlerRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config, handlers))
    }

    /// Connects to the configured server and completes the login handshake.
    ///
    /// Returns the handshake latency. No retry is attempted on failure.
    pub async fn open(&mut self) -> Result<Duration> {
        if self.session.state() != ConnectionState::Disconnected {
            return Err(Error::invalid_state("client is already open"));
        }
        if self.take_close_request() {
            return Err(Error::invalid_state("open cancelled by close"));
        }
        let stream = connection::connect(&self.config).await?;
        self.open_with(stream).await
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client for any byte-stream transport
    pub fn with_transport(config: Config, handlers: HandlerRegistry) -> Self {
        let (message_tx, message_rx) = mpsc::channel(MESSAGE_QUEUE_CAPACITY);
        let session = Session::new(&config, handlers);
        let read_buf = BytesMut::with_capacity(config.buffer_size);
        Client {
            config,
            session,
            stream: None,
            clock: Clock::new(),
            message_rx,
            handle: ClientHandle {
                message_tx,
                stop: Arc::new(AtomicBool::new(false)),
            },
            read_buf,
        }
    }

    /// Returns a handle for sending messages and closing the connection
    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn latency(&self) -> Option<Duration> {
        self.session.latency()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handlers, kept across reconnects
    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        self.session.handlers_mut()
    }

    /// Logs in over an already connected transport and waits for the response
    pub async fn open_with(&mut self, stream: S) -> Result<Duration> {
        if self.session.state() != ConnectionState::Disconnected {
            return Err(Error::invalid_state("client is already open"));
        }

        if self.take_close_request() {
            self.stream = Some(stream);
            self.close().await;
            return Err(Error::invalid_state("open cancelled by close"));
        }

        let mut stale = 0;
        while self.message_rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(count = stale, "discarding messages queued while disconnected");
        }

        self.stream = Some(stream);
        if let Err(e) = self.session.open(self.clock.now_ms()) {
            self.session.close();
            self.stream = None;
            return Err(e);
        }
        self.flush().await?;

        loop {
            if self.take_close_request() {
                self.close().await;
                return Err(Error::invalid_state("open cancelled by close"));
            }
            self.tick().await?;
            match self.session.state() {
                ConnectionState::Connected => {
                    let latency = self.session.latency().unwrap_or_default();
                    info!(endpoint = %self.config.endpoint(), ?latency, "session established");
                    return Ok(latency);
                }
                ConnectionState::Disconnected => return Err(Error::HandshakeTimeout),
                ConnectionState::Connecting => {}
            }
        }
    }

    /// Runs the connection loop until the connection ends.
    ///
    /// Returns `Ok` after a heartbeat timeout or `close`, and the error for
    /// transport failures and protocol violations. Reconnecting is up to the caller.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            if self.take_close_request() {
                self.close().await;
                return Ok(());
            }
            if self.stream.is_none() || !self.session.state().is_active() {
                self.close().await;
                return Ok(());
            }
            self.tick().await?;
        }
    }

    /// Closes the connection. Safe to call at any time, any number of times.
    pub async fn close(&mut self) {
        self.session.close();
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "transport shutdown failed");
            }
        }
    }

    /// Consumes a pending `ClientHandle::close` request
    fn take_close_request(&self) -> bool {
        self.handle.stop.swap(false, Ordering::AcqRel)
    }

    /// One loop iteration: send queued messages, read with a timeout, process
    async fn tick(&mut self) -> Result<()> {
        if self.session.state() == ConnectionState::Connected {
            let now = self.clock.now_ms();
            while let Ok(message) = self.message_rx.try_recv() {
                if let Err(e) = self.session.send(now, message) {
                    warn!(error = %e, "dropping outbound message");
                }
            }
            self.flush().await?;
        }

        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        self.read_buf.clear();
        let read = timeout(self.config.read_timeout, stream.read_buf(&mut self.read_buf)).await;
        let received = match read {
            Err(_) => 0,
            Ok(Ok(0)) => return self.lose_transport(Error::ConnectionClosed),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return self.lose_transport(e.into()),
        };

        let now = self.clock.now_ms();
        let outcome = self.session.process(now, &self.read_buf[..received]);
        if !self.session.state().is_active() {
            self.close().await;
            return outcome;
        }
        outcome?;
        self.flush().await
    }

    /// Writes everything the session has encoded
    async fn flush(&mut self) -> Result<()> {
        let output = self.session.take_output();
        if output.is_empty() {
            return Ok(());
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let written = async {
            stream.write_all(&output).await?;
            stream.flush().await
        }
        .await;
        match written {
            Ok(()) => Ok(()),
            Err(e) => self.lose_transport(e.into()),
        }
    }

    fn lose_transport(&mut self, err: Error) -> Result<()> {
        warn!(error = %err, "transport failed");
        self.stream = None;
        self.session.transport_lost();
        Err(err)
    }
}
