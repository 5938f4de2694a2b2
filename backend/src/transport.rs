use crate::config::ConsoleConfig;
use crate::error::TransportError;
use crate::state::AppState;
use crate::telemetry_task::get_current_timestamp_ms;
use crate::web::emit_warning;
use neobot_shared::{COMMAND_TOPIC, Channel, CommandToken, LinkState, LogKind};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

/// Bound on requests queued inside the MQTT client before `publish` waits.
const CLIENT_REQUEST_CAP: usize = 64;

pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

pub(crate) type HandlerSlot = Arc<RwLock<Option<MessageHandler>>>;

/// Raw inbound message handed from the I/O loop to the telemetry task.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

// ======================================================================
//  Transport Trait
// ======================================================================
pub trait Transport: Send + Sync + 'static {
    /// Install the inbound handler. It runs on the I/O loop and must not block.
    fn on_message(&self, handler: MessageHandler);

    fn publish(
        &self,
        topic: &str,
        payload: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn link(&self) -> watch::Receiver<LinkState>;
}

pub(crate) fn deliver(slot: &HandlerSlot, topic: &str, payload: &[u8]) {
    let handler = slot
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    match handler {
        Some(handler) => handler(topic, payload),
        None => tracing::debug!(topic, "no handler installed, dropping message"),
    }
}

// ======================================================================
//  MQTT Implementation
// ======================================================================
pub struct MqttTransport {
    client: AsyncClient,
    handler: HandlerSlot,
    link_rx: watch::Receiver<LinkState>,
    publish_timeout: Duration,
}

impl MqttTransport {
    /// Build the client and its I/O loop. Nothing touches the network until
    /// the returned loop is spawned, so install the handler first. Connection
    /// failures are then retried forever.
    pub fn connect(
        endpoint: &str,
        port: u16,
        cfg: &ConsoleConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> (Self, impl Future<Output = ()> + Send + use<>) {
        let mut options = MqttOptions::new(cfg.client_id.clone(), endpoint, port);
        options.set_keep_alive(cfg.keep_alive());
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, CLIENT_REQUEST_CAP);
        let handler: HandlerSlot = Arc::new(RwLock::new(None));
        let broker = format!("{endpoint}:{port}");
        tracing::info!(%broker, client_id = %cfg.client_id, "connecting to broker");
        let (link_tx, link_rx) = watch::channel(LinkState::disconnected(broker));

        let io = io_loop(
            client.clone(),
            eventloop,
            handler.clone(),
            link_tx,
            cfg.reconnect_delay(),
            shutdown_rx,
        );

        (
            Self {
                client,
                handler,
                link_rx,
                publish_timeout: cfg.publish_timeout(),
            },
            io,
        )
    }
}

impl Transport for MqttTransport {
    fn on_message(&self, handler: MessageHandler) {
        *self
            .handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handler);
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        // rumqttc would queue the request and replay it after a reconnect;
        // a stale drive command must never reach the robot late.
        if !self.link_rx.borrow().connected {
            return Err(TransportError::Connection("not connected to broker".into()));
        }

        let send = self
            .client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec());
        match tokio::time::timeout(self.publish_timeout, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(TransportError::Timeout {
                topic: topic.to_string(),
                timeout: self.publish_timeout,
            }),
        }
    }

    fn link(&self) -> watch::Receiver<LinkState> {
        self.link_rx.clone()
    }
}

fn subscribe_all(client: &AsyncClient) {
    for channel in Channel::ALL {
        if let Err(e) = client.try_subscribe(channel.topic(), QoS::AtMostOnce) {
            tracing::error!(topic = channel.topic(), "subscribe failed: {e}");
        }
    }
}

fn set_link(link_tx: &watch::Sender<LinkState>, connected: bool, error: Option<String>) {
    link_tx.send_if_modified(|link| {
        if link.connected == connected && (connected || link.last_error == error) {
            return false;
        }
        link.connected = connected;
        if error.is_some() || connected {
            link.last_error = error;
        }
        link.changed_at_ms = get_current_timestamp_ms();
        true
    });
}

async fn io_loop(
    client: AsyncClient,
    mut eventloop: EventLoop,
    handler: HandlerSlot,
    link_tx: watch::Sender<LinkState>,
    reconnect_delay: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        let mut stop = false;
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(p))) => {
                    deliver(&handler, &p.topic, &p.payload);
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("connected to broker, subscribing to telemetry");
                    // Clean session: subscriptions have to be renewed on every connect.
                    subscribe_all(&client);
                    set_link(&link_tx, true, None);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    tracing::warn!("broker closed the session");
                    set_link(&link_tx, false, Some("broker sent disconnect".into()));
                }
                Ok(_) => {}
                Err(e) => {
                    let err = TransportError::Connection(e.to_string());
                    tracing::error!("{err}; retrying in {reconnect_delay:?}");
                    set_link(&link_tx, false, Some(err.to_string()));
                    tokio::select! {
                        _ = tokio::time::sleep(reconnect_delay) => {}
                        _ = shutdown_rx.recv() => stop = true,
                    }
                }
            },
            _ = shutdown_rx.recv() => {
                if let Err(e) = client.try_disconnect() {
                    tracing::debug!("disconnect request not queued: {e}");
                } else {
                    // Give the loop one chance to flush the DISCONNECT packet.
                    let _ = tokio::time::timeout(Duration::from_millis(200), eventloop.poll()).await;
                }
                stop = true;
            }
        }
        if stop {
            break;
        }
    }
    set_link(&link_tx, false, None);
    tracing::info!("broker I/O loop stopped");
}

// ======================================================================
//  Command Publisher
// ======================================================================

/// Drains dispatcher output onto the command topic in FIFO order.
///
/// Each token is attempted exactly once; failures are surfaced and dropped.
/// Returns on shutdown or once every command sender is gone.
pub async fn publish_task<T: Transport>(
    state: Arc<AppState>,
    transport: Arc<T>,
    mut commands_rx: mpsc::Receiver<CommandToken>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            token = commands_rx.recv() => match token {
                Some(token) => publish_command(&state, transport.as_ref(), token).await,
                None => break,
            },
            _ = shutdown_rx.recv() => break,
        }
    }
    tracing::info!("command publisher stopped");
}

pub async fn publish_command<T: Transport>(state: &AppState, transport: &T, token: CommandToken) {
    match transport.publish(COMMAND_TOPIC, token.as_str()).await {
        Ok(()) => {
            tracing::info!(%token, "command sent");
            state.record_log(LogKind::Command, format!("[CMD] {token}"));
        }
        Err(e) => {
            tracing::warn!(%token, "command not sent: {e}");
            emit_warning(state, format!("Command {token} not sent: {e}"));
        }
    }
}
