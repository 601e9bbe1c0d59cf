use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::{self, AgentSettings, ClientMessage};
use super::transport::{AgentConnection, AgentEvent, AgentTransport, TransportConnector};
use crate::audio::AudioChunk;
use crate::auth::AccessToken;
use crate::error::TransportError;

pub const DEFAULT_AGENT_URL: &str = "wss://agent.deepgram.com/v1/agent/converse";

/// Inbound events buffered between the socket reader and the coordinator
const EVENT_CHANNEL_CAPACITY: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens agent connections over WebSocket
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait::async_trait]
impl TransportConnector for WebSocketConnector {
    async fn connect(&self, token: &AccessToken) -> Result<AgentConnection, TransportError> {
        info!("Connecting to agent at {}", self.url);

        let mut request = self.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token.secret()))
            .map_err(|e| TransportError::Request(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, _response) = connect_async(request).await?;
        let (sink, source) = socket.split();

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader = tokio::spawn(read_events(source, events_tx));

        info!("Connected to agent successfully");

        Ok(AgentConnection {
            transport: Box::new(WebSocketTransport {
                sink,
                reader: Some(reader),
            }),
            events: events_rx,
        })
    }
}

/// Write half of an agent WebSocket; the read half runs in its own task
pub struct WebSocketTransport {
    sink: SplitSink<Socket, Message>,
    reader: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    async fn send_control(&mut self, message: ClientMessage<'_>) -> Result<(), TransportError> {
        let json = message.to_json()?;
        self.sink.send(Message::Text(json)).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AgentTransport for WebSocketTransport {
    async fn configure(&mut self, settings: &AgentSettings) -> Result<(), TransportError> {
        info!(
            "Applying agent settings (listen={}, think={}, speak={})",
            settings.agent.listen.provider.model,
            settings.agent.think.provider.model,
            settings.agent.speak.provider.model
        );
        self.send_control(ClientMessage::Settings(settings)).await
    }

    async fn send_audio(&mut self, chunk: AudioChunk) -> Result<(), TransportError> {
        self.sink.send(Message::Binary(chunk.into_bytes())).await?;
        Ok(())
    }

    async fn keep_alive(&mut self) -> Result<(), TransportError> {
        debug!("Sending keep-alive");
        self.send_control(ClientMessage::KeepAlive).await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        info!("Closing agent connection");

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        self.sink.close().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Forward socket frames as [`AgentEvent`]s until the socket or the receiver closes
async fn read_events(mut source: SplitStream<Socket>, events: mpsc::Sender<AgentEvent>) {
    debug!("Agent event reader started");

    while let Some(message) = source.next().await {
        let event = match message {
            Ok(Message::Text(text)) => match messages::parse_server_message(&text) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Failed to parse agent message: {}", e);
                    continue;
                }
            },
            Ok(Message::Binary(bytes)) => AgentEvent::Audio(AudioChunk::from_bytes(bytes)),
            Ok(Message::Close(frame)) => {
                info!("Agent closed the connection: {:?}", frame);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                let _ = events
                    .send(AgentEvent::Error {
                        description: e.to_string(),
                        code: None,
                    })
                    .await;
                break;
            }
        };

        if events.send(event).await.is_err() {
            // Coordinator detached
            return;
        }
    }

    let _ = events.send(AgentEvent::Close).await;
    debug!("Agent event reader stopped");
}
