use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use shared::protocol::{ClientEvent, GatewayEvent};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::warn;
use url::Url;

/// Write half of a gateway connection.
#[async_trait]
pub trait GatewaySink: Send {
    async fn send(&mut self, event: ClientEvent) -> Result<()>;
}

/// Read half of a gateway connection. `None` means the transport closed.
#[async_trait]
pub trait GatewaySource: Send {
    async fn next_event(&mut self) -> Option<Result<GatewayEvent>>;
}

/// Dials the gateway. The session manager only sees the two halves, so tests
/// can drive it without any network.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(
        &self,
        base_url: &str,
        token: &str,
    ) -> Result<(Box<dyn GatewaySink>, Box<dyn GatewaySource>)>;
}

/// Production connector over tokio-tungstenite.
pub struct WsConnector;

#[async_trait]
impl GatewayConnector for WsConnector {
    async fn connect(
        &self,
        base_url: &str,
        token: &str,
    ) -> Result<(Box<dyn GatewaySink>, Box<dyn GatewaySource>)> {
        let url = socket_url(base_url, token)?;
        let (stream, _response) = connect_async(url.as_str()).await?;
        let (sink, source) = stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsSource { source })))
    }
}

fn socket_url(base_url: &str, token: &str) -> Result<Url> {
    let trimmed = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        trimmed.to_string()
    } else {
        return Err(anyhow!(
            "gateway url must start with http://, https://, ws:// or wss://: {base_url}"
        ));
    };

    let mut url = Url::parse(&format!("{ws_base}/ws"))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsSink {
    sink: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl GatewaySink for WsSink {
    async fn send(&mut self, event: ClientEvent) -> Result<()> {
        let text = serde_json::to_string(&event)?;
        self.sink.send(WsMessage::Text(text)).await?;
        Ok(())
    }
}

struct WsSource {
    source: SplitStream<WsStream>,
}

#[async_trait]
impl GatewaySource for WsSource {
    async fn next_event(&mut self) -> Option<Result<GatewayEvent>> {
        while let Some(frame) = self.source.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<GatewayEvent>(&text) {
                    Ok(event) => return Some(Ok(event)),
                    Err(error) => {
                        warn!(%error, "ignoring malformed gateway event");
                        continue;
                    }
                },
                Ok(WsMessage::Close(_)) => return None,
                // ping/pong answered by the library
                Ok(_) => continue,
                Err(error) => return Some(Err(error.into())),
            }
        }
        None
    }
}
