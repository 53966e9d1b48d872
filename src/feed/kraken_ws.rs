use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::supervisor::MarketStream;
use crate::error::{BotError, BotResult};
use crate::models::{Candle, CandleEvent, Timeframe};

pub const KRAKEN_WS_URL: &str = "wss://ws.kraken.com";

/// OHLC intervals (minutes) Kraken accepts for subscriptions and REST history
pub const KRAKEN_INTERVALS: [u32; 9] = [1, 5, 15, 30, 60, 240, 1440, 10080, 21600];

pub fn is_supported_interval(timeframe: Timeframe) -> bool {
    KRAKEN_INTERVALS.contains(&timeframe.minutes())
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Kraken public WebSocket (v1) OHLC feed for a single pair
///
/// Kraken pushes the in-progress bar on every trade and never flags a bar as
/// final, so decoded events are always `is_closed = false`; the buffer infers
/// closure when the next bar opens.
pub struct KrakenStream {
    url: String,
    pair: String,
    socket: Option<Socket>,
}

impl KrakenStream {
    pub fn new(url: impl Into<String>, pair: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pair: pair.into(),
            socket: None,
        }
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    fn socket(&mut self) -> BotResult<&mut Socket> {
        self.socket
            .as_mut()
            .ok_or_else(|| BotError::ConnectionLost("not connected".to_string()))
    }
}

pub fn subscribe_message(pair: &str, timeframe: Timeframe) -> Value {
    json!({
        "event": "subscribe",
        "pair": [pair],
        "subscription": {
            "name": "ohlc",
            "interval": timeframe.minutes()
        }
    })
}

#[async_trait]
impl MarketStream for KrakenStream {
    async fn connect(&mut self) -> BotResult<()> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| BotError::ConnectionLost(format!("connect {}: {}", self.url, e)))?;
        self.socket = Some(socket);
        tracing::info!(url = %self.url, "Connected to Kraken WebSocket");
        Ok(())
    }

    async fn subscribe(&mut self, timeframe: Timeframe) -> BotResult<()> {
        let payload = subscribe_message(&self.pair, timeframe).to_string();
        let pair = self.pair.clone();
        self.socket()?
            .send(Message::Text(payload))
            .await
            .map_err(|e| BotError::ConnectionLost(format!("subscribe {}: {}", timeframe, e)))?;
        tracing::info!(%pair, %timeframe, "Subscribed to OHLC");
        Ok(())
    }

    async fn next_message(&mut self) -> Option<BotResult<String>> {
        let socket = match self.socket() {
            Ok(socket) => socket,
            Err(e) => return Some(Err(e)),
        };

        loop {
            match socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Kraken closed the connection");
                    return None;
                }
                Err(e) => return Some(Err(BotError::ConnectionLost(e.to_string()))),
            }
        }
    }

    fn decode(&self, raw: &str) -> BotResult<Option<CandleEvent>> {
        decode_message(raw)
    }

    async fn close(&mut self) -> BotResult<()> {
        if let Some(mut socket) = self.socket.take() {
            socket
                .close(None)
                .await
                .map_err(|e| BotError::ConnectionLost(e.to_string()))?;
        }
        Ok(())
    }
}

/// Translate one Kraken v1 frame
///
/// Data frames look like
/// `[channelID, [time, etime, open, high, low, close, vwap, volume, count], "ohlc-5", "XBT/USD"]`
/// with prices as strings. Event objects (heartbeat, systemStatus,
/// subscriptionStatus) are control traffic.
pub fn decode_message(raw: &str) -> BotResult<Option<CandleEvent>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| BotError::MalformedStreamMessage(format!("invalid json: {}", e)))?;

    let frame = match value {
        Value::Object(event) => {
            if event.get("status").and_then(Value::as_str) == Some("error") {
                tracing::warn!(
                    message = ?event.get("errorMessage"),
                    "Kraken rejected a request"
                );
            }
            return Ok(None);
        }
        Value::Array(frame) => frame,
        _ => {
            return Err(BotError::MalformedStreamMessage(
                "expected object or array".to_string(),
            ))
        }
    };

    let Some(interval) = frame
        .get(2)
        .and_then(Value::as_str)
        .and_then(|name| name.strip_prefix("ohlc-"))
    else {
        // Some other channel
        return Ok(None);
    };
    let minutes: u32 = interval
        .parse()
        .map_err(|_| BotError::MalformedStreamMessage(format!("bad interval {:?}", interval)))?;
    let timeframe = Timeframe::from_minutes(minutes);

    let data = frame
        .get(1)
        .and_then(Value::as_array)
        .ok_or_else(|| BotError::MalformedStreamMessage("missing ohlc payload".to_string()))?;
    if data.len() < 8 {
        return Err(BotError::MalformedStreamMessage(format!(
            "ohlc payload has {} fields",
            data.len()
        )));
    }

    let end_time = timestamp(number(data, 1)?)?;
    let candle = Candle {
        open_time: end_time - Duration::minutes(minutes as i64),
        open: number(data, 2)?,
        high: number(data, 3)?,
        low: number(data, 4)?,
        close: number(data, 5)?,
        volume: number(data, 7)?,
    };

    Ok(Some(CandleEvent {
        timeframe,
        candle,
        is_closed: false,
    }))
}

/// Field as f64, accepting both JSON numbers and numeric strings
pub(crate) fn number(fields: &[Value], idx: usize) -> BotResult<f64> {
    let value = fields
        .get(idx)
        .ok_or_else(|| BotError::MalformedStreamMessage(format!("missing field {}", idx)))?;
    let parsed = match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        BotError::MalformedStreamMessage(format!("field {} is not numeric: {}", idx, value))
    })
}

pub(crate) fn timestamp(secs: f64) -> BotResult<DateTime<Utc>> {
    Utc.timestamp_opt(secs.trunc() as i64, 0)
        .single()
        .ok_or_else(|| BotError::MalformedStreamMessage(format!("bad timestamp {}", secs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OHLC: &str = r#"[42,["1542057314.748456","1542057360.435743","3586.70000","3586.70000","3586.60000","3586.60000","3586.68894","0.03373000",2],"ohlc-5","XBT/USD"]"#;

    #[test]
    fn test_decode_ohlc_frame() {
        let event = decode_message(OHLC).unwrap().unwrap();

        assert_eq!(event.timeframe, Timeframe::from_minutes(5));
        assert!(!event.is_closed);
        assert_eq!(event.candle.open_time.timestamp(), 1542057360 - 300);
        assert_eq!(event.candle.open, 3586.7);
        assert_eq!(event.candle.high, 3586.7);
        assert_eq!(event.candle.low, 3586.6);
        assert_eq!(event.candle.close, 3586.6);
        assert_eq!(event.candle.volume, 0.03373);
    }

    #[test]
    fn test_control_messages_are_ignored() {
        for raw in [
            r#"{"event":"heartbeat"}"#,
            r#"{"connectionID":1,"event":"systemStatus","status":"online","version":"1.9.0"}"#,
            r#"{"channelID":42,"channelName":"ohlc-5","event":"subscriptionStatus","pair":"XBT/USD","status":"subscribed","subscription":{"interval":5,"name":"ohlc"}}"#,
            r#"{"event":"subscriptionStatus","status":"error","errorMessage":"Currency pair not supported"}"#,
        ] {
            assert!(decode_message(raw).unwrap().is_none(), "{}", raw);
        }
    }

    #[test]
    fn test_other_channels_are_ignored() {
        let raw = r#"[0,[["5541.20000","0.15850568","1534614057.321597","s","l",""]],"trade","XBT/USD"]"#;
        assert!(decode_message(raw).unwrap().is_none());
    }

    #[test]
    fn test_malformed_frames() {
        for raw in [
            "not json",
            "42",
            r#"[42,["1","x","1","1","1","1","1","1",2],"ohlc-5","XBT/USD"]"#,
            r#"[42,["1","2","3"],"ohlc-5","XBT/USD"]"#,
            r#"[42,[],"ohlc-abc","XBT/USD"]"#,
        ] {
            assert!(
                matches!(decode_message(raw), Err(BotError::MalformedStreamMessage(_))),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_subscribe_message() {
        let msg = subscribe_message("XBT/USD", Timeframe::from_minutes(60));
        assert_eq!(msg["event"], "subscribe");
        assert_eq!(msg["pair"][0], "XBT/USD");
        assert_eq!(msg["subscription"]["name"], "ohlc");
        assert_eq!(msg["subscription"]["interval"], 60);
    }

    #[tokio::test]
    async fn test_not_connected() {
        let mut stream = KrakenStream::new(KRAKEN_WS_URL, "XBT/USD");
        assert!(matches!(
            stream.subscribe(Timeframe::from_minutes(1)).await,
            Err(BotError::ConnectionLost(_))
        ));
        assert!(stream.close().await.is_ok());
    }
}
