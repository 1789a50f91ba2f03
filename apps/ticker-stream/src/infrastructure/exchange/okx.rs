//! OKX Adapter
//!
//! Speaks the OKX v5 public WebSocket protocol for the `tickers` channel.
//!
//! # Protocol
//!
//! 1. Connect to `wss://ws.okx.com:8443/ws/v5/public`
//! 2. Send one `subscribe` op listing every instrument
//! 3. Receive `{"event":"subscribe"}` acks and `{"arg":..,"data":[..]}` pushes
//! 4. When the link goes quiet, send `{"op":"ping"}`; OKX answers `pong`

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::application::ports::{
    ControlSignal, ExchangeAdapter, FrameError, OutboundFrame, ParsedFrame,
};
use crate::domain::session::Venue;
use crate::domain::ticker::{CanonicalTicker, InstrumentId, MalformedTickerError};
use crate::infrastructure::exchange::messages::{OkxChannelArg, OkxEvent, OkxPush, OkxRequest};

/// OKX public WebSocket endpoint.
pub const OKX_PUBLIC_ENDPOINT: &str = "wss://ws.okx.com:8443/ws/v5/public";

const TICKERS_CHANNEL: &str = "tickers";

/// Adapter for the OKX `tickers` channel.
#[derive(Debug, Clone)]
pub struct OkxAdapter {
    instruments: Vec<InstrumentId>,
    known: HashSet<String>,
}

impl OkxAdapter {
    /// Create an adapter for the given instruments.
    #[must_use]
    pub fn new(instruments: Vec<InstrumentId>) -> Self {
        let known = instruments.iter().map(|id| id.as_str().to_string()).collect();
        Self { instruments, known }
    }

    fn parse_event(value: Value) -> Result<ParsedFrame, FrameError> {
        let event: OkxEvent = serde_json::from_value(value)?;
        let signal = match event.event.as_str() {
            "subscribe" => ControlSignal::SubscriptionAck,
            "error" => ControlSignal::Error {
                code: event.code(),
                message: event.msg.unwrap_or_default(),
            },
            _ => return Ok(ParsedFrame::Empty),
        };
        Ok(ParsedFrame::Control(signal))
    }

    fn parse_push(&self, value: Value, observed_at: DateTime<Utc>) -> Result<ParsedFrame, FrameError> {
        let push: OkxPush = serde_json::from_value(value)?;
        let Some(first) = push.data.into_iter().next() else {
            return Ok(ParsedFrame::Empty);
        };

        let (inst_id, raw) = first.into_parts();
        let inst_id = inst_id
            .filter(|id| !id.is_empty())
            .ok_or(MalformedTickerError::MissingInstrument)?;
        if !self.known.contains(&inst_id) {
            return Err(FrameError::UnknownInstrument(inst_id));
        }

        let ticker = CanonicalTicker::from_raw(InstrumentId::new(inst_id), &raw, observed_at)?;
        Ok(ParsedFrame::Ticker(ticker))
    }
}

impl ExchangeAdapter for OkxAdapter {
    fn venue(&self) -> Venue {
        Venue::Okx
    }

    fn default_endpoint(&self) -> &str {
        OKX_PUBLIC_ENDPOINT
    }

    fn instruments(&self) -> &[InstrumentId] {
        &self.instruments
    }

    fn build_subscription(&self) -> Result<Vec<OutboundFrame>, FrameError> {
        let request = OkxRequest {
            op: "subscribe",
            args: self
                .instruments
                .iter()
                .map(|id| OkxChannelArg {
                    channel: TICKERS_CHANNEL.to_string(),
                    inst_id: id.as_str().to_string(),
                })
                .collect(),
        };
        Ok(vec![OutboundFrame::Text(serde_json::to_string(&request)?)])
    }

    fn heartbeat(&self) -> Result<OutboundFrame, FrameError> {
        let request = OkxRequest {
            op: "ping",
            args: Vec::new(),
        };
        Ok(OutboundFrame::Text(serde_json::to_string(&request)?))
    }

    fn parse_frame(
        &self,
        raw: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<ParsedFrame, FrameError> {
        let trimmed = raw.trim();
        if trimmed == "pong" {
            return Ok(ParsedFrame::Control(ControlSignal::Heartbeat));
        }

        let value: Value = serde_json::from_str(trimmed)?;

        if value.get("event").is_some() {
            return Self::parse_event(value);
        }
        if value.get("op").and_then(Value::as_str) == Some("pong") {
            return Ok(ParsedFrame::Control(ControlSignal::Heartbeat));
        }
        if value.get("data").is_some() {
            return self.parse_push(value, observed_at);
        }

        Ok(ParsedFrame::Empty)
    }
}
