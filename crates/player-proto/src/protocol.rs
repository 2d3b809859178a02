//! Wire format of the engine's JSON IPC.
//!
//! Requests are one JSON object per line:
//!   `{"command":["seek",5.0,"relative"],"request_id":3}`
//! Replies echo the id:
//!   `{"data":12.5,"error":"success","request_id":3}`
//! Unsolicited event lines carry no `request_id` and are ignored here.

use serde_json::{json, Value};
use tracing::debug;

pub const TIME_POS: &str = "time-pos";
pub const DURATION: &str = "duration";

/// Reassembly buffer bound. Anything beyond this without a newline is noise.
pub const MAX_PENDING: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    CyclePause,
    SeekRelative(f64),
    SeekAbsolute(f64),
    AddVolume(i32),
    GetProperty(String),
}

impl EngineCommand {
    pub fn get(property: &str) -> Self {
        EngineCommand::GetProperty(property.to_string())
    }

    fn args(&self) -> Value {
        match self {
            EngineCommand::CyclePause => json!(["cycle", "pause"]),
            EngineCommand::SeekRelative(secs) => json!(["seek", secs, "relative"]),
            EngineCommand::SeekAbsolute(secs) => json!(["seek", secs, "absolute"]),
            EngineCommand::AddVolume(delta) => json!(["add", "volume", delta]),
            EngineCommand::GetProperty(name) => json!(["get_property", name]),
        }
    }

    /// One newline-terminated request line.
    pub fn encode(&self, request_id: Option<u64>) -> String {
        let msg = match request_id {
            Some(id) => json!({ "command": self.args(), "request_id": id }),
            None => json!({ "command": self.args() }),
        };
        format!("{}\n", msg)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub request_id: u64,
    /// Numeric payload; `None` for errors, `null` data or non-numbers.
    pub data: Option<f64>,
}

/// Parse one reply line. Lines without a `request_id` (events) yield `None`.
pub fn decode_reply_line(line: &str) -> Option<Reply> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let val: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            debug!("protocol: invalid json '{}': {}", trimmed, e);
            return None;
        }
    };
    let request_id = val.get("request_id").and_then(Value::as_u64)?;
    let ok = val
        .get("error")
        .and_then(Value::as_str)
        .map_or(true, |e| e == "success");
    let data = if ok {
        val.get("data").and_then(Value::as_f64)
    } else {
        None
    };
    Some(Reply { request_id, data })
}

/// Collects the replies to a fixed set of request ids from a byte stream
/// that may split lines anywhere and deliver replies in any order.
#[derive(Debug)]
pub struct ReplyAssembler {
    wanted: Vec<(u64, Option<Option<f64>>)>,
    pending: Vec<u8>,
}

impl ReplyAssembler {
    pub fn new(ids: &[u64]) -> Self {
        Self {
            wanted: ids.iter().map(|&id| (id, None)).collect(),
            pending: Vec::new(),
        }
    }

    /// Absorb a chunk of raw bytes. Only complete lines are interpreted.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        while let Some(nl) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=nl).collect();
            let Ok(text) = std::str::from_utf8(&line) else {
                continue;
            };
            if let Some(reply) = decode_reply_line(text) {
                self.accept(reply);
            }
        }

        if self.pending.len() > MAX_PENDING {
            debug!("protocol: dropping {} unterminated bytes", self.pending.len());
            self.pending.clear();
        }
    }

    fn accept(&mut self, reply: Reply) {
        match self.wanted.iter_mut().find(|(id, _)| *id == reply.request_id) {
            Some((_, slot)) => *slot = Some(reply.data),
            None => debug!("protocol: reply for stale req={}", reply.request_id),
        }
    }

    pub fn answered(&self, id: u64) -> bool {
        self.wanted
            .iter()
            .any(|(want, slot)| *want == id && slot.is_some())
    }

    pub fn is_complete(&self) -> bool {
        self.wanted.iter().all(|(_, slot)| slot.is_some())
    }

    /// The numeric value for `id`, if its reply arrived and carried one.
    pub fn value(&self, id: u64) -> Option<f64> {
        self.wanted
            .iter()
            .find(|(want, _)| *want == id)
            .and_then(|(_, slot)| slot.flatten())
    }
}
