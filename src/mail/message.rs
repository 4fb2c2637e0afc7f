// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

use serde::Deserialize;
use serde::Serialize;

use crate::handle::Handle;
use crate::node::Element;

/// Ordering key of a message: its number, then its arrival time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageKey {
    pub number: u64,
    pub timestamp: i64,
}

/// A message record as stored in a leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Assigned on arrival; changed only by renumbering.
    pub number: u64,
    /// Arrival time in seconds since the epoch.
    pub timestamp: i64,
    pub headers: Vec<String>,
    /// The body node this message owns, if it has a body.
    pub body: Option<Handle>,
}

impl Element for Message {
    type Key = MessageKey;

    fn key(&self) -> MessageKey {
        return MessageKey {
            number: self.number,
            timestamp: self.timestamp,
        };
    }
}

impl Message {
    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        return self.headers.iter().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            return key.trim().eq_ignore_ascii_case(name).then_some(value.trim());
        });
    }
}

/// Message text, stored in its own node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub lines: Vec<String>,
}

/// A message on its way in, before it has a number.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incoming {
    pub timestamp: i64,
    pub headers: Vec<String>,
    pub body: Option<Vec<String>>,
}

impl Incoming {
    pub fn new(timestamp: i64) -> Incoming {
        return Incoming {
            timestamp,
            headers: Vec::new(),
            body: None,
        };
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Incoming {
        self.headers.push(format!("{name}: {value}"));
        return self;
    }

    pub fn with_body<L: Into<String>>(mut self, lines: impl IntoIterator<Item = L>) -> Incoming {
        self.body = Some(lines.into_iter().map(Into::into).collect());
        return self;
    }
}
