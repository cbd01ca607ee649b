//! Registry keys and pipeline phases.
//!
//! Every listener is registered under an [`EventKey`]. Two keys are reserved
//! for the pipeline-wide hooks that run around every message; all other keys
//! carry a validated [`EventName`] taken from message content.

use crate::error::InvalidEventName;
use std::{borrow::Borrow, fmt, str::FromStr};

/// Namespace reserved for pipeline hooks. User event names may not start with it.
pub const RESERVED_PREFIX: &str = "processor:";

/// Wire name of the pre-processing hook.
pub const START_MESSAGE_PROCESSING: &str = "processor:start-message-processing";

/// Wire name of the post-processing hook.
pub const END_MESSAGE_PROCESSING: &str = "processor:end-message-processing";

/// A validated, non-reserved event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventName(String);

impl EventName {
    /// Validate and wrap a user event name.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidEventName> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidEventName::Empty);
        }
        if name.starts_with(RESERVED_PREFIX) {
            return Err(InvalidEventName::Reserved(name));
        }
        Ok(Self(name))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap into the owned string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EventName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EventName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for EventName {
    type Err = InvalidEventName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for EventName {
    type Error = InvalidEventName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for EventName {
    type Error = InvalidEventName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Key under which listeners are registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// Runs before the event-specific listeners of every message.
    Start,
    /// Runs after the event-specific listeners of every message, with metadata attached.
    End,
    /// Runs for messages whose event field equals this name.
    User(EventName),
}

impl EventKey {
    /// Build a user key, validating the name.
    pub fn user(name: impl Into<String>) -> Result<Self, InvalidEventName> {
        EventName::new(name).map(EventKey::User)
    }

    /// Parse a wire name, mapping the reserved names onto the phase hooks.
    ///
    /// Unlike [`EventKey::user`], this accepts the two reserved wire names;
    /// any other name in the reserved namespace is still rejected.
    pub fn parse(name: &str) -> Result<Self, InvalidEventName> {
        match name {
            START_MESSAGE_PROCESSING => Ok(EventKey::Start),
            END_MESSAGE_PROCESSING => Ok(EventKey::End),
            other => EventKey::user(other),
        }
    }

    /// The wire name of this key.
    pub fn as_str(&self) -> &str {
        match self {
            EventKey::Start => START_MESSAGE_PROCESSING,
            EventKey::End => END_MESSAGE_PROCESSING,
            EventKey::User(name) => name.as_str(),
        }
    }

    /// Whether this key is one of the reserved phase hooks.
    pub fn is_reserved(&self) -> bool {
        !matches!(self, EventKey::User(_))
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EventName> for EventKey {
    fn from(name: EventName) -> Self {
        EventKey::User(name)
    }
}

impl FromStr for EventKey {
    type Err = InvalidEventName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One of the three fixed stages of per-message dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Pre-processing; [`EventKey::Start`] listeners.
    Start,
    /// Event-specific listeners.
    Event,
    /// Post-processing; [`EventKey::End`] listeners.
    End,
}

impl Phase {
    /// Short lowercase name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Event => "event",
            Phase::End => "end",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_name_validation() {
        assert!(EventName::new("order.created").is_ok());
        assert_eq!(EventName::new(""), Err(InvalidEventName::Empty));
        assert!(matches!(
            EventName::new("processor:anything"),
            Err(InvalidEventName::Reserved(_))
        ));
        // Only the exact prefix is reserved.
        assert!(EventName::new("processor-start").is_ok());
    }

    #[test]
    fn test_parse_maps_reserved_names() {
        assert_eq!(
            EventKey::parse(START_MESSAGE_PROCESSING),
            Ok(EventKey::Start)
        );
        assert_eq!(EventKey::parse(END_MESSAGE_PROCESSING), Ok(EventKey::End));
        assert!(EventKey::parse("processor:other").is_err());

        let key = EventKey::parse("ping").unwrap();
        assert!(!key.is_reserved());
        assert_eq!(key.to_string(), "ping");
    }

    #[test]
    fn test_user_key_cannot_alias_phase_hooks() {
        assert!(EventKey::user(START_MESSAGE_PROCESSING).is_err());
        assert!(EventKey::user(END_MESSAGE_PROCESSING).is_err());
        assert_ne!(EventKey::user("start").unwrap(), EventKey::Start);
    }
}
