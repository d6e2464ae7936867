//! Resolution events sent to the forwarder, and entry-change reasons.

use mesh_wire::Rloc16;
use serde::Serialize;
use std::fmt;
use std::net::Ipv6Addr;

/// How a pending resolution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionOutcome {
    /// Target now maps to the given locator; held traffic can go
    Resolved(Rloc16),
    /// Resolution failed or was abandoned; held traffic must be dropped
    Drop,
}

/// Notification for the forwarder about traffic held on `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolutionEvent {
    /// Address whose resolution ended
    pub target: Ipv6Addr,
    /// How it ended
    pub outcome: ResolutionOutcome,
}

/// What happened to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAction {
    Added,
    Updated,
    Removed,
}

impl fmt::Display for EntryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryAction::Added => write!(f, "Added"),
            EntryAction::Updated => write!(f, "Updated"),
            EntryAction::Removed => write!(f, "Removed"),
        }
    }
}

/// Why an entry was added or updated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    QueryRequest,
    Snoop,
    ReceivedNotification,
    /// Locator supplied by the caller for an existing entry
    Update,
    /// Locator rewritten after the owner changed its RLOC16
    ReplaceLocator,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeReason::QueryRequest => "query request",
            ChangeReason::Snoop => "snoop",
            ChangeReason::ReceivedNotification => "rx notification",
            ChangeReason::Update => "update",
            ChangeReason::ReplaceLocator => "replace locator",
        };
        f.write_str(s)
    }
}

/// Why an entry was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveReason {
    RemovingRouterId,
    RemovingRloc16,
    ReceivedIcmpDstUnreachNoRoute,
    EvictingForNewEntry,
    RemovingEid,
    NoRoute,
    Cleared,
}

impl fmt::Display for RemoveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoveReason::RemovingRouterId => "removing router id",
            RemoveReason::RemovingRloc16 => "removing rloc16",
            RemoveReason::ReceivedIcmpDstUnreachNoRoute => "rx icmp no route",
            RemoveReason::EvictingForNewEntry => "evicting for new entry",
            RemoveReason::RemovingEid => "removing eid",
            RemoveReason::NoRoute => "no route to rloc16",
            RemoveReason::Cleared => "cleared",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes() {
        let event = ResolutionEvent {
            target: "fd00::1".parse().unwrap(),
            outcome: ResolutionOutcome::Resolved(Rloc16(0x0800)),
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["target"], "fd00::1");
        assert_eq!(json["outcome"]["Resolved"], 0x0800);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(RemoveReason::EvictingForNewEntry.to_string(), "evicting for new entry");
        assert_eq!(ChangeReason::ReceivedNotification.to_string(), "rx notification");
        assert_eq!(ChangeReason::Update.to_string(), "update");
        assert_eq!(ChangeReason::ReplaceLocator.to_string(), "replace locator");
        assert_eq!(EntryAction::Removed.to_string(), "Removed");
    }
}
