//! Closed vocabularies shared by the API, the pipeline and the stores.
//!
//! Every enum round-trips through the same lowercase snake_case label in
//! JSON and in the database, so a row written by one layer always parses
//! in the others.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let normalized = value.trim().to_ascii_lowercase();
                match normalized.as_str() {
                    $($label => Ok($name::$variant),)+
                    _ => Err(format!(
                        "unknown {} {:?}; expected one of: {}",
                        stringify!($name),
                        value,
                        [$($label),+].join(", ")
                    )),
                }
            }
        }
    };
}

labelled_enum! {
    /// Label assigned to an incoming message describing what the customer wants.
    pub enum Intent {
        Greeting => "greeting",
        Question => "question",
        OrderStatus => "order_status",
        Complaint => "complaint",
        TicketRequest => "ticket_request",
        Escalation => "escalation",
        Feedback => "feedback",
        Other => "other",
    }
}

impl Intent {
    /// Intents that open a support ticket on the customer's behalf.
    pub fn requires_ticket(&self) -> bool {
        matches!(
            self,
            Intent::TicketRequest | Intent::Complaint | Intent::Escalation
        )
    }
}

labelled_enum! {
    /// Channel an interaction arrived on.
    pub enum MessageType {
        Chat => "chat",
        Webhook => "webhook",
    }
}

labelled_enum! {
    pub enum MessageRole {
        User => "user",
        Assistant => "assistant",
        System => "system",
    }
}

labelled_enum! {
    pub enum TicketStatus {
        Open => "open",
        Assigned => "assigned",
        InProgress => "in_progress",
        Resolved => "resolved",
        Closed => "closed",
    }
}

impl TicketStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

labelled_enum! {
    pub enum TicketPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

labelled_enum! {
    pub enum DocumentStatus {
        Pending => "pending",
        Processing => "processing",
        Processed => "processed",
        Failed => "failed",
    }
}
