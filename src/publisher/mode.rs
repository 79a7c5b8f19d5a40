use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Delivery guarantee applied to every send of a publisher factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationMode {
    /// Fire and forget.
    #[default]
    None,
    /// Sent without waiting; the broker acknowledges in the background.
    AutoAck,
    /// The send blocks until the broker acknowledged it or the timeout elapsed.
    WaitForAck,
}

impl ConfirmationMode {
    pub fn is_auto_ack(&self) -> bool {
        matches!(self, ConfirmationMode::AutoAck)
    }

    pub fn is_wait_for_ack(&self) -> bool {
        matches!(self, ConfirmationMode::WaitForAck)
    }

    /// Whether sends in this mode use the shared producer rather than the pool.
    pub fn uses_shared_producer(&self) -> bool {
        !self.is_wait_for_ack()
    }
}

impl fmt::Display for ConfirmationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfirmationMode::None => "NONE",
            ConfirmationMode::AutoAck => "AUTO_ACK",
            ConfirmationMode::WaitForAck => "WAIT_FOR_ACK",
        };
        f.write_str(name)
    }
}

impl FromStr for ConfirmationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(ConfirmationMode::None),
            "AUTO_ACK" => Ok(ConfirmationMode::AutoAck),
            "WAIT_FOR_ACK" => Ok(ConfirmationMode::WaitForAck),
            other => Err(Error::Config(format!(
                "unknown confirmation mode '{}', expected NONE, AUTO_ACK or WAIT_FOR_ACK",
                other
            ))),
        }
    }
}
