use serde::{Deserialize, Serialize};

use crate::records::RecordId;

/// Terminal status of one processing attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Success,
    Skipped,
    Duplicate,
}

/// Result reported back to the delivery layer after a processing attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessOutcome {
    pub status: ProcessStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<RecordId>,
}

impl ProcessOutcome {
    pub fn skipped() -> Self {
        Self {
            status: ProcessStatus::Skipped,
            channel_id: None,
            partner_id: None,
            message_id: None,
        }
    }

    pub fn duplicate(message_id: Option<RecordId>) -> Self {
        Self {
            status: ProcessStatus::Duplicate,
            channel_id: None,
            partner_id: None,
            message_id,
        }
    }

    pub fn success(channel_id: RecordId, partner_id: RecordId, message_id: RecordId) -> Self {
        Self {
            status: ProcessStatus::Success,
            channel_id: Some(channel_id),
            partner_id: Some(partner_id),
            message_id: Some(message_id),
        }
    }
}
