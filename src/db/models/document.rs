//! Keys for JSON documents stored per user or per workspace.

use std::fmt;

/// Identifies one stored JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentKey {
    /// Shared pipeline board, one per workspace
    PipelineBoard,
    /// Per-user pipeline data
    PipelineData(i64),
    /// Per-user finance data
    FinanceData(i64),
    /// Per-user document under a free-form storage key
    UserStorage { user_id: i64, key: String },
}

impl DocumentKey {
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentKey::PipelineBoard => "pipeline_board",
            DocumentKey::PipelineData(_) => "pipeline_data",
            DocumentKey::FinanceData(_) => "finance_data",
            DocumentKey::UserStorage { .. } => "user_storage",
        }
    }

    /// Owning user, or `None` for workspace documents
    pub fn owner(&self) -> Option<i64> {
        match self {
            DocumentKey::PipelineBoard => None,
            DocumentKey::PipelineData(user_id) | DocumentKey::FinanceData(user_id) => {
                Some(*user_id)
            }
            DocumentKey::UserStorage { user_id, .. } => Some(*user_id),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKey::PipelineBoard => write!(f, "pipeline_board"),
            DocumentKey::PipelineData(id) => write!(f, "pipeline_data/{}", id),
            DocumentKey::FinanceData(id) => write!(f, "finance_data/{}", id),
            DocumentKey::UserStorage { user_id, key } => {
                write!(f, "user_storage/{}/{}", user_id, key)
            }
        }
    }
}
