//! Activity event definitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use lexhub_core::types::{SessionId, UserId};

/// Kind of user interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    PageView,
    Click,
    DocumentOpen,
    DocumentEdit,
    DocumentSave,
    DocumentShare,
    Search,
    FormSubmit,
    FeatureUse,
    Login,
    Logout,
    Error,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::Click => "click",
            Self::DocumentOpen => "document_open",
            Self::DocumentEdit => "document_edit",
            Self::DocumentSave => "document_save",
            Self::DocumentShare => "document_share",
            Self::Search => "search",
            Self::FormSubmit => "form_submit",
            Self::FeatureUse => "feature_use",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable user interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub user_id: UserId,
    pub activity_type: ActivityType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl ActivityEvent {
    pub fn new(user_id: impl Into<UserId>, activity_type: ActivityType) -> Self {
        Self {
            user_id: user_id.into(),
            activity_type,
            timestamp: Utc::now(),
            page: None,
            element: None,
            metadata: Map::new(),
            session_id: None,
        }
    }

    pub fn with_page(mut self, page: Option<String>) -> Self {
        self.page = page;
        self
    }

    pub fn with_element(mut self, element: Option<String>) -> Self {
        self.element = element;
        self
    }

    pub fn with_metadata(mut self, metadata: Option<Map<String, Value>>) -> Self {
        self.metadata = metadata.unwrap_or_default();
        self
    }

    pub fn with_session(mut self, session_id: Option<SessionId>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Feature name for `feature_use` events, from the element or the
    /// `feature` metadata entry.
    pub fn feature(&self) -> Option<&str> {
        if self.activity_type != ActivityType::FeatureUse {
            return None;
        }
        self.element
            .as_deref()
            .or_else(|| self.metadata.get("feature").and_then(Value::as_str))
    }
}
