use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identity boundary handed to the core by the host application.
///
/// The core never looks up a global session; whoever owns authentication builds one of
/// these and passes it in when an assessment or analysis session is created.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub user_id: String,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, is_active: bool) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            is_active,
            started_at: Utc::now(),
        }
    }

    /// Session for a local, unauthenticated run (the CLI front end).
    pub fn anonymous() -> Self {
        Self::new("anonymous", true)
    }
}
