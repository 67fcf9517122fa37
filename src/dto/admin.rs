use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::audit_logs;

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardSummary {
    pub users: i64,
    pub products: i64,
    pub categories: i64,
    pub orders: i64,
    pub pending_orders: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: Option<i64>,
    pub actor_kind: String,
    pub action: String,
    pub resource: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<audit_logs::Model> for AuditLogEntry {
    fn from(model: audit_logs::Model) -> Self {
        Self {
            id: model.id,
            actor_id: model.actor_id,
            actor_kind: model.actor_kind,
            action: model.action,
            resource: model.resource,
            metadata: model.metadata,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogList {
    pub items: Vec<AuditLogEntry>,
}
