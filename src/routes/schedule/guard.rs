use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

use super::model::{AttendeePermission, AttendeeRole, TravelAttendee, TravelSchedule};

/// Capabilities a schedule operation can demand of an attendee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Edit,
    Chat,
}

impl AttendeePermission {
    pub fn allows(self, capability: Capability) -> bool {
        match (self, capability) {
            (AttendeePermission::All, _) => true,
            (AttendeePermission::Edit, Capability::Edit) => true,
            (AttendeePermission::Chat, Capability::Chat) => true,
            _ => false,
        }
    }
}

impl TravelAttendee {
    pub fn is_author(&self) -> bool {
        self.role == AttendeeRole::Author
    }

    /// The author may do anything regardless of the stored permission.
    pub fn can(&self, capability: Capability) -> bool {
        self.is_author() || self.permission.allows(capability)
    }
}

/// Resolves the requester's attendee row for a schedule: NotFound when the
/// schedule does not exist, Forbidden when the requester has no row.
pub async fn require_attendee(
    pool: &PgPool,
    schedule_id: Uuid,
    member_id: Uuid,
) -> Result<TravelAttendee, AppError> {
    if TravelSchedule::find_by_id(pool, schedule_id).await?.is_none() {
        return Err(AppError::ScheduleNotFound);
    }

    TravelSchedule::find_attendee(pool, schedule_id, member_id)
        .await?
        .ok_or(AppError::NotAttendee)
}

pub async fn require_capability(
    pool: &PgPool,
    schedule_id: Uuid,
    member_id: Uuid,
    capability: Capability,
) -> Result<TravelAttendee, AppError> {
    let attendee = require_attendee(pool, schedule_id, member_id).await?;
    if !attendee.can(capability) {
        return Err(AppError::PermissionDenied);
    }
    Ok(attendee)
}

pub async fn require_author(
    pool: &PgPool,
    schedule_id: Uuid,
    member_id: Uuid,
) -> Result<TravelAttendee, AppError> {
    let attendee = require_attendee(pool, schedule_id, member_id).await?;
    if !attendee.is_author() {
        return Err(AppError::AuthorOnly);
    }
    Ok(attendee)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn attendee(role: AttendeeRole, permission: AttendeePermission) -> TravelAttendee {
        TravelAttendee {
            schedule_id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
            role,
            permission,
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn all_permission_allows_everything() {
        assert!(AttendeePermission::All.allows(Capability::Edit));
        assert!(AttendeePermission::All.allows(Capability::Chat));
    }

    #[test]
    fn edit_and_chat_do_not_cross() {
        assert!(AttendeePermission::Edit.allows(Capability::Edit));
        assert!(!AttendeePermission::Edit.allows(Capability::Chat));
        assert!(AttendeePermission::Chat.allows(Capability::Chat));
        assert!(!AttendeePermission::Chat.allows(Capability::Edit));
    }

    #[test]
    fn read_allows_nothing() {
        assert!(!AttendeePermission::Read.allows(Capability::Edit));
        assert!(!AttendeePermission::Read.allows(Capability::Chat));
    }

    #[test]
    fn author_overrides_stored_permission() {
        // Role wins even if a stray row carried a weaker permission.
        let author = attendee(AttendeeRole::Author, AttendeePermission::Read);
        assert!(author.can(Capability::Edit));
        assert!(author.can(Capability::Chat));
    }

    #[test]
    fn guest_is_bound_by_permission() {
        let guest = attendee(AttendeeRole::Guest, AttendeePermission::Read);
        assert!(!guest.can(Capability::Edit));
        assert!(!guest.can(Capability::Chat));

        let chatter = attendee(AttendeeRole::Guest, AttendeePermission::Chat);
        assert!(chatter.can(Capability::Chat));
        assert!(!chatter.can(Capability::Edit));
    }
}
