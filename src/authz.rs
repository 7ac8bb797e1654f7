//! Membership predicates backing every authorization decision.
//!
//! Rights are derived from association rows, not from an owner column: a
//! `project_members` row makes a user a member, its `is_creator` flag makes
//! them the creator, and a `task_assignees` row makes them an assignee of a
//! task. The predicates are read-only queries; the one non-trivial rule
//! (who may update a task) is a pure function over their results.

use crate::error_handler::ServiceError;
use crate::schema::{project_members, task_assignees};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

pub async fn is_project_member(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<bool, ServiceError> {
    diesel::select(exists(
        project_members::table
            .filter(project_members::user_id.eq(user_id))
            .filter(project_members::project_id.eq(project_id)),
    ))
    .get_result::<bool>(conn)
    .await
    .map_err(ServiceError::from)
}

pub async fn is_project_creator(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<bool, ServiceError> {
    diesel::select(exists(
        project_members::table
            .filter(project_members::user_id.eq(user_id))
            .filter(project_members::project_id.eq(project_id))
            .filter(project_members::is_creator.eq(true)),
    ))
    .get_result::<bool>(conn)
    .await
    .map_err(ServiceError::from)
}

pub async fn is_task_assignee(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    task_id: Uuid,
) -> Result<bool, ServiceError> {
    diesel::select(exists(
        task_assignees::table
            .filter(task_assignees::user_id.eq(user_id))
            .filter(task_assignees::task_id.eq(task_id)),
    ))
    .get_result::<bool>(conn)
    .await
    .map_err(ServiceError::from)
}

/// The caller's standing relative to a task and its project, resolved once
/// per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskUpdateContext {
    pub is_creator: bool,
    pub is_assignee: bool,
    pub is_member: bool,
}

impl TaskUpdateContext {
    pub async fn load(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        project_id: Uuid,
        task_id: Uuid,
    ) -> Result<Self, ServiceError> {
        Ok(TaskUpdateContext {
            is_creator: is_project_creator(conn, user_id, project_id).await?,
            is_assignee: is_task_assignee(conn, user_id, task_id).await?,
            is_member: is_project_member(conn, user_id, project_id).await?,
        })
    }
}

/// A task update is allowed for the project creator and for task assignees.
/// Any other project member may only flip `completed` - and only when that
/// is the single field in the payload.
pub fn may_update_task(ctx: &TaskUpdateContext, updates_only_completed: bool) -> bool {
    ctx.is_creator || ctx.is_assignee || (updates_only_completed && ctx.is_member)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(is_creator: bool, is_assignee: bool, is_member: bool) -> TaskUpdateContext {
        TaskUpdateContext {
            is_creator,
            is_assignee,
            is_member,
        }
    }

    #[test]
    fn creator_may_update_anything() {
        assert!(may_update_task(&ctx(true, false, true), false));
        assert!(may_update_task(&ctx(true, false, true), true));
    }

    #[test]
    fn assignee_may_update_anything() {
        assert!(may_update_task(&ctx(false, true, true), false));
        assert!(may_update_task(&ctx(false, true, true), true));
        // Assignment grants update rights even without project membership.
        assert!(may_update_task(&ctx(false, true, false), false));
    }

    #[test]
    fn plain_member_may_only_flip_completed() {
        assert!(may_update_task(&ctx(false, false, true), true));
        assert!(!may_update_task(&ctx(false, false, true), false));
    }

    #[test]
    fn outsider_may_do_nothing() {
        assert!(!may_update_task(&ctx(false, false, false), true));
        assert!(!may_update_task(&ctx(false, false, false), false));
    }
}
