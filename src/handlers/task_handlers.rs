// taskboard-api/src/handlers/task_handlers.rs
use crate::auth_utils::AuthenticatedUser;
use crate::authz::{is_project_creator, is_project_member, may_update_task, TaskUpdateContext};
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{
    patch_field, CreateTaskPayload, NewTask, NewTaskAssignee, Project, Task, TaskAssignee,
    TaskInvitePayload, TaskMemberView, TaskProjectRef, TaskResponse, UpdateTaskChangeset,
    UpdateTaskPayload, User,
};
use crate::schema::{projects, task_assignees, tasks, users};
use actix_web::{delete, get, post, put, web, HttpResponse};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize, Debug)]
pub struct CreateTaskParams {
    pub project_id: Uuid,
    pub user_id: Uuid,
}

#[post("")]
pub async fn create_task_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    params: web::Query<CreateTaskParams>,
    payload: web::Json<CreateTaskPayload>,
) -> Result<HttpResponse, ServiceError> {
    let params = params.into_inner();
    let project_id = params.project_id;
    let assignee_id = params.user_id;

    let mut conn = pool.get().await?;

    let project = projects::table
        .find(project_id)
        .select(Project::as_select())
        .first::<Project>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    if project.is_none() {
        return Err(ServiceError::NotFound("Project not found".to_string()));
    }

    if !is_project_member(&mut conn, authenticated_user.id, project_id).await? {
        return Err(ServiceError::Forbidden(
            "Only project members can create tasks.".to_string(),
        ));
    }

    // The initial assignee is caller-chosen and may be someone else.
    let assignee = users::table
        .find(assignee_id)
        .select(User::as_select())
        .first::<User>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    if assignee.is_none() {
        return Err(ServiceError::NotFound("User not found".to_string()));
    }

    let new_task_data = NewTask {
        project_id,
        title: payload.title.clone(),
        description: payload.description.clone(),
        deadline: payload.deadline,
    };

    // A task never exists without its first assignee row.
    let task = conn
        .transaction::<Task, ServiceError, _>(|conn| {
            async move {
                let task = diesel::insert_into(tasks::table)
                    .values(&new_task_data)
                    .get_result::<Task>(conn)
                    .await?;

                diesel::insert_into(task_assignees::table)
                    .values(&NewTaskAssignee {
                        task_id: task.id,
                        user_id: assignee_id,
                    })
                    .execute(conn)
                    .await?;

                Ok(task)
            }
            .scope_boxed()
        })
        .await?;

    log::info!(
        "Task {} created in project {} by user {}",
        task.id,
        project_id,
        authenticated_user.id
    );

    let response = build_task_response(&mut conn, task).await?;

    Ok(HttpResponse::Created().json(response))
}

#[get("/{task_id}")]
pub async fn get_task_handler(
    pool: web::Data<DbPool>,
    task_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let task_to_find_id = task_id_path.into_inner();

    let mut conn = pool.get().await?;

    let task = find_task(&mut conn, task_to_find_id).await?;
    let response = build_task_response(&mut conn, task).await?;

    Ok(HttpResponse::Ok().json(response))
}

#[put("/{task_id}")]
pub async fn update_task_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    task_id_path: web::Path<Uuid>,
    payload: web::Json<UpdateTaskPayload>,
) -> Result<HttpResponse, ServiceError> {
    let task_to_update_id = task_id_path.into_inner();

    let mut conn = pool.get().await?;

    let task = find_task(&mut conn, task_to_update_id).await?;

    let ctx = TaskUpdateContext::load(
        &mut conn,
        authenticated_user.id,
        task.project_id,
        task.id,
    )
    .await?;

    let payload = payload.into_inner();

    if !may_update_task(&ctx, payload.updates_only_completed()) {
        return Err(ServiceError::Forbidden(
            "No permission to update this task.".to_string(),
        ));
    }

    let task_changes = UpdateTaskChangeset {
        title: patch_field(payload.title, "title")?,
        description: patch_field(payload.description, "description")?,
        deadline: patch_field(payload.deadline, "deadline")?,
        completed: patch_field(payload.completed, "completed")?,
    };

    if !task_changes.is_noop() {
        diesel::update(tasks::table.find(task_to_update_id))
            .set(&task_changes)
            .get_result::<Task>(&mut conn)
            .await
            .map_err(ServiceError::from)?;
    }

    Ok(HttpResponse::Ok().json(json!({"message": "Task was updated"})))
}

#[post("/{task_id}")]
pub async fn invite_to_task_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    task_id_path: web::Path<Uuid>,
    payload: web::Json<TaskInvitePayload>,
) -> Result<HttpResponse, ServiceError> {
    let task_to_invite_id = task_id_path.into_inner();
    let invite = payload.into_inner();

    let mut conn = pool.get().await?;

    let task = find_task(&mut conn, task_to_invite_id).await?;

    if invite.task_id != task.id {
        return Err(ServiceError::BadRequest(
            "Invite does not reference this task.".to_string(),
        ));
    }

    if invite.project_id != task.project_id {
        return Err(ServiceError::NotFound(
            "Task does not belong to this project.".to_string(),
        ));
    }

    if !is_project_creator(&mut conn, authenticated_user.id, task.project_id).await? {
        return Err(ServiceError::Forbidden(
            "Only the project creator can invite to a task.".to_string(),
        ));
    }

    let user = users::table
        .find(invite.user_id)
        .select(User::as_select())
        .first::<User>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    if user.is_none() {
        return Err(ServiceError::NotFound("User not found".to_string()));
    }

    let existing = task_assignees::table
        .find((task.id, invite.user_id))
        .select(TaskAssignee::as_select())
        .first::<TaskAssignee>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    if existing.is_some() {
        return Err(ServiceError::Conflict(
            "User is already assigned to this task.".to_string(),
        ));
    }

    diesel::insert_into(task_assignees::table)
        .values(&NewTaskAssignee {
            task_id: task.id,
            user_id: invite.user_id,
        })
        .execute(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    Ok(HttpResponse::Created().json(json!({"message": "User assigned to task"})))
}

#[delete("/{task_id}")]
pub async fn delete_task_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    task_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let task_to_delete_id = task_id_path.into_inner();

    let mut conn = pool.get().await?;

    let task = find_task(&mut conn, task_to_delete_id).await?;

    if !is_project_creator(&mut conn, authenticated_user.id, task.project_id).await? {
        return Err(ServiceError::Forbidden(
            "Only the project creator can delete a task.".to_string(),
        ));
    }

    let num_deleted = diesel::delete(tasks::table.find(task_to_delete_id))
        .execute(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    if num_deleted > 0 {
        Ok(HttpResponse::Ok().json(json!({"message": "Task was deleted"})))
    } else {
        Err(ServiceError::NotFound("Task not found".to_string()))
    }
}

async fn find_task(conn: &mut AsyncPgConnection, task_id: Uuid) -> Result<Task, ServiceError> {
    tasks::table
        .find(task_id)
        .select(Task::as_select())
        .first::<Task>(conn)
        .await
        .optional()
        .map_err(ServiceError::from)?
        .ok_or_else(|| ServiceError::NotFound("Task not found".to_string()))
}

pub async fn load_task_members(
    conn: &mut AsyncPgConnection,
    task_id: Uuid,
) -> Result<Vec<TaskMemberView>, ServiceError> {
    let rows = task_assignees::table
        .inner_join(users::table)
        .filter(task_assignees::task_id.eq(task_id))
        .select((task_assignees::user_id, users::username))
        .load::<(Uuid, String)>(conn)
        .await
        .map_err(ServiceError::from)?;

    Ok(rows
        .into_iter()
        .map(|(user_id, username)| TaskMemberView { user_id, username })
        .collect())
}

/// A task view carries its project reference and assignee list. Zero
/// assignees means the every-task-has-an-assignee invariant was broken
/// somewhere; that is reported as a server-side failure, not as an empty
/// list.
pub async fn build_task_response(
    conn: &mut AsyncPgConnection,
    task: Task,
) -> Result<TaskResponse, ServiceError> {
    let project = projects::table
        .find(task.project_id)
        .select(Project::as_select())
        .first::<Project>(conn)
        .await
        .map_err(ServiceError::from)?;

    let members = load_task_members(conn, task.id).await?;

    if members.is_empty() {
        return Err(ServiceError::UnlinkedTask(task.id));
    }

    Ok(TaskResponse {
        id: task.id,
        title: task.title,
        description: task.description,
        deadline: task.deadline,
        completed: task.completed,
        project: TaskProjectRef {
            project_id: project.id,
            project_title: project.title,
        },
        members,
    })
}

pub async fn build_task_responses(
    conn: &mut AsyncPgConnection,
    task_list: Vec<Task>,
) -> Result<Vec<TaskResponse>, ServiceError> {
    let mut responses = Vec::with_capacity(task_list.len());

    for task in task_list {
        responses.push(build_task_response(conn, task).await?);
    }

    Ok(responses)
}
