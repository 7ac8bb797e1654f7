// taskboard-api/src/handlers/project_handlers.rs
use crate::auth_utils::AuthenticatedUser;
use crate::authz::{is_project_creator, is_project_member};
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::handlers::task_handlers::build_task_responses;
use crate::models::{
    CreateProjectPayload, NewProject, NewProjectMember, Project, ProjectInvitePayload,
    ProjectMember, ProjectMemberView, ProjectResponse, Task, UpdateProjectChangeset,
    UpdateProjectPayload, User,
};
use crate::schema::{project_members, projects, tasks, users};
use actix_web::{delete, get, post, put, web, HttpResponse};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize, Debug)]
pub struct ProjectSearchQuery {
    pub title: Option<String>,
}

#[post("")]
pub async fn create_project_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    payload: web::Json<CreateProjectPayload>,
) -> Result<HttpResponse, ServiceError> {
    let creator_id = authenticated_user.id;
    let new_project_data = NewProject {
        title: payload.title.clone(),
        description: payload.description.clone(),
    };

    let mut conn = pool.get().await?;

    // The project and its creator membership commit together; a project
    // without a creator row must never exist.
    let project = conn
        .transaction::<Project, ServiceError, _>(|conn| {
            async move {
                let project = diesel::insert_into(projects::table)
                    .values(&new_project_data)
                    .get_result::<Project>(conn)
                    .await?;

                diesel::insert_into(project_members::table)
                    .values(&NewProjectMember {
                        user_id: creator_id,
                        project_id: project.id,
                        is_creator: true,
                    })
                    .execute(conn)
                    .await?;

                Ok(project)
            }
            .scope_boxed()
        })
        .await?;

    log::info!("Project {} created by user {}", project.id, creator_id);

    let response = build_project_response(&mut conn, project).await?;

    Ok(HttpResponse::Created().json(response))
}

#[post("/invite")]
pub async fn invite_to_project_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    payload: web::Json<ProjectInvitePayload>,
) -> Result<HttpResponse, ServiceError> {
    let invite = payload.into_inner();

    let mut conn = pool.get().await?;

    let project = projects::table
        .find(invite.project_id)
        .select(Project::as_select())
        .first::<Project>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    if project.is_none() {
        return Err(ServiceError::NotFound("Project not found".to_string()));
    }

    if !is_project_creator(&mut conn, authenticated_user.id, invite.project_id).await? {
        return Err(ServiceError::Forbidden(
            "Only the project creator can invite.".to_string(),
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

    let existing = project_members::table
        .find((invite.user_id, invite.project_id))
        .select(ProjectMember::as_select())
        .first::<ProjectMember>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    if existing.is_some() {
        return Err(ServiceError::Conflict(
            "User is already a member of this project.".to_string(),
        ));
    }

    // Concurrent duplicate invites land on the composite primary key and
    // come back as a conflict, not a crash.
    diesel::insert_into(project_members::table)
        .values(&NewProjectMember {
            user_id: invite.user_id,
            project_id: invite.project_id,
            is_creator: invite.is_creator,
        })
        .execute(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    Ok(HttpResponse::Created().json(json!({"message": "User invited to project"})))
}

#[get("")]
pub async fn list_projects_handler(pool: web::Data<DbPool>) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;

    let project_list = projects::table
        .select(Project::as_select())
        .load::<Project>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let responses = build_project_responses(&mut conn, project_list).await?;

    Ok(HttpResponse::Ok().json(responses))
}

#[get("/search")]
pub async fn search_projects_handler(
    pool: web::Data<DbPool>,
    query: web::Query<ProjectSearchQuery>,
) -> Result<HttpResponse, ServiceError> {
    let needle = match query.title.as_deref() {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => return Ok(HttpResponse::Ok().json(Vec::<ProjectResponse>::new())),
    };

    let mut conn = pool.get().await?;

    let project_list = projects::table
        .filter(projects::title.ilike(format!("%{}%", needle)))
        .select(Project::as_select())
        .load::<Project>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let responses = build_project_responses(&mut conn, project_list).await?;

    Ok(HttpResponse::Ok().json(responses))
}

#[get("/me/projects")]
pub async fn my_projects_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;

    let responses =
        crate::handlers::user_handlers::load_projects_for_user(&mut conn, authenticated_user.id)
            .await?;

    Ok(HttpResponse::Ok().json(responses))
}

#[get("/{project_id}")]
pub async fn get_project_handler(
    pool: web::Data<DbPool>,
    project_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let project_to_find_id = project_id_path.into_inner();

    let mut conn = pool.get().await?;

    let project = projects::table
        .find(project_to_find_id)
        .select(Project::as_select())
        .first::<Project>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    match project {
        Some(project) => {
            let response = build_project_response(&mut conn, project).await?;
            Ok(HttpResponse::Ok().json(response))
        }
        None => Err(ServiceError::NotFound("Project not found".to_string())),
    }
}

#[get("/{project_id}/tasks")]
pub async fn list_project_tasks_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    project_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let project_to_find_id = project_id_path.into_inner();

    let mut conn = pool.get().await?;

    let project = projects::table
        .find(project_to_find_id)
        .select(Project::as_select())
        .first::<Project>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    if project.is_none() {
        return Err(ServiceError::NotFound("Project not found".to_string()));
    }

    if !is_project_member(&mut conn, authenticated_user.id, project_to_find_id).await? {
        return Err(ServiceError::Forbidden(
            "Only project members can view tasks.".to_string(),
        ));
    }

    let task_list = tasks::table
        .filter(tasks::project_id.eq(project_to_find_id))
        .select(Task::as_select())
        .load::<Task>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let responses = build_task_responses(&mut conn, task_list).await?;

    Ok(HttpResponse::Ok().json(responses))
}

#[put("/{project_id}")]
pub async fn update_project_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    project_id_path: web::Path<Uuid>,
    payload: web::Json<UpdateProjectPayload>,
) -> Result<HttpResponse, ServiceError> {
    let project_to_update_id = project_id_path.into_inner();

    let mut conn = pool.get().await?;

    let project = projects::table
        .find(project_to_update_id)
        .select(Project::as_select())
        .first::<Project>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    if project.is_none() {
        return Err(ServiceError::NotFound("Project not found".to_string()));
    }

    if !is_project_creator(&mut conn, authenticated_user.id, project_to_update_id).await? {
        return Err(ServiceError::Forbidden(
            "Only the project creator can update.".to_string(),
        ));
    }

    let payload = payload.into_inner();
    let project_changes = UpdateProjectChangeset {
        title: payload.title,
        description: payload.description,
    };

    if !project_changes.is_noop() {
        diesel::update(projects::table.find(project_to_update_id))
            .set(&project_changes)
            .get_result::<Project>(&mut conn)
            .await
            .map_err(ServiceError::from)?;
    }

    Ok(HttpResponse::Ok().json(json!({"message": "Project was updated"})))
}

#[delete("/{project_id}")]
pub async fn delete_project_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    project_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let project_to_delete_id = project_id_path.into_inner();

    let mut conn = pool.get().await?;

    let project = projects::table
        .find(project_to_delete_id)
        .select(Project::as_select())
        .first::<Project>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    if project.is_none() {
        return Err(ServiceError::NotFound("Project not found".to_string()));
    }

    if !is_project_creator(&mut conn, authenticated_user.id, project_to_delete_id).await? {
        return Err(ServiceError::Forbidden(
            "Only the project creator can delete.".to_string(),
        ));
    }

    // Memberships, tasks and task assignments all cascade from the project.
    let num_deleted = diesel::delete(projects::table.find(project_to_delete_id))
        .execute(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    if num_deleted > 0 {
        log::info!(
            "Project {} deleted by user {}",
            project_to_delete_id,
            authenticated_user.id
        );
        Ok(HttpResponse::Ok().json(json!({"message": "Project was deleted"})))
    } else {
        Err(ServiceError::NotFound("Project not found".to_string()))
    }
}

pub async fn load_project_members(
    conn: &mut AsyncPgConnection,
    project_id: Uuid,
) -> Result<Vec<ProjectMemberView>, ServiceError> {
    let rows = project_members::table
        .inner_join(users::table)
        .filter(project_members::project_id.eq(project_id))
        .select((
            project_members::user_id,
            users::username,
            project_members::is_creator,
        ))
        .load::<(Uuid, String, bool)>(conn)
        .await
        .map_err(ServiceError::from)?;

    Ok(rows
        .into_iter()
        .map(|(user_id, username, is_creator)| ProjectMemberView {
            user_id,
            username,
            is_creator,
        })
        .collect())
}

/// A project view always carries its full membership list; an empty list is
/// a valid state (every member deleted their account).
pub async fn build_project_response(
    conn: &mut AsyncPgConnection,
    project: Project,
) -> Result<ProjectResponse, ServiceError> {
    let members = load_project_members(conn, project.id).await?;

    Ok(ProjectResponse {
        id: project.id,
        title: project.title,
        description: project.description,
        members,
    })
}

pub async fn build_project_responses(
    conn: &mut AsyncPgConnection,
    project_list: Vec<Project>,
) -> Result<Vec<ProjectResponse>, ServiceError> {
    let mut responses = Vec::with_capacity(project_list.len());

    for project in project_list {
        responses.push(build_project_response(conn, project).await?);
    }

    Ok(responses)
}
