use crate::auth_utils::{hash_password, AuthenticatedUser};
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::handlers::project_handlers::build_project_responses;
use crate::models::{
    Project, UpdateUserChangeset, UpdateUserPayload, User, UserResponse,
};
use crate::schema::{project_members, projects, users};
use actix_web::{delete, get, put, web, HttpResponse};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize, Debug)]
pub struct UserSearchQuery {
    pub username: Option<String>,
}

#[get("")]
pub async fn list_users_handler(pool: web::Data<DbPool>) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;

    let user_list = users::table
        .select(User::as_select())
        .load::<User>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let responses: Vec<UserResponse> = user_list.into_iter().map(UserResponse::from).collect();

    Ok(HttpResponse::Ok().json(responses))
}

#[get("/search")]
pub async fn search_users_handler(
    pool: web::Data<DbPool>,
    query: web::Query<UserSearchQuery>,
) -> Result<HttpResponse, ServiceError> {
    let needle = match query.username.as_deref() {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => return Ok(HttpResponse::Ok().json(Vec::<UserResponse>::new())),
    };

    let mut conn = pool.get().await?;

    let user_list = users::table
        .filter(users::username.ilike(format!("%{}%", needle)))
        .select(User::as_select())
        .load::<User>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let responses: Vec<UserResponse> = user_list.into_iter().map(UserResponse::from).collect();

    Ok(HttpResponse::Ok().json(responses))
}

#[get("/by-username/{username}")]
pub async fn get_user_by_username_handler(
    pool: web::Data<DbPool>,
    username_path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let username_to_find = username_path.into_inner();

    let mut conn = pool.get().await?;

    let user = find_user_by_username(&mut conn, &username_to_find).await?;

    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[get("/by-username/{username}/projects")]
pub async fn get_user_projects_by_username_handler(
    pool: web::Data<DbPool>,
    username_path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let username_to_find = username_path.into_inner();

    let mut conn = pool.get().await?;

    let user = find_user_by_username(&mut conn, &username_to_find).await?;
    let responses = load_projects_for_user(&mut conn, user.id).await?;

    Ok(HttpResponse::Ok().json(responses))
}

#[get("/{user_id}")]
pub async fn get_user_handler(
    pool: web::Data<DbPool>,
    user_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let user_to_find_id = user_id_path.into_inner();

    let mut conn = pool.get().await?;

    let user = users::table
        .find(user_to_find_id)
        .select(User::as_select())
        .first::<User>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    match user {
        Some(user) => Ok(HttpResponse::Ok().json(UserResponse::from(user))),
        None => Err(ServiceError::NotFound("User not found".to_string())),
    }
}

#[get("/{user_id}/projects")]
pub async fn get_user_projects_handler(
    pool: web::Data<DbPool>,
    user_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let user_to_find_id = user_id_path.into_inner();

    let mut conn = pool.get().await?;

    let user_exists = users::table
        .find(user_to_find_id)
        .select(User::as_select())
        .first::<User>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    if user_exists.is_none() {
        return Err(ServiceError::NotFound("User not found".to_string()));
    }

    let responses = load_projects_for_user(&mut conn, user_to_find_id).await?;

    Ok(HttpResponse::Ok().json(responses))
}

#[put("/{user_id}")]
pub async fn update_user_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    user_id_path: web::Path<Uuid>,
    payload: web::Json<UpdateUserPayload>,
) -> Result<HttpResponse, ServiceError> {
    let user_to_update_id = user_id_path.into_inner();

    if authenticated_user.id != user_to_update_id {
        return Err(ServiceError::Forbidden(
            "You can only update your own profile.".to_string(),
        ));
    }

    let payload = payload.into_inner();
    let user_changes = UpdateUserChangeset {
        name: payload.name,
        username: payload.username,
        email: payload.email,
        password_hash: match payload.password {
            Some(password) => Some(hash_password(&password)?),
            None => None,
        },
    };

    let mut conn = pool.get().await?;

    // An empty patch succeeds without touching the row.
    if user_changes.is_noop() {
        let exists = users::table
            .find(user_to_update_id)
            .select(User::as_select())
            .first::<User>(&mut conn)
            .await
            .optional()
            .map_err(ServiceError::from)?;
        return match exists {
            Some(_) => Ok(HttpResponse::Ok().json(json!({"message": "User updated"}))),
            None => Err(ServiceError::NotFound("User not found".to_string())),
        };
    }

    let updated = diesel::update(users::table.find(user_to_update_id))
        .set(&user_changes)
        .get_result::<User>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    match updated {
        Some(_) => Ok(HttpResponse::Ok().json(json!({"message": "User updated"}))),
        None => Err(ServiceError::NotFound("User not found".to_string())),
    }
}

#[delete("/{user_id}")]
pub async fn delete_user_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    user_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let user_to_delete_id = user_id_path.into_inner();

    if authenticated_user.id != user_to_delete_id {
        return Err(ServiceError::Forbidden(
            "You can only delete your own profile.".to_string(),
        ));
    }

    let mut conn = pool.get().await?;

    // Memberships and task assignments go with the user via FK cascade;
    // projects they created stay behind.
    let num_deleted = diesel::delete(users::table.find(user_to_delete_id))
        .execute(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    if num_deleted > 0 {
        Ok(HttpResponse::Ok().json(json!({"message": "User was deleted"})))
    } else {
        Err(ServiceError::NotFound("User not found".to_string()))
    }
}

async fn find_user_by_username(
    conn: &mut AsyncPgConnection,
    username: &str,
) -> Result<User, ServiceError> {
    users::table
        .filter(users::username.eq(username))
        .select(User::as_select())
        .first::<User>(conn)
        .await
        .optional()
        .map_err(ServiceError::from)?
        .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
}

pub async fn load_projects_for_user(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> Result<Vec<crate::models::ProjectResponse>, ServiceError> {
    let project_list = projects::table
        .inner_join(project_members::table)
        .filter(project_members::user_id.eq(user_id))
        .select(Project::as_select())
        .load::<Project>(conn)
        .await
        .map_err(ServiceError::from)?;

    build_project_responses(conn, project_list).await
}
