use crate::auth_utils::{
    hash_password, issue_token, verify_password, AuthSettings, AuthenticatedUser,
};
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{LoginPayload, LoginResponse, NewUser, RegisterPayload, User, UserResponse};
use crate::schema::users;
use actix_web::{get, post, web, HttpResponse};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

#[post("/register")]
pub async fn register_handler(
    pool: web::Data<DbPool>,
    payload: web::Json<RegisterPayload>,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;

    let existing = users::table
        .filter(
            users::username
                .eq(&payload.username)
                .or(users::email.eq(&payload.email)),
        )
        .select(User::as_select())
        .first::<User>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    if existing.is_some() {
        return Err(ServiceError::Conflict(
            "A user with this username or email already exists.".to_string(),
        ));
    }

    let new_user = NewUser {
        name: payload.name.clone(),
        username: payload.username.clone(),
        email: payload.email.clone(),
        password_hash: hash_password(&payload.password)?,
    };

    // The unique constraints still guard the race between the check above
    // and this insert; a violation surfaces as a conflict.
    let user = diesel::insert_into(users::table)
        .values(&new_user)
        .get_result::<User>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    log::info!("Registered user {} ({})", user.username, user.id);

    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

#[post("/login")]
pub async fn login_handler(
    pool: web::Data<DbPool>,
    settings: web::Data<AuthSettings>,
    payload: web::Json<LoginPayload>,
) -> Result<HttpResponse, ServiceError> {
    // Unknown username and wrong password must be indistinguishable.
    let invalid = || ServiceError::Unauthorized("Invalid credentials.".to_string());

    let mut conn = pool.get().await?;

    let user = users::table
        .filter(users::username.eq(&payload.username))
        .select(User::as_select())
        .first::<User>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    let user = user.ok_or_else(invalid)?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(invalid());
    }

    let token = issue_token(user.id, &settings)?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token: token,
        token_type: "bearer".to_string(),
    }))
}

#[get("/me")]
pub async fn me_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;

    let user = users::table
        .find(authenticated_user.id)
        .select(User::as_select())
        .first::<User>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    // A valid token for a since-deleted user is still "not authenticated";
    // the distinction is not leaked.
    match user {
        Some(user) => Ok(HttpResponse::Ok().json(UserResponse::from(user))),
        None => Err(ServiceError::Unauthorized("Not authenticated.".to_string())),
    }
}
