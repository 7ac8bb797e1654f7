pub mod auth_utils;
pub mod authz;
pub mod db;
pub mod error_handler;
pub mod handlers;
pub mod models;
pub mod schema;

use actix_web::{web, HttpResponse};
use db::DbPool;

pub async fn health_check_handler(
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, error_handler::ServiceError> {
    match pool.get().await {
        Ok(_conn) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "message": "Backend is running and DB pool accessible"
        }))),
        Err(e) => {
            log::error!("Failed to get connection from pool: {:?}", e);
            Err(error_handler::ServiceError::InternalServerError(
                "Failed to check DB pool".to_string(),
            ))
        }
    }
}

/// Mounts every route. Shared between the binary and the integration tests
/// so both run the same app.
pub fn configure_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health_check_handler)))
        .service(
            web::scope("/auth")
                .service(handlers::auth_handlers::register_handler)
                .service(handlers::auth_handlers::login_handler),
        )
        .service(handlers::auth_handlers::me_handler)
        .service(handlers::project_handlers::my_projects_handler)
        .service(
            web::scope("/users")
                .service(handlers::user_handlers::list_users_handler)
                // literal paths go before the {user_id} matchers
                .service(handlers::user_handlers::search_users_handler)
                .service(handlers::user_handlers::get_user_by_username_handler)
                .service(handlers::user_handlers::get_user_projects_by_username_handler)
                .service(handlers::user_handlers::get_user_projects_handler)
                .service(handlers::user_handlers::get_user_handler)
                .service(handlers::user_handlers::update_user_handler)
                .service(handlers::user_handlers::delete_user_handler),
        )
        .service(
            web::scope("/projects")
                .service(handlers::project_handlers::create_project_handler)
                .service(handlers::project_handlers::invite_to_project_handler)
                .service(handlers::project_handlers::list_projects_handler)
                // literal path goes before the {project_id} matchers
                .service(handlers::project_handlers::search_projects_handler)
                .service(handlers::project_handlers::list_project_tasks_handler)
                .service(handlers::project_handlers::get_project_handler)
                .service(handlers::project_handlers::update_project_handler)
                .service(handlers::project_handlers::delete_project_handler),
        )
        .service(
            web::scope("/tasks")
                .service(handlers::task_handlers::create_task_handler)
                .service(handlers::task_handlers::get_task_handler)
                .service(handlers::task_handlers::update_task_handler)
                .service(handlers::task_handlers::invite_to_task_handler)
                .service(handlers::task_handlers::delete_task_handler),
        );
}
