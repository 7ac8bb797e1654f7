// taskboard-api/src/error_handler.rs
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::bb8::RunError as BB8RunError;
use diesel_async::pooled_connection::PoolError;
use serde_json::json;
use std::fmt;
use uuid::Uuid;

#[derive(Debug)]
pub enum ServiceError {
    InternalServerError(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    NotFound(String),
    /// A task with no assignee rows was encountered during a read. This
    /// breaks the every-task-has-an-assignee invariant and is never expected
    /// in normal operation.
    UnlinkedTask(Uuid),
    DatabaseError(String),
    PoolError(String),
}

impl ServiceError {
    fn from_diesel_error(error: DieselError) -> ServiceError {
        match error {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                log::warn!("Unique constraint violation: {}", info.message());
                ServiceError::Conflict("The record already exists.".to_string())
            }
            DieselError::DatabaseError(kind, info) => {
                log::error!("Database error: {:?} - Info: {}", kind, info.message());
                ServiceError::DatabaseError("A database operation failed.".to_string())
            }
            DieselError::NotFound => {
                ServiceError::NotFound("The requested record was not found.".to_string())
            }
            err => {
                log::error!("Unexpected Diesel error: {}", err);
                ServiceError::DatabaseError("An unexpected database error occurred.".to_string())
            }
        }
    }

    fn from_pool_error(error: PoolError) -> ServiceError {
        log::error!("Pool error: {:?}", error);
        ServiceError::PoolError("Could not connect to the database pool.".to_string())
    }

    fn from_bb8_run_error(error: BB8RunError) -> ServiceError {
        log::error!("BB8 connection pool error: {:?}", error);
        ServiceError::PoolError("Could not obtain connection from database pool.".to_string())
    }
}

impl From<DieselError> for ServiceError {
    fn from(error: DieselError) -> ServiceError {
        ServiceError::from_diesel_error(error)
    }
}

impl From<PoolError> for ServiceError {
    fn from(error: PoolError) -> ServiceError {
        ServiceError::from_pool_error(error)
    }
}

impl From<BB8RunError> for ServiceError {
    fn from(error: BB8RunError) -> ServiceError {
        ServiceError::from_bb8_run_error(error)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServiceError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ServiceError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ServiceError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ServiceError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ServiceError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ServiceError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ServiceError::UnlinkedTask(task_id) => {
                write!(f, "Task {} has no assignee associations", task_id)
            }
            ServiceError::DatabaseError(msg) => write!(f, "Database Error: {}", msg),
            ServiceError::PoolError(msg) => write!(f, "Pool Error: {}", msg),
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match *self {
            ServiceError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::UnlinkedTask(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::PoolError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        // 5xx details stay in the logs; the client gets a generic message.
        let user_facing_message = match status_code.as_u16() < 500 {
            true => self.to_string(),
            false => "An internal server error occurred. Please try again later.".to_string(),
        };

        if status_code.is_server_error() {
            log::error!("Responding with server error ({}): {}", status_code, self);
        } else {
            log::warn!(
                "Responding with client error ({}): {}",
                status_code,
                user_facing_message
            );
        }

        HttpResponse::build(status_code).json(json!({
            "status": "error",
            "statusCode": status_code.as_u16(),
            "message": user_facing_message
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_kinds() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::UnlinkedTask(Uuid::new_v4()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unique_violation_maps_to_conflict() {
        let err = DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new("duplicate key".to_string()),
        );
        assert!(matches!(ServiceError::from(err), ServiceError::Conflict(_)));
    }

    #[test]
    fn missing_row_maps_to_not_found() {
        assert!(matches!(
            ServiceError::from(DieselError::NotFound),
            ServiceError::NotFound(_)
        ));
    }

    #[test]
    fn unlinked_task_message_names_the_task() {
        let id = Uuid::new_v4();
        assert!(ServiceError::UnlinkedTask(id).to_string().contains(&id.to_string()));
    }
}
