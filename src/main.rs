// taskboard-api/src/main.rs
use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};
use std::env;
use taskboard_api::{auth_utils::AuthSettings, configure_app, db};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    if cfg!(debug_assertions) {
        match dotenvy::dotenv() {
            Ok(path) => log::info!(".env file loaded from path: {}", path.display()),
            Err(e) => log::warn!(
                "Could not load .env file: {}, using environment variables.",
                e
            ),
        }
    }

    let database_url = env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set in environment variables or .env file");

    let pool = db::create_pool(&database_url)
        .await
        .expect("Failed to create database connection pool.");

    let auth_settings = AuthSettings::from_env();

    log::info!("Taskboard API starting...");

    let frontend_url =
        env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .expect("PORT must be a valid number");

    log::info!("Server will start at http://{}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_url)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(auth_settings.clone()))
            .configure(configure_app)
    })
    .bind(format!("{}:{}", host, port))?
    .run()
    .await
}
