use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use screening_backend::config::ScreeningConfig;
use screening_backend::models::loader;
use screening_backend::pipeline::Preprocessor;
use screening_backend::routes::configure_routes;
use screening_backend::state::AppState;
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = ScreeningConfig::load().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::other(e)
    })?;
    let preprocessor = Preprocessor::from_config(&config.image).map_err(std::io::Error::other)?;
    let (width, height) = preprocessor.dimensions();
    log::info!("Uploads are resized to {}x{}", width, height);

    let state = AppState::from_load(
        loader::load(&config.models, &config.labels),
        preprocessor,
        config.server.max_upload_bytes,
    );

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
