use actix_web::{web, App, HttpServer};
use relay_service::openapi::ApiDoc;
use relay_service::{config, db, error, logging, metrics, routes, state::AppState};
use std::sync::Arc;
use utoipa::OpenApi;

async fn openapi_json(doc: web::Data<utoipa::openapi::OpenApi>) -> actix_web::HttpResponse {
    let body = serde_json::to_string(&*doc)
        .expect("Failed to serialize OpenAPI document for relay-service");

    actix_web::HttpResponse::Ok()
        .content_type("application/json")
        .body(body)
}

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    // Initialize DB pool and run embedded migrations
    let db = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    let state = AppState {
        db: db.clone(),
        config: cfg.clone(),
    };

    // Metrics updater (pending inbox depth gauge)
    metrics::spawn_metrics_updater(db.clone());

    let bind_addr = format!("{}:{}", cfg.host, cfg.port);
    tracing::info!(%bind_addr, "starting relay-service");

    let jwt_secret = cfg.jwt_secret.clone();
    HttpServer::new(move || {
        let openapi_doc = ApiDoc::openapi();
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(openapi_doc))
            .route(ApiDoc::openapi_json_path(), web::get().to(openapi_json))
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
            .wrap(actix_middleware::DeviceAuthMiddleware::new(
                jwt_secret.clone(),
            ))
            .wrap(actix_middleware::MetricsMiddleware)
            .wrap(cors)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(e.to_string()))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    Ok(())
}
