// Copyright Kyler Chin <kyler@catenarymaps.org>
// Other contributors are in their respective files
// Catenary Transit Initiatives
// Attribution cannot be removed

mod analytics;
mod train_api;

use actix_web::middleware::DefaultHeaders;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, Responder, middleware, web};
use log::{error, info};
use serde_json::json;
use std::sync::Arc;
use trainjatri::config::Config;
use trainjatri::crowd_validation::CrowdValidationStore;
use trainjatri::delay_simulation::DelaySimulator;
use trainjatri::schedule_store::ScheduleStore;
use trainjatri::time_parsing::format_iso;

/// Everything a request handler needs, built once at startup. No
/// process-wide singletons anywhere in the service.
pub struct AppState {
    pub config: Config,
    pub schedule_store: ScheduleStore,
    pub delay_simulator: DelaySimulator,
    pub crowd_validation: CrowdValidationStore,
}

async fn index(_req: HttpRequest) -> impl Responder {
    HttpResponse::Ok()
        .insert_header(("Content-Type", "text/plain"))
        .body("Hello from the TrainJatri Banyan HTTP endpoint!")
}

#[actix_web::get("/api/health")]
pub async fn health_check(state: web::Data<Arc<AppState>>) -> impl Responder {
    let now = chrono::Local::now().naive_local();
    let data_status = state.schedule_store.status();
    let crowd_summary = state.crowd_validation.all_validations(now);

    let active_validations: usize = crowd_summary
        .values()
        .map(|summary| summary.active_confirmations)
        .sum();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": format_iso(now),
        "version": trainjatri::API_VERSION,
        "data_sources": data_status,
        "crowd_validations": {
            "total_trains": crowd_summary.len(),
            "active_validations": active_validations,
        },
        "modules": {
            "schedule_store": "active",
            "position_logic": "active",
            "delay_simulation": "active",
            "timeline": "active",
            "crowd_validation": "active",
        },
    }))
}

#[actix_web::get("/api/stations")]
pub async fn get_stations(state: web::Data<Arc<AppState>>) -> impl Responder {
    let now = chrono::Local::now().naive_local();
    let snapshot = state.schedule_store.snapshot();

    HttpResponse::Ok().json(json!({
        "success": true,
        "stations": &snapshot.stations,
        "total_count": snapshot.stations.len(),
        "timestamp": format_iso(now),
    }))
}

#[derive(serde::Deserialize)]
struct SearchQuery {
    from: Option<String>,
    to: Option<String>,
    number: Option<String>,
}

#[actix_web::get("/api/trains/search")]
pub async fn search_trains(
    state: web::Data<Arc<AppState>>,
    query: web::Query<SearchQuery>,
) -> impl Responder {
    let now = chrono::Local::now().naive_local();
    let query = query.into_inner();
    let snapshot = state.schedule_store.snapshot();

    if let Some(number) = &query.number {
        let results = snapshot.search_by_number(number);
        let schedules: Vec<_> = results.iter().map(|r| &r.schedule).collect();

        let mut body = json!({
            "success": true,
            "search_type": "train_number",
            "query": number,
            "results": schedules,
            "total_count": results.len(),
            "timestamp": format_iso(now),
        });
        if results.is_empty() {
            body["message"] = json!("No trains found with the specified number");
        }
        return HttpResponse::Ok().json(body);
    }

    if let (Some(from), Some(to)) = (&query.from, &query.to) {
        let results = snapshot.search_by_stations(from, to);
        let schedules: Vec<_> = results.iter().map(|r| &r.schedule).collect();

        let mut body = json!({
            "success": true,
            "search_type": "station_to_station",
            "from_station": from,
            "to_station": to,
            "results": schedules,
            "total_count": results.len(),
            "timestamp": format_iso(now),
        });
        if results.is_empty() {
            body["message"] = json!(format!("No trains found between {} and {}", from, to));
        }
        return HttpResponse::Ok().json(body);
    }

    HttpResponse::BadRequest().json(json!({
        "success": false,
        "error": "Invalid search parameters. Use 'from' and 'to' for station search or 'number' for train search.",
    }))
}

#[actix_web::post("/api/admin/refresh-data")]
pub async fn refresh_data(state: web::Data<Arc<AppState>>) -> impl Responder {
    let now = chrono::Local::now().naive_local();

    let data_status = state.schedule_store.refresh();
    let cleaned_count = state.crowd_validation.cleanup(24, now);

    HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Data refreshed successfully",
        "data_status": data_status,
        "cleaned_validations": cleaned_count,
        "timestamp": format_iso(now),
    }))
}

#[actix_web::get("/api/admin/system-status")]
pub async fn system_status(state: web::Data<Arc<AppState>>) -> impl Responder {
    let now = chrono::Local::now().naive_local();
    let data_status = state.schedule_store.status();
    let crowd_summary = state.crowd_validation.all_validations(now);

    let total_confirmations: usize = crowd_summary
        .values()
        .map(|summary| summary.total_confirmations)
        .sum();
    let active_confirmations: usize = crowd_summary
        .values()
        .map(|summary| summary.active_confirmations)
        .sum();

    let schedules_loaded = data_status.schedules_count > 0;

    HttpResponse::Ok().json(json!({
        "success": true,
        "system_status": {
            "data_dir": state.config.data_dir.display().to_string(),
            "data_sources": data_status,
            "crowd_validations": {
                "total_trains": crowd_summary.len(),
                "total_confirmations": total_confirmations,
                "active_confirmations": active_confirmations,
            },
            "system_health": {
                "schedule_store": if schedules_loaded { "healthy" } else { "unhealthy" },
                "position_logic": "healthy",
                "delay_simulation": "healthy",
                "timeline": "healthy",
                "crowd_validation": "healthy",
            },
            "last_updated": format_iso(now),
        },
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let config = Config::from_env();
    info!("Starting TrainJatri backend on {}:{}", config.host, config.port);

    let schedule_store = ScheduleStore::new(config.data_dir.clone(), config.cache_duration);
    let crowd_validation = CrowdValidationStore::open(
        Some(config.crowd_validations_file.clone()),
        config.crowd_validation_timeout_secs,
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        schedule_store,
        delay_simulator: DelaySimulator::new(),
        crowd_validation,
    });

    // warm the reference-data cache before accepting traffic
    let initial_status = state.schedule_store.status();
    if initial_status.schedules_count == 0 {
        error!("No schedules loaded from {}", config.data_dir.display());
    } else {
        info!("Loaded {} schedules", initial_status.schedules_count);
    }

    let builder = HttpServer::new(move || {
        App::new()
            .wrap(DefaultHeaders::new().add(("Server", "TrainJatriBanyan")))
            .wrap(actix_cors::Cors::permissive())
            .wrap(middleware::Compress::default())
            .app_data(actix_web::web::Data::new(Arc::clone(&state)))
            .route("/", web::get().to(index))
            .service(health_check)
            .service(get_stations)
            .service(search_trains)
            .service(refresh_data)
            .service(system_status)
            .service(train_api::train_status)
            .service(train_api::confirm_on_train)
            .service(train_api::remove_confirmation)
            .service(train_api::train_crowd_data)
            .service(train_api::train_summary)
            .service(train_api::trains_at_station)
            .service(analytics::delay_analytics)
            .service(analytics::delay_probability)
    })
    .workers(4);

    builder
        .bind((config.host.as_str(), config.port))?
        .run()
        .await
}
