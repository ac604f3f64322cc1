// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::AppState;
use actix_web::HttpResponse;
use actix_web::Responder;
use actix_web::web;
use log::error;
use serde_json::json;
use std::sync::Arc;
use trainjatri::geo_math;
use trainjatri::models::Coordinate;
use trainjatri::time_parsing::format_iso;
use trainjatri::timeline;

/// Live status with the full per-station timeline, refined by whatever
/// crowd signal exists for the train.
#[actix_web::get("/api/trains/{train_number}/status")]
pub async fn train_status(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> impl Responder {
    let train_number = path.into_inner();
    let now = chrono::Local::now().naive_local();
    let snapshot = state.schedule_store.snapshot();
    let mut rng = rand::rng();

    let report = timeline::generate_status(
        &train_number,
        &snapshot,
        &state.delay_simulator,
        now,
        &mut rng,
    );

    match report {
        Ok(report) => {
            let adjusted =
                state
                    .crowd_validation
                    .adjust_report(&train_number, report, now, &mut rng);

            HttpResponse::Ok().json(json!({
                "success": true,
                "train_number": train_number,
                "status": adjusted,
                "timestamp": format_iso(now),
            }))
        }
        Err(e) => HttpResponse::NotFound().json(json!({
            "success": false,
            "error": e.to_string(),
        })),
    }
}

#[derive(serde::Deserialize)]
pub struct ConfirmBody {
    user_id: Option<String>,
    #[serde(default)]
    station_name: Option<String>,
    #[serde(default)]
    coordinates: Option<Coordinate>,
}

#[actix_web::post("/api/trains/{train_number}/confirm")]
pub async fn confirm_on_train(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<ConfirmBody>,
) -> impl Responder {
    let train_number = path.into_inner();
    let body = body.into_inner();
    let now = chrono::Local::now().naive_local();

    let Some(user_id) = body.user_id else {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": "User ID is required",
        }));
    };

    let receipt = state.crowd_validation.confirm(
        &train_number,
        &user_id,
        body.station_name,
        body.coordinates,
        now,
    );

    HttpResponse::Ok().json(json!({
        "success": true,
        "message": receipt.message,
        "train_number": receipt.train_number,
        "user_id": receipt.user_id,
        "timestamp": receipt.timestamp,
        "crowd_metrics": receipt.crowd_metrics,
    }))
}

#[derive(serde::Deserialize)]
pub struct RemoveBody {
    user_id: Option<String>,
}

#[actix_web::delete("/api/trains/{train_number}/confirm")]
pub async fn remove_confirmation(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<RemoveBody>,
) -> impl Responder {
    let train_number = path.into_inner();
    let now = chrono::Local::now().naive_local();

    let Some(user_id) = body.into_inner().user_id else {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": "User ID is required",
        }));
    };

    match state
        .crowd_validation
        .remove_confirmation(&train_number, &user_id, now)
    {
        Ok(()) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Confirmation removed",
            "train_number": train_number,
            "user_id": user_id,
            "timestamp": format_iso(now),
        })),
        Err(e) => HttpResponse::NotFound().json(json!({
            "success": false,
            "error": e.to_string(),
        })),
    }
}

#[actix_web::get("/api/trains/{train_number}/crowd-data")]
pub async fn train_crowd_data(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> impl Responder {
    let train_number = path.into_inner();
    let now = chrono::Local::now().naive_local();

    let crowd_data = state.crowd_validation.crowd_data(&train_number, now);

    HttpResponse::Ok().json(json!({
        "success": true,
        "train_number": train_number,
        "crowd_data": crowd_data,
        "timestamp": format_iso(now),
    }))
}

#[actix_web::get("/api/trains/{train_number}/summary")]
pub async fn train_summary(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> impl Responder {
    let train_number = path.into_inner();
    let now = chrono::Local::now().naive_local();
    let snapshot = state.schedule_store.snapshot();

    let Some(schedule) = snapshot.get_schedule(&train_number) else {
        error!("Summary requested for unknown train {}", train_number);
        return HttpResponse::NotFound().json(json!({
            "success": false,
            "error": "Train schedule not found",
        }));
    };

    let routes = &schedule.data.routes;
    let route_names: Vec<&str> = routes.iter().map(|stop| stop.city.as_str()).collect();
    let total_distance = geo_math::route_distance_by_names(&snapshot.stations, &route_names);

    let summary = json!({
        "train_number": &train_number,
        "train_name": &schedule.data.train_name,
        "operating_days": &schedule.data.days,
        "total_stations": routes.len(),
        "route_summary": {
            "origin": routes.first().map(|stop| stop.city.as_str()),
            "destination": routes.last().map(|stop| stop.city.as_str()),
            "total_distance": total_distance,
        },
        "schedule_info": {
            "departure_time": routes.first().and_then(|stop| stop.departure_time.as_deref()),
            "arrival_time": routes.last().and_then(|stop| stop.arrival_time.as_deref()),
        },
        "crowd_data": state.crowd_validation.crowd_data(&train_number, now),
    });

    HttpResponse::Ok().json(json!({
        "success": true,
        "train_number": train_number,
        "summary": summary,
        "timestamp": format_iso(now),
    }))
}

#[actix_web::get("/api/stations/{station_name}/trains")]
pub async fn trains_at_station(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> impl Responder {
    let station_name = path.into_inner();
    let now = chrono::Local::now().naive_local();
    let snapshot = state.schedule_store.snapshot();

    let trains = snapshot.trains_calling_at(&station_name);
    let total_count = trains.len();

    HttpResponse::Ok().json(json!({
        "success": true,
        "station_name": station_name,
        "trains": trains,
        "total_count": total_count,
        "timestamp": format_iso(now),
    }))
}
