// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::AppState;
use actix_web::HttpResponse;
use actix_web::Responder;
use actix_web::web;
use serde_json::json;
use std::sync::Arc;
use trainjatri::time_parsing::format_iso;
use trainjatri::time_parsing::parse_clock;

#[derive(serde::Deserialize)]
pub struct DelayAnalyticsQuery {
    train: Option<String>,
    station: Option<String>,
}

/// Historical delay statistics. "No data yet" is an explicit sentinel,
/// never a zero-filled result.
#[actix_web::get("/api/analytics/delays")]
pub async fn delay_analytics(
    state: web::Data<Arc<AppState>>,
    query: web::Query<DelayAnalyticsQuery>,
) -> impl Responder {
    let now = chrono::Local::now().naive_local();
    let query = query.into_inner();

    match &query.train {
        Some(train_number) => {
            let stats = state
                .delay_simulator
                .historical_stats(train_number, query.station.as_deref());

            let stats_body = match stats {
                Ok(stats) => json!(stats),
                Err(e) => json!({ "error": e.to_string() }),
            };

            let analytics_type = if query.station.is_some() {
                "train_station_delays"
            } else {
                "train_delays"
            };

            let mut body = json!({
                "success": true,
                "analytics_type": analytics_type,
                "train_number": train_number,
                "stats": stats_body,
                "timestamp": format_iso(now),
            });
            if let Some(station) = &query.station {
                body["station_name"] = json!(station);
            }

            HttpResponse::Ok().json(body)
        }
        None => {
            let snapshot = state.schedule_store.snapshot();

            HttpResponse::Ok().json(json!({
                "success": true,
                "analytics_type": "overall_delays",
                "stats": {
                    "total_trains": snapshot.all_train_numbers().len(),
                },
                "timestamp": format_iso(now),
            }))
        }
    }
}

#[derive(serde::Deserialize)]
pub struct DelayProbabilityQuery {
    train: Option<String>,
    station: Option<String>,
    /// Scheduled slot as a schedule clock string, e.g. `9:30 AM`.
    /// Defaults to the current time.
    time: Option<String>,
}

#[actix_web::get("/api/analytics/delays/probability")]
pub async fn delay_probability(
    state: web::Data<Arc<AppState>>,
    query: web::Query<DelayProbabilityQuery>,
) -> impl Responder {
    let now = chrono::Local::now().naive_local();
    let query = query.into_inner();

    let (Some(train_number), Some(station_name)) = (&query.train, &query.station) else {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": "Both 'train' and 'station' parameters are required",
        }));
    };

    let scheduled_time = query
        .time
        .as_deref()
        .and_then(parse_clock)
        .map(|clock| now.date().and_time(clock))
        .unwrap_or(now);

    let prediction =
        state
            .delay_simulator
            .predict_probability(train_number, station_name, scheduled_time);

    HttpResponse::Ok().json(json!({
        "success": true,
        "train_number": train_number,
        "station_name": station_name,
        "prediction": prediction,
        "timestamp": format_iso(now),
    }))
}
