use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use stundenplan_core::{
    FeedConfig, LessonView,
    cache::{FeedIngestor, SystemClock, TimetableCache},
    queries,
    subjects::SubjectResolver,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const DEFAULT_EXAM_COUNT: usize = 5;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<TimetableCache<FeedIngestor, SystemClock>>,
    pub resolver: Arc<SubjectResolver>,
    pub timezone: Tz,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Timetable query parameters
#[derive(Deserialize)]
struct TimetableQuery {
    /// How many upcoming exams to include, default 5.
    exams: Option<usize>,
}

/// Payload of `/api/timetable`
#[derive(Serialize)]
struct TimetableResponse {
    current_lesson: Option<LessonView>,
    next_lesson: Option<LessonView>,
    today: Vec<LessonView>,
    exams: Vec<LessonView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl TimetableResponse {
    fn no_data() -> Self {
        Self {
            current_lesson: None,
            next_lesson: None,
            today: Vec::new(),
            exams: Vec::new(),
            message: Some("no timetable data available".to_string()),
        }
    }
}

pub fn create_app(config: FeedConfig) -> Router {
    let timezone = config.timezone;
    let freshness = config.freshness;
    let cache = Arc::new(TimetableCache::new(
        FeedIngestor::new(config),
        SystemClock,
        freshness,
    ));
    let state = AppState {
        cache,
        resolver: Arc::new(SubjectResolver::default()),
        timezone,
    };

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/timetable", get(timetable_handler))
        .route("/api/week", get(week_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Stundenplan Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "School timetable dashboard backend",
        "endpoints": {
            "health": "/health",
            "timetable": "/api/timetable",
            "week": "/api/week"
        }
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Current lesson, next lesson, today's remaining lessons and the
/// next N exams, in the shape the dashboard front end consumes.
async fn timetable_handler(
    Query(params): Query<TimetableQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let Some(entry) = state.cache.get_events().await else {
        return Json(TimetableResponse::no_data());
    };

    let now = Utc::now().with_timezone(&state.timezone);
    let events = &entry.events;

    let current_lesson = queries::current_lesson(events, now).map(|lesson| {
        let mut view = lesson.view();
        view.notebook_link = state
            .resolver
            .notebook_link(&lesson.subject)
            .map(str::to_string);
        view
    });

    Json(TimetableResponse {
        current_lesson,
        next_lesson: queries::next_lesson(events, now).map(|l| l.view()),
        today: queries::lessons_today(events, now)
            .into_iter()
            .map(|l| l.view())
            .collect(),
        exams: queries::upcoming_exams(events, now, params.exams.unwrap_or(DEFAULT_EXAM_COUNT))
            .into_iter()
            .map(|l| l.view())
            .collect(),
        message: None,
    })
}

/// This week's lessons grouped by civic day, Monday through Sunday.
async fn week_handler(State(state): State<AppState>) -> impl IntoResponse {
    let Some(entry) = state.cache.get_events().await else {
        return Json(serde_json::json!({
            "week": {},
            "message": "no timetable data available"
        }));
    };

    let now = Utc::now().with_timezone(&state.timezone);
    let week: BTreeMap<NaiveDate, Vec<LessonView>> = queries::week_lessons(&entry.events, now)
        .into_iter()
        .map(|(day, lessons)| (day, lessons.into_iter().map(|l| l.view()).collect()))
        .collect();

    Json(serde_json::json!({ "week": week }))
}
