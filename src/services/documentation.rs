use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Courtside Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::matches::start_match,
        crate::routes::matches::list_matches,
        crate::routes::matches::get_match,
        crate::routes::matches::award_point,
        crate::routes::matches::start_timeout,
        crate::routes::matches::end_timeout,
        crate::routes::matches::configure_set,
        crate::routes::matches::override_state,
        crate::routes::matches::coin_toss,
        crate::routes::sync::sync_status,
        crate::routes::sync::drain,
        crate::routes::sync::dead_letters,
        crate::routes::sync::requeue_dead_letter,
        crate::routes::sync::discard_dead_letter,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::matches::StartMatchRequest,
            crate::dto::matches::SetOpeningRequest,
            crate::dto::matches::MatchView,
            crate::dto::matches::MatchSummary,
            crate::dto::matches::CoinTossResult,
            crate::dto::sync::SyncStatus,
            crate::dto::sync::DeadLetterDto,
            crate::services::offline_queue::DrainReport,
            crate::dao::models::MatchStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "matches", description = "Courtside scoring operations"),
        (name = "sync", description = "Offline queue inspection"),
    )
)]
pub struct ApiDoc;
