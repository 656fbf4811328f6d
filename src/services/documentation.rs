use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Gavel Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::create_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::request_exit,
        crate::routes::rooms::decide_exit,
        crate::routes::messages::send_message,
        crate::routes::messages::list_messages,
        crate::routes::messages::poll,
        crate::routes::judgment::get_judgment,
        crate::routes::judgment::retry_judgment,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::CreateRoomResponse,
            crate::dto::room::JoinRoomRequest,
            crate::dto::room::JoinRoomResponse,
            crate::dto::room::ExitRequestResponse,
            crate::dto::room::ExitDecisionRequest,
            crate::dto::room::ExitDecisionResponse,
            crate::dto::room::RetryJudgmentResponse,
            crate::dto::message::SendMessageRequest,
            crate::dto::message::MessageDto,
            crate::dto::message::MessageListResponse,
            crate::dto::poll::PollResponse,
            crate::dto::judgment::JudgmentResponse,
            crate::dao::models::RoomStatus,
            crate::dao::models::MemberRole,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room creation, joining and the exit workflow"),
        (name = "messages", description = "Debate messages and polling"),
        (name = "judgment", description = "Final verdicts"),
    )
)]
pub struct ApiDoc;
