//! OpenAPI specification and Swagger UI configuration.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Drip Sequence API",
        version = "0.1.0",
        description = "Multi-step email sequence engine.\n\nEnrollment, scheduled dispatch, engagement tracking and one-click unsubscribe.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Operator", description = "Manual dispatch, enrollment control and sequence statistics"),
        (name = "Webhooks", description = "Subscriber capture and provider delivery notifications"),
        (name = "Unsubscribe", description = "Public token-guarded opt-out page"),
        (name = "Operations", description = "Health, readiness, and liveness probes"),
    ),
    paths(
        // Operator
        crate::rest::handle_dispatch,
        crate::rest::handle_enroll,
        crate::rest::handle_pause,
        crate::rest::handle_resume,
        crate::rest::handle_list_sequences,
        crate::rest::handle_sequence_stats,
        crate::rest::handle_sequence_enrollments,
        // Webhooks
        crate::webhooks::handle_subscriber,
        crate::webhooks::handle_resend,
        // Unsubscribe
        crate::unsubscribe::unsubscribe_page,
        // Operations
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
    ),
    components(schemas(
        // Engine types
        drip_core::types::Enrollment,
        drip_core::types::EnrollmentStatus,
        drip_core::types::DispatchSummary,
        drip_core::types::SequenceStats,
        drip_core::types::VariantStats,
        drip_core::catalog::SequenceDefinition,
        drip_core::catalog::Variant,
        drip_core::catalog::Step,
        // Request/response types
        crate::rest::EnrollRequest,
        crate::rest::EnrollResponse,
        crate::rest::EnrollmentActionResponse,
        crate::rest::ErrorResponse,
        crate::rest::HealthResponse,
        crate::webhooks::SubscriberRequest,
        crate::webhooks::SubscriberResponse,
        crate::webhooks::ResendEvent,
        crate::webhooks::ResendEventData,
        crate::webhooks::ResendEventResponse,
    ))
)]
pub struct ApiDoc;
