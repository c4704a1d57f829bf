//! OpenAPI specification and Swagger UI configuration.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Segment Studio API",
        version = "0.1.0",
        description = "Subscriber segmentation for email campaigns.\n\nBuild rule sets over subscriber fields, preview the matching audience live, and save segments with a cached subscriber count.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Segments", description = "Rule evaluation, segment CRUD, and the field catalogue"),
        (name = "Subscribers", description = "Value suggestions drawn from the subscriber base"),
        (name = "Operations", description = "Health, readiness, and liveness probes"),
    ),
    paths(
        // Segments
        crate::segment_rest::evaluate_segment,
        crate::segment_rest::list_segments,
        crate::segment_rest::get_segment,
        crate::segment_rest::create_segment,
        crate::segment_rest::update_segment,
        crate::segment_rest::recalculate_segment,
        crate::segment_rest::delete_segment,
        crate::segment_rest::list_fields,
        // Subscribers
        crate::segment_rest::subscriber_tags,
        crate::segment_rest::subscriber_sources,
        // Operations
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
    ),
    components(schemas(
        // Rule model
        segment_engine::FieldName,
        segment_engine::FieldType,
        segment_engine::Operator,
        segment_engine::fields::FieldDescriptor,
        segment_engine::ConditionValue,
        segment_engine::Condition,
        segment_engine::MatchMode,
        segment_engine::RuleSet,
        // Segments
        segment_engine::Segment,
        segment_engine::SegmentDraft,
        segment_engine::EvaluationResult,
        crate::segment_rest::EvaluateRequest,
        // Subscribers
        segment_core::types::SubscriberSummary,
        segment_core::types::EngagementLevel,
        // REST error/health types
        crate::rest::ErrorResponse,
        crate::rest::HealthResponse,
    ))
)]
pub struct ApiDoc;
