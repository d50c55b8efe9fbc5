use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{body_partial_json, method, path, query_param};

use profile_cell::models::*;
use profile_cell::router::profile_routes;
use profile_cell::services::ProfileService;
use shared_utils::test_utils::{TestConfig, TestUser, JwtTestUtils, MockSupabaseResponses};

const TOKEN: &str = "staff-token";

fn profile_from(user_id: &str, role: &str, status: &str) -> Profile {
    serde_json::from_value(MockSupabaseResponses::profile_response(user_id, role, status)).unwrap()
}

async fn mock_profile_lookup(mock_server: &MockServer, user_id: &str, rows: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", user_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_doctor_profile_starts_pending() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let user = TestUser::doctor("asha@clinic.test");

    mock_profile_lookup(&mock_server, &user.id, json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/profiles"))
        .and(body_partial_json(json!({ "role": "doctor", "approval_status": "pending" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::profile_response(&user.id, "doctor", "pending")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = ProfileService::new(&config);
    let profile = service.create_profile(&user.to_user(), CreateProfileRequest {
        full_name: "Dr. Asha Menon".to_string(),
        phone: None,
        role: StaffRole::Doctor,
        specialization: Some("General Medicine".to_string()),
        consultation_fee: Some(500.0),
    }, TOKEN).await.unwrap();

    assert_eq!(profile.approval_status, ApprovalStatus::Pending);
    assert!(profile.is_doctor());
}

#[tokio::test]
async fn test_first_receptionist_is_auto_approved() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let user = TestUser::receptionist("desk@clinic.test");

    mock_profile_lookup(&mock_server, &user.id, json!([])).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("role", "eq.receptionist"))
        .and(query_param("approval_status", "eq.approved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/profiles"))
        .and(body_partial_json(json!({ "approval_status": "approved" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::profile_response(&user.id, "receptionist", "approved")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = ProfileService::new(&config);
    let profile = service.create_profile(&user.to_user(), CreateProfileRequest {
        full_name: "Ravi Desk".to_string(),
        phone: None,
        role: StaffRole::Receptionist,
        specialization: None,
        consultation_fee: None,
    }, TOKEN).await.unwrap();

    assert!(profile.is_approved());
}

#[tokio::test]
async fn test_later_receptionist_waits_for_approval() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let user = TestUser::receptionist("second@clinic.test");

    mock_profile_lookup(&mock_server, &user.id, json!([])).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("role", "eq.receptionist"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": Uuid::new_v4() }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/profiles"))
        .and(body_partial_json(json!({ "approval_status": "pending" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::profile_response(&user.id, "receptionist", "pending")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = ProfileService::new(&config);
    let profile = service.create_profile(&user.to_user(), CreateProfileRequest {
        full_name: "Second Desk".to_string(),
        phone: None,
        role: StaffRole::Receptionist,
        specialization: None,
        consultation_fee: None,
    }, TOKEN).await.unwrap();

    assert_eq!(profile.approval_status, ApprovalStatus::Pending);
}

#[tokio::test]
async fn test_duplicate_profile_rejected() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let user = TestUser::doctor("asha@clinic.test");

    mock_profile_lookup(&mock_server, &user.id, json!([
        MockSupabaseResponses::profile_response(&user.id, "doctor", "pending")
    ])).await;

    let service = ProfileService::new(&config);
    let result = service.create_profile(&user.to_user(), CreateProfileRequest {
        full_name: "Dr. Asha Menon".to_string(),
        phone: None,
        role: StaffRole::Doctor,
        specialization: None,
        consultation_fee: None,
    }, TOKEN).await;

    assert_matches!(result, Err(ProfileError::AlreadyExists));
}

#[tokio::test]
async fn test_approve_pending_doctor() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let doctor_id = Uuid::new_v4().to_string();
    let reviewer = profile_from(&Uuid::new_v4().to_string(), "receptionist", "approved");

    mock_profile_lookup(&mock_server, &doctor_id, json!([
        MockSupabaseResponses::profile_response(&doctor_id, "doctor", "pending")
    ])).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .and(body_partial_json(json!({ "approval_status": "approved", "rejection_reason": null })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::profile_response(&doctor_id, "doctor", "approved")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = ProfileService::new(&config);
    let profile = service.approve_profile(&doctor_id, &reviewer, TOKEN).await.unwrap();
    assert!(profile.is_approved());
}

#[tokio::test]
async fn test_approving_twice_is_invalid_transition() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let doctor_id = Uuid::new_v4().to_string();
    let reviewer = profile_from(&Uuid::new_v4().to_string(), "receptionist", "approved");

    mock_profile_lookup(&mock_server, &doctor_id, json!([
        MockSupabaseResponses::profile_response(&doctor_id, "doctor", "approved")
    ])).await;

    let service = ProfileService::new(&config);
    let result = service.approve_profile(&doctor_id, &reviewer, TOKEN).await;

    assert_matches!(result, Err(ProfileError::InvalidTransition {
        from: ApprovalStatus::Approved,
        to: ApprovalStatus::Approved,
    }));
}

#[tokio::test]
async fn test_review_guards() {
    let config = TestConfig::default().to_app_config();
    let service = ProfileService::new(&config);
    let reviewer_id = Uuid::new_v4().to_string();
    let reviewer = profile_from(&reviewer_id, "receptionist", "approved");

    assert_matches!(
        service.approve_profile(&reviewer_id, &reviewer, TOKEN).await,
        Err(ProfileError::SelfReview)
    );
    assert_matches!(
        service.reject_profile(&Uuid::new_v4().to_string(), &reviewer, "   ", TOKEN).await,
        Err(ProfileError::ValidationError(_))
    );
}

#[tokio::test]
async fn test_role_guards() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let pending_id = Uuid::new_v4().to_string();
    let doctor_id = Uuid::new_v4().to_string();
    let missing_id = Uuid::new_v4().to_string();

    mock_profile_lookup(&mock_server, &pending_id, json!([
        MockSupabaseResponses::profile_response(&pending_id, "receptionist", "pending")
    ])).await;
    mock_profile_lookup(&mock_server, &doctor_id, json!([
        MockSupabaseResponses::profile_response(&doctor_id, "doctor", "approved")
    ])).await;
    mock_profile_lookup(&mock_server, &missing_id, json!([])).await;

    let service = ProfileService::new(&config);

    assert_matches!(service.require_approved(&pending_id, TOKEN).await, Err(ProfileError::NotApproved));
    assert_matches!(service.require_approved(&missing_id, TOKEN).await, Err(ProfileError::ProfileMissing));
    assert_matches!(
        service.require_receptionist(&doctor_id, TOKEN).await,
        Err(ProfileError::InsufficientRole(StaffRole::Receptionist))
    );
    assert!(service.require_approved(&doctor_id, TOKEN).await.unwrap().is_doctor());
}

#[tokio::test]
async fn test_pending_route_requires_receptionist() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_url(&mock_server.uri());
    let doctor = TestUser::doctor("asha@clinic.test");
    let token = JwtTestUtils::create_test_token(&doctor, &test_config.jwt_secret, Some(1));

    mock_profile_lookup(&mock_server, &doctor.id, json!([
        MockSupabaseResponses::profile_response(&doctor.id, "doctor", "approved")
    ])).await;

    let app = profile_routes(Arc::new(test_config.to_app_config()));
    let request = Request::builder()
        .method("GET")
        .uri("/pending")
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_routes_reject_missing_token() {
    let app = profile_routes(TestConfig::default().to_arc());
    let request = Request::builder()
        .method("GET")
        .uri("/me")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_review_routes_require_uuid_ids() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_url(&mock_server.uri());
    let desk = TestUser::receptionist("desk@clinic.test");
    let token = JwtTestUtils::create_test_token(&desk, &test_config.jwt_secret, Some(1));
    let target = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let smuggled = format!("/{}%26role%3Deq.doctor/approve", target);
    for (verb, uri) in [("POST", smuggled.as_str()), ("GET", "/not-a-uuid")] {
        let request = Request::builder()
            .method(verb)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();

        let response = profile_routes(test_config.to_arc()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{} {}", verb, uri);
    }
}
