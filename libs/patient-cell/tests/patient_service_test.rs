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

use patient_cell::models::*;
use patient_cell::router::patient_routes;
use patient_cell::services::PatientService;
use shared_config::ScheduleConfig;
use shared_utils::test_utils::{TestConfig, TestUser, JwtTestUtils, MockSupabaseResponses};

const TOKEN: &str = "staff-token";

fn intake() -> CreatePatientRequest {
    CreatePatientRequest {
        full_name: "Meera Iyer".to_string(),
        phone: "+91 98123 45678".to_string(),
        email: Some("meera@example.com".to_string()),
        date_of_birth: chrono::NaiveDate::from_ymd_opt(1990, 5, 14),
        gender: Gender::Female,
        address: Some("12 Lake Road".to_string()),
        blood_group: Some("o+".to_string()),
        medical_history: None,
        emergency_contact: None,
    }
}

#[tokio::test]
async fn test_create_patient_normalizes_and_stores() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("phone", "eq.+919812345678"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .and(body_partial_json(json!({
            "phone": "+919812345678",
            "blood_group": "O+",
            "gender": "female"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id, "Meera Iyer", "+919812345678")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = PatientService::new(&config);
    let patient = service.create_patient(intake(), None, TOKEN).await.unwrap();

    assert_eq!(patient.id.to_string(), patient_id);
    assert_eq!(patient.full_name, "Meera Iyer");
}

#[tokio::test]
async fn test_duplicate_phone_rejected() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("phone", "eq.+919812345678"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": Uuid::new_v4() }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = PatientService::new(&config);
    let result = service.create_patient(intake(), None, TOKEN).await;

    assert_matches!(result, Err(PatientError::PhoneAlreadyRegistered { phone }) if phone == "+919812345678");
}

#[tokio::test]
async fn test_invalid_intake_never_reaches_database() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();

    let service = PatientService::new(&config);
    let result = service.create_patient(CreatePatientRequest {
        phone: "123".to_string(),
        ..intake()
    }, None, TOKEN).await;

    assert_matches!(result, Err(PatientError::ValidationError(_)));
    assert!(mock_server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_update_phone_excludes_own_record() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("phone", "eq.9812300000"))
        .and(query_param("id", format!("neq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .and(body_partial_json(json!({ "phone": "9812300000", "email": null })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id.to_string(), "Meera Iyer", "9812300000")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = PatientService::new(&config);
    let patient = service.update_patient(patient_id, UpdatePatientRequest {
        phone: Some("98123-00000".to_string()),
        email: Some("".to_string()),
        ..Default::default()
    }, TOKEN).await.unwrap();

    assert_eq!(patient.phone, "9812300000");
}

#[tokio::test]
async fn test_search_builds_filters() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("full_name", "ilike.*meera*"))
        .and(query_param("order", "created_at.desc"))
        .and(query_param("limit", "200"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&Uuid::new_v4().to_string(), "Meera Iyer", "9812345678")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = PatientService::new(&config);
    let patients = service.search_patients(PatientSearchQuery {
        name: Some(" meera ".to_string()),
        phone: None,
        limit: Some(5000),
        offset: Some(-3),
    }, TOKEN).await.unwrap();

    assert_eq!(patients.len(), 1);
}

#[tokio::test]
async fn test_delete_blocked_by_appointments() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": Uuid::new_v4() }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = PatientService::new(&config);
    let result = service.delete_patient(patient_id, TOKEN).await;

    assert_matches!(result, Err(PatientError::HasAppointments));
}

#[tokio::test]
async fn test_delete_missing_patient() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = PatientService::new(&config);
    let result = service.delete_patient(patient_id, TOKEN).await;

    assert_matches!(result, Err(PatientError::NotFound));
}

#[tokio::test]
async fn test_doctor_cannot_delete_patient() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_url(&mock_server.uri());
    let doctor = TestUser::doctor("asha@clinic.test");
    let token = JwtTestUtils::create_test_token(&doctor, &test_config.jwt_secret, Some(1));

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", doctor.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::profile_response(&doctor.id, "doctor", "approved")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let app = patient_routes(test_config.to_arc());
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/{}", Uuid::new_v4()))
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_malformed_patient_id_rejected_before_any_query() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_url(&mock_server.uri());
    let desk = TestUser::receptionist("desk@clinic.test");
    let token = JwtTestUtils::create_test_token(&desk, &test_config.jwt_secret, Some(1));
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::profile_response(&desk.id, "receptionist", "approved")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let smuggled = format!("{}%26id%3Deq.{}", patient_id, patient_id);
    for (verb, uri) in [("DELETE", format!("/{}", smuggled)), ("GET", format!("/{}", smuggled)), ("GET", "/not-a-uuid".to_string())] {
        let request = Request::builder()
            .method(verb)
            .uri(uri.as_str())
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();

        let response = patient_routes(test_config.to_arc()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{} {}", verb, uri);
    }
}

#[tokio::test]
async fn test_newborn_registered_on_clinic_date() {
    let mock_server = MockServer::start().await;
    let mut test_config = TestConfig::with_url(&mock_server.uri());
    test_config.schedule = ScheduleConfig {
        utc_offset_minutes: 840,
        ..ScheduleConfig::default()
    };
    let clinic_today = test_config.schedule.local_date(chrono::Utc::now());

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .and(body_partial_json(json!({ "date_of_birth": clinic_today.format("%Y-%m-%d").to_string() })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::patient_response(&Uuid::new_v4().to_string(), "Baby Iyer", "+919812345678")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = PatientService::new(&test_config.to_app_config());
    let result = service.create_patient(CreatePatientRequest {
        full_name: "Baby Iyer".to_string(),
        date_of_birth: Some(clinic_today),
        ..intake()
    }, None, TOKEN).await;

    assert!(result.is_ok());
}
