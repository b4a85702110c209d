use rstest::rstest;
use serde_json::{json, Value};

use crate::utils::spawn_app;

#[rstest]
#[case("2030-01-20T15:00:00Z", "Annual check-up")]
#[case("2030-03-02T09:30:00Z", "Contact lens fitting")]
#[tokio::test]
async fn booking_appointment_returns_201(#[case] date: &str, #[case] reason: &str) {
    let app = spawn_app().await;
    let patient = app.client_for(&app.patient).await;

    let response = app
        .post_json(
            &patient,
            "/api/appointments",
            &json!({
                "doctorName": "Dr. Soto",
                "date": date,
                "reason": reason
            }),
        )
        .await;

    assert_eq!(201, response.status().as_u16());
    let saved: Value = response.json().await.unwrap();
    assert_eq!(saved["patientId"], app.patient.user_id.as_str());
    assert_eq!(saved["status"], "scheduled");
    assert_eq!(saved["reason"], reason);
}

#[rstest]
#[case("bad input")]
#[case(r#"{"date": "not a date"}"#)]
#[case(r#"{"date": "2030-01-20T15:00:00Z", "status": "postponed"}"#)]
#[tokio::test]
async fn booking_appointment_returns_error(#[case] input: &str) {
    let app = spawn_app().await;
    let patient = app.client_for(&app.patient).await;

    let response = patient
        .post(&format!("{}/api/appointments", &app.address))
        .header("Content-Type", "application/json")
        .body(input.to_string())
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn booking_without_a_date_names_the_field() {
    let app = spawn_app().await;
    let patient = app.client_for(&app.patient).await;

    let response = app
        .post_json(&patient, "/api/appointments", &json!({"reason": "Blurry vision"}))
        .await;

    assert_eq!(400, response.status().as_u16());
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["field"], "date");
}

#[tokio::test]
async fn patients_cannot_book_for_someone_else() {
    let app = spawn_app().await;
    let patient = app.client_for(&app.patient).await;

    let response = app
        .post_json(
            &patient,
            "/api/appointments",
            &json!({"patientId": app.staff.user_id, "date": "2030-01-20T15:00:00Z"}),
        )
        .await;

    assert_eq!(403, response.status().as_u16());
}

#[tokio::test]
async fn booking_for_an_unknown_patient_is_rejected() {
    let app = spawn_app().await;
    let staff = app.client_for(&app.staff).await;

    let response = app
        .post_json(
            &staff,
            "/api/appointments",
            &json!({"patientId": "nobody", "date": "2030-01-20T15:00:00Z"}),
        )
        .await;

    assert_eq!(400, response.status().as_u16());
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["field"], "patientId");
}

#[tokio::test]
async fn viewing_appointments_returns_newest_first_per_patient() {
    let app = spawn_app().await;
    let other = app.add_user(optica::models::Role::Patient).await;
    let staff = app.client_for(&app.staff).await;
    for (patient_id, date) in [
        (&app.patient.user_id, "2030-01-01T10:00:00Z"),
        (&app.patient.user_id, "2030-06-01T10:00:00Z"),
        (&other.user_id, "2030-03-01T10:00:00Z"),
    ] {
        let response = app
            .post_json(
                &staff,
                "/api/appointments",
                &json!({"patientId": patient_id, "date": date}),
            )
            .await;
        assert_eq!(201, response.status().as_u16());
    }

    // Staff may filter by any patient.
    let filtered: Vec<Value> = app
        .get(&staff, &format!("/api/appointments?patientId={}", app.patient.user_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(filtered.len(), 2);
    assert_eq!(filtered[0]["date"], "2030-06-01T10:00:00Z");
    let all: Vec<Value> = app.get(&staff, "/api/appointments").await.json().await.unwrap();
    assert_eq!(all.len(), 3);

    // Patients only ever see their own, whatever they ask for.
    let patient = app.client_for(&other).await;
    let own: Vec<Value> = app
        .get(&patient, &format!("/api/appointments?patientId={}", app.patient.user_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0]["patientId"], other.user_id.as_str());
}

#[tokio::test]
async fn any_status_can_follow_any_other() {
    let app = spawn_app().await;
    let staff = app.client_for(&app.staff).await;
    let created: Value = app
        .post_json(
            &staff,
            "/api/appointments",
            &json!({"patientId": app.patient.user_id, "date": "2030-01-20T15:00:00Z"}),
        )
        .await
        .json()
        .await
        .unwrap();
    let path = format!("/api/appointments/{}", created["id"]);

    for status in ["completed", "scheduled", "no_show"] {
        let response = app.put_json(&staff, &path, &json!({"status": status})).await;
        assert_eq!(200, response.status().as_u16());
        let updated: Value = response.json().await.unwrap();
        assert_eq!(updated["status"], status);
        assert_eq!(updated["date"], "2030-01-20T15:00:00Z");
    }
}

#[tokio::test]
async fn patients_can_only_update_their_own_appointments() {
    let app = spawn_app().await;
    let other = app.add_user(optica::models::Role::Patient).await;
    let owner = app.client_for(&app.patient).await;
    let created: Value = app
        .post_json(&owner, "/api/appointments", &json!({"date": "2030-01-20T15:00:00Z"}))
        .await
        .json()
        .await
        .unwrap();
    let path = format!("/api/appointments/{}", created["id"]);

    let stranger = app.client_for(&other).await;
    let response = app
        .put_json(&stranger, &path, &json!({"status": "cancelled"}))
        .await;
    assert_eq!(403, response.status().as_u16());

    let response = app
        .put_json(&owner, &path, &json!({"status": "cancelled"}))
        .await;
    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn updating_a_missing_appointment_is_not_found() {
    let app = spawn_app().await;
    let staff = app.client_for(&app.staff).await;

    let response = app
        .put_json(&staff, "/api/appointments/999", &json!({"status": "confirmed"}))
        .await;

    assert_eq!(404, response.status().as_u16());
}
