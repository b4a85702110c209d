use rstest::rstest;
use serde_json::{json, Value};

use crate::utils::spawn_app;

#[rstest]
#[case("admin")]
#[case("staff")]
#[tokio::test]
async fn clinic_roles_see_users_and_inventory(#[case] view: &str) {
    let app = spawn_app().await;
    app.create_product("Aviator", "150000").await;
    let user = if view == "admin" { &app.admin } else { &app.staff };
    let client = app.client_for(user).await;

    let dashboard: Value = app.get(&client, "/api/dashboard").await.json().await.unwrap();

    assert_eq!(dashboard["view"], view);
    assert_eq!(dashboard["users"].as_array().unwrap().len(), 3);
    assert_eq!(dashboard["products"].as_array().unwrap().len(), 1);
    assert!(dashboard.get("orders").is_none());
}

#[tokio::test]
async fn patients_see_only_their_own_records() {
    let app = spawn_app().await;
    let other = app.add_user(optica::models::Role::Patient).await;
    let staff = app.client_for(&app.staff).await;
    for patient_id in [&app.patient.user_id, &other.user_id] {
        let response = app
            .post_json(
                &staff,
                "/api/appointments",
                &json!({"patientId": patient_id, "date": "2030-01-20T15:00:00Z"}),
            )
            .await;
        assert_eq!(201, response.status().as_u16());
    }

    let patient = app.client_for(&app.patient).await;
    let dashboard: Value = app.get(&patient, "/api/dashboard").await.json().await.unwrap();

    assert_eq!(dashboard["view"], "patient");
    assert_eq!(dashboard["appointments"].as_array().unwrap().len(), 1);
    assert!(dashboard["orders"].as_array().unwrap().is_empty());
    assert!(dashboard["prescriptions"].as_array().unwrap().is_empty());
    assert!(dashboard.get("users").is_none());
}

#[tokio::test]
async fn users_without_a_role_row_are_patients() {
    let app = spawn_app().await;
    let newcomer = crate::utils::TestUser::generate(optica::models::Role::Patient);
    app.storage
        .upsert_user(optica::models::NewUser {
            id: newcomer.user_id.clone(),
            email: Some(newcomer.email.clone()),
            first_name: None,
            last_name: None,
            profile_image_url: None,
            password_hash: Some(
                optica::auth::compute_password_hash(secrecy::Secret::new(
                    newcomer.password.clone(),
                ))
                .unwrap(),
            ),
        })
        .await
        .unwrap();
    let client = app.client_for(&newcomer).await;

    let dashboard: Value = app.get(&client, "/api/dashboard").await.json().await.unwrap();

    assert_eq!(dashboard["view"], "patient");
}
