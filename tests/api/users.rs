use serde_json::{json, Value};

use crate::utils::spawn_app;

#[tokio::test]
async fn role_can_be_read_by_any_signed_in_user() {
    let app = spawn_app().await;
    let patient = app.client_for(&app.patient).await;

    let response = app
        .get(&patient, &format!("/api/users/{}/role", app.staff.user_id))
        .await;

    assert_eq!(200, response.status().as_u16());
    let role: Value = response.json().await.unwrap();
    assert_eq!(role["role"], "staff");
    assert_eq!(role["userId"], app.staff.user_id.as_str());
}

#[tokio::test]
async fn missing_role_is_not_found() {
    let app = spawn_app().await;
    let patient = app.client_for(&app.patient).await;

    let response = app.get(&patient, "/api/users/missing-user/role").await;

    assert_eq!(404, response.status().as_u16());
}

#[tokio::test]
async fn setting_a_role_twice_overwrites_every_field() {
    let app = spawn_app().await;
    let admin = app.client_for(&app.admin).await;
    let path = format!("/api/users/{}/role", app.patient.user_id);
    let before: Value = app.get(&admin, &path).await.json().await.unwrap();

    let first: Value = app
        .post_json(
            &admin,
            "/api/users/role",
            &json!({
                "userId": app.patient.user_id,
                "role": "patient",
                "rut": "12.345.678-5",
                "phone": "+56 9 1234 5678",
                "birthDate": "1990-04-12"
            }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(first["rut"], "12.345.678-5");
    assert_eq!(first["birthDate"], "1990-04-12");

    let response = app
        .post_json(
            &admin,
            "/api/users/role",
            &json!({"userId": app.patient.user_id, "role": "staff"}),
        )
        .await;
    assert_eq!(200, response.status().as_u16());

    let after: Value = app.get(&admin, &path).await.json().await.unwrap();
    assert_eq!(after["id"], before["id"]);
    assert_eq!(after["role"], "staff");
    assert!(after["rut"].is_null());
    assert!(after["phone"].is_null());
    assert!(after["birthDate"].is_null());
}

#[tokio::test]
async fn only_admins_assign_roles() {
    let app = spawn_app().await;
    let staff = app.client_for(&app.staff).await;

    let response = app
        .post_json(
            &staff,
            "/api/users/role",
            &json!({"userId": app.staff.user_id, "role": "admin"}),
        )
        .await;

    assert_eq!(403, response.status().as_u16());
}

#[tokio::test]
async fn role_for_an_unknown_user_is_rejected() {
    let app = spawn_app().await;
    let admin = app.client_for(&app.admin).await;

    let response = app
        .post_json(&admin, "/api/users/role", &json!({"userId": "nobody", "role": "staff"}))
        .await;

    assert_eq!(400, response.status().as_u16());
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["field"], "userId");
}

#[tokio::test]
async fn staff_list_users_with_their_roles() {
    let app = spawn_app().await;
    let staff = app.client_for(&app.staff).await;

    let users: Vec<Value> = app.get(&staff, "/api/admin/users").await.json().await.unwrap();

    assert_eq!(users.len(), 3);
    let patient = users
        .iter()
        .find(|u| u["id"] == app.patient.user_id.as_str())
        .unwrap();
    assert_eq!(patient["role"], "patient");
    assert_eq!(patient["email"], app.patient.email.as_str());
    assert!(patient.get("passwordHash").is_none());
}

#[tokio::test]
async fn patients_cannot_list_users() {
    let app = spawn_app().await;
    let patient = app.client_for(&app.patient).await;

    let response = app.get(&patient, "/api/admin/users").await;

    assert_eq!(403, response.status().as_u16());
}

#[tokio::test]
async fn permissive_policy_lets_any_signed_in_user_through() {
    let app = crate::utils::spawn_app_with(|c| c.application.enforce_roles = false).await;
    let patient = app.client_for(&app.patient).await;

    let response = app.get(&patient, "/api/admin/users").await;

    assert_eq!(200, response.status().as_u16());
}
