use rstest::rstest;
use serde_json::Value;

use crate::utils::spawn_app;

#[tokio::test]
async fn requests_missing_authorization_are_rejected() {
    let app = spawn_app().await;
    let client = app.client();

    let response = client
        .post(&format!("{}/api/login", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    assert_eq!(
        r#"Basic realm="optica""#,
        response.headers()["WWW-Authenticate"]
    );
}

#[tokio::test]
async fn non_existing_user_is_rejected() {
    let app = spawn_app().await;
    let client = app.client();

    let username = uuid::Uuid::new_v4().to_string();
    let password = uuid::Uuid::new_v4().to_string();

    let response = client
        .post(&format!("{}/api/login", &app.address))
        .basic_auth(username, Some(password))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    assert_eq!(
        r#"Basic realm="optica""#,
        response.headers()["WWW-Authenticate"]
    );
}

#[tokio::test]
async fn invalid_password_is_rejected() {
    let app = spawn_app().await;
    let client = app.client();

    let response = client
        .post(&format!("{}/api/login", &app.address))
        .basic_auth(&app.patient.email, Some(uuid::Uuid::new_v4().to_string()))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

#[rstest]
#[case("/api/auth/user")]
#[case("/api/dashboard")]
#[case("/api/appointments")]
#[case("/api/prescriptions")]
#[case("/api/orders")]
#[case("/api/admin/users")]
#[tokio::test]
async fn session_is_required(#[case] path: &str) {
    let app = spawn_app().await;

    let response = app.get(&app.client(), path).await;

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn login_starts_a_session_for_the_user() {
    let app = spawn_app().await;
    let client = app.client();

    let response = app.login(&client, &app.staff).await;
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], app.staff.user_id.as_str());
    assert_eq!(body["role"], "staff");

    let me: Value = app
        .get(&client, "/api/auth/user")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(me["email"], app.staff.email.as_str());
    assert_eq!(me["role"], "staff");
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = spawn_app().await;
    let client = app.client_for(&app.patient).await;

    let response = client
        .post(&format!("{}/api/logout", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(204, response.status().as_u16());

    let response = app.get(&client, "/api/auth/user").await;
    assert_eq!(401, response.status().as_u16());
}
