use rstest::rstest;
use serde_json::{json, Value};

use crate::utils::{spawn_app, spawn_app_with};

#[tokio::test]
async fn order_items_snapshot_the_product_price() {
    let app = spawn_app_with(|c| c.application.seed_demo_data = true).await;
    let patient = app.client_for(&app.patient).await;

    let aviator: Value = app
        .get(&patient, "/api/products/1")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(aviator["name"], "Ray-Ban Aviator");
    assert_eq!(aviator["price"], "150000");

    let response = app
        .post_json(
            &patient,
            "/api/orders",
            &json!({
                "totalAmount": "150000",
                "items": [{"productId": 1, "quantity": 1}]
            }),
        )
        .await;
    assert_eq!(201, response.status().as_u16());
    let order: Value = response.json().await.unwrap();
    assert_eq!(order["patientId"], app.patient.user_id.as_str());
    assert_eq!(order["status"], "pending");
    assert_eq!(order["depositAmount"], "0");

    let items: Vec<Value> = app
        .get(&patient, &format!("/api/orders/{}/items", order["id"]))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["price"], "150000");
    assert_eq!(items[0]["quantity"], 1);
    assert_eq!(items[0]["product"]["name"], "Ray-Ban Aviator");
}

#[tokio::test]
async fn repricing_a_product_leaves_past_items_untouched() {
    let app = spawn_app().await;
    let staff = app.client_for(&app.staff).await;
    let product = app.create_product("Aviator", "150000").await;
    let order: Value = app
        .post_json(
            &staff,
            "/api/orders",
            &json!({
                "patientId": app.patient.user_id,
                "totalAmount": "300000",
                "items": [{"productId": product, "quantity": 2}]
            }),
        )
        .await
        .json()
        .await
        .unwrap();

    let response = app
        .put_json(&staff, &format!("/api/products/{product}"), &json!({"price": "175000"}))
        .await;
    assert_eq!(200, response.status().as_u16());

    let items: Vec<Value> = app
        .get(&staff, &format!("/api/orders/{}/items", order["id"]))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(items[0]["price"], "150000");
    assert_eq!(items[0]["product"]["price"], "175000");
}

#[tokio::test]
async fn unknown_product_aborts_the_whole_order() {
    let app = spawn_app().await;
    let patient = app.client_for(&app.patient).await;
    let product = app.create_product("Aviator", "150000").await;

    let response = app
        .post_json(
            &patient,
            "/api/orders",
            &json!({
                "totalAmount": "150000",
                "items": [
                    {"productId": product, "quantity": 1},
                    {"productId": 999, "quantity": 1}
                ]
            }),
        )
        .await;

    assert_eq!(404, response.status().as_u16());
    let orders: Vec<Value> = app.get(&patient, "/api/orders").await.json().await.unwrap();
    assert!(orders.is_empty());
}

#[rstest]
#[case(json!({"totalAmount": "10", "items": []}), "items")]
#[case(json!({"totalAmount": "10"}), "items")]
#[case(json!({"items": [{"productId": 1, "quantity": 1}]}), "totalAmount")]
#[case(json!({"totalAmount": "-10", "items": [{"productId": 1, "quantity": 1}]}), "totalAmount")]
#[case(json!({"totalAmount": "10", "depositAmount": "-1", "items": [{"productId": 1, "quantity": 1}]}), "depositAmount")]
#[case(json!({"totalAmount": "10", "items": [{"productId": 1, "quantity": 0}]}), "quantity")]
#[case(json!({"totalAmount": "10", "items": [{"quantity": 1}]}), "productId")]
#[tokio::test]
async fn invalid_orders_are_rejected(#[case] body: Value, #[case] field: &str) {
    let app = spawn_app().await;
    let patient = app.client_for(&app.patient).await;

    let response = app.post_json(&patient, "/api/orders", &body).await;

    assert_eq!(400, response.status().as_u16());
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["field"], field);
}

#[tokio::test]
async fn unknown_prescription_is_rejected() {
    let app = spawn_app().await;
    let patient = app.client_for(&app.patient).await;
    let product = app.create_product("Aviator", "150000").await;

    let response = app
        .post_json(
            &patient,
            "/api/orders",
            &json!({
                "prescriptionId": 999,
                "totalAmount": "150000",
                "items": [{"productId": product, "quantity": 1}]
            }),
        )
        .await;

    assert_eq!(400, response.status().as_u16());
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["field"], "prescriptionId");
}

#[tokio::test]
async fn patients_only_see_their_own_orders() {
    let app = spawn_app().await;
    let other = app.add_user(optica::models::Role::Patient).await;
    let product = app.create_product("Aviator", "150000").await;
    let owner = app.client_for(&app.patient).await;
    let order: Value = app
        .post_json(
            &owner,
            "/api/orders",
            &json!({
                "totalAmount": "150000",
                "items": [{"productId": product, "quantity": 1}]
            }),
        )
        .await
        .json()
        .await
        .unwrap();
    let order_path = format!("/api/orders/{}", order["id"]);

    let stranger = app.client_for(&other).await;
    assert_eq!(403, app.get(&stranger, &order_path).await.status().as_u16());
    assert_eq!(
        403,
        app.get(&stranger, &format!("{order_path}/items"))
            .await
            .status()
            .as_u16()
    );
    let listed: Vec<Value> = app.get(&stranger, "/api/orders").await.json().await.unwrap();
    assert!(listed.is_empty());

    let fetched: Value = app.get(&owner, &order_path).await.json().await.unwrap();
    assert_eq!(fetched, order);
}

#[tokio::test]
async fn missing_order_has_no_items() {
    let app = spawn_app().await;
    let staff = app.client_for(&app.staff).await;

    let response = app.get(&staff, "/api/orders/999/items").await;
    assert_eq!(200, response.status().as_u16());
    let items: Vec<Value> = response.json().await.unwrap();
    assert!(items.is_empty());

    let response = app.get(&staff, "/api/orders/999").await;
    assert_eq!(404, response.status().as_u16());
}
