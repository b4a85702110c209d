use optica::models::{
    NewOrder, NewProduct, NewUser, NewUserRole, OrderLine, OrderStatus, ProductCategory,
    ProductUpdate, Role,
};
use optica::storage::{PgStorage, Storage, StorageError};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;

use crate::utils::{pg_storage, spawn_pg_app_with};

fn price(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

fn aviator() -> NewProduct {
    NewProduct {
        name: "Ray-Ban Aviator".into(),
        description: None,
        category: ProductCategory::Frame,
        brand: Some("Ray-Ban".into()),
        model: None,
        price: price("150000"),
        stock: 3,
        image_url: None,
        active: true,
    }
}

fn order_for(patient_id: &str, total: &str) -> NewOrder {
    NewOrder {
        patient_id: patient_id.into(),
        prescription_id: None,
        date: None,
        status: OrderStatus::Pending,
        total_amount: price(total),
        deposit_amount: Decimal::ZERO,
        notes: None,
    }
}

fn line(product_id: i32, quantity: i32) -> OrderLine {
    OrderLine {
        product_id,
        quantity,
    }
}

fn new_user(id: &str, email: &str) -> NewUser {
    NewUser {
        id: id.into(),
        email: Some(email.into()),
        first_name: None,
        last_name: None,
        profile_image_url: None,
        password_hash: None,
    }
}

async fn with_patient(storage: &PgStorage, id: &str) {
    storage
        .upsert_user(new_user(id, &format!("{id}@optica.test")))
        .await
        .expect("Failed to store patient");
}

#[tokio::test]
async fn aviator_scenario_keeps_exact_amounts() {
    let Some(app) = spawn_pg_app_with(|c| c.application.seed_demo_data = true).await else {
        return;
    };
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
    assert_eq!(order["totalAmount"], "150000");
    assert_eq!(order["depositAmount"], "0");

    let items: Vec<Value> = app
        .get(&patient, &format!("/api/orders/{}/items", order["id"]))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["price"], "150000");
    assert_eq!(items[0]["product"]["price"], "150000");
}

#[tokio::test]
async fn prices_are_stored_without_rounding_or_overflow() {
    let Some(app) = spawn_pg_app_with(|_| {}).await else {
        return;
    };
    let staff = app.client_for(&app.staff).await;

    for amount in ["0.005", "99990.50", "100000000000"] {
        let response = app
            .post_json(
                &staff,
                "/api/products",
                &json!({"name": "Lens", "category": "lens", "price": amount}),
            )
            .await;
        assert_eq!(201, response.status().as_u16(), "price {amount}");
        let product: Value = response.json().await.unwrap();
        assert_eq!(product["price"], amount);
    }
}

#[tokio::test]
async fn failed_order_leaves_no_rows_behind() {
    let Some(storage) = pg_storage().await else {
        return;
    };
    with_patient(&storage, "u1").await;
    let product = storage.create_product(aviator()).await.unwrap();

    let result = storage
        .create_order(
            order_for("u1", "150000"),
            vec![line(product.id, 1), line(999, 1)],
        )
        .await;

    assert!(matches!(result, Err(StorageError::ProductNotFound(999))));
    assert!(storage.list_orders(None).await.unwrap().is_empty());
    assert!(storage.get_order_items(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn item_price_is_a_snapshot() {
    let Some(storage) = pg_storage().await else {
        return;
    };
    with_patient(&storage, "u1").await;
    let product = storage.create_product(aviator()).await.unwrap();
    let order = storage
        .create_order(order_for("u1", "300000"), vec![line(product.id, 2)])
        .await
        .unwrap();

    storage
        .update_product(
            product.id,
            ProductUpdate {
                price: Some(price("99000")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let items = storage.get_order_items(order.id).await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item.quantity, 2);
    assert_eq!(items[0].item.price.to_string(), "150000");
    assert_eq!(items[0].product.price.to_string(), "99000");
    assert_eq!(order.total_amount.to_string(), "300000");
}

#[tokio::test]
async fn missing_references_name_the_offending_field() {
    let Some(storage) = pg_storage().await else {
        return;
    };
    with_patient(&storage, "u1").await;
    let product = storage.create_product(aviator()).await.unwrap();

    let unknown_patient = storage
        .create_order(order_for("nobody", "1"), vec![line(product.id, 1)])
        .await;
    let unknown_prescription = storage
        .create_order(
            NewOrder {
                prescription_id: Some(42),
                ..order_for("u1", "1")
            },
            vec![line(product.id, 1)],
        )
        .await;
    let unknown_user_role = storage
        .set_user_role(NewUserRole::with_role("nobody", Role::Staff))
        .await;

    assert!(matches!(
        unknown_patient,
        Err(StorageError::MissingReference("patientId"))
    ));
    assert!(matches!(
        unknown_prescription,
        Err(StorageError::MissingReference("prescriptionId"))
    ));
    assert!(matches!(
        unknown_user_role,
        Err(StorageError::MissingReference("userId"))
    ));
    assert!(storage.list_orders(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn referenced_product_cannot_be_deleted() {
    let Some(storage) = pg_storage().await else {
        return;
    };
    with_patient(&storage, "u1").await;
    let product = storage.create_product(aviator()).await.unwrap();
    let unused = storage
        .create_product(NewProduct {
            name: "Case".into(),
            ..aviator()
        })
        .await
        .unwrap();
    storage
        .create_order(order_for("u1", "150000"), vec![line(product.id, 1)])
        .await
        .unwrap();

    let result = storage.delete_product(product.id).await;

    assert!(matches!(result, Err(StorageError::Conflict(_))));
    assert!(storage.get_product(product.id).await.unwrap().is_some());
    assert!(storage.delete_product(unused.id).await.unwrap());
    assert!(!storage.delete_product(unused.id).await.unwrap());
}

#[tokio::test]
async fn role_upsert_overwrites_the_single_row() {
    let Some(storage) = pg_storage().await else {
        return;
    };
    with_patient(&storage, "u1").await;

    assert!(storage.get_user_role("u1".into()).await.unwrap().is_none());

    let first = storage
        .set_user_role(NewUserRole {
            phone: Some("+56 9 1234 5678".into()),
            ..NewUserRole::with_role("u1", Role::Staff)
        })
        .await
        .unwrap();
    let second = storage
        .set_user_role(NewUserRole::with_role("u1", Role::Admin))
        .await
        .unwrap();
    let stored = storage.get_user_role("u1".into()).await.unwrap().unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(stored, second);
    assert_eq!(stored.role, Role::Admin);
    assert_eq!(stored.phone, None);

    let users = storage.list_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].role, Some(Role::Admin));
}

#[tokio::test]
async fn email_belongs_to_a_single_user() {
    let Some(storage) = pg_storage().await else {
        return;
    };
    with_patient(&storage, "u1").await;

    let duplicate = storage
        .upsert_user(new_user("u2", "u1@optica.test"))
        .await;
    let refreshed = storage
        .upsert_user(NewUser {
            first_name: Some("Ana".into()),
            ..new_user("u1", "u1@optica.test")
        })
        .await
        .unwrap();

    assert!(matches!(duplicate, Err(StorageError::Conflict(_))));
    assert!(storage.get_user("u2".into()).await.unwrap().is_none());
    assert_eq!(refreshed.first_name.as_deref(), Some("Ana"));
}
