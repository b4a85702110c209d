use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ApiError, PatientQuery};
use crate::auth::AuthenticatedUser;
use crate::models::{require_text, NewOrder, OrderLine, OrderStatus, ValidationError};
use crate::storage::Storage;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemForm {
    pub product_id: Option<i32>,
    pub quantity: Option<i32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderForm {
    /// Defaults to the caller.
    pub patient_id: Option<String>,
    pub prescription_id: Option<i32>,
    pub date: Option<DateTime<Utc>>,
    pub status: Option<OrderStatus>,
    pub total_amount: Option<Decimal>,
    pub deposit_amount: Option<Decimal>,
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItemForm>,
}

fn non_negative(field: &'static str, amount: Decimal) -> Result<Decimal, ValidationError> {
    if amount < Decimal::ZERO {
        Err(ValidationError::new(field, "must not be negative"))
    } else {
        Ok(amount)
    }
}

impl TryFrom<OrderItemForm> for OrderLine {
    type Error = ValidationError;

    fn try_from(form: OrderItemForm) -> Result<Self, Self::Error> {
        let product_id = form.product_id.ok_or(ValidationError::required("productId"))?;
        let quantity = form.quantity.unwrap_or(1);
        if quantity <= 0 {
            return Err(ValidationError::new("quantity", "must be greater than zero"));
        }
        Ok(OrderLine {
            product_id,
            quantity,
        })
    }
}

impl TryFrom<OrderForm> for (NewOrder, Vec<OrderLine>) {
    type Error = ValidationError;

    fn try_from(form: OrderForm) -> Result<Self, Self::Error> {
        if form.items.is_empty() {
            return Err(ValidationError::new("items", "an order needs at least one item"));
        }
        let lines = form
            .items
            .into_iter()
            .map(OrderLine::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let total_amount = form
            .total_amount
            .ok_or(ValidationError::required("totalAmount"))?;
        let order = NewOrder {
            patient_id: require_text("patientId", form.patient_id)?,
            prescription_id: form.prescription_id,
            date: form.date,
            status: form.status.unwrap_or_default(),
            total_amount: non_negative("totalAmount", total_amount)?,
            deposit_amount: non_negative(
                "depositAmount",
                form.deposit_amount.unwrap_or(Decimal::ZERO),
            )?,
            notes: form.notes,
        };
        Ok((order, lines))
    }
}

#[tracing::instrument(name = "Listing orders", skip(storage), fields(user_id = %user.id))]
pub async fn list_orders(
    query: web::Query<PatientQuery>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let patient_id = user.patient_scope(query.into_inner().patient_id);
    let orders = storage.list_orders(patient_id).await?;
    Ok(HttpResponse::Ok().json(orders))
}

#[tracing::instrument(name = "Fetching an order", skip(storage), fields(user_id = %user.id))]
pub async fn get_order(
    id: web::Path<i32>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let order = storage
        .get_order(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id}")))?;
    user.require_self_or_staff(&order.patient_id)?;
    Ok(HttpResponse::Ok().json(order))
}

#[tracing::instrument(
    name = "Placing a new order",
    skip(form, storage),
    fields(user_id = %user.id, items = form.items.len())
)]
pub async fn create_order(
    form: web::Json<OrderForm>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let mut form = form.into_inner();
    let patient_id = form.patient_id.get_or_insert_with(|| user.id.clone());
    user.require_self_or_staff(patient_id)?;
    let (order, lines): (NewOrder, Vec<OrderLine>) = form.try_into()?;
    let order = storage.create_order(order, lines).await?;
    Ok(HttpResponse::Created().json(order))
}

#[tracing::instrument(name = "Fetching order items", skip(storage), fields(user_id = %user.id))]
pub async fn get_order_items(
    id: web::Path<i32>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    match storage.get_order(id).await? {
        Some(order) => user.require_self_or_staff(&order.patient_id)?,
        None => return Ok(HttpResponse::Ok().json(Vec::<()>::new())),
    }
    let items = storage.get_order_items(id).await?;
    Ok(HttpResponse::Ok().json(items))
}
