use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use std::fmt;

use super::{decode_text_enum, Product, UnknownVariant};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Copy, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Ready,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = UnknownVariant;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "ready" => Ok(OrderStatus::Ready),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(UnknownVariant {
                kind: "order status",
                value: s,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i32,
    pub patient_id: String,
    pub prescription_id: Option<i32>,
    pub date: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub deposit_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Order {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Order {
            id: row.try_get("id")?,
            patient_id: row.try_get("patient_id")?,
            prescription_id: row.try_get("prescription_id")?,
            date: row.try_get("date")?,
            status: decode_text_enum(row, "status")?,
            total_amount: row.try_get("total_amount")?,
            deposit_amount: row.try_get("deposit_amount")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// One line of an order. `price` is the product price captured when the
/// order was placed and never follows later product changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i32,
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItemWithProduct {
    #[serde(flatten)]
    pub item: OrderItem,
    pub product: Product,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub patient_id: String,
    pub prescription_id: Option<i32>,
    pub date: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub deposit_amount: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: i32,
    pub quantity: i32,
}

/// Expects the item columns aliased as `item_id`, `item_price` next to the
/// joined product's own columns.
impl<'r> FromRow<'r, PgRow> for OrderItemWithProduct {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderItemWithProduct {
            item: OrderItem {
                id: row.try_get("item_id")?,
                order_id: row.try_get("order_id")?,
                product_id: row.try_get("product_id")?,
                quantity: row.try_get("quantity")?,
                price: row.try_get("item_price")?,
            },
            product: Product::from_row(row)?,
        })
    }
}
