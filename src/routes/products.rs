use actix_web::{web, HttpResponse};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::auth::AuthenticatedUser;
use crate::models::{require_text, NewProduct, ProductCategory, ProductUpdate, ValidationError};
use crate::storage::Storage;

/// Wire shape for both creating and updating a product. Creation requires
/// `name`, `category` and `price`; updates only touch the fields present.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductForm {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<ProductCategory>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub image_url: Option<String>,
    pub active: Option<bool>,
}

fn check_price(price: Option<Decimal>) -> Result<(), ValidationError> {
    match price {
        Some(p) if p < Decimal::ZERO => {
            Err(ValidationError::new("price", "must not be negative"))
        }
        _ => Ok(()),
    }
}

fn check_stock(stock: Option<i32>) -> Result<(), ValidationError> {
    match stock {
        Some(s) if s < 0 => Err(ValidationError::new("stock", "must not be negative")),
        _ => Ok(()),
    }
}

impl TryFrom<ProductForm> for NewProduct {
    type Error = ValidationError;

    fn try_from(form: ProductForm) -> Result<Self, Self::Error> {
        let name = require_text("name", form.name)?;
        let category = form.category.ok_or(ValidationError::required("category"))?;
        let price = form.price.ok_or(ValidationError::required("price"))?;
        check_price(Some(price))?;
        check_stock(form.stock)?;
        Ok(NewProduct {
            name,
            description: form.description,
            category,
            brand: form.brand,
            model: form.model,
            price,
            stock: form.stock.unwrap_or(0),
            image_url: form.image_url,
            active: form.active.unwrap_or(true),
        })
    }
}

impl TryFrom<ProductForm> for ProductUpdate {
    type Error = ValidationError;

    fn try_from(form: ProductForm) -> Result<Self, Self::Error> {
        let name = match form.name {
            Some(name) => Some(require_text("name", Some(name))?),
            None => None,
        };
        check_price(form.price)?;
        check_stock(form.stock)?;
        Ok(ProductUpdate {
            name,
            description: form.description,
            category: form.category,
            brand: form.brand,
            model: form.model,
            price: form.price,
            stock: form.stock,
            image_url: form.image_url,
            active: form.active,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub active: Option<bool>,
}

#[tracing::instrument(name = "Listing products", skip(storage))]
pub async fn list_products(
    query: web::Query<ProductQuery>,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let products = storage
        .list_products(query.active.unwrap_or(false))
        .await?;
    Ok(HttpResponse::Ok().json(products))
}

#[tracing::instrument(name = "Fetching a product", skip(storage))]
pub async fn get_product(
    id: web::Path<i32>,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let product = storage
        .get_product(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id}")))?;
    Ok(HttpResponse::Ok().json(product))
}

#[tracing::instrument(
    name = "Adding a new product",
    skip(form, storage),
    fields(user_id = %user.id)
)]
pub async fn create_product(
    form: web::Json<ProductForm>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    user.require_staff()?;
    let product: NewProduct = form.into_inner().try_into()?;
    let product = storage.create_product(product).await?;
    Ok(HttpResponse::Created().json(product))
}

#[tracing::instrument(
    name = "Updating a product",
    skip(form, storage),
    fields(user_id = %user.id)
)]
pub async fn update_product(
    id: web::Path<i32>,
    form: web::Json<ProductForm>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    user.require_staff()?;
    let id = id.into_inner();
    let update: ProductUpdate = form.into_inner().try_into()?;
    let product = storage
        .update_product(id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id}")))?;
    Ok(HttpResponse::Ok().json(product))
}

#[tracing::instrument(name = "Deleting a product", skip(storage), fields(user_id = %user.id))]
pub async fn delete_product(
    id: web::Path<i32>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    user.require_staff()?;
    let id = id.into_inner();
    if !storage.delete_product(id).await? {
        tracing::info!(product_id = id, "Product was already gone");
    }
    Ok(HttpResponse::NoContent().finish())
}
