//! Persistence layer.
//!
//! `Storage` is the seam between the HTTP handlers and the relational store.
//! Lookups that find nothing return `Ok(None)`; errors are reserved for
//! failures and rejected writes.

mod memory;
mod postgres;

use futures::future::BoxFuture;
use secrecy::Secret;

use crate::models::{
    Appointment, AppointmentUpdate, NewAppointment, NewOrder, NewPrescription, NewProduct,
    NewUser, NewUserRole, Order, OrderItemWithProduct, OrderLine, Prescription, Product,
    ProductUpdate, User, UserRole, UserWithRole,
};

pub use memory::InMemoryStorage;
pub use postgres::PgStorage;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Product {0} not found")]
    ProductNotFound(i32),
    /// A foreign key pointed at a row that does not exist.
    #[error("`{0}` references a record that does not exist")]
    MissingReference(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

pub trait Storage: Send + Sync {
    fn list_products(&self, active_only: bool) -> BoxFuture<'_, StorageResult<Vec<Product>>>;
    fn get_product(&self, id: i32) -> BoxFuture<'_, StorageResult<Option<Product>>>;
    fn create_product(&self, product: NewProduct) -> BoxFuture<'_, StorageResult<Product>>;
    fn update_product(
        &self,
        id: i32,
        update: ProductUpdate,
    ) -> BoxFuture<'_, StorageResult<Option<Product>>>;
    /// Returns whether a row was removed.
    fn delete_product(&self, id: i32) -> BoxFuture<'_, StorageResult<bool>>;

    fn list_appointments(
        &self,
        patient_id: Option<String>,
    ) -> BoxFuture<'_, StorageResult<Vec<Appointment>>>;
    fn get_appointment(&self, id: i32) -> BoxFuture<'_, StorageResult<Option<Appointment>>>;
    fn create_appointment(
        &self,
        appointment: NewAppointment,
    ) -> BoxFuture<'_, StorageResult<Appointment>>;
    fn update_appointment(
        &self,
        id: i32,
        update: AppointmentUpdate,
    ) -> BoxFuture<'_, StorageResult<Option<Appointment>>>;

    fn list_prescriptions(
        &self,
        patient_id: Option<String>,
    ) -> BoxFuture<'_, StorageResult<Vec<Prescription>>>;
    fn get_prescription(&self, id: i32) -> BoxFuture<'_, StorageResult<Option<Prescription>>>;
    fn create_prescription(
        &self,
        prescription: NewPrescription,
    ) -> BoxFuture<'_, StorageResult<Prescription>>;

    fn list_orders(&self, patient_id: Option<String>) -> BoxFuture<'_, StorageResult<Vec<Order>>>;
    fn get_order(&self, id: i32) -> BoxFuture<'_, StorageResult<Option<Order>>>;
    /// Writes the order and one item per line, all or nothing. Each item
    /// records the product price current at the time of the call.
    fn create_order(
        &self,
        order: NewOrder,
        lines: Vec<OrderLine>,
    ) -> BoxFuture<'_, StorageResult<Order>>;
    /// Items joined with their product. Unknown orders yield an empty list.
    fn get_order_items(
        &self,
        order_id: i32,
    ) -> BoxFuture<'_, StorageResult<Vec<OrderItemWithProduct>>>;

    fn get_user_role(&self, user_id: String) -> BoxFuture<'_, StorageResult<Option<UserRole>>>;
    /// Insert or fully overwrite the role row keyed by `user_id`.
    fn set_user_role(&self, role: NewUserRole) -> BoxFuture<'_, StorageResult<UserRole>>;

    fn list_users(&self) -> BoxFuture<'_, StorageResult<Vec<UserWithRole>>>;
    fn get_user(&self, user_id: String) -> BoxFuture<'_, StorageResult<Option<User>>>;
    fn upsert_user(&self, user: NewUser) -> BoxFuture<'_, StorageResult<User>>;
    /// `(user_id, password_hash)` for the user registered under `email`.
    fn get_stored_credentials(
        &self,
        email: String,
    ) -> BoxFuture<'_, StorageResult<Option<(String, Secret<String>)>>>;
}

/// Runs a storage future inside a span and logs failures with the operation
/// name attached.
pub(crate) fn traced<'a, T, F>(operation: &'static str, fut: F) -> BoxFuture<'a, StorageResult<T>>
where
    F: std::future::Future<Output = StorageResult<T>> + Send + 'a,
    T: Send + 'a,
{
    use tracing::Instrument;

    Box::pin(
        async move {
            fut.await.map_err(|e| {
                tracing::error!(operation, error = ?e, "Failed to execute storage operation");
                e
            })
        }
        .instrument(tracing::debug_span!("storage", operation)),
    )
}
