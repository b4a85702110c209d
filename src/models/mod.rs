pub mod appointments;
pub mod orders;
pub mod prescriptions;
pub mod products;
pub mod user;

use sqlx::postgres::PgRow;
use sqlx::Row;

pub use appointments::{Appointment, AppointmentStatus, AppointmentUpdate, NewAppointment};
pub use orders::{NewOrder, Order, OrderItem, OrderItemWithProduct, OrderLine, OrderStatus};
pub use prescriptions::{EyeMeasurements, LensPower, NewPrescription, Prescription};
pub use products::{NewProduct, Product, ProductCategory, ProductUpdate};
pub use user::{NewUser, NewUserRole, Role, User, UserRole, UserWithRole};

/// Rejected input, raised before anything reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    pub fn required(field: &'static str) -> Self {
        Self::new(field, "is required")
    }
}

/// A text column or input held a value outside of its enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

pub(crate) fn decode_text_enum<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: TryFrom<String, Error = UnknownVariant>,
{
    let raw: String = row.try_get(column)?;
    T::try_from(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

pub(crate) fn require_text(field: &'static str, value: Option<String>) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::required(field)),
    }
}
