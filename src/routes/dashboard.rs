use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::auth::AuthenticatedUser;
use crate::models::{Appointment, Order, Prescription, Product, Role, UserWithRole};
use crate::storage::Storage;

/// What the landing page shows, decided once from the caller's role.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum Dashboard {
    Admin {
        users: Vec<UserWithRole>,
        products: Vec<Product>,
    },
    Staff {
        users: Vec<UserWithRole>,
        products: Vec<Product>,
    },
    Patient {
        prescriptions: Vec<Prescription>,
        orders: Vec<Order>,
        appointments: Vec<Appointment>,
    },
}

impl Dashboard {
    pub async fn load(user: &AuthenticatedUser, storage: &dyn Storage) -> Result<Self, ApiError> {
        let dashboard = match user.role {
            Role::Admin => Dashboard::Admin {
                users: storage.list_users().await?,
                products: storage.list_products(false).await?,
            },
            Role::Staff => Dashboard::Staff {
                users: storage.list_users().await?,
                products: storage.list_products(false).await?,
            },
            Role::Patient => {
                let own = Some(user.id.clone());
                Dashboard::Patient {
                    prescriptions: storage.list_prescriptions(own.clone()).await?,
                    orders: storage.list_orders(own.clone()).await?,
                    appointments: storage.list_appointments(own).await?,
                }
            }
        };
        Ok(dashboard)
    }
}

#[tracing::instrument(
    name = "Loading the dashboard",
    skip(storage),
    fields(user_id = %user.id, role = %user.role)
)]
pub async fn dashboard(
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let dashboard = Dashboard::load(&user, storage.get_ref()).await?;
    Ok(HttpResponse::Ok().json(dashboard))
}
