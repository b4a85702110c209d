//! Typed HTTP client for the clinic API.
//!
//! Reads go through a [`QueryCache`]; every successful mutation invalidates
//! the resource paths it can have changed. Mutations are never retried.

mod cache;

pub use cache::{QueryCache, QueryKey};

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{
    Appointment, Order, OrderItemWithProduct, Prescription, Product, UserRole, UserWithRole,
};
use crate::routes::{
    AppointmentForm, AppointmentUpdateForm, CurrentUser, Dashboard, OrderForm,
    PrescriptionForm, PrintablePrescription, ProductForm, UserRoleForm,
};

const DASHBOARD: &str = "/api/dashboard";
const PRODUCTS: &str = "/api/products";
const APPOINTMENTS: &str = "/api/appointments";
const PRESCRIPTIONS: &str = "/api/prescriptions";
const ORDERS: &str = "/api/orders";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request failed")]
    Transport(#[from] reqwest::Error),
    #[error("{status}: {message}")]
    Api {
        status: StatusCode,
        message: String,
        field: Option<String>,
    },
    #[error("Unexpected response body")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
            ClientError::Decode(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    field: Option<String>,
}

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    cache: QueryCache,
}

impl ApiClient {
    /// A client with its own cookie jar, so a login sticks to it.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_store(true)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            http,
            cache: QueryCache::new(),
        })
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let (message, field) = match serde_json::from_slice::<ErrorBody>(&bytes) {
                Ok(body) => (body.message, body.field),
                Err(_) => (String::from_utf8_lossy(&bytes).into_owned(), None),
            };
            return Err(ClientError::Api {
                status,
                message,
                field,
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tracing::instrument(name = "Client query", skip(self), fields(path = %key.path))]
    async fn query<T: DeserializeOwned>(&self, key: QueryKey) -> Result<T, ClientError> {
        if let Some(cached) = self.cache.get(&key) {
            return Ok(serde_json::from_value(cached)?);
        }
        let request = self
            .http
            .get(format!("{}{}", self.base_url, key.path))
            .query(&key.filter);
        let value = self.send(request).await?;
        let parsed = serde_json::from_value(value.clone())?;
        self.cache.insert(key, value);
        Ok(parsed)
    }

    #[tracing::instrument(name = "Client mutation", skip(self, body, invalidates))]
    async fn mutate<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        invalidates: &[&str],
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let value = self.send(request).await?;
        for path in invalidates {
            self.cache.invalidate(path);
        }
        Ok(serde_json::from_value(value)?)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, ClientError> {
        let request = self
            .http
            .post(format!("{}/api/login", self.base_url))
            .basic_auth(email, Some(password));
        let value = self.send(request).await?;
        self.cache.clear();
        Ok(serde_json::from_value(value)?)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.mutate::<(), ()>(Method::POST, "/api/logout", None::<&()>, &[])
            .await?;
        self.cache.clear();
        Ok(())
    }

    pub async fn current_user(&self) -> Result<CurrentUser, ClientError> {
        self.query(QueryKey::new("/api/auth/user")).await
    }

    pub async fn dashboard(&self) -> Result<Dashboard, ClientError> {
        self.query(QueryKey::new(DASHBOARD)).await
    }

    pub async fn products(&self, active_only: bool) -> Result<Vec<Product>, ClientError> {
        self.query(QueryKey::new(PRODUCTS).filter("active", active_only.then_some(true)))
            .await
    }

    pub async fn product(&self, id: i32) -> Result<Product, ClientError> {
        self.query(QueryKey::new(format!("{PRODUCTS}/{id}"))).await
    }

    pub async fn create_product(&self, product: &ProductForm) -> Result<Product, ClientError> {
        self.mutate(Method::POST, PRODUCTS, Some(product), &[PRODUCTS, DASHBOARD])
            .await
    }

    pub async fn update_product(
        &self,
        id: i32,
        product: &ProductForm,
    ) -> Result<Product, ClientError> {
        let path = format!("{PRODUCTS}/{id}");
        // Cached order items embed the live product row.
        self.mutate(Method::PUT, &path, Some(product), &[PRODUCTS, ORDERS, DASHBOARD])
            .await
    }

    pub async fn delete_product(&self, id: i32) -> Result<(), ClientError> {
        let path = format!("{PRODUCTS}/{id}");
        self.mutate(Method::DELETE, &path, None::<&()>, &[PRODUCTS, ORDERS, DASHBOARD])
            .await
    }

    pub async fn appointments(
        &self,
        patient_id: Option<&str>,
    ) -> Result<Vec<Appointment>, ClientError> {
        self.query(QueryKey::new(APPOINTMENTS).filter("patientId", patient_id))
            .await
    }

    pub async fn create_appointment(
        &self,
        appointment: &AppointmentForm,
    ) -> Result<Appointment, ClientError> {
        self.mutate(
            Method::POST,
            APPOINTMENTS,
            Some(appointment),
            &[APPOINTMENTS, DASHBOARD],
        )
        .await
    }

    pub async fn update_appointment(
        &self,
        id: i32,
        update: &AppointmentUpdateForm,
    ) -> Result<Appointment, ClientError> {
        let path = format!("{APPOINTMENTS}/{id}");
        self.mutate(Method::PUT, &path, Some(update), &[APPOINTMENTS, DASHBOARD])
            .await
    }

    pub async fn prescriptions(
        &self,
        patient_id: Option<&str>,
    ) -> Result<Vec<Prescription>, ClientError> {
        self.query(QueryKey::new(PRESCRIPTIONS).filter("patientId", patient_id))
            .await
    }

    pub async fn prescription(&self, id: i32) -> Result<Prescription, ClientError> {
        self.query(QueryKey::new(format!("{PRESCRIPTIONS}/{id}")))
            .await
    }

    pub async fn create_prescription(
        &self,
        prescription: &PrescriptionForm,
    ) -> Result<Prescription, ClientError> {
        self.mutate(
            Method::POST,
            PRESCRIPTIONS,
            Some(prescription),
            &[PRESCRIPTIONS, DASHBOARD],
        )
        .await
    }

    /// The printable page. Prescriptions never change, so this is cached too.
    pub async fn print_prescription(&self, id: i32) -> Result<String, ClientError> {
        let printable: PrintablePrescription = self
            .query(QueryKey::new(format!("{PRESCRIPTIONS}/{id}/print")))
            .await?;
        Ok(printable.html)
    }

    pub async fn orders(&self, patient_id: Option<&str>) -> Result<Vec<Order>, ClientError> {
        self.query(QueryKey::new(ORDERS).filter("patientId", patient_id))
            .await
    }

    pub async fn order(&self, id: i32) -> Result<Order, ClientError> {
        self.query(QueryKey::new(format!("{ORDERS}/{id}"))).await
    }

    pub async fn order_items(&self, id: i32) -> Result<Vec<OrderItemWithProduct>, ClientError> {
        self.query(QueryKey::new(format!("{ORDERS}/{id}/items")))
            .await
    }

    pub async fn create_order(&self, order: &OrderForm) -> Result<Order, ClientError> {
        self.mutate(Method::POST, ORDERS, Some(order), &[ORDERS, DASHBOARD])
            .await
    }

    pub async fn user_role(&self, user_id: &str) -> Result<UserRole, ClientError> {
        self.query(QueryKey::new(format!("/api/users/{user_id}/role")))
            .await
    }

    pub async fn set_user_role(&self, role: &UserRoleForm) -> Result<UserRole, ClientError> {
        let role_path = format!(
            "/api/users/{}/role",
            role.user_id.as_deref().unwrap_or_default()
        );
        self.mutate(
            Method::POST,
            "/api/users/role",
            Some(role),
            &[role_path.as_str(), "/api/admin/users", "/api/auth/user", DASHBOARD],
        )
        .await
    }

    pub async fn users(&self) -> Result<Vec<UserWithRole>, ClientError> {
        self.query(QueryKey::new("/api/admin/users")).await
    }
}
