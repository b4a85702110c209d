use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::auth::AuthenticatedUser;
use crate::models::{
    require_text, AppointmentStatus, AppointmentUpdate, NewAppointment, ValidationError,
};
use crate::storage::Storage;

/// `?patientId=` filter shared by the per-patient listings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientQuery {
    pub patient_id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentForm {
    /// Defaults to the caller.
    pub patient_id: Option<String>,
    pub doctor_name: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

impl TryFrom<AppointmentForm> for NewAppointment {
    type Error = ValidationError;

    fn try_from(form: AppointmentForm) -> Result<Self, Self::Error> {
        Ok(NewAppointment {
            patient_id: require_text("patientId", form.patient_id)?,
            doctor_name: form.doctor_name,
            date: form.date.ok_or(ValidationError::required("date"))?,
            reason: form.reason,
            status: form.status.unwrap_or_default(),
            notes: form.notes,
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentUpdateForm {
    pub doctor_name: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

impl From<AppointmentUpdateForm> for AppointmentUpdate {
    fn from(form: AppointmentUpdateForm) -> Self {
        AppointmentUpdate {
            doctor_name: form.doctor_name,
            date: form.date,
            reason: form.reason,
            status: form.status,
            notes: form.notes,
        }
    }
}

#[tracing::instrument(name = "Listing appointments", skip(storage), fields(user_id = %user.id))]
pub async fn list_appointments(
    query: web::Query<PatientQuery>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let patient_id = user.patient_scope(query.into_inner().patient_id);
    let appointments = storage.list_appointments(patient_id).await?;
    Ok(HttpResponse::Ok().json(appointments))
}

#[tracing::instrument(
    name = "Booking a new appointment",
    skip(form, storage),
    fields(user_id = %user.id, status = ?form.status)
)]
pub async fn create_appointment(
    form: web::Json<AppointmentForm>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let mut form = form.into_inner();
    let patient_id = form.patient_id.get_or_insert_with(|| user.id.clone());
    user.require_self_or_staff(patient_id)?;
    let appointment: NewAppointment = form.try_into()?;
    let appointment = storage.create_appointment(appointment).await?;
    Ok(HttpResponse::Created().json(appointment))
}

#[tracing::instrument(
    name = "Updating an appointment",
    skip(form, storage),
    fields(user_id = %user.id)
)]
pub async fn update_appointment(
    id: web::Path<i32>,
    form: web::Json<AppointmentUpdateForm>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let not_found = || ApiError::NotFound(format!("Appointment {id}"));
    let existing = storage.get_appointment(id).await?.ok_or_else(not_found)?;
    user.require_self_or_staff(&existing.patient_id)?;

    let appointment = storage
        .update_appointment(id, form.into_inner().into())
        .await?
        .ok_or_else(not_found)?;
    Ok(HttpResponse::Ok().json(appointment))
}
