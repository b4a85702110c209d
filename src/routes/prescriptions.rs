use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::{ApiError, PatientQuery};
use crate::auth::AuthenticatedUser;
use crate::models::{
    require_text, EyeMeasurements, LensPower, NewPrescription, Prescription, ValidationError,
};
use crate::storage::Storage;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionForm {
    pub patient_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub right_eye: EyeMeasurements,
    #[serde(default)]
    pub left_eye: EyeMeasurements,
    pub addition: Option<String>,
    pub pupillary_distance: Option<String>,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    pub is_transcription: Option<bool>,
    pub original_image_url: Option<String>,
}

impl TryFrom<PrescriptionForm> for NewPrescription {
    type Error = ValidationError;

    fn try_from(form: PrescriptionForm) -> Result<Self, Self::Error> {
        Ok(NewPrescription {
            patient_id: require_text("patientId", form.patient_id)?,
            date: form.date,
            doctor_name: form.doctor_name,
            right_eye: form.right_eye,
            left_eye: form.left_eye,
            addition: form.addition,
            pupillary_distance: form.pupillary_distance,
            diagnosis: form.diagnosis,
            notes: form.notes,
            is_transcription: form.is_transcription.unwrap_or(false),
            original_image_url: form.original_image_url,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrintablePrescription {
    pub html: String,
}

#[tracing::instrument(name = "Listing prescriptions", skip(storage), fields(user_id = %user.id))]
pub async fn list_prescriptions(
    query: web::Query<PatientQuery>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let patient_id = user.patient_scope(query.into_inner().patient_id);
    let prescriptions = storage.list_prescriptions(patient_id).await?;
    Ok(HttpResponse::Ok().json(prescriptions))
}

async fn fetch_visible(
    id: i32,
    user: &AuthenticatedUser,
    storage: &dyn Storage,
) -> Result<Prescription, ApiError> {
    let prescription = storage
        .get_prescription(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Prescription {id}")))?;
    user.require_self_or_staff(&prescription.patient_id)?;
    Ok(prescription)
}

#[tracing::instrument(name = "Fetching a prescription", skip(storage), fields(user_id = %user.id))]
pub async fn get_prescription(
    id: web::Path<i32>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let prescription = fetch_visible(id.into_inner(), &user, storage.get_ref()).await?;
    Ok(HttpResponse::Ok().json(prescription))
}

#[tracing::instrument(
    name = "Recording a new prescription",
    skip(form, storage),
    fields(user_id = %user.id)
)]
pub async fn create_prescription(
    form: web::Json<PrescriptionForm>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    user.require_staff()?;
    let prescription: NewPrescription = form.into_inner().try_into()?;
    let prescription = storage.create_prescription(prescription).await?;
    Ok(HttpResponse::Created().json(prescription))
}

#[tracing::instrument(name = "Printing a prescription", skip(storage), fields(user_id = %user.id))]
pub async fn print_prescription(
    id: web::Path<i32>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let prescription = fetch_visible(id.into_inner(), &user, storage.get_ref()).await?;
    Ok(HttpResponse::Ok().json(PrintablePrescription {
        html: render_printable(&prescription),
    }))
}

fn cell(value: &Option<String>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => htmlescape::encode_minimal(v),
        _ => "&ndash;".to_string(),
    }
}

fn lens_row(out: &mut String, label: &str, lens: &LensPower) {
    out.push_str(&format!(
        "<tr><th>{label}</th><td>{}</td><td>{}</td><td>{}</td></tr>",
        cell(&lens.sphere),
        cell(&lens.cylinder),
        cell(&lens.axis),
    ));
}

fn lens_table(out: &mut String, caption: &str, od: &LensPower, os: &LensPower) {
    out.push_str(&format!(
        "<table><caption>{caption}</caption>\
         <tr><th></th><th>Sphere</th><th>Cylinder</th><th>Axis</th></tr>"
    ));
    lens_row(out, "OD", od);
    lens_row(out, "OS", os);
    out.push_str("</table>");
}

/// Standalone HTML page for printing. Every stored value is escaped.
pub fn render_printable(p: &Prescription) -> String {
    let mut out = String::with_capacity(2048);
    out.push_str(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Prescription</title>\
         <style>body{font-family:sans-serif;margin:2em}table{border-collapse:collapse;margin:1em 0}\
         th,td{border:1px solid #444;padding:4px 10px;text-align:center}</style></head><body>",
    );
    out.push_str(&format!(
        "<h1>Prescription #{}</h1><p><strong>Patient:</strong> {}</p>\
         <p><strong>Date:</strong> {}</p><p><strong>Doctor:</strong> {}</p>",
        p.id,
        htmlescape::encode_minimal(&p.patient_id),
        p.date.format("%Y-%m-%d"),
        cell(&p.doctor_name),
    ));
    lens_table(&mut out, "Distance", &p.right_eye.far, &p.left_eye.far);
    if !(p.right_eye.near.is_empty() && p.left_eye.near.is_empty()) {
        lens_table(&mut out, "Near", &p.right_eye.near, &p.left_eye.near);
    }
    out.push_str(&format!(
        "<p><strong>Addition:</strong> {}</p><p><strong>Pupillary distance:</strong> {}</p>\
         <p><strong>Diagnosis:</strong> {}</p><p><strong>Notes:</strong> {}</p>",
        cell(&p.addition),
        cell(&p.pupillary_distance),
        cell(&p.diagnosis),
        cell(&p.notes),
    ));
    if p.is_transcription {
        out.push_str("<p><em>Transcribed from an external prescription.</em></p>");
    }
    out.push_str("</body></html>");
    out
}
