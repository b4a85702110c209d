//! Optical prescriptions.
//!
//! Each eye carries a distance ("far") and a reading ("near") correction.
//! Values are kept as the optometrist wrote them (`"-1.25"`, `"180"`), so
//! they are text rather than numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LensPower {
    pub sphere: Option<String>,
    pub cylinder: Option<String>,
    pub axis: Option<String>,
}

impl LensPower {
    pub fn is_empty(&self) -> bool {
        self.sphere.is_none() && self.cylinder.is_none() && self.axis.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EyeMeasurements {
    #[serde(default)]
    pub far: LensPower,
    #[serde(default)]
    pub near: LensPower,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: i32,
    pub patient_id: String,
    pub date: DateTime<Utc>,
    pub doctor_name: Option<String>,
    /// OD
    pub right_eye: EyeMeasurements,
    /// OS
    pub left_eye: EyeMeasurements,
    pub addition: Option<String>,
    pub pupillary_distance: Option<String>,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    pub is_transcription: bool,
    pub original_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn lens_from_row(row: &PgRow, eye: &str, distance: &str) -> Result<LensPower, sqlx::Error> {
    Ok(LensPower {
        sphere: row.try_get(format!("sphere_{eye}_{distance}").as_str())?,
        cylinder: row.try_get(format!("cylinder_{eye}_{distance}").as_str())?,
        axis: row.try_get(format!("axis_{eye}_{distance}").as_str())?,
    })
}

impl<'r> FromRow<'r, PgRow> for Prescription {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Prescription {
            id: row.try_get("id")?,
            patient_id: row.try_get("patient_id")?,
            date: row.try_get("date")?,
            doctor_name: row.try_get("doctor_name")?,
            right_eye: EyeMeasurements {
                far: lens_from_row(row, "od", "far")?,
                near: lens_from_row(row, "od", "near")?,
            },
            left_eye: EyeMeasurements {
                far: lens_from_row(row, "os", "far")?,
                near: lens_from_row(row, "os", "near")?,
            },
            addition: row.try_get("addition")?,
            pupillary_distance: row.try_get("pupillary_distance")?,
            diagnosis: row.try_get("diagnosis")?,
            notes: row.try_get("notes")?,
            is_transcription: row.try_get("is_transcription")?,
            original_image_url: row.try_get("original_image_url")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrescription {
    pub patient_id: String,
    pub date: Option<DateTime<Utc>>,
    pub doctor_name: Option<String>,
    pub right_eye: EyeMeasurements,
    pub left_eye: EyeMeasurements,
    pub addition: Option<String>,
    pub pupillary_distance: Option<String>,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    pub is_transcription: bool,
    pub original_image_url: Option<String>,
}
