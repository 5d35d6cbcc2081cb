use crate::error::ValidationError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_STRENGTH_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub strength: String,
    pub expiry_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub doctor_name: String,
    pub appointment_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMedicine {
    pub name: String,
    pub strength: String,
    pub expiry_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub doctor_name: String,
    pub appointment_date: NaiveDate,
}

#[derive(Debug, Clone, Copy)]
pub struct NewPrescription<'a> {
    pub user_id: Uuid,
    pub file_name: &'a str,
    pub file_path: &'a str,
    pub file_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MedicineForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub strength: String,
    pub expiry_date: Option<NaiveDate>,
}

impl MedicineForm {
    /// Length limits apply to the raw input, emptiness to the trimmed one.
    pub fn validate(self) -> Result<NewMedicine, ValidationError> {
        if self.name.trim().is_empty() || self.name.chars().count() > MAX_NAME_CHARS {
            return Err(ValidationError::new(
                "Medicine name is required and must be under 100 characters.",
            ));
        }
        if self.strength.trim().is_empty() || self.strength.chars().count() > MAX_STRENGTH_CHARS {
            return Err(ValidationError::new(
                "Strength is required and must be under 50 characters.",
            ));
        }
        let expiry_date = self
            .expiry_date
            .ok_or_else(|| ValidationError::new("Please select an expiry date."))?;

        Ok(NewMedicine {
            name: self.name.trim().to_string(),
            strength: self.strength.trim().to_string(),
            expiry_date,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AppointmentForm {
    #[serde(default)]
    pub doctor_name: String,
    pub appointment_date: Option<NaiveDate>,
}

impl AppointmentForm {
    pub fn validate(self) -> Result<NewAppointment, ValidationError> {
        if self.doctor_name.trim().is_empty() || self.doctor_name.chars().count() > MAX_NAME_CHARS
        {
            return Err(ValidationError::new(
                "Doctor name is required and must be under 100 characters.",
            ));
        }
        let appointment_date = self
            .appointment_date
            .ok_or_else(|| ValidationError::new("Please select an appointment date."))?;

        Ok(NewAppointment {
            doctor_name: self.doctor_name.trim().to_string(),
            appointment_date,
        })
    }
}
