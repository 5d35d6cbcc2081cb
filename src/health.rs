use crate::models::{Appointment, Medicine};
use chrono::NaiveDate;
use serde::Serialize;

pub const EXPIRY_WARNING_DAYS: i64 = 30;
pub const UPCOMING_WINDOW_DAYS: i64 = 7;

pub fn days_until(date: NaiveDate, today: NaiveDate) -> i64 {
    (date - today).num_days()
}

/// A medicine expiring today is still usable.
pub fn is_expired(expiry: NaiveDate, today: NaiveDate) -> bool {
    expiry < today
}

pub fn is_expiring_soon(expiry: NaiveDate, today: NaiveDate) -> bool {
    let days = days_until(expiry, today);
    days > 0 && days <= EXPIRY_WARNING_DAYS
}

pub fn is_past(date: NaiveDate, today: NaiveDate) -> bool {
    date < today
}

pub fn is_upcoming_soon(date: NaiveDate, today: NaiveDate) -> bool {
    let days = days_until(date, today);
    days > 0 && days <= UPCOMING_WINDOW_DAYS
}

#[derive(Debug, Clone, Serialize)]
pub struct MedicineStatus {
    #[serde(flatten)]
    pub medicine: Medicine,
    pub expired: bool,
    pub expiring_soon: bool,
}

impl MedicineStatus {
    pub fn new(medicine: Medicine, today: NaiveDate) -> Self {
        Self {
            expired: is_expired(medicine.expiry_date, today),
            expiring_soon: is_expiring_soon(medicine.expiry_date, today),
            medicine,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentStatus {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub today: bool,
    pub upcoming_soon: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AppointmentSchedule {
    pub upcoming: Vec<AppointmentStatus>,
    pub past: Vec<AppointmentStatus>,
}

/// Splits date-ordered appointments into upcoming (today included) and past,
/// keeping their order.
pub fn schedule(appointments: Vec<Appointment>, today: NaiveDate) -> AppointmentSchedule {
    let mut schedule = AppointmentSchedule::default();
    for appointment in appointments {
        let date = appointment.appointment_date;
        let status = AppointmentStatus {
            today: date == today,
            upcoming_soon: is_upcoming_soon(date, today),
            appointment,
        };
        if is_past(date, today) {
            schedule.past.push(status);
        } else {
            schedule.upcoming.push(status);
        }
    }
    schedule
}
