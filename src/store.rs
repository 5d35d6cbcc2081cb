use crate::db::{self, parse_date, parse_timestamp, parse_uuid, DbConnection};
use crate::models::{Appointment, Medicine, NewAppointment, NewMedicine, NewPrescription, Prescription};
use async_trait::async_trait;
use rusqlite::params;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
}

/// The prescription table as the coordinator sees it. Every call is scoped
/// by owner except the insert, whose record already carries one.
#[async_trait]
pub trait PrescriptionRecords: Send + Sync {
    async fn insert_prescription(&self, record: NewPrescription<'_>) -> Result<Prescription, StoreError>;

    /// Newest upload first.
    async fn list_prescriptions(&self, owner: Uuid) -> Result<Vec<Prescription>, StoreError>;

    async fn get_prescription(&self, owner: Uuid, id: Uuid) -> Result<Prescription, StoreError>;

    async fn delete_prescription(&self, owner: Uuid, id: Uuid) -> Result<(), StoreError>;
}

/// Medicines, appointments and prescriptions in SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    conn: DbConnection,
}

fn map_medicine(row: &rusqlite::Row<'_>) -> rusqlite::Result<Medicine> {
    Ok(Medicine {
        id: parse_uuid(0, row.get(0)?)?,
        user_id: parse_uuid(1, row.get(1)?)?,
        name: row.get(2)?,
        strength: row.get(3)?,
        expiry_date: parse_date(4, row.get(4)?)?,
        created_at: parse_timestamp(5, row.get(5)?)?,
    })
}

fn map_appointment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: parse_uuid(0, row.get(0)?)?,
        user_id: parse_uuid(1, row.get(1)?)?,
        doctor_name: row.get(2)?,
        appointment_date: parse_date(3, row.get(3)?)?,
        created_at: parse_timestamp(4, row.get(4)?)?,
    })
}

fn map_prescription(row: &rusqlite::Row<'_>) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: parse_uuid(0, row.get(0)?)?,
        user_id: parse_uuid(1, row.get(1)?)?,
        file_name: row.get(2)?,
        file_path: row.get(3)?,
        file_size: row.get(4)?,
        uploaded_at: parse_timestamp(5, row.get(5)?)?,
    })
}

impl SqliteStore {
    pub fn new(conn: DbConnection) -> Self {
        Self { conn }
    }

    pub async fn list_medicines(&self, owner: Uuid) -> Result<Vec<Medicine>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, strength, expiry_date, created_at FROM medicines
             WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        )?;
        let medicines = stmt
            .query_map([owner.to_string()], map_medicine)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(medicines)
    }

    pub async fn insert_medicine(&self, owner: Uuid, new: NewMedicine) -> Result<Medicine, StoreError> {
        let medicine = Medicine {
            id: Uuid::new_v4(),
            user_id: owner,
            name: new.name,
            strength: new.strength,
            expiry_date: new.expiry_date,
            created_at: db::now(),
        };

        self.conn.lock().await.execute(
            "INSERT INTO medicines (id, user_id, name, strength, expiry_date, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                medicine.id.to_string(),
                owner.to_string(),
                medicine.name,
                medicine.strength,
                medicine.expiry_date.to_string(),
                db::timestamp(medicine.created_at)
            ],
        )?;

        Ok(medicine)
    }

    pub async fn delete_medicine(&self, owner: Uuid, id: Uuid) -> Result<(), StoreError> {
        let deleted = self.conn.lock().await.execute(
            "DELETE FROM medicines WHERE id = ? AND user_id = ?",
            params![id.to_string(), owner.to_string()],
        )?;
        if deleted == 0 {
            return Err(StoreError::NotFound("Medicine"));
        }
        Ok(())
    }

    /// Soonest first.
    pub async fn list_appointments(&self, owner: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, doctor_name, appointment_date, created_at FROM appointments
             WHERE user_id = ? ORDER BY appointment_date ASC, created_at ASC",
        )?;
        let appointments = stmt
            .query_map([owner.to_string()], map_appointment)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(appointments)
    }

    pub async fn insert_appointment(
        &self,
        owner: Uuid,
        new: NewAppointment,
    ) -> Result<Appointment, StoreError> {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            user_id: owner,
            doctor_name: new.doctor_name,
            appointment_date: new.appointment_date,
            created_at: db::now(),
        };

        self.conn.lock().await.execute(
            "INSERT INTO appointments (id, user_id, doctor_name, appointment_date, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                appointment.id.to_string(),
                owner.to_string(),
                appointment.doctor_name,
                appointment.appointment_date.to_string(),
                db::timestamp(appointment.created_at)
            ],
        )?;

        Ok(appointment)
    }

    pub async fn delete_appointment(&self, owner: Uuid, id: Uuid) -> Result<(), StoreError> {
        let deleted = self.conn.lock().await.execute(
            "DELETE FROM appointments WHERE id = ? AND user_id = ?",
            params![id.to_string(), owner.to_string()],
        )?;
        if deleted == 0 {
            return Err(StoreError::NotFound("Appointment"));
        }
        Ok(())
    }
}

#[async_trait]
impl PrescriptionRecords for SqliteStore {
    async fn insert_prescription(&self, record: NewPrescription<'_>) -> Result<Prescription, StoreError> {
        let prescription = Prescription {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            file_name: record.file_name.to_string(),
            file_path: record.file_path.to_string(),
            file_size: record.file_size,
            uploaded_at: db::now(),
        };

        self.conn.lock().await.execute(
            "INSERT INTO prescriptions (id, user_id, file_name, file_path, file_size, uploaded_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                prescription.id.to_string(),
                prescription.user_id.to_string(),
                prescription.file_name,
                prescription.file_path,
                prescription.file_size,
                db::timestamp(prescription.uploaded_at)
            ],
        )?;

        Ok(prescription)
    }

    async fn list_prescriptions(&self, owner: Uuid) -> Result<Vec<Prescription>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, file_name, file_path, file_size, uploaded_at FROM prescriptions
             WHERE user_id = ? ORDER BY uploaded_at DESC, rowid DESC",
        )?;
        let prescriptions = stmt
            .query_map([owner.to_string()], map_prescription)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(prescriptions)
    }

    async fn get_prescription(&self, owner: Uuid, id: Uuid) -> Result<Prescription, StoreError> {
        let result = self.conn.lock().await.query_row(
            "SELECT id, user_id, file_name, file_path, file_size, uploaded_at FROM prescriptions
             WHERE id = ? AND user_id = ?",
            params![id.to_string(), owner.to_string()],
            map_prescription,
        );

        match result {
            Ok(prescription) => Ok(prescription),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::NotFound("Prescription")),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_prescription(&self, owner: Uuid, id: Uuid) -> Result<(), StoreError> {
        let deleted = self.conn.lock().await.execute(
            "DELETE FROM prescriptions WHERE id = ? AND user_id = ?",
            params![id.to_string(), owner.to_string()],
        )?;
        if deleted == 0 {
            return Err(StoreError::NotFound("Prescription"));
        }
        Ok(())
    }
}
