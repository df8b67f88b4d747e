use chrono::NaiveDate;
use diesel::prelude::*;
use shared::*;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::appointments)]
pub struct AppointmentRow {
    pub id: i32,
    pub time: NaiveDate,
    pub caregiver_username: String,
    pub patient_username: String,
    pub vaccine_name: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::appointments)]
pub struct NewAppointment<'a> {
    pub id: i32,
    pub time: NaiveDate,
    pub caregiver_username: &'a str,
    pub patient_username: &'a str,
    pub vaccine_name: &'a str,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::availabilities)]
pub struct NewAvailability<'a> {
    pub time: NaiveDate,
    pub username: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::vaccines)]
pub struct Vaccine {
    pub name: String,
    pub doses: i32,
}

/// Salted password hash for one account. Caregivers and patients live in
/// separate tables with the same shape.
#[derive(Debug, Clone, Queryable)]
pub struct StoredCredential {
    pub username: String,
    pub salt: Vec<u8>,
    pub hash: Vec<u8>,
}

impl From<AppointmentRow> for Appointment {
    fn from(row: AppointmentRow) -> Self {
        Self {
            id: row.id,
            date: row.time,
            caregiver: row.caregiver_username,
            patient: row.patient_username,
            vaccine: row.vaccine_name,
        }
    }
}

impl From<Vaccine> for VaccineStock {
    fn from(vaccine: Vaccine) -> Self {
        Self {
            name: vaccine.name,
            doses: vaccine.doses,
        }
    }
}
