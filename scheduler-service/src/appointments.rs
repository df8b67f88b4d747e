use diesel::dsl::max;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::SqliteConnection;
use shared::{Appointment, AppointmentId, BookingError, Identity, Role};

use crate::models::{AppointmentRow, NewAppointment};
use crate::schema::{appointment_ids, appointments};

/// Largest id ever handed out plus one. The high-water mark in
/// `appointment_ids` outlives cancellations, so a deleted maximum id is
/// never issued twice. Call this inside the transaction that inserts.
///
/// Once `AppointmentId::MAX` has been issued there is no next id, and the
/// result is `DuplicateId` for that maximum.
pub fn next_id(conn: &mut SqliteConnection) -> Result<AppointmentId, BookingError> {
    let current_max = appointments::table
        .select(max(appointments::id))
        .first::<Option<i32>>(conn)?;
    let highest = current_max.unwrap_or(0).max(last_issued(conn)?.unwrap_or(0));

    highest
        .checked_add(1)
        .ok_or(BookingError::DuplicateId(highest))
}

fn last_issued(conn: &mut SqliteConnection) -> Result<Option<i32>, BookingError> {
    let last = appointment_ids::table
        .select(appointment_ids::last_issued)
        .first::<i32>(conn)
        .optional()?;
    Ok(last)
}

pub fn insert(conn: &mut SqliteConnection, appointment: &Appointment) -> Result<(), BookingError> {
    let exists = appointments::table
        .find(appointment.id)
        .select(appointments::id)
        .first::<i32>(conn)
        .optional()?
        .is_some();
    if exists {
        return Err(BookingError::DuplicateId(appointment.id));
    }

    let new_appointment = NewAppointment {
        id: appointment.id,
        time: appointment.date,
        caregiver_username: &appointment.caregiver,
        patient_username: &appointment.patient,
        vaccine_name: &appointment.vaccine,
    };

    diesel::insert_into(appointments::table)
        .values(&new_appointment)
        .execute(conn)
        .map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                BookingError::DuplicateId(appointment.id)
            }
            other => other.into(),
        })?;

    let high_water = last_issued(conn)?.unwrap_or(0).max(appointment.id);
    diesel::replace_into(appointment_ids::table)
        .values((
            appointment_ids::id.eq(1),
            appointment_ids::last_issued.eq(high_water),
        ))
        .execute(conn)?;

    Ok(())
}

/// Looks up `id` only among the caller's own appointments. Someone else's
/// appointment resolves to `None`, exactly like a missing one.
pub fn find_owned_by(
    conn: &mut SqliteConnection,
    id: AppointmentId,
    identity: &Identity,
) -> Result<Option<Appointment>, BookingError> {
    let by_id = appointments::table.filter(appointments::id.eq(id));
    let row = match identity.role {
        Role::Caregiver => by_id
            .filter(appointments::caregiver_username.eq(identity.username.as_str()))
            .select(AppointmentRow::as_select())
            .first::<AppointmentRow>(conn)
            .optional()?,
        Role::Patient => by_id
            .filter(appointments::patient_username.eq(identity.username.as_str()))
            .select(AppointmentRow::as_select())
            .first::<AppointmentRow>(conn)
            .optional()?,
    };
    Ok(row.map(Appointment::from))
}

pub fn delete(conn: &mut SqliteConnection, id: AppointmentId) -> Result<(), BookingError> {
    let deleted = diesel::delete(appointments::table.find(id)).execute(conn)?;
    if deleted == 0 {
        return Err(BookingError::AppointmentNotFound(id));
    }
    Ok(())
}

pub fn list_for_caregiver(
    conn: &mut SqliteConnection,
    username: &str,
) -> Result<Vec<Appointment>, BookingError> {
    let rows = appointments::table
        .filter(appointments::caregiver_username.eq(username))
        .order(appointments::id.asc())
        .select(AppointmentRow::as_select())
        .load::<AppointmentRow>(conn)?;
    Ok(rows.into_iter().map(Appointment::from).collect())
}

pub fn list_for_patient(
    conn: &mut SqliteConnection,
    username: &str,
) -> Result<Vec<Appointment>, BookingError> {
    let rows = appointments::table
        .filter(appointments::patient_username.eq(username))
        .order(appointments::id.asc())
        .select(AppointmentRow::as_select())
        .load::<AppointmentRow>(conn)?;
    Ok(rows.into_iter().map(Appointment::from).collect())
}
