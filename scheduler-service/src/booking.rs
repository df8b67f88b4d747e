//! Reservation and cancellation across the three ledgers.
//!
//! `reserve` and `cancel` each run as one `BEGIN IMMEDIATE` transaction: the
//! write lock is taken before the first read, so the availability check, the
//! dose check, and the `next_id` computation cannot be interleaved with
//! another writer sharing the database file. Any error rolls the whole
//! operation back.

use chrono::NaiveDate;
use diesel::{Connection, SqliteConnection};
use shared::*;
use tracing::{info, warn};

use crate::{appointments, availability, inventory};

pub fn reserve(
    conn: &mut SqliteConnection,
    date: NaiveDate,
    vaccine: &str,
    patient: &str,
) -> Result<Reservation, BookingError> {
    let result = conn.immediate_transaction::<_, BookingError, _>(|conn| {
        // earliest name wins
        let caregiver = availability::list_for_date(conn, date)?
            .into_iter()
            .next()
            .ok_or(BookingError::NoCaregiverAvailable)?;

        match inventory::get(conn, vaccine)? {
            Some(doses) if doses > 0 => {}
            _ => return Err(BookingError::InsufficientDoses),
        }

        let appointment = Appointment {
            id: appointments::next_id(conn)?,
            date,
            caregiver,
            patient: patient.to_string(),
            vaccine: vaccine.to_string(),
        };
        appointments::insert(conn, &appointment)?;
        availability::remove(conn, date, &appointment.caregiver)?;
        inventory::decrement_by_one(conn, vaccine)?;

        Ok(Reservation {
            appointment_id: appointment.id,
            caregiver: appointment.caregiver,
        })
    });

    match &result {
        Ok(reservation) => info!(
            "Reserved appointment {} on {} with {} for {}",
            reservation.appointment_id, date, reservation.caregiver, patient
        ),
        Err(e) => warn!("Reservation of {} on {} for {} failed: {}", vaccine, date, patient, e),
    }
    result
}

/// Undoes a reservation owned by `identity`: the slot goes back to the
/// caregiver, the dose goes back to the inventory, and the row is removed.
pub fn cancel(
    conn: &mut SqliteConnection,
    id: AppointmentId,
    identity: &Identity,
) -> Result<Appointment, BookingError> {
    let result = conn.immediate_transaction::<_, BookingError, _>(|conn| {
        let appointment = appointments::find_owned_by(conn, id, identity)?
            .ok_or(BookingError::AppointmentNotFound(id))?;

        availability::add(conn, appointment.date, &appointment.caregiver)?;
        inventory::increment_by_one(conn, &appointment.vaccine)?;
        appointments::delete(conn, appointment.id)?;

        Ok(appointment)
    });

    match &result {
        Ok(appointment) => info!("Appointment {} canceled by {}", appointment.id, identity.username),
        Err(e) => warn!("Cancel of appointment {} by {} failed: {}", id, identity.username, e),
    }
    result
}

pub fn search_caregiver_schedule(
    conn: &mut SqliteConnection,
    date: NaiveDate,
) -> Result<CaregiverSchedule, BookingError> {
    conn.transaction::<_, BookingError, _>(|conn| {
        Ok(CaregiverSchedule {
            date,
            caregivers: availability::list_for_date(conn, date)?,
            vaccines: inventory::list_all(conn)?,
        })
    })
}

pub fn show_appointments(
    conn: &mut SqliteConnection,
    identity: &Identity,
) -> Result<Vec<AppointmentSummary>, BookingError> {
    let booked = match identity.role {
        Role::Caregiver => appointments::list_for_caregiver(conn, &identity.username)?,
        Role::Patient => appointments::list_for_patient(conn, &identity.username)?,
    };
    Ok(booked
        .iter()
        .map(|a| a.summary_for(identity.role))
        .collect())
}
