use diesel::prelude::*;
use diesel::SqliteConnection;
use shared::{BookingError, VaccineStock};
use tracing::{info, warn};

use crate::models::Vaccine;
use crate::schema::vaccines;

pub fn get(conn: &mut SqliteConnection, name: &str) -> Result<Option<i32>, BookingError> {
    let doses = vaccines::table
        .filter(vaccines::name.eq(name))
        .select(vaccines::doses)
        .first::<i32>(conn)
        .optional()?;
    Ok(doses)
}

pub fn list_all(conn: &mut SqliteConnection) -> Result<Vec<VaccineStock>, BookingError> {
    let rows = vaccines::table
        .order(vaccines::name.asc())
        .select(Vaccine::as_select())
        .load::<Vaccine>(conn)?;
    Ok(rows.into_iter().map(VaccineStock::from).collect())
}

/// Returns the dose count after the change.
pub fn create_or_increment(
    conn: &mut SqliteConnection,
    name: &str,
    amount: i32,
) -> Result<i32, BookingError> {
    if amount < 0 {
        return Err(BookingError::InvalidDoseAmount(amount.to_string()));
    }

    match get(conn, name)? {
        None => {
            diesel::insert_into(vaccines::table)
                .values(&Vaccine {
                    name: name.to_string(),
                    doses: amount,
                })
                .execute(conn)?;
            Ok(amount)
        }
        Some(current) => {
            let total = current.checked_add(amount).ok_or_else(|| {
                BookingError::InvalidDoseAmount(format!("{} more doses of {} overflows", amount, name))
            })?;
            diesel::update(vaccines::table.filter(vaccines::name.eq(name)))
                .set(vaccines::doses.eq(total))
                .execute(conn)?;
            Ok(total)
        }
    }
}

pub fn decrement_by_one(conn: &mut SqliteConnection, name: &str) -> Result<(), BookingError> {
    let updated = diesel::update(
        vaccines::table
            .filter(vaccines::name.eq(name))
            .filter(vaccines::doses.gt(0)),
    )
    .set(vaccines::doses.eq(vaccines::doses - 1))
    .execute(conn)?;

    if updated == 0 {
        return Err(BookingError::InsufficientDoses);
    }
    Ok(())
}

pub fn increment_by_one(conn: &mut SqliteConnection, name: &str) -> Result<(), BookingError> {
    let updated = diesel::update(vaccines::table.filter(vaccines::name.eq(name)))
        .set(vaccines::doses.eq(vaccines::doses + 1))
        .execute(conn)?;

    if updated == 0 {
        warn!("Vaccine {} vanished while restoring a dose", name);
        return Err(BookingError::UnknownVaccine(name.to_string()));
    }
    Ok(())
}

/// `add_doses <vaccine> <amount>`: the amount arrives as raw command text.
pub fn add_doses(
    conn: &mut SqliteConnection,
    name: &str,
    amount_text: &str,
) -> Result<i32, BookingError> {
    let amount: i32 = amount_text
        .parse()
        .map_err(|_| BookingError::InvalidDoseAmount(amount_text.to_string()))?;
    if amount < 0 {
        return Err(BookingError::InvalidDoseAmount(amount_text.to_string()));
    }

    let total = conn.immediate_transaction::<_, BookingError, _>(|conn| {
        create_or_increment(conn, name, amount)
    })?;

    info!("Added {} doses of {}, now {}", amount, name, total);
    Ok(total)
}
