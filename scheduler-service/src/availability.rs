use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::SqliteConnection;
use shared::BookingError;
use tracing::info;

use crate::models::NewAvailability;
use crate::schema::availabilities;

/// Caregivers offering `date`, in ascending byte order of their usernames.
pub fn list_for_date(
    conn: &mut SqliteConnection,
    date: NaiveDate,
) -> Result<Vec<String>, BookingError> {
    let caregivers = availabilities::table
        .filter(availabilities::time.eq(date))
        .order(availabilities::username.asc())
        .select(availabilities::username)
        .load::<String>(conn)?;
    Ok(caregivers)
}

/// Inserting a slot that already exists is a no-op, so a cancel can always
/// put its slot back.
pub fn add(
    conn: &mut SqliteConnection,
    date: NaiveDate,
    caregiver: &str,
) -> Result<bool, BookingError> {
    let inserted = diesel::insert_or_ignore_into(availabilities::table)
        .values(&NewAvailability {
            time: date,
            username: caregiver,
        })
        .execute(conn)?;
    Ok(inserted > 0)
}

pub fn remove(
    conn: &mut SqliteConnection,
    date: NaiveDate,
    caregiver: &str,
) -> Result<bool, BookingError> {
    let deleted = diesel::delete(
        availabilities::table
            .filter(availabilities::time.eq(date))
            .filter(availabilities::username.eq(caregiver)),
    )
    .execute(conn)?;
    Ok(deleted > 0)
}

pub fn upload(
    conn: &mut SqliteConnection,
    date: NaiveDate,
    caregiver: &str,
) -> Result<(), BookingError> {
    let inserted =
        conn.immediate_transaction::<_, BookingError, _>(|conn| add(conn, date, caregiver))?;
    if inserted {
        info!("Caregiver {} is available on {}", caregiver, date);
    } else {
        info!("Caregiver {} already offered {}", caregiver, date);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn list_is_sorted_and_scoped_to_the_day() {
        let mut conn = db::in_memory();
        for name in ["zoe", "bob", "amy"] {
            add(&mut conn, day(1), name).unwrap();
        }
        add(&mut conn, day(2), "aaron").unwrap();

        assert_eq!(list_for_date(&mut conn, day(1)).unwrap(), vec!["amy", "bob", "zoe"]);
        assert_eq!(list_for_date(&mut conn, day(2)).unwrap(), vec!["aaron"]);
        assert!(list_for_date(&mut conn, day(3)).unwrap().is_empty());
    }

    #[test]
    fn add_twice_keeps_one_slot() {
        let mut conn = db::in_memory();
        assert!(add(&mut conn, day(1), "carl").unwrap());
        assert!(!add(&mut conn, day(1), "carl").unwrap());
        assert_eq!(list_for_date(&mut conn, day(1)).unwrap(), vec!["carl"]);
    }

    #[test]
    fn remove_missing_slot_is_not_an_error() {
        let mut conn = db::in_memory();
        assert!(!remove(&mut conn, day(1), "carl").unwrap());
        add(&mut conn, day(1), "carl").unwrap();
        assert!(remove(&mut conn, day(1), "carl").unwrap());
        assert!(list_for_date(&mut conn, day(1)).unwrap().is_empty());
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut conn = db::in_memory();
        upload(&mut conn, day(1), "Carl").unwrap();
        upload(&mut conn, day(1), "carl").unwrap();
        upload(&mut conn, day(1), "carl").unwrap();
        assert_eq!(list_for_date(&mut conn, day(1)).unwrap(), vec!["Carl", "carl"]);
    }
}
