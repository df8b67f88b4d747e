use constant_time_eq::constant_time_eq;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::SqliteConnection;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use shared::Role;
use thiserror::Error;
use tracing::info;

use crate::models::StoredCredential;
use crate::schema::{caregivers, patients};

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const SPECIAL_CHARACTERS: [char; 4] = ['!', '@', '#', '?'];

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("username {0} is taken")]
    UsernameTaken(String),

    #[error("password does not meet the strength policy")]
    WeakPassword,

    #[error("storage unavailable: {0}")]
    Storage(#[from] DieselError),
}

/// At least 8 characters mixing upper and lower case, letters and digits,
/// and one of `!`, `@`, `#`, `?`.
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(char::is_uppercase)
        && password.chars().any(char::is_lowercase)
        && password.chars().any(char::is_alphabetic)
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| SPECIAL_CHARACTERS.contains(&c))
}

/// Salted PBKDF2-HMAC-SHA256 password storage for both account kinds.
pub struct CredentialStore {
    rounds: u32,
}

impl CredentialStore {
    pub fn new(rounds: u32) -> Self {
        Self { rounds }
    }

    pub fn create(
        &self,
        conn: &mut SqliteConnection,
        role: Role,
        username: &str,
        password: &str,
    ) -> Result<(), CredentialError> {
        conn.immediate_transaction::<_, CredentialError, _>(|conn| {
            if find(conn, role, username)?.is_some() {
                return Err(CredentialError::UsernameTaken(username.to_string()));
            }
            if !is_strong_password(password) {
                return Err(CredentialError::WeakPassword);
            }

            let mut salt = vec![0u8; SALT_LEN];
            rand::thread_rng().fill_bytes(&mut salt);
            let hash = self.derive(password, &salt);

            let inserted = match role {
                Role::Caregiver => diesel::insert_into(caregivers::table)
                    .values((
                        caregivers::username.eq(username),
                        caregivers::salt.eq(salt.as_slice()),
                        caregivers::hash.eq(hash.as_slice()),
                    ))
                    .execute(conn),
                Role::Patient => diesel::insert_into(patients::table)
                    .values((
                        patients::username.eq(username),
                        patients::salt.eq(salt.as_slice()),
                        patients::hash.eq(hash.as_slice()),
                    ))
                    .execute(conn),
            };
            match inserted {
                Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                    Err(CredentialError::UsernameTaken(username.to_string()))
                }
                other => other.map(|_| ()).map_err(CredentialError::from),
            }
        })?;

        info!("Created {:?} account {}", role, username);
        Ok(())
    }

    /// `false` for an unknown user as well as for a wrong password.
    pub fn verify(
        &self,
        conn: &mut SqliteConnection,
        role: Role,
        username: &str,
        password: &str,
    ) -> Result<bool, CredentialError> {
        let Some(stored) = find(conn, role, username)? else {
            return Ok(false);
        };
        let candidate = self.derive(password, &stored.salt);
        let matches = constant_time_eq(&candidate, &stored.hash);
        if matches {
            info!("Verified {:?} credentials for {}", role, stored.username);
        }
        Ok(matches)
    }

    fn derive(&self, password: &str, salt: &[u8]) -> Vec<u8> {
        let mut hash = vec![0u8; HASH_LEN];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, self.rounds, &mut hash);
        hash
    }
}

fn find(
    conn: &mut SqliteConnection,
    role: Role,
    username: &str,
) -> Result<Option<StoredCredential>, DieselError> {
    match role {
        Role::Caregiver => caregivers::table
            .find(username)
            .first::<StoredCredential>(conn)
            .optional(),
        Role::Patient => patients::table
            .find(username)
            .first::<StoredCredential>(conn)
            .optional(),
    }
}
