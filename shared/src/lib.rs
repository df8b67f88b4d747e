use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub type AppointmentId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Caregiver,
    Patient,
}

/// The caller on whose behalf a booking operation runs. The engine trusts
/// this value as given; authentication happens before it is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appointment {
    pub id: AppointmentId,
    pub date: NaiveDate,
    pub caregiver: String,
    pub patient: String,
    pub vaccine: String,
}

/// One line of `show_appointments`: the other party is the patient when a
/// caregiver asks, and the caregiver when a patient asks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentSummary {
    pub id: AppointmentId,
    pub vaccine: String,
    pub date: NaiveDate,
    pub counterpart: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaccineStock {
    pub name: String,
    pub doses: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaregiverSchedule {
    pub date: NaiveDate,
    pub caregivers: Vec<String>,
    pub vaccines: Vec<VaccineStock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub appointment_id: AppointmentId,
    pub caregiver: String,
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("no caregiver is available")]
    NoCaregiverAvailable,

    #[error("not enough available doses")]
    InsufficientDoses,

    #[error("appointment {0} does not exist")]
    AppointmentNotFound(AppointmentId),

    #[error("appointment id {0} already exists")]
    DuplicateId(AppointmentId),

    #[error("vaccine {0} is missing from inventory")]
    UnknownVaccine(String),

    #[error("invalid dose amount: {0}")]
    InvalidDoseAmount(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] diesel::result::Error),
}

impl BookingError {
    /// Only storage failures may clear up on their own; everything else is a
    /// property of the data and will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self, BookingError::StorageUnavailable(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    CreatePatient,
    CreateCaregiver,
    LoginPatient,
    LoginCaregiver,
    SearchCaregiverSchedule,
    Reserve,
    UploadAvailability,
    Cancel,
    AddDoses,
    ShowAppointments,
    Logout,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operation {}", self.0)
    }
}

impl std::error::Error for UnknownCommand {}

impl FromStr for CommandType {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command_type = match s.to_lowercase().as_str() {
            "create_patient" => CommandType::CreatePatient,
            "create_caregiver" => CommandType::CreateCaregiver,
            "login_patient" => CommandType::LoginPatient,
            "login_caregiver" => CommandType::LoginCaregiver,
            "search_caregiver_schedule" => CommandType::SearchCaregiverSchedule,
            "reserve" => CommandType::Reserve,
            "upload_availability" => CommandType::UploadAvailability,
            "cancel" => CommandType::Cancel,
            "add_doses" => CommandType::AddDoses,
            "show_appointments" => CommandType::ShowAppointments,
            "logout" => CommandType::Logout,
            "quit" => CommandType::Quit,
            _ => return Err(UnknownCommand(s.to_string())),
        };
        Ok(command_type)
    }
}

/// A tokenized input line. `args` excludes the operation name, so
/// `reserve 2024-06-01 covaxA` has two args.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub command_type: CommandType,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    Unknown(UnknownCommand),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut tokens = line.split_whitespace();
        let operation = tokens.next().ok_or(ParseError::Empty)?;
        let command_type = operation.parse().map_err(ParseError::Unknown)?;

        Ok(Self {
            command_type,
            args: tokens.map(str::to_string).collect(),
        })
    }
}

impl Identity {
    pub fn caregiver(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::Caregiver,
        }
    }

    pub fn patient(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::Patient,
        }
    }
}

impl Appointment {
    pub fn summary_for(&self, role: Role) -> AppointmentSummary {
        let counterpart = match role {
            Role::Caregiver => self.patient.clone(),
            Role::Patient => self.caregiver.clone(),
        };
        AppointmentSummary {
            id: self.id,
            vaccine: self.vaccine.clone(),
            date: self.date,
            counterpart,
        }
    }
}
