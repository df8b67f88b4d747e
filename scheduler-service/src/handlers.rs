use anyhow::Result;
use chrono::NaiveDate;
use diesel::SqliteConnection;
use shared::*;
use std::io::{BufRead, Write};
use tracing::{error, info, warn};

use crate::availability;
use crate::booking;
use crate::credentials::{CredentialError, CredentialStore};
use crate::inventory;
use crate::session::Session;

const DATE_FORMAT: &str = "%Y-%m-%d";
const PASSWORD_POLICY: &str = "please use a strong password (8+ char, at least one upper and one lower, \
    at least one letter and one number, and at least one special character, from \"!\", \"@\", \"#\", \"?\")";

const MENU: [&str; 13] = [
    "*** Please enter one of the following commands ***",
    "> create_patient <username> <password>",
    "> create_caregiver <username> <password>",
    "> login_patient <username> <password>",
    "> login_caregiver <username> <password>",
    "> search_caregiver_schedule <date>",
    "> reserve <date> <vaccine>",
    "> upload_availability <date>",
    "> cancel <appointment_id>",
    "> add_doses <vaccine> <number>",
    "> show_appointments",
    "> logout",
    "> quit",
];

/// Output of one command line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reply {
    pub lines: Vec<String>,
    pub quit: bool,
}

impl Reply {
    fn line(text: impl Into<String>) -> Self {
        Self {
            lines: vec![text.into()],
            quit: false,
        }
    }

    fn lines(lines: Vec<String>) -> Self {
        Self { lines, quit: false }
    }
}

pub struct CommandHandler {
    conn: SqliteConnection,
    credentials: CredentialStore,
    session: Session,
}

impl CommandHandler {
    pub fn new(conn: SqliteConnection, credentials: CredentialStore) -> Self {
        Self {
            conn,
            credentials,
            session: Session::default(),
        }
    }

    /// Reads commands until `quit` or end of input. Commands run one at a
    /// time, in order.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<()> {
        writeln!(output)?;
        writeln!(output, "Welcome to the COVID-19 Vaccine Reservation Scheduling Application!")?;
        for line in MENU {
            writeln!(output, "{}", line)?;
        }
        writeln!(output)?;

        let mut lines = input.lines();
        loop {
            write!(output, "> ")?;
            output.flush()?;

            let Some(line) = lines.next() else {
                info!("Input closed, leaving command loop");
                break;
            };
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Unreadable input, leaving command loop: {}", e);
                    writeln!(output, "Please try again!")?;
                    break;
                }
            };
            let reply = self.handle_line(&line);
            for text in &reply.lines {
                writeln!(output, "{}", text)?;
            }
            if reply.quit {
                break;
            }
        }
        Ok(())
    }

    pub fn handle_line(&mut self, line: &str) -> Reply {
        match Command::parse(line) {
            Ok(command) => self.handle_command(command),
            Err(ParseError::Empty) => Reply::line("Please try again!"),
            Err(ParseError::Unknown(unknown)) => {
                warn!("{}", unknown);
                Reply::line("Invalid operation name!")
            }
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Reply {
        let args = command.args.as_slice();
        match command.command_type {
            CommandType::CreatePatient => self.handle_create(Role::Patient, args),
            CommandType::CreateCaregiver => self.handle_create(Role::Caregiver, args),
            CommandType::LoginPatient => self.handle_login(Role::Patient, args),
            CommandType::LoginCaregiver => self.handle_login(Role::Caregiver, args),
            CommandType::SearchCaregiverSchedule => self.handle_search_caregiver_schedule(args),
            CommandType::Reserve => self.handle_reserve(args),
            CommandType::UploadAvailability => self.handle_upload_availability(args),
            CommandType::Cancel => self.handle_cancel(args),
            CommandType::AddDoses => self.handle_add_doses(args),
            CommandType::ShowAppointments => self.handle_show_appointments(args),
            CommandType::Logout => self.handle_logout(args),
            CommandType::Quit => Reply {
                lines: vec!["Bye!".to_string()],
                quit: true,
            },
        }
    }

    fn handle_create(&mut self, role: Role, args: &[String]) -> Reply {
        let (failed, taken, weak) = match role {
            Role::Patient => ("Create patient failed", "Username taken, try again", "Create patient failed"),
            Role::Caregiver => ("Failed to create user.", "Username taken, try again!", "Create caregiver failed"),
        };

        let [username, password] = args else {
            return Reply::line(failed);
        };

        match self.credentials.create(&mut self.conn, role, username, password) {
            Ok(()) => Reply::line(format!("Created user {}", username)),
            Err(CredentialError::UsernameTaken(_)) => Reply::line(taken),
            Err(CredentialError::WeakPassword) => Reply::line(format!("{}, {}", weak, PASSWORD_POLICY)),
            Err(e) => {
                error!("Creating {:?} {} failed: {}", role, username, e);
                Reply::line(failed)
            }
        }
    }

    fn handle_login(&mut self, role: Role, args: &[String]) -> Reply {
        let (already, failed) = match role {
            Role::Patient => ("User already logged in, try again", "Login patient failed"),
            Role::Caregiver => ("User already logged in.", "Login failed."),
        };

        if self.session.current().is_some() {
            return Reply::line(already);
        }
        let [username, password] = args else {
            return Reply::line(failed);
        };

        match self.credentials.verify(&mut self.conn, role, username, password) {
            Ok(true) => {}
            Ok(false) => return Reply::line(failed),
            Err(e) => {
                error!("Login lookup for {} failed: {}", username, e);
                return Reply::line(failed);
            }
        }

        let identity = Identity {
            username: username.clone(),
            role,
        };
        if self.session.login(identity).is_err() {
            return Reply::line(already);
        }
        match role {
            Role::Patient => Reply::line(format!("Logged in as {}", username)),
            Role::Caregiver => Reply::line(format!("Logged in as: {}", username)),
        }
    }

    fn handle_search_caregiver_schedule(&mut self, args: &[String]) -> Reply {
        if self.session.current().is_none() {
            return Reply::line("Please login first");
        }
        let [date] = args else {
            return Reply::line("Please try again");
        };
        let Some(date) = parse_date(date) else {
            return Reply::line("Please try again");
        };

        let schedule = match booking::search_caregiver_schedule(&mut self.conn, date) {
            Ok(schedule) => schedule,
            Err(e) => return storage_failure("search_caregiver_schedule", &e),
        };

        let mut lines = vec!["Caregivers:".to_string()];
        if schedule.caregivers.is_empty() {
            lines.push("No caregivers available".to_string());
        } else {
            lines.extend(schedule.caregivers);
        }
        lines.push("Vaccines:".to_string());
        if schedule.vaccines.is_empty() {
            lines.push("No vaccines available".to_string());
        } else {
            lines.extend(
                schedule
                    .vaccines
                    .iter()
                    .map(|v| format!("{} {}", v.name, v.doses)),
            );
        }
        Reply::lines(lines)
    }

    fn handle_reserve(&mut self, args: &[String]) -> Reply {
        let Some(identity) = self.session.current() else {
            return Reply::line("Please login first");
        };
        if identity.role != Role::Patient {
            return Reply::line("Please login as a patient");
        }
        let [date, vaccine] = args else {
            return Reply::line("Please try again");
        };
        let Some(date) = parse_date(date) else {
            return Reply::line("Please try again");
        };

        match booking::reserve(&mut self.conn, date, vaccine, &identity.username) {
            Ok(reservation) => Reply::line(format!(
                "Appointment ID {}, Caregiver username {}",
                reservation.appointment_id, reservation.caregiver
            )),
            Err(BookingError::NoCaregiverAvailable) => Reply::line("No caregiver is available"),
            Err(BookingError::InsufficientDoses) => Reply::line("Not enough available doses"),
            Err(e) => storage_failure("reserve", &e),
        }
    }

    fn handle_upload_availability(&mut self, args: &[String]) -> Reply {
        let Some(identity) = self.session.current_with_role(Role::Caregiver) else {
            return Reply::line("Please login as a caregiver first!");
        };
        let [date] = args else {
            return Reply::line("Please try again!");
        };
        let Some(date) = parse_date(date) else {
            return Reply::line("Please enter a valid date!");
        };

        match availability::upload(&mut self.conn, date, &identity.username) {
            Ok(()) => Reply::line("Availability uploaded!"),
            Err(e) => {
                error!("Upload of {} for {} failed: {}", date, identity.username, e);
                Reply::line("Upload Availability Failed")
            }
        }
    }

    fn handle_cancel(&mut self, args: &[String]) -> Reply {
        let Some(identity) = self.session.current() else {
            return Reply::line("Please login first");
        };
        let [id] = args else {
            return Reply::line("Please try again");
        };
        let Ok(id) = id.parse::<AppointmentId>() else {
            return Reply::line("Please try again");
        };

        match booking::cancel(&mut self.conn, id, identity) {
            Ok(_) => Reply::line(format!("Appointment ID {} has been successfully canceled", id)),
            Err(BookingError::AppointmentNotFound(_)) => {
                Reply::line(format!("Appointment ID {} does not exist", id))
            }
            Err(e) => storage_failure("cancel", &e),
        }
    }

    fn handle_add_doses(&mut self, args: &[String]) -> Reply {
        if self.session.current_with_role(Role::Caregiver).is_none() {
            return Reply::line("Please login as a caregiver first!");
        }
        let [vaccine, amount] = args else {
            return Reply::line("Please try again!");
        };

        match inventory::add_doses(&mut self.conn, vaccine, amount) {
            Ok(_) => Reply::line("Doses updated!"),
            Err(e) => {
                warn!("add_doses {} {} failed: {}", vaccine, amount, e);
                Reply::line("Error occurred when adding doses")
            }
        }
    }

    fn handle_show_appointments(&mut self, args: &[String]) -> Reply {
        let Some(identity) = self.session.current() else {
            return Reply::line("Please login first");
        };
        if !args.is_empty() {
            return Reply::line("Please try again");
        }

        match booking::show_appointments(&mut self.conn, identity) {
            Ok(summaries) if summaries.is_empty() => Reply::line("No appointments scheduled"),
            Ok(summaries) => Reply::lines(
                summaries
                    .iter()
                    .map(|s| format!("{} {} {} {}", s.id, s.vaccine, s.date, s.counterpart))
                    .collect(),
            ),
            Err(e) => storage_failure("show_appointments", &e),
        }
    }

    fn handle_logout(&mut self, args: &[String]) -> Reply {
        if !args.is_empty() {
            return Reply::line("Please try again");
        }
        match self.session.logout() {
            Ok(identity) => {
                info!("{} logged out", identity.username);
                Reply::line("Successfully logged out")
            }
            Err(_) => Reply::line("Please login first"),
        }
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}

fn storage_failure(operation: &str, e: &BookingError) -> Reply {
    if e.is_transient() {
        warn!("{} hit a storage error, the command can be retried: {}", operation, e);
    } else {
        error!("{} failed: {}", operation, e);
    }
    Reply::line("Please try again")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::io::Cursor;

    fn handler() -> CommandHandler {
        CommandHandler::new(db::in_memory(), CredentialStore::new(10))
    }

    /// Runs each line and returns the replies, one string per command.
    fn script(handler: &mut CommandHandler, lines: &[&str]) -> Vec<String> {
        lines
            .iter()
            .map(|line| handler.handle_line(line).lines.join("\n"))
            .collect()
    }

    #[test]
    fn booking_flow_end_to_end() {
        let mut handler = handler();
        let out = script(
            &mut handler,
            &[
                "create_caregiver carl Passw0rd!",
                "login_caregiver carl Passw0rd!",
                "upload_availability 2024-06-01",
                "add_doses covaxA 1",
                "logout",
                "create_patient pat Passw0rd!",
                "login_patient pat Passw0rd!",
                "search_caregiver_schedule 2024-06-01",
                "reserve 2024-06-01 covaxA",
                "show_appointments",
                "search_caregiver_schedule 2024-06-01",
                "reserve 2024-06-01 covaxA",
                "cancel 1",
                "reserve 2024-06-01 covaxA",
            ],
        );
        assert_eq!(
            out,
            vec![
                "Created user carl",
                "Logged in as: carl",
                "Availability uploaded!",
                "Doses updated!",
                "Successfully logged out",
                "Created user pat",
                "Logged in as pat",
                "Caregivers:\ncarl\nVaccines:\ncovaxA 1",
                "Appointment ID 1, Caregiver username carl",
                "1 covaxA 2024-06-01 carl",
                "Caregivers:\nNo caregivers available\nVaccines:\ncovaxA 0",
                "No caregiver is available",
                "Appointment ID 1 has been successfully canceled",
                "Appointment ID 2, Caregiver username carl",
            ]
        );
    }

    #[test]
    fn caregiver_sees_patient_and_can_cancel() {
        let mut handler = handler();
        script(
            &mut handler,
            &[
                "create_caregiver carl Passw0rd!",
                "create_patient pat Passw0rd!",
                "login_caregiver carl Passw0rd!",
                "upload_availability 2024-06-01",
                "add_doses covaxA 2",
                "logout",
                "login_patient pat Passw0rd!",
                "reserve 2024-06-01 covaxA",
                "logout",
                "login_caregiver carl Passw0rd!",
            ],
        );
        let out = script(
            &mut handler,
            &["show_appointments", "cancel 1", "show_appointments", "cancel 1"],
        );
        assert_eq!(
            out,
            vec![
                "1 covaxA 2024-06-01 pat",
                "Appointment ID 1 has been successfully canceled",
                "No appointments scheduled",
                "Appointment ID 1 does not exist",
            ]
        );
    }

    #[test]
    fn out_of_stock_is_reported_when_a_slot_exists() {
        let mut handler = handler();
        let out = script(
            &mut handler,
            &[
                "create_caregiver carl Passw0rd!",
                "login_caregiver carl Passw0rd!",
                "upload_availability 2024-06-01",
                "add_doses covaxA 0",
                "logout",
                "create_patient pat Passw0rd!",
                "login_patient pat Passw0rd!",
                "reserve 2024-06-01 covaxA",
                "reserve 2024-06-01 unknown",
            ],
        );
        assert_eq!(out[7], "Not enough available doses");
        assert_eq!(out[8], "Not enough available doses");
    }

    #[test]
    fn commands_require_the_right_login() {
        let mut handler = handler();
        let out = script(
            &mut handler,
            &[
                "search_caregiver_schedule 2024-06-01",
                "reserve 2024-06-01 covaxA",
                "cancel 1",
                "show_appointments",
                "logout",
                "upload_availability 2024-06-01",
                "add_doses covaxA 3",
                "create_caregiver carl Passw0rd!",
                "login_caregiver carl Passw0rd!",
                "reserve 2024-06-01 covaxA",
                "login_patient pat Passw0rd!",
                "login_caregiver carl Passw0rd!",
            ],
        );
        assert_eq!(
            out,
            vec![
                "Please login first",
                "Please login first",
                "Please login first",
                "Please login first",
                "Please login first",
                "Please login as a caregiver first!",
                "Please login as a caregiver first!",
                "Created user carl",
                "Logged in as: carl",
                "Please login as a patient",
                "User already logged in, try again",
                "User already logged in.",
            ]
        );
    }

    #[test]
    fn patients_cannot_manage_inventory() {
        let mut handler = handler();
        let out = script(
            &mut handler,
            &[
                "create_patient pat Passw0rd!",
                "login_patient pat Passw0rd!",
                "add_doses covaxA 3",
                "upload_availability 2024-06-01",
            ],
        );
        assert_eq!(out[2], "Please login as a caregiver first!");
        assert_eq!(out[3], "Please login as a caregiver first!");
    }

    #[test]
    fn malformed_arguments() {
        let mut handler = handler();
        script(
            &mut handler,
            &["create_caregiver carl Passw0rd!", "login_caregiver carl Passw0rd!"],
        );
        let out = script(
            &mut handler,
            &[
                "search_caregiver_schedule",
                "search_caregiver_schedule 2024-13-01",
                "upload_availability",
                "upload_availability 2024-02-30",
                "add_doses covaxA",
                "add_doses covaxA lots",
                "add_doses covaxA -4",
                "cancel",
                "cancel one",
                "show_appointments now",
                "logout now",
            ],
        );
        assert_eq!(
            out,
            vec![
                "Please try again",
                "Please try again",
                "Please try again!",
                "Please enter a valid date!",
                "Please try again!",
                "Error occurred when adding doses",
                "Error occurred when adding doses",
                "Please try again",
                "Please try again",
                "Please try again",
                "Please try again",
            ]
        );
    }

    #[test]
    fn account_creation_and_login_failures() {
        let mut handler = handler();
        let weak_patient = format!("Create patient failed, {}", PASSWORD_POLICY);
        let weak_caregiver = format!("Create caregiver failed, {}", PASSWORD_POLICY);
        let out = script(
            &mut handler,
            &[
                "create_patient pat",
                "create_caregiver carl",
                "create_patient pat weak",
                "create_caregiver carl weak",
                "create_patient pat Passw0rd!",
                "create_patient pat Passw0rd!",
                "create_caregiver carl Passw0rd!",
                "create_caregiver carl Passw0rd!",
                "login_patient pat wrong",
                "login_patient carl Passw0rd!",
                "login_caregiver carl",
                "login_caregiver pat Passw0rd!",
            ],
        );
        assert_eq!(
            out,
            vec![
                "Create patient failed",
                "Failed to create user.",
                weak_patient.as_str(),
                weak_caregiver.as_str(),
                "Created user pat",
                "Username taken, try again",
                "Created user carl",
                "Username taken, try again!",
                "Login patient failed",
                "Login patient failed",
                "Login failed.",
                "Login failed.",
            ]
        );
    }

    #[test]
    fn cancel_of_someone_elses_appointment_is_hidden() {
        let mut handler = handler();
        script(
            &mut handler,
            &[
                "create_caregiver carl Passw0rd!",
                "create_patient pat Passw0rd!",
                "create_patient sam Passw0rd!",
                "login_caregiver carl Passw0rd!",
                "upload_availability 2024-06-01",
                "add_doses covaxA 1",
                "logout",
                "login_patient pat Passw0rd!",
                "reserve 2024-06-01 covaxA",
                "logout",
                "login_patient sam Passw0rd!",
            ],
        );
        let out = script(&mut handler, &["cancel 1", "cancel 7", "show_appointments"]);
        assert_eq!(
            out,
            vec![
                "Appointment ID 1 does not exist",
                "Appointment ID 7 does not exist",
                "No appointments scheduled",
            ]
        );
    }

    #[test]
    fn unknown_and_empty_lines() {
        let mut handler = handler();
        assert_eq!(handler.handle_line("").lines, vec!["Please try again!"]);
        assert_eq!(handler.handle_line("book it").lines, vec!["Invalid operation name!"]);
        let quit = handler.handle_line("QUIT");
        assert_eq!(quit.lines, vec!["Bye!"]);
        assert!(quit.quit);
    }

    #[test]
    fn run_stops_at_quit() {
        let mut handler = handler();
        let input = Cursor::new("create_patient pat Passw0rd!\nquit\nshow_appointments\n");
        let mut output = Vec::new();
        handler.run(input, &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Welcome to the COVID-19 Vaccine Reservation Scheduling Application!"));
        assert!(text.contains("> Created user pat\n"));
        assert!(text.ends_with("> Bye!\n"));
        assert!(!text.contains("Please login first"));
    }

    #[test]
    fn run_stops_on_input_that_is_not_utf8() {
        let mut handler = handler();
        let mut input = b"create_patient pat Passw0rd!\n".to_vec();
        input.extend_from_slice(&[0xff, 0xfe, b'\n']);
        input.extend_from_slice(b"create_patient sam Passw0rd!\n");
        let mut output = Vec::new();
        handler.run(Cursor::new(input), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("> Created user pat\n"));
        assert!(text.ends_with("> Please try again!\n"));
        assert!(!text.contains("Created user sam"));
    }

    #[test]
    fn reserve_only_accepts_iso_dates() {
        let mut handler = handler();
        let out = script(
            &mut handler,
            &[
                "create_caregiver carl Passw0rd!",
                "login_caregiver carl Passw0rd!",
                "upload_availability 2024-06-01",
                "add_doses covaxA 1",
                "logout",
                "create_patient pat Passw0rd!",
                "login_patient pat Passw0rd!",
                "reserve 06/01/2024 covaxA",
                "reserve 2024-6-31 covaxA",
                "reserve 2024-06-01 covaxA",
            ],
        );
        assert_eq!(
            &out[7..],
            &[
                "Please try again",
                "Please try again",
                "Appointment ID 1, Caregiver username carl",
            ]
        );
    }

    #[test]
    fn run_ends_cleanly_at_end_of_input() {
        let mut handler = handler();
        let mut output = Vec::new();
        handler.run(Cursor::new("logout\n"), &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.ends_with("> Please login first\n> "));
    }
}
