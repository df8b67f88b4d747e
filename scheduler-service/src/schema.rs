diesel::table! {
    appointment_ids (id) {
        id -> Integer,
        last_issued -> Integer,
    }
}

diesel::table! {
    appointments (id) {
        id -> Integer,
        time -> Date,
        caregiver_username -> Text,
        patient_username -> Text,
        vaccine_name -> Text,
    }
}

diesel::table! {
    availabilities (time, username) {
        time -> Date,
        username -> Text,
    }
}

diesel::table! {
    caregivers (username) {
        username -> Text,
        salt -> Binary,
        hash -> Binary,
    }
}

diesel::table! {
    patients (username) {
        username -> Text,
        salt -> Binary,
        hash -> Binary,
    }
}

diesel::table! {
    vaccines (name) {
        name -> Text,
        doses -> Integer,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    appointment_ids,
    appointments,
    availabilities,
    caregivers,
    patients,
    vaccines,
);
