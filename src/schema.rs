// Mirrors the tables created by the embedded migrations in `migrations/`.

diesel::table! {
    devices (id) {
        id -> Integer,
        name -> Text,
        created -> Timestamp,
    }
}

diesel::table! {
    media_files (id) {
        id -> Integer,
        device_id -> Integer,
        file -> Text,
        uploaded -> Timestamp,
    }
}

diesel::joinable!(media_files -> devices (device_id));

diesel::allow_tables_to_appear_in_same_query!(devices, media_files);
