// Diesel table definitions for the relational persistence layer (§4.5,
// §6's MYSQL_DSN). History is append-only: one row per accepted
// observation, written in batches by the batch writer.

diesel::table! {
    pilot_history (id) {
        id -> Bigint,
        address -> Unsigned<Integer>,
        name -> Nullable<Text>,
        aircraft_kind -> Unsigned<Tinyint>,
        latitude -> Double,
        longitude -> Double,
        altitude_m -> Nullable<Smallint>,
        ground_speed_kmh -> Double,
        climb_rate_dms -> Smallint,
        heading_deg -> Unsigned<Smallint>,
        battery_pct -> Unsigned<Tinyint>,
        recorded_at -> Timestamp,
    }
}

diesel::table! {
    thermal_history (id) {
        id -> Bigint,
        thermal_id -> Unsigned<Bigint>,
        reporter_address -> Unsigned<Integer>,
        latitude -> Double,
        longitude -> Double,
        quality -> Unsigned<Tinyint>,
        climb_dms -> Smallint,
        wind_speed_ms -> Double,
        wind_heading_deg -> Unsigned<Smallint>,
        recorded_at -> Timestamp,
    }
}

diesel::table! {
    station_history (id) {
        id -> Bigint,
        address -> Unsigned<Integer>,
        name -> Nullable<Text>,
        latitude -> Double,
        longitude -> Double,
        temperature_c -> Double,
        wind_speed_ms -> Double,
        wind_heading_deg -> Unsigned<Smallint>,
        wind_gusts_ms -> Double,
        humidity_pct -> Unsigned<Tinyint>,
        pressure_hpa -> Double,
        battery_pct -> Unsigned<Tinyint>,
        recorded_at -> Timestamp,
    }
}
