//! FANET frame decode/encode (§4.1). Pure functions, no I/O.
//!
//! Wire layout: `[4-byte unix ts LE][2-byte RSSI i16 LE][2-byte SNR i16 LE]
//! [1-byte header][3-byte source address LE][type-specific body]`.
//!
//! The header's packet-type field is 4 bits wide (bits 0-3), not 3: the
//! spec's own type catalogue includes value 9 (thermal), which does not
//! fit in 3 bits. Flags occupy bits 4-7. See DESIGN.md.

use chrono::{DateTime, TimeZone, Utc};

use crate::model::device_address::DeviceAddress;
use crate::model::entities::EntityRecord;
use crate::model::geo::GeoPoint;
use crate::model::kinds::{AircraftKind, GroundKind};

use super::error::ParseError;

const LAT_SCALE: f64 = 93206.04;
const LON_SCALE: f64 = 46603.02;

const TYPE_AIR_TRACKING: u8 = 1;
const TYPE_NAME: u8 = 2;
const TYPE_SERVICE: u8 = 4;
const TYPE_GROUND: u8 = 7;
const TYPE_THERMAL: u8 = 9;

fn read_i24_le(bytes: &[u8]) -> i32 {
    let raw = (bytes[0] as u32) | ((bytes[1] as u32) << 8) | ((bytes[2] as u32) << 16);
    if raw & 0x0080_0000 != 0 {
        (raw | 0xFF00_0000) as i32
    } else {
        raw as i32
    }
}

fn write_i24_le(out: &mut Vec<u8>, value: i32) {
    let raw = (value as u32) & 0x00FF_FFFF;
    out.push((raw & 0xFF) as u8);
    out.push(((raw >> 8) & 0xFF) as u8);
    out.push(((raw >> 16) & 0xFF) as u8);
}

fn decode_coord(raw: i32, scale: f64) -> f64 {
    raw as f64 / scale
}

fn encode_coord(degrees: f64, scale: f64) -> i32 {
    (degrees * scale).round() as i32
}

/// Parse the packet-type segment out of an MQTT topic of the shape
/// `<prefix>/<chip_id>/f/<packet_type>`.
pub fn topic_packet_type(topic: &str) -> Option<u8> {
    topic.rsplit('/').next()?.parse().ok()
}

/// Reads just the 24-bit FANET source address out of a gateway-wrapped
/// payload, without decoding the rest of the frame. Used by the ingest
/// supervisor to hash-dispatch a message to its per-device worker (§5, §9)
/// before the full `decode` (which also validates topic/type agreement and
/// the type-specific body) runs on that worker.
pub fn peek_source_address(payload: &[u8]) -> Option<DeviceAddress> {
    if payload.len() < 8 + 4 {
        return None;
    }
    let frame = &payload[8..];
    let addr_raw = u32::from_le_bytes([frame[1], frame[2], frame[3], 0]);
    DeviceAddress::new(addr_raw)
}

fn position(lat_raw: &[u8], lon_raw: &[u8]) -> Result<GeoPoint, ParseError> {
    let point = GeoPoint::new(
        decode_coord(read_i24_le(lat_raw), LAT_SCALE),
        decode_coord(read_i24_le(lon_raw), LON_SCALE),
    );
    if point.in_range() {
        Ok(point)
    } else {
        Err(ParseError::CoordOutOfRange)
    }
}

/// Decode a gateway-wrapped FANET payload. `topic`'s trailing segment must
/// agree with the header's packet type.
pub fn decode(topic: &str, payload: &[u8]) -> Result<EntityRecord, ParseError> {
    if payload.len() < 8 + 4 {
        return Err(ParseError::ShortFrame);
    }
    let ts_raw = u32::from_le_bytes(payload[0..4].try_into().unwrap());
    let timestamp = Utc
        .timestamp_opt(ts_raw as i64, 0)
        .single()
        .unwrap_or_else(Utc::now);

    let frame = &payload[8..];
    let header = frame[0];
    let packet_type = header & 0x0F;

    if let Some(topic_type) = topic_packet_type(topic) {
        if topic_type != packet_type {
            return Err(ParseError::TypeMismatch);
        }
    }

    let addr_raw = u32::from_le_bytes([frame[1], frame[2], frame[3], 0]);
    let address = DeviceAddress::new(addr_raw).ok_or(ParseError::CoordOutOfRange)?;
    let body = &frame[4..];

    match packet_type {
        TYPE_AIR_TRACKING => decode_air_tracking(address, timestamp, body),
        TYPE_NAME => decode_name(address, timestamp, body),
        TYPE_SERVICE => decode_service(address, timestamp, body),
        TYPE_GROUND => decode_ground(address, timestamp, body),
        TYPE_THERMAL => decode_thermal(address, timestamp, body),
        _ => Err(ParseError::UnknownType),
    }
}

fn decode_air_tracking(
    address: DeviceAddress,
    timestamp: DateTime<Utc>,
    body: &[u8],
) -> Result<EntityRecord, ParseError> {
    if body.len() < 15 {
        return Err(ParseError::ShortFrame);
    }
    let position = position(&body[0..3], &body[3..6])?;
    let altitude_m = i16::from_le_bytes([body[6], body[7]]);
    let ground_speed_kmh = u16::from_le_bytes([body[8], body[9]]) as f64 / 10.0;
    let climb_rate_dms = i16::from_le_bytes([body[10], body[11]]);
    let heading_deg = (body[12] as u16 * 360) / 256;
    let aircraft_kind = AircraftKind::from_wire(body[13] & 0x07);
    let battery_pct = body[14].min(100);

    Ok(EntityRecord::Pilot {
        address,
        position: Some(GeoPoint::with_altitude(
            position.latitude,
            position.longitude,
            altitude_m,
        )),
        timestamp,
        aircraft_kind,
        ground_speed_kmh: Some(ground_speed_kmh),
        climb_rate_dms: Some(climb_rate_dms),
        heading_deg: Some(heading_deg),
        battery_pct: Some(battery_pct),
        name: None,
    })
}

fn decode_name(
    address: DeviceAddress,
    timestamp: DateTime<Utc>,
    body: &[u8],
) -> Result<EntityRecord, ParseError> {
    let name = String::from_utf8_lossy(body).trim_end_matches('\0').to_string();
    Ok(EntityRecord::Pilot {
        address,
        position: None,
        timestamp,
        aircraft_kind: AircraftKind::Unknown,
        ground_speed_kmh: None,
        climb_rate_dms: None,
        heading_deg: None,
        battery_pct: None,
        name: Some(name),
    })
}

fn decode_service(
    address: DeviceAddress,
    timestamp: DateTime<Utc>,
    body: &[u8],
) -> Result<EntityRecord, ParseError> {
    if body.len() < 17 {
        return Err(ParseError::ShortFrame);
    }
    let position = position(&body[0..3], &body[3..6])?;
    let temperature_c = i16::from_le_bytes([body[6], body[7]]) as f64 / 10.0;
    let wind_speed_ms = u16::from_le_bytes([body[8], body[9]]) as f64 / 10.0;
    let wind_heading_deg = (body[10] as u16 * 360) / 256;
    let wind_gusts_ms = u16::from_le_bytes([body[11], body[12]]) as f64 / 10.0;
    let humidity_pct = body[13].min(100);
    let pressure_hpa = u16::from_le_bytes([body[14], body[15]]) as f64 / 10.0 + 800.0;
    let battery_pct = body[16].min(100);

    Ok(EntityRecord::Station {
        address,
        position,
        timestamp,
        temperature_c,
        wind_speed_ms,
        wind_heading_deg,
        wind_gusts_ms,
        humidity_pct,
        pressure_hpa,
        battery_pct,
    })
}

fn decode_ground(
    address: DeviceAddress,
    timestamp: DateTime<Utc>,
    body: &[u8],
) -> Result<EntityRecord, ParseError> {
    if body.len() < 8 {
        return Err(ParseError::ShortFrame);
    }
    let position = position(&body[0..3], &body[3..6])?;
    let ground_kind = GroundKind::from_wire(body[6]);
    let track_online = body[7] & 0x01 != 0;

    Ok(EntityRecord::GroundObject {
        address,
        position,
        timestamp,
        ground_kind,
        track_online,
    })
}

fn decode_thermal(
    address: DeviceAddress,
    timestamp: DateTime<Utc>,
    body: &[u8],
) -> Result<EntityRecord, ParseError> {
    if body.len() < 12 {
        return Err(ParseError::ShortFrame);
    }
    let position = position(&body[0..3], &body[3..6])?;
    let quality = body[6].min(5);
    let climb_dms = i16::from_le_bytes([body[7], body[8]]);
    let wind_speed_ms = u16::from_le_bytes([body[9], body[10]]) as f64 / 10.0;
    let wind_heading_deg = (body[11] as u16 * 360) / 256;

    Ok(EntityRecord::Thermal {
        address,
        position,
        timestamp,
        quality,
        climb_dms,
        wind_speed_ms,
        wind_heading_deg,
    })
}

/// Re-encode a record into a gateway-wrapped payload. Used by tests to
/// assert the codec is a total left-inverse on well-formed frames (§8.6),
/// and available to synthetic load generators.
pub fn encode(
    record: &EntityRecord,
    topic_prefix: &str,
    gateway_timestamp: DateTime<Utc>,
    rssi: i16,
    snr: i16,
) -> (String, Vec<u8>) {
    let mut out = Vec::new();
    out.extend_from_slice(&(gateway_timestamp.timestamp() as u32).to_le_bytes());
    out.extend_from_slice(&rssi.to_le_bytes());
    out.extend_from_slice(&snr.to_le_bytes());

    let (packet_type, address) = match record {
        EntityRecord::Pilot {
            address,
            position,
            aircraft_kind,
            ground_speed_kmh,
            climb_rate_dms,
            heading_deg,
            battery_pct,
            name,
            ..
        } => {
            if let Some(name) = name {
                out.push(TYPE_NAME);
                write_i24_le(&mut out, address.as_u32() as i32);
                out.extend_from_slice(name.as_bytes());
                (TYPE_NAME, *address)
            } else {
                let position = position.expect("air-tracking record must carry a position");
                out.push(TYPE_AIR_TRACKING);
                write_i24_le(&mut out, address.as_u32() as i32);
                write_i24_le(&mut out, encode_coord(position.latitude, LAT_SCALE));
                write_i24_le(&mut out, encode_coord(position.longitude, LON_SCALE));
                out.extend_from_slice(&position.altitude_m.unwrap_or(0).to_le_bytes());
                out.extend_from_slice(
                    &((ground_speed_kmh.unwrap_or(0.0) * 10.0).round() as u16).to_le_bytes(),
                );
                out.extend_from_slice(&climb_rate_dms.unwrap_or(0).to_le_bytes());
                out.push(((heading_deg.unwrap_or(0) as u32 * 256) / 360) as u8);
                out.push(*aircraft_kind as u8);
                out.push(battery_pct.unwrap_or(0));
                (TYPE_AIR_TRACKING, *address)
            }
        }
        EntityRecord::GroundObject {
            address,
            position,
            ground_kind,
            track_online,
            ..
        } => {
            out.push(TYPE_GROUND);
            write_i24_le(&mut out, address.as_u32() as i32);
            write_i24_le(&mut out, encode_coord(position.latitude, LAT_SCALE));
            write_i24_le(&mut out, encode_coord(position.longitude, LON_SCALE));
            out.push(*ground_kind as u8);
            out.push(if *track_online { 1 } else { 0 });
            (TYPE_GROUND, *address)
        }
        EntityRecord::Thermal {
            address,
            position,
            quality,
            climb_dms,
            wind_speed_ms,
            wind_heading_deg,
            ..
        } => {
            out.push(TYPE_THERMAL);
            write_i24_le(&mut out, address.as_u32() as i32);
            write_i24_le(&mut out, encode_coord(position.latitude, LAT_SCALE));
            write_i24_le(&mut out, encode_coord(position.longitude, LON_SCALE));
            out.push(*quality);
            out.extend_from_slice(&climb_dms.to_le_bytes());
            out.extend_from_slice(&((wind_speed_ms * 10.0).round() as u16).to_le_bytes());
            out.push(((*wind_heading_deg as u32 * 256) / 360) as u8);
            (TYPE_THERMAL, *address)
        }
        EntityRecord::Station {
            address,
            position,
            temperature_c,
            wind_speed_ms,
            wind_heading_deg,
            wind_gusts_ms,
            humidity_pct,
            pressure_hpa,
            battery_pct,
            ..
        } => {
            out.push(TYPE_SERVICE);
            write_i24_le(&mut out, address.as_u32() as i32);
            write_i24_le(&mut out, encode_coord(position.latitude, LAT_SCALE));
            write_i24_le(&mut out, encode_coord(position.longitude, LON_SCALE));
            out.extend_from_slice(&((temperature_c * 10.0).round() as i16).to_le_bytes());
            out.extend_from_slice(&((wind_speed_ms * 10.0).round() as u16).to_le_bytes());
            out.push(((*wind_heading_deg as u32 * 256) / 360) as u8);
            out.extend_from_slice(&((wind_gusts_ms * 10.0).round() as u16).to_le_bytes());
            out.push(*humidity_pct);
            out.extend_from_slice(&(((pressure_hpa - 800.0) * 10.0).round() as u16).to_le_bytes());
            out.push(*battery_pct);
            (TYPE_SERVICE, *address)
        }
    };

    (format!("{topic_prefix}/{address}/f/{packet_type}"), out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::geo::GeoPoint;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn air_tracking_round_trips() {
        let record = EntityRecord::Pilot {
            address: DeviceAddress::new(0xABC123).unwrap(),
            position: Some(GeoPoint::with_altitude(46.018, 8.0, 1200)),
            timestamp: ts(),
            aircraft_kind: AircraftKind::Paraglider,
            ground_speed_kmh: Some(24.3),
            climb_rate_dms: Some(-12),
            heading_deg: Some(270),
            battery_pct: Some(88),
            name: None,
        };
        let (topic, payload) = encode(&record, "fb/b", ts(), -70, 8);
        let decoded = decode(&topic, &payload).unwrap();
        match decoded {
            EntityRecord::Pilot {
                position,
                aircraft_kind,
                battery_pct,
                ..
            } => {
                let p = position.unwrap();
                assert!((p.latitude - 46.018).abs() < 1e-3);
                assert!((p.longitude - 8.0).abs() < 1e-3);
                assert_eq!(aircraft_kind, AircraftKind::Paraglider);
                assert_eq!(battery_pct, Some(88));
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn thermal_round_trips() {
        let record = EntityRecord::Thermal {
            address: DeviceAddress::new(0x010203).unwrap(),
            position: GeoPoint::new(46.5, 14.2),
            timestamp: ts(),
            quality: 4,
            climb_dms: 35,
            wind_speed_ms: 3.5,
            wind_heading_deg: 180,
        };
        let (topic, payload) = encode(&record, "fb/b", ts(), -80, 5);
        let decoded = decode(&topic, &payload).unwrap();
        match decoded {
            EntityRecord::Thermal { quality, climb_dms, .. } => {
                assert_eq!(quality, 4);
                assert_eq!(climb_dms, 35);
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn short_frame_is_rejected() {
        let err = decode("fb/b/abc123/f/1", &[0u8; 4]).unwrap_err();
        assert_eq!(err, ParseError::ShortFrame);
    }

    #[test]
    fn topic_type_mismatch_is_rejected() {
        let record = EntityRecord::Thermal {
            address: DeviceAddress::new(1).unwrap(),
            position: GeoPoint::new(0.0, 0.0),
            timestamp: ts(),
            quality: 1,
            climb_dms: 0,
            wind_speed_ms: 0.0,
            wind_heading_deg: 0,
        };
        let (_, payload) = encode(&record, "fb/b", ts(), 0, 0);
        let err = decode("fb/b/000001/f/1", &payload).unwrap_err();
        assert_eq!(err, ParseError::TypeMismatch);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut payload = vec![0u8; 8];
        payload.push(0x0F); // type 15, unused
        payload.extend_from_slice(&[1, 0, 0]);
        payload.extend_from_slice(&[0u8; 8]);
        let err = decode("fb/b/1/f/15", &payload).unwrap_err();
        assert_eq!(err, ParseError::UnknownType);
    }
}
