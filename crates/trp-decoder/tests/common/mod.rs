//! Fixture builders for synthetic TRP archives
#![allow(dead_code)]

use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::Write;
use std::path::Path;
use trp_decoder::wire::encode_varint;
use zip::write::SimpleFileOptions;

pub const RSRP: &str = "Radio.Lte.ServingCell.Rsrp";
pub const CALL_EVENT: &str = "VoLTE.Call.Event";
pub const EPOCH: u64 = 1_733_530_000;
pub const EPOCH_ISO: &str = "2024-12-07T00:06:40.000Z";

pub fn varint(value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    encode_varint(value, &mut out);
    out
}

pub fn field_varint(number: u64, value: u64) -> Vec<u8> {
    let mut out = varint(number << 3);
    out.extend(varint(value));
    out
}

pub fn field_bytes(number: u64, payload: &[u8]) -> Vec<u8> {
    let mut out = varint((number << 3) | 2);
    out.extend(varint(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

pub fn field_f32(number: u64, value: f32) -> Vec<u8> {
    let mut out = varint((number << 3) | 5);
    out.extend_from_slice(&value.to_le_bytes());
    out
}

pub fn concat(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}

pub fn u32_framed(records: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for record in records {
        out.extend_from_slice(&(record.len() as u32).to_le_bytes());
        out.extend_from_slice(record);
    }
    out
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Declarations in the flat `name 0x10 id` layout only the text scan understands
pub fn flat_declarations(entries: &[(&str, u64)]) -> Vec<u8> {
    let mut out = vec![0u8, 0u8];
    for (name, id) in entries {
        out.extend_from_slice(name.as_bytes());
        out.push(0x10);
        out.extend(varint(*id));
        out.push(0);
    }
    out
}

/// Declarations as one length-delimited record each: name, id, dtype, optional lookup
pub fn structured_declarations(entries: &[(&str, u64, &str, Option<&str>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, id, dtype, lookup) in entries {
        let mut record = field_bytes(1, name.as_bytes());
        record.extend(field_varint(2, *id));
        record.extend(field_bytes(3, dtype.as_bytes()));
        if let Some(table) = lookup {
            record.extend(field_bytes(4, table.as_bytes()));
        }
        out.extend(field_bytes(1, &record));
    }
    out
}

pub fn lookup_table(name: &str, entries: &[(u64, &str)]) -> Vec<u8> {
    let mut table = field_bytes(1, name.as_bytes());
    for (value, label) in entries {
        let entry = concat(&[&field_varint(1, *value), &field_bytes(2, label.as_bytes())]);
        table.extend(field_bytes(2, &entry));
    }
    field_bytes(1, &table)
}

/// Raw channel record: declared id, a float value and an epoch timestamp
pub fn rsrp_record(id: u64, value: f32, epoch: Option<u64>) -> Vec<u8> {
    let mut out = field_varint(1, id);
    out.extend(field_f32(2, value));
    if let Some(epoch) = epoch {
        out.extend(field_varint(3, epoch));
    }
    out
}

pub fn track_xml(points: &[(f64, f64, &str)]) -> Vec<u8> {
    let mut xml = String::from(r#"<?xml version="1.0"?><gpx><trk><trkseg>"#);
    for (lat, lon, time) in points {
        xml.push_str(&format!(r#"<trkpt lat="{lat}" lon="{lon}"><time>{time}</time></trkpt>"#));
    }
    xml.push_str("</trkseg></trk></gpx>");
    xml.into_bytes()
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, body) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap();
}
