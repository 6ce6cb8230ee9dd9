//! Streaming parser for `positions/wptrack.xml`
//!
//! The track file is GPX-like but not strictly GPX: point elements may be `trkpt`,
//! `wpt` or any `*point`, and coordinates may be spelled out as `latitude`/`longitude`.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::path::Path;
use tracing::{debug, warn};

use crate::models::TrackPoint;
use crate::utils::time::{format_timestamp, parse_timestamp};

/// Points read from a track file, plus a warning when parsing stopped early
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackParse {
    pub points: Vec<TrackPoint>,
    pub warning: Option<String>,
}

impl TrackParse {
    /// Earliest parseable point time
    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.points
            .iter()
            .filter_map(|p| p.time.as_deref().and_then(parse_timestamp))
            .min()
    }
}

#[derive(Debug, Default)]
struct PendingPoint {
    lat: f64,
    lon: f64,
    time: Option<String>,
    alt: Option<f64>,
    speed: Option<f64>,
}

impl PendingPoint {
    fn finish(self) -> TrackPoint {
        TrackPoint {
            time: self.time,
            lat: self.lat,
            lon: self.lon,
            alt: self.alt,
            speed: self.speed,
        }
    }
}

fn is_point_element(local_name: &str) -> bool {
    local_name.ends_with("trkpt") || local_name.ends_with("wpt") || local_name.ends_with("point")
}

fn local_name_lower(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase()
}

/// Coordinates from `lat`/`lon` (or `latitude`/`longitude`); `None` when either is missing
/// or unparseable
fn coordinates(e: &BytesStart<'_>) -> Option<(f64, f64)> {
    let mut lat = None;
    let mut lon = None;
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_lowercase();
        let Ok(value) = std::str::from_utf8(&attr.value) else {
            continue;
        };
        match key.as_str() {
            "lat" | "latitude" if lat.is_none() => lat = Some(value.trim().to_string()),
            "lon" | "longitude" if lon.is_none() => lon = Some(value.trim().to_string()),
            _ => {}
        }
    }
    let lat: f64 = lat?.parse().ok()?;
    let lon: f64 = lon?.parse().ok()?;
    (lat.is_finite() && lon.is_finite()).then_some((lat, lon))
}

fn normalize_time(text: &str) -> String {
    parse_timestamp(text)
        .map(format_timestamp)
        .unwrap_or_else(|| text.to_string())
}

/// Parse track XML from a string
pub fn parse_track(content: &str) -> TrackParse {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut out = TrackParse::default();
    let mut current: Option<PendingPoint> = None;
    let mut point_depth = 0usize;
    let mut child: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = local_name_lower(e);
                if current.is_some() {
                    point_depth += 1;
                    child = Some(name);
                } else if is_point_element(&name) {
                    current = coordinates(e).map(|(lat, lon)| PendingPoint {
                        lat,
                        lon,
                        ..PendingPoint::default()
                    });
                    point_depth = 0;
                }
            }
            Ok(Event::Empty(ref e)) => {
                if current.is_none()
                    && is_point_element(&local_name_lower(e))
                    && let Some((lat, lon)) = coordinates(e)
                {
                    out.points.push(TrackPoint {
                        time: None,
                        lat,
                        lon,
                        alt: None,
                        speed: None,
                    });
                }
            }
            Ok(Event::Text(e)) => {
                let (Some(point), Some(tag)) = (current.as_mut(), child.as_deref()) else {
                    continue;
                };
                let Ok(text) = std::str::from_utf8(&e) else {
                    continue;
                };
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if tag.ends_with("time") {
                    point.time = Some(normalize_time(text));
                } else if tag.ends_with("speed") {
                    point.speed = text.parse().ok().or(point.speed);
                } else if tag.ends_with("ele") {
                    point.alt = text.parse().ok().or(point.alt);
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                if current.is_some() && point_depth > 0 {
                    point_depth -= 1;
                    child = None;
                } else if is_point_element(&name) {
                    if let Some(point) = current.take() {
                        out.points.push(point.finish());
                    }
                    child = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                let message = format!(
                    "track XML error at position {}: {}",
                    reader.error_position(),
                    e
                );
                warn!("{}", message);
                out.warning = Some(message);
                break;
            }
            _ => {}
        }
    }

    debug!("Parsed {} track points", out.points.len());
    out
}

/// Parse a track file; a missing file yields no points and no warning
pub fn parse_track_file(path: &Path) -> TrackParse {
    if !path.is_file() {
        return TrackParse::default();
    }
    match std::fs::read(path) {
        Ok(bytes) => parse_track(&String::from_utf8_lossy(&bytes)),
        Err(e) => TrackParse {
            points: Vec::new(),
            warning: Some(format!("track file unreadable: {e}")),
        },
    }
}
