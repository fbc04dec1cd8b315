//! Parser for the bikeStations XML feed format.
//!
//! Fields are looked up by tag name rather than by child position, because
//! systems differ in tag order and occasionally in tag names.

use crate::constants::tags;
use crate::error::{CollectorError, Result};
use crate::models::{FeedPayload, StationRecord, Timestamp, timestamp_from_millis};
use roxmltree::{Document, Node};
use std::str::FromStr;
use tracing::{trace, warn};

/// Parse a full feed document into station records keyed by id
///
/// # Errors
/// * `Parse` if the document is not XML or the root carries no refresh time
pub fn parse_station_xml(text: &str) -> Result<FeedPayload> {
    let doc = Document::parse(text)
        .map_err(|e| CollectorError::parse(format!("invalid XML: {}", e)))?;
    let root = doc.root_element();

    let last_updated = tags::FEED_LAST_UPDATE
        .iter()
        .find_map(|name| root.attribute(*name))
        .ok_or_else(|| {
            CollectorError::parse(format!(
                "root element <{}> has no last-update attribute",
                root.tag_name().name()
            ))
        })
        .and_then(parse_millis)?;

    let mut payload = FeedPayload {
        last_updated: Some(last_updated),
        ..Default::default()
    };

    for station in root.children().filter(|n| n.has_tag_name(tags::STATION)) {
        if !is_installed(station) {
            trace!("Skipping uninstalled station element");
            continue;
        }
        match parse_station(station, last_updated) {
            Some(record) => {
                payload.stations.insert(record.id, record);
            }
            None => warn!("Skipping station element without a valid id"),
        }
    }

    Ok(payload)
}

fn parse_station(station: Node<'_, '_>, feed_last_updated: Timestamp) -> Option<StationRecord> {
    let id = field(station, tags::ID)?;

    let last_update_time = tags::LAST_UPDATE_TIME
        .iter()
        .find_map(|tag| child_text(station, tag))
        .and_then(|text| parse_millis(text).ok())
        .unwrap_or(feed_last_updated);

    Some(StationRecord {
        id,
        name: child_text(station, tags::NAME).map(str::to_string),
        lat: field(station, tags::LAT),
        lon: field(station, tags::LON),
        bikes: field(station, tags::BIKES),
        empty_docks: field(station, tags::EMPTY_DOCKS),
        last_update_time: Some(last_update_time),
        last_comm_time: child_text(station, tags::LAST_COMM).and_then(|t| parse_millis(t).ok()),
    })
}

/// Stations are installed unless the feed says otherwise
fn is_installed(station: Node<'_, '_>) -> bool {
    child_text(station, tags::INSTALLED)
        .and_then(|text| text.chars().next())
        .is_none_or(|c| !c.eq_ignore_ascii_case(&'f'))
}

fn child_text<'a>(station: Node<'a, '_>, tag: &str) -> Option<&'a str> {
    station
        .children()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

fn field<T: FromStr>(station: Node<'_, '_>, tag: &str) -> Option<T> {
    child_text(station, tag).and_then(|text| text.parse().ok())
}

fn parse_millis(text: &str) -> Result<Timestamp> {
    text.trim()
        .parse::<i64>()
        .ok()
        .and_then(timestamp_from_millis)
        .ok_or_else(|| CollectorError::parse(format!("invalid epoch milliseconds '{}'", text)))
}
