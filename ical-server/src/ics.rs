//! iCalendar serialization.
//!
//! Emits RFC 5545 text with CRLF line endings, a VTIMEZONE block for
//! America/New_York, property value escaping and 75-octet line folding.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::events::CalendarEvent;

const PRODID: &str = "-//mbta-cr-ical//EN";
const TZID: &str = "America/New_York";

/// Serialize events into a complete VCALENDAR document.
pub fn build_calendar(events: &[CalendarEvent], generated_at: DateTime<Utc>) -> String {
    let mut lines = calendar_header();
    let stamp = format_utc(generated_at);
    for event in events {
        lines.push("BEGIN:VEVENT".to_string());
        lines.push(fold_line(&format!("UID:{}", escape_text(&event.uid))));
        lines.push(fold_line(&format!("SUMMARY:{}", escape_text(&event.summary))));
        lines.push(fold_line(&format!(
            "DESCRIPTION:{}",
            escape_text(&event.description)
        )));
        lines.push(fold_line(&format!(
            "LOCATION:{}",
            escape_text(&event.location)
        )));
        lines.push(format!("DTSTAMP:{stamp}"));
        lines.push(format!("DTSTART;TZID={TZID}:{}", format_local(event.start)));
        lines.push(format!("DTEND;TZID={TZID}:{}", format_local(event.end)));
        lines.push(format!("STATUS:{}", event.status));
        lines.push("END:VEVENT".to_string());
    }
    lines.push("END:VCALENDAR".to_string());
    finish(lines)
}

/// A single all-day tentative event announcing that live data was
/// unavailable, so subscribed clients keep their last good copy visible.
pub fn build_outage_calendar(message: &str, generated_at: DateTime<Utc>) -> String {
    let local_date = generated_at.with_timezone(&crate::EASTERN).date_naive();
    let date = local_date.format("%Y%m%d").to_string();
    let next = local_date + chrono::Duration::days(1);
    let mut lines = calendar_header();
    lines.push("BEGIN:VEVENT".to_string());
    lines.push(fold_line(&format!("UID:mbta-outage-{local_date}")));
    lines.push("SUMMARY:MBTA Commuter Rail schedule unavailable".to_string());
    lines.push(fold_line(&format!("DESCRIPTION:{}", escape_text(message))));
    lines.push("LOCATION:MBTA Commuter Rail".to_string());
    lines.push(format!("DTSTAMP:{}", format_utc(generated_at)));
    lines.push(format!("DTSTART;VALUE=DATE:{date}"));
    lines.push(format!("DTEND;VALUE=DATE:{}", next.format("%Y%m%d")));
    lines.push("STATUS:TENTATIVE".to_string());
    lines.push("TRANSP:TRANSPARENT".to_string());
    lines.push("END:VEVENT".to_string());
    lines.push("END:VCALENDAR".to_string());
    finish(lines)
}

fn calendar_header() -> Vec<String> {
    vec![
        "BEGIN:VCALENDAR".to_string(),
        format!("PRODID:{PRODID}"),
        "VERSION:2.0".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
        "REFRESH-INTERVAL;VALUE=DURATION:P1D".to_string(),
        "X-PUBLISHED-TTL;VALUE=DURATION:P1D".to_string(),
        "BEGIN:VTIMEZONE".to_string(),
        format!("TZID:{TZID}"),
        "BEGIN:STANDARD".to_string(),
        "DTSTART:20071104T020000".to_string(),
        "RRULE:FREQ=YEARLY;BYMONTH=11;BYDAY=1SU".to_string(),
        "TZOFFSETFROM:-0400".to_string(),
        "TZOFFSETTO:-0500".to_string(),
        "TZNAME:EST".to_string(),
        "END:STANDARD".to_string(),
        "BEGIN:DAYLIGHT".to_string(),
        "DTSTART:20070311T020000".to_string(),
        "RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=2SU".to_string(),
        "TZOFFSETFROM:-0500".to_string(),
        "TZOFFSETTO:-0400".to_string(),
        "TZNAME:EDT".to_string(),
        "END:DAYLIGHT".to_string(),
        "END:VTIMEZONE".to_string(),
    ]
}

fn finish(lines: Vec<String>) -> String {
    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

fn format_local(instant: DateTime<Tz>) -> String {
    instant.format("%Y%m%dT%H%M%S").to_string()
}

fn format_utc(instant: DateTime<Utc>) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Escape TEXT property values per RFC 5545 section 3.3.11.
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Fold a content line so no physical line exceeds 75 octets, splitting
/// only at character boundaries. Continuation lines start with a space.
fn fold_line(line: &str) -> String {
    const LIMIT: usize = 75;
    if line.len() <= LIMIT {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / LIMIT * 3);
    let mut width = 0;
    let mut budget = LIMIT;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > budget {
            out.push_str("\r\n ");
            width = 0;
            // One octet of each continuation line is the leading space.
            budget = LIMIT - 1;
        }
        out.push(c);
        width += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EASTERN;
    use chrono::TimeZone;

    fn event() -> CalendarEvent {
        let start = EASTERN.with_ymd_and_hms(2024, 4, 1, 7, 15, 0).unwrap();
        CalendarEvent {
            uid: "mbta-CR-Franklin-Trip-1-place-forgp-2024-04-01".to_string(),
            start,
            end: start + chrono::Duration::minutes(50),
            summary: "CR Franklin – Trip Trip-1 – Inbound – 7:15 AM".to_string(),
            description: "Route: Franklin/Foxboro Line\nTrip: Trip-1".to_string(),
            location: "Franklin/Foxboro Line – Forge Park/495".to_string(),
            status: "CONFIRMED",
        }
    }

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn calendar_structure() {
        let text = build_calendar(&[event()], stamp());
        assert!(text.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(text.ends_with("END:VCALENDAR\r\n"));
        assert!(text.contains("PRODID:-//mbta-cr-ical//EN\r\n"));
        assert!(text.contains("X-PUBLISHED-TTL;VALUE=DURATION:P1D\r\n"));
        assert!(text.contains("TZID:America/New_York\r\n"));
        assert!(text.contains("RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=2SU\r\n"));
        assert!(text.contains("DTSTART;TZID=America/New_York:20240401T071500\r\n"));
        assert!(text.contains("DTEND;TZID=America/New_York:20240401T080500\r\n"));
        assert!(text.contains("DTSTAMP:20240401T120000Z\r\n"));
        assert!(text.contains("STATUS:CONFIRMED\r\n"));
    }

    #[test]
    fn empty_calendar_has_no_events() {
        let text = build_calendar(&[], stamp());
        assert!(!text.contains("BEGIN:VEVENT"));
        assert!(text.contains("END:VTIMEZONE\r\n"));
    }

    #[test]
    fn text_escaping() {
        assert_eq!(escape_text("a;b,c\\d"), "a\\;b\\,c\\\\d");
        assert_eq!(escape_text("line one\nline two"), "line one\\nline two");
        assert_eq!(escape_text("crlf\r\nhere"), "crlf\\nhere");
    }

    #[test]
    fn folding_limits_physical_lines() {
        let long = format!("DESCRIPTION:{}", "x".repeat(300));
        let folded = fold_line(&long);
        for physical in folded.split("\r\n") {
            assert!(physical.len() <= 75, "line too long: {}", physical.len());
        }
        // Unfolding restores the original.
        assert_eq!(folded.replace("\r\n ", ""), long);
    }

    #[test]
    fn folding_respects_char_boundaries() {
        let long = format!("SUMMARY:{}", "é".repeat(100));
        let folded = fold_line(&long);
        for physical in folded.split("\r\n") {
            assert!(physical.len() <= 75);
        }
        assert_eq!(folded.replace("\r\n ", ""), long);
    }

    #[test]
    fn short_lines_are_untouched() {
        assert_eq!(fold_line("SUMMARY:short"), "SUMMARY:short");
    }

    #[test]
    fn outage_calendar_is_all_day_and_tentative() {
        let text = build_outage_calendar("MBTA API unreachable", stamp());
        assert!(text.contains("UID:mbta-outage-2024-04-01\r\n"));
        assert!(text.contains("DTSTART;VALUE=DATE:20240401\r\n"));
        assert!(text.contains("DTEND;VALUE=DATE:20240402\r\n"));
        assert!(text.contains("LOCATION:MBTA Commuter Rail\r\n"));
        assert!(text.contains("STATUS:TENTATIVE\r\n"));
        assert!(text.contains("TRANSP:TRANSPARENT\r\n"));
        assert!(text.contains("DESCRIPTION:MBTA API unreachable\r\n"));
    }
}
