//! Netconsole datagram decoding.
//!
//! The kernel sends one log message per datagram, in one of two layouts:
//!
//! - classic: `[<seconds>.<fraction>] <message>`, with the printk timestamp left-padded with spaces
//! - extended: `<level>,<sequence>,<microseconds>,<flags>;<message>`, optionally followed by continuation lines
//!
//! In both cases the timestamp is the time elapsed since the sender booted.

use std::time::Duration;

use netconsoled_core::record::LogEntry;

/// Decodes a single netconsole datagram.
///
/// Returns `None` if the datagram is in neither the classic nor the extended layout.
pub fn decode(datagram: &[u8]) -> Option<LogEntry> {
    let text = String::from_utf8_lossy(datagram);
    let text = text.trim_end_matches(['\r', '\n']);

    decode_classic(text).or_else(|| decode_extended(text))
}

fn decode_classic(text: &str) -> Option<LogEntry> {
    let (timestamp, message) = text.strip_prefix('[')?.split_once(']')?;
    let elapsed = parse_seconds(timestamp.trim_start())?;
    let message = message.strip_prefix(' ').unwrap_or(message);

    Some(LogEntry::new(elapsed, message))
}

fn decode_extended(text: &str) -> Option<LogEntry> {
    let (header, body) = text.split_once(';')?;

    let mut fields = header.split(',');
    let _level = fields.next()?.parse::<u32>().ok()?;
    let _sequence = fields.next()?.parse::<u64>().ok()?;
    let micros = fields.next()?.parse::<u64>().ok()?;

    // Continuation lines carry key/value metadata rather than message text.
    let message = body.lines().next().unwrap_or_default();

    Some(LogEntry::new(Duration::from_micros(micros), message))
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let (seconds, fraction) = value.split_once('.')?;
    if !is_digits(seconds) || !is_digits(fraction) || fraction.len() > 9 {
        return None;
    }

    let seconds = seconds.parse::<u64>().ok()?;
    let nanos = fraction.parse::<u32>().ok()? * 10u32.pow(9 - fraction.len() as u32);

    Some(Duration::new(seconds, nanos))
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
