//! Utility functions and helpers
//!
//! Hex parsing for fixed-size fields, human-readable formatting for work
//! statistics, and the retry backoff calculator used by the RPC client.

use crate::{Error, Result};
use std::time::Duration;

/// Validate hex string format
pub fn validate_hex_string(field: &str, s: &str, expected_len: Option<usize>) -> Result<()> {
    if let Some(len) = expected_len {
        if s.len() != len {
            return Err(Error::invalid_hex(
                field,
                format!("expected {} characters, got {}", len, s.len()),
            ));
        }
    }

    if !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::invalid_hex(
            field,
            "string contains non-hexadecimal characters",
        ));
    }

    Ok(())
}

/// Decode a hex string into a fixed-size byte array
pub fn hex_to_array<const N: usize>(field: &str, s: &str) -> Result<[u8; N]> {
    validate_hex_string(field, s, Some(N * 2))?;
    let mut out = [0u8; N];
    hex::decode_to_slice(s, &mut out).map_err(|e| Error::invalid_hex(field, e.to_string()))?;
    Ok(out)
}

/// Encode bytes as uppercase hex, the form the node prints
pub fn bytes_to_hex_upper(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Format hash rate as a human-readable string
pub fn format_hash_rate(hashes_per_sec: f64) -> String {
    const UNITS: &[&str] = &["H/s", "KH/s", "MH/s", "GH/s", "TH/s"];
    let mut rate = hashes_per_sec;
    let mut unit_index = 0;

    while rate >= 1000.0 && unit_index < UNITS.len() - 1 {
        rate /= 1000.0;
        unit_index += 1;
    }

    format!("{:.2} {}", rate, UNITS[unit_index])
}

/// Format a duration with millisecond precision
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Exponential backoff calculator
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    current_attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff calculator
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            current_attempt: 0,
        }
    }

    /// Get the next delay
    pub fn next_delay(&mut self) -> Duration {
        let delay = if self.current_attempt == 0 {
            self.initial_delay
        } else {
            let exponential = (self.initial_delay.as_millis() as f64
                * self.multiplier.powi(self.current_attempt as i32)) as u64;
            Duration::from_millis(exponential)
        };

        self.current_attempt += 1;
        delay.min(self.max_delay)
    }

    /// Get current attempt number
    pub fn attempt(&self) -> u32 {
        self.current_attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_hex_string() {
        assert!(validate_hex_string("work", "deadbeef", Some(8)).is_ok());
        assert!(validate_hex_string("work", "DEADBEEF", Some(8)).is_ok());
        assert!(validate_hex_string("work", "123456789abcdef0", None).is_ok());

        assert!(validate_hex_string("work", "deadbeef", Some(10)).is_err());
        assert!(validate_hex_string("work", "deadbzzf", None).is_err());
        assert!(validate_hex_string("work", "", Some(1)).is_err());
    }

    #[test]
    fn test_hex_to_array() {
        let bytes: [u8; 4] = hex_to_array("field", "deadBEEF").unwrap();
        assert_eq!(bytes, [0xde, 0xad, 0xbe, 0xef]);

        let err = hex_to_array::<4>("previous", "dead").unwrap_err();
        assert!(matches!(err, Error::InvalidHex { ref field, .. } if field == "previous"));
    }

    #[test]
    fn test_bytes_to_hex_upper() {
        assert_eq!(bytes_to_hex_upper(&[0xde, 0xad, 0x01]), "DEAD01");
    }

    #[test]
    fn test_format_hash_rate() {
        assert_eq!(format_hash_rate(100.0), "100.00 H/s");
        assert_eq!(format_hash_rate(1500.0), "1.50 KH/s");
        assert_eq!(format_hash_rate(1_000_000.0), "1.00 MH/s");
        assert_eq!(format_hash_rate(1_500_000_000.0), "1.50 GH/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
    }

    #[test]
    fn test_exponential_backoff() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(5), 2.0);

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(800));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1600));
        assert_eq!(backoff.next_delay(), Duration::from_millis(3200));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5)); // Capped at max

        assert_eq!(backoff.attempt(), 7);
    }
}
