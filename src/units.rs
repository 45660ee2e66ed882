//! Resource spec parsing and human-readable formatting.
//!
//! Memory specs follow `<number><unit>` with unit in {none=MB, K, M, G, T},
//! case-insensitive. CPU specs are an integer count or a percentage of the
//! detected total (e.g. "50%").

use sysinfo::System;

use crate::error::{Error, Result};

/// Parse a memory spec into whole megabytes.
///
/// A bare number is interpreted as MB. Fractional values are rounded up so a
/// spec like "0.5K" never collapses to zero while a value is present.
pub fn parse_memory(spec: &str) -> Result<u64> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(Error::InvalidSpec("empty memory spec".to_string()));
    }

    let (number, unit) = match spec.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&spec[..idx], Some(c.to_ascii_uppercase())),
        _ => (spec, None),
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| Error::InvalidSpec(format!("unparsable memory spec: {spec}")))?;
    if value < 0.0 {
        return Err(Error::InvalidSpec(format!(
            "memory spec must be non-negative: {spec}"
        )));
    }

    let mb = match unit {
        None | Some('M') => value,
        Some('K') => value / 1024.0,
        Some('G') => value * 1024.0,
        Some('T') => value * 1024.0 * 1024.0,
        Some(other) => {
            return Err(Error::InvalidSpec(format!(
                "unknown memory unit '{other}' in spec: {spec}"
            )))
        }
    };

    Ok(mb.ceil() as u64)
}

/// Parse a CPU spec: either an integer core count or a percentage of `total`.
pub fn parse_cpus(spec: &str, total: u32) -> Result<u32> {
    let spec = spec.trim();
    let count = if let Some(percent) = spec.strip_suffix('%') {
        let value: f64 = percent
            .trim()
            .parse()
            .map_err(|_| Error::InvalidSpec(format!("unparsable cpu spec: {spec}")))?;
        if value <= 0.0 {
            return Err(Error::InvalidSpec(format!(
                "cpu percentage must be positive: {spec}"
            )));
        }
        ((f64::from(total) * value / 100.0).round() as u32).max(1)
    } else {
        spec.parse::<u32>()
            .map_err(|_| Error::InvalidSpec(format!("unparsable cpu spec: {spec}")))?
    };

    if count == 0 {
        return Err(Error::InvalidSpec(format!(
            "cpu count must be at least 1: {spec}"
        )));
    }
    Ok(count)
}

/// Format a megabyte quantity for log lines and summaries.
pub fn format_memory(mb: f64) -> String {
    if mb >= 1024.0 * 1024.0 {
        format!("{:.1}T", mb / (1024.0 * 1024.0))
    } else if mb >= 1024.0 {
        format!("{:.1}G", mb / 1024.0)
    } else {
        format!("{mb:.1}M")
    }
}

/// Format a duration in seconds as a short human-readable string.
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        let minutes = (secs / 60.0).floor();
        format!("{minutes:.0}m {:.0}s", secs - minutes * 60.0)
    } else {
        let hours = (secs / 3600.0).floor();
        let minutes = ((secs - hours * 3600.0) / 60.0).floor();
        format!("{hours:.0}h {minutes:.0}m")
    }
}

/// Detect total CPU count and currently available memory (MB).
pub fn system_resources() -> (u32, u64) {
    let mut sys = System::new_all();
    sys.refresh_memory();
    let cpus = sys.cpus().len().max(1) as u32;
    let memory_mb = sys.available_memory() / (1024 * 1024);
    (cpus, memory_mb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_memory_bare_number_is_mb() {
        assert_eq!(parse_memory("512").unwrap(), 512);
    }

    #[test]
    fn parse_memory_units() {
        assert_eq!(parse_memory("512M").unwrap(), 512);
        assert_eq!(parse_memory("2G").unwrap(), 2048);
        assert_eq!(parse_memory("1T").unwrap(), 1024 * 1024);
        assert_eq!(parse_memory("2048K").unwrap(), 2);
    }

    #[test]
    fn parse_memory_case_insensitive() {
        assert_eq!(parse_memory("1g").unwrap(), 1024);
        assert_eq!(parse_memory("100m").unwrap(), 100);
    }

    #[test]
    fn parse_memory_fractional_rounds_up() {
        assert_eq!(parse_memory("1.5G").unwrap(), 1536);
        assert_eq!(parse_memory("0.5K").unwrap(), 1);
    }

    #[test]
    fn parse_memory_rejects_garbage() {
        assert!(parse_memory("").is_err());
        assert!(parse_memory("abc").is_err());
        assert!(parse_memory("12X").is_err());
        assert!(parse_memory("-1G").is_err());
    }

    #[test]
    fn parse_cpus_integer() {
        assert_eq!(parse_cpus("4", 16).unwrap(), 4);
    }

    #[test]
    fn parse_cpus_percentage() {
        assert_eq!(parse_cpus("50%", 16).unwrap(), 8);
        assert_eq!(parse_cpus("1%", 16).unwrap(), 1); // floored at one core
    }

    #[test]
    fn parse_cpus_rejects_zero_and_garbage() {
        assert!(parse_cpus("0", 16).is_err());
        assert!(parse_cpus("-5%", 16).is_err());
        assert!(parse_cpus("many", 16).is_err());
    }

    #[test]
    fn format_memory_scales() {
        assert_eq!(format_memory(512.0), "512.0M");
        assert_eq!(format_memory(2048.0), "2.0G");
        assert_eq!(format_memory(1024.0 * 1024.0 * 1.5), "1.5T");
    }

    #[test]
    fn format_duration_scales() {
        assert_eq!(format_duration(3.25), "3.2s");
        assert_eq!(format_duration(125.0), "2m 5s");
        assert_eq!(format_duration(7500.0), "2h 5m");
    }

    #[test]
    fn system_resources_detects_something() {
        let (cpus, memory_mb) = system_resources();
        assert!(cpus >= 1);
        assert!(memory_mb > 0);
    }
}
