//! Time formatting for logs, manifests and subtitle documents.

/// Format seconds into HH:MM:SS or HH:MM:SS.mmm string.
pub fn format_seconds(total_secs: f64) -> String {
    let total_secs = total_secs.max(0.0);
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    // Include milliseconds if present
    if (secs - secs.floor()).abs() > 0.0001 {
        format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, mins, secs.floor() as u32)
    }
}

/// Format seconds as an ASS subtitle time (`H:MM:SS.cc`, centisecond precision).
pub fn format_ass_time(total_secs: f64) -> String {
    let total_cs = (total_secs.max(0.0) * 100.0).round() as u64;
    let h = total_cs / 360_000;
    let m = (total_cs % 360_000) / 6_000;
    let s = (total_cs % 6_000) / 100;
    let cs = total_cs % 100;
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(90.0), "00:01:30");
        assert_eq!(format_seconds(3723.5), "01:02:03.500");
        assert_eq!(format_seconds(-4.0), "00:00:00");
    }

    #[test]
    fn test_format_ass_time() {
        assert_eq!(format_ass_time(0.0), "0:00:00.00");
        assert_eq!(format_ass_time(4.1), "0:00:04.10");
        assert_eq!(format_ass_time(61.257), "0:01:01.26");
        assert_eq!(format_ass_time(3600.0), "1:00:00.00");
    }
}
