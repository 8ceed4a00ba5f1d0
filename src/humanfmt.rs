use std::time::Duration;

#[must_use]
pub(crate) enum HumanFmt {
    Size(u64),
    Time(Duration),
    Rate(u64, Duration),
}

fn write_scaled(
    f: &mut std::fmt::Formatter<'_>,
    value: f64,
    units: &[&str],
    suffix: &str,
) -> std::fmt::Result {
    let mut value = value;
    let mut unit = units[0];

    for next in &units[1..] {
        if value < 1000.0 {
            break;
        }
        value /= 1000.0;
        unit = next;
    }

    let precision = if value >= 100.0 {
        0
    } else if value >= 10.0 {
        1
    } else {
        2
    };

    write!(f, "{value:.precision$}{unit}{suffix}")
}

impl std::fmt::Display for HumanFmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        #[expect(clippy::cast_precision_loss)]
        match *self {
            Self::Size(bytes) => {
                if bytes < 1000 {
                    return write!(f, "{bytes}B");
                }
                write_scaled(f, bytes as f64, &["B", "kB", "MB", "GB", "TB", "PB"], "")
            }
            Self::Rate(bytes, elapsed) => {
                let secs = elapsed.as_secs_f64();
                if secs == 0.0 {
                    return write!(f, "???B/s");
                }
                write_scaled(
                    f,
                    bytes as f64 / secs,
                    &["B", "kB", "MB", "GB", "TB", "PB"],
                    "/s",
                )
            }
            Self::Time(elapsed) => {
                if elapsed < Duration::from_secs(1) {
                    let millis = elapsed.as_secs_f64() * 1000.0;
                    return write!(f, "{millis:.0}ms");
                }
                if elapsed < Duration::from_secs(600) {
                    return write!(f, "{:.1}s", elapsed.as_secs_f64());
                }
                let total = elapsed.as_secs();
                let (secs, mins, hours) = (total % 60, (total / 60) % 60, total / 3600);
                if hours != 0 {
                    write!(f, "{hours}h{mins}m{secs}s")
                } else {
                    write!(f, "{mins}m{secs}s")
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_size() {
        assert_eq!(format!("{}", HumanFmt::Size(0)), "0B");
        assert_eq!(format!("{}", HumanFmt::Size(999)), "999B");
        assert_eq!(format!("{}", HumanFmt::Size(1000)), "1.00kB");
        assert_eq!(format!("{}", HumanFmt::Size(55_500)), "55.5kB");
        assert_eq!(format!("{}", HumanFmt::Size(123_456_789)), "123MB");
        assert_eq!(format!("{}", HumanFmt::Size(9_500_000_000)), "9.50GB");
    }

    #[test]
    fn test_rate() {
        assert_eq!(
            format!("{}", HumanFmt::Rate(1000, Duration::ZERO)),
            "???B/s"
        );
        assert_eq!(
            format!("{}", HumanFmt::Rate(500, Duration::from_secs(1))),
            "500B/s"
        );
        assert_eq!(
            format!("{}", HumanFmt::Rate(10_000_000, Duration::from_secs(4))),
            "2.50MB/s"
        );
    }

    #[test]
    fn test_time() {
        assert_eq!(
            format!("{}", HumanFmt::Time(Duration::from_millis(12))),
            "12ms"
        );
        assert_eq!(
            format!("{}", HumanFmt::Time(Duration::from_millis(2500))),
            "2.5s"
        );
        assert_eq!(
            format!("{}", HumanFmt::Time(Duration::from_secs(601))),
            "10m1s"
        );
        assert_eq!(
            format!("{}", HumanFmt::Time(Duration::from_secs(3601))),
            "1h0m1s"
        );
    }
}
