// src/usage/format.rs

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// Human readable size in binary units: `512B`, `1.50KB`, `15.25MB`, `2.00GB`.
pub fn human_size(bytes: u64) -> String {
    if bytes < KIB {
        format!("{}B", bytes)
    } else if bytes < MIB {
        format!("{:.2}KB", bytes as f64 / KIB as f64)
    } else if bytes < GIB {
        format!("{:.2}MB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.2}GB", bytes as f64 / GIB as f64)
    }
}

/// Size in megabytes with two fraction digits, whatever the magnitude.
pub fn usage_mb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / MIB as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_bytes() {
        assert_eq!(human_size(0), "0B");
        assert_eq!(usage_mb(0), "0.00");
    }

    #[test]
    fn unit_thresholds() {
        assert_eq!(human_size(1023), "1023B");
        assert_eq!(human_size(1024), "1.00KB");
        assert_eq!(human_size(1536), "1.50KB");
        assert_eq!(human_size(MIB - 1), "1024.00KB");
        assert_eq!(human_size(MIB), "1.00MB");
        assert_eq!(human_size(GIB - 1), "1024.00MB");
        assert_eq!(human_size(GIB), "1.00GB");
        assert_eq!(human_size(5 * GIB + GIB / 2), "5.50GB");
    }

    #[test]
    fn every_size_gets_exactly_one_suffix() {
        for bytes in [0, 1, 1023, 1024, 70_000, MIB, 300 * MIB, GIB, 40 * GIB] {
            let human = human_size(bytes);
            let suffixes = ["GB", "MB", "KB"]
                .iter()
                .filter(|s| human.ends_with(*s))
                .count();
            let plain_bytes = usize::from(bytes < KIB && human.ends_with('B'));
            assert_eq!(suffixes + plain_bytes, 1, "{} -> {}", bytes, human);
        }
    }

    #[test]
    fn megabytes_match_human_string_below_a_gigabyte() {
        assert_eq!(human_size(15_990_000), "15.25MB");
        assert_eq!(usage_mb(15_990_000), "15.25");
    }

    #[test]
    fn megabytes_stay_in_megabytes_above_a_gigabyte() {
        let bytes = 3 * GIB;
        assert_eq!(human_size(bytes), "3.00GB");
        assert_eq!(usage_mb(bytes), "3072.00");

        let human: f64 = human_size(bytes).trim_end_matches("GB").parse().unwrap();
        let mb: f64 = usage_mb(bytes).parse().unwrap();
        assert_eq!(human * 1024.0, mb);
    }
}
