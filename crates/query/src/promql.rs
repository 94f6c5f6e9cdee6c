//! Query strings sent to the time-series backend.

pub fn sum_rate(sum_by: &str, metric: &str, range: &str) -> String {
    format!("sum by ({sum_by}) (rate({metric}[{range}]))")
}

pub fn histogram_quantile(q: f64, metric: &str, range: &str) -> String {
    format!("histogram_quantile({q:.6}, sum(increase({metric}[{range}])) by (le))")
}

/// Parse a range selector such as `5m`, `1h`, `1d` or `1w` into seconds.
pub fn range_seconds(range: &str) -> Option<u64> {
    let range = range.trim();
    let split = range.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = range.split_at(split);
    let n: u64 = digits.parse().ok()?;
    let unit_secs = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        "w" => 7 * 86_400,
        "y" => 365 * 86_400,
        _ => return None,
    };
    n.checked_mul(unit_secs)
}
