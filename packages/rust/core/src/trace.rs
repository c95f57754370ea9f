//! Trace ids that tie log lines of one collection together.

use chrono::{DateTime, Local};
use uuid::Uuid;

const ITEM_MARKER: &str = "_item_";

/// `<prefix>_<yymmddHHMMSS>_<8 hex chars>`
pub fn generate_trace_id(prefix: &str, now: DateTime<Local>) -> String {
    let short = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}_{}", now.format("%y%m%d%H%M%S"), &short[..8])
}

/// Trace id for item `index` of a batch: `<batch>_item_<index:05>`.
///
/// An item id passed as `batch` is reduced to its batch id first.
pub fn item_trace_id(batch: &str, index: usize) -> String {
    let base = batch.split(ITEM_MARKER).next().unwrap_or(batch);
    format!("{base}{ITEM_MARKER}{index:05}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn trace_id_layout() {
        let now = Local.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        let id = generate_trace_id("collect", now);

        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "collect");
        assert_eq!(parts[1], "250309140507");
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn trace_ids_differ() {
        let now = Local::now();
        assert_ne!(generate_trace_id("t", now), generate_trace_id("t", now));
    }

    #[test]
    fn item_ids_do_not_nest() {
        let item = item_trace_id("collect_250309140507_abcd1234", 3);
        assert_eq!(item, "collect_250309140507_abcd1234_item_00003");
        assert_eq!(
            item_trace_id(&item, 12),
            "collect_250309140507_abcd1234_item_00012"
        );
    }
}
