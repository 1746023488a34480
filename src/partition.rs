//! Partition suffix derivation and destination-table decoration.
//!
//! A partition suffix is the `YYYYMMDD` form of a run datetime; partitioned
//! destination tables are addressed as `table$YYYYMMDD`, which the engine's
//! partition routing understands natively.
//!
//! No validation happens here. Run datetimes are validated at the config
//! boundary before they ever reach this module.

/// Derives a `YYYYMMDD` partition suffix from a run datetime string
/// (`YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`), or `None` when the run datetime
/// is absent.
pub fn suffix_for(run_datetime: Option<&str>) -> Option<String> {
    run_datetime.map(|rt| rt.chars().take(10).filter(|c| *c != '-').collect())
}

/// Decorates a destination table name with a partition suffix.
///
/// When `partitioned` is true, appends `$suffix`, preferring the per-call
/// `custom_suffix` over the session's `base_suffix`. When false, the name is
/// returned unchanged (tmp tables are never partitioned).
pub fn decorate(
    table_name: &str,
    partitioned: bool,
    custom_suffix: Option<&str>,
    base_suffix: &str,
) -> String {
    if partitioned {
        let suffix = custom_suffix.unwrap_or(base_suffix);
        format!("{table_name}${suffix}")
    } else {
        table_name.to_string()
    }
}
