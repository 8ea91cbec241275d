use chrono::Utc;

/// The wall-clock source for timeline event timestamps: Unix epoch seconds,
/// which only ever increases for a given process. The scaled clock used to
/// *schedule* replay is a different concern, built on [`std::time::Instant`]
/// in `simtrace-replay`.
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}
