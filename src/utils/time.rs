use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in whole seconds, the resolution card timestamps use
///
/// A clock set before 1970 reads as `0` ("never"); one past 2106 saturates.
pub fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u32::try_from(elapsed.as_secs()).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
