//! Step timing utilities.

use std::time::Duration;

/// Format a duration the way the run summary prints it: seconds below a
/// minute, minutes above.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 60.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}s", secs)
    }
}
