use chrono::{DateTime, Utc};
use uuid::Uuid;

/// `QT-<last 6 digits of epoch millis>-<3 uppercase alphanumerics>`.
pub fn generate_quote_number(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().rem_euclid(1_000_000);
    let suffix: String =
        Uuid::new_v4().simple().to_string().chars().take(3).collect::<String>().to_uppercase();
    format!("QT-{millis:06}-{suffix}")
}
