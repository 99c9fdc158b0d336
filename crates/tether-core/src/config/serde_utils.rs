//! serde adapters for the config file format

/// `Duration` written as a plain number of seconds.
///
/// Output is always whole seconds, so anything below one second is lost on
/// save. Input may be an integer (`timeout = 30`) or a fraction
/// (`timeout = 2.5`). Negative values are rejected.
pub mod duration_secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Whole(u64),
        Fractional(f64),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Seconds::deserialize(deserializer)? {
            Seconds::Whole(secs) => Ok(Duration::from_secs(secs)),
            Seconds::Fractional(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|e| de::Error::custom(format!("invalid duration {}: {}", secs, e))),
        }
    }
}

/// Profile table keyed by profile name.
///
/// Entries that omit `id` get one derived from their key, and entries that
/// omit `name` take the key as their name, so the same file always yields the
/// same IDs.
pub mod profiles_by_name {
    use serde::{Deserialize, Deserializer};
    use std::collections::BTreeMap;

    use crate::config::ConnectionProfile;
    use crate::types::ConnectionId;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, ConnectionProfile>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut profiles = BTreeMap::<String, ConnectionProfile>::deserialize(deserializer)?;
        for (key, profile) in profiles.iter_mut() {
            if profile.id.is_nil() {
                profile.id = ConnectionId::for_profile(key);
            }
            if profile.name.is_empty() {
                profile.name = key.clone();
            }
        }
        Ok(profiles)
    }
}
