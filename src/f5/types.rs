//! iControl REST Type Definitions
//!
//! Typed request and response bodies for the four endpoints the exporter talks to.
//!
//! # Design Notes
//!
//! - **Strict stats**: the fields the translator reads are required. A stats block
//!   missing one of them fails to decode instead of turning into a zero.
//! - **Optional extras**: fields that are only informational (`minActiveMembers`,
//!   enabled state, status reason) are `Option` because older TMOS releases omit them.
//! - **Document order**: `entries` maps are decoded into [`Entries`], which keeps the
//!   order the appliance sent them in.
//!
//! # Endpoints Covered
//!
//! - `POST /mgmt/shared/authn/login` → [`LoginRequest`], [`AuthResponse`]
//! - `GET /mgmt/tm/ltm/pool/stats` → [`PoolStatsResponse`]
//! - `GET /mgmt/tm/cm/sync-status` → [`SyncStatusResponse`]

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Description the sync-status endpoint reports for a healthy device group
pub const IN_SYNC: &str = "In Sync";

/// Availability description of a pool that can take traffic
pub const AVAILABLE: &str = "available";

/// Body of the login call
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub login_provider_name: &'a str,
}

/// Response of the login call
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub token: AuthToken,
}

#[derive(Deserialize)]
pub struct AuthToken {
    pub token: String,
    #[serde(rename = "expirationMicros", default)]
    pub expiration_micros: Option<i64>,
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"[REDACTED]")
            .field("expiration_micros", &self.expiration_micros)
            .finish()
    }
}

/// An `entries` object, kept in the order it appeared in the document.
#[derive(Debug, Clone)]
pub struct Entries<T>(Vec<(String, T)>);

impl<T> Entries<T> {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn first(&self) -> Option<&T> {
        self.0.first().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for Entries<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> FromIterator<(String, T)> for Entries<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de, T> Deserialize<'de> for Entries<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T> Visitor<'de> for EntriesVisitor<T>
        where
            T: Deserialize<'de>,
        {
            type Value = Entries<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of stat entries")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, T>()? {
                    entries.push((key, value));
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

/// `{"nestedStats": {"entries": ...}}` wrapper used by every stats collection
#[derive(Debug, Deserialize, Clone)]
pub struct NestedEntry<T> {
    #[serde(rename = "nestedStats")]
    pub nested_stats: NestedStats<T>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NestedStats<T> {
    pub entries: T,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct StatValue {
    pub value: i64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StatDescription {
    pub description: String,
}

/// Response of `GET /mgmt/tm/ltm/pool/stats`
///
/// A device without pools answers without an `entries` key at all.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PoolStatsResponse {
    #[serde(default)]
    pub entries: Entries<NestedEntry<PoolStats>>,
}

impl PoolStatsResponse {
    pub fn pools(&self) -> impl Iterator<Item = &PoolStats> {
        self.entries
            .iter()
            .map(|(_, entry)| &entry.nested_stats.entries)
    }
}

/// Stats block of a single pool
#[derive(Debug, Deserialize, Clone)]
pub struct PoolStats {
    #[serde(rename = "tmName")]
    pub tm_name: StatDescription,
    #[serde(rename = "status.availabilityState")]
    pub availability_state: StatDescription,
    #[serde(rename = "status.enabledState", default)]
    pub enabled_state: Option<StatDescription>,
    #[serde(rename = "status.statusReason", default)]
    pub status_reason: Option<StatDescription>,
    #[serde(rename = "activeMemberCnt")]
    pub active_member_cnt: StatValue,
    #[serde(rename = "availableMemberCnt")]
    pub available_member_cnt: StatValue,
    #[serde(rename = "memberCnt")]
    pub member_cnt: StatValue,
    #[serde(rename = "minActiveMembers", default)]
    pub min_active_members: Option<StatValue>,
    #[serde(rename = "serverside.curConns")]
    pub serverside_cur_conns: StatValue,
    #[serde(rename = "serverside.totConns")]
    pub serverside_tot_conns: StatValue,
}

/// Response of `GET /mgmt/tm/cm/sync-status`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SyncStatusResponse {
    #[serde(default)]
    pub entries: Entries<NestedEntry<SyncStats>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncStats {
    pub status: StatDescription,
}

impl SyncStatusResponse {
    /// Status description of the first entry.
    ///
    /// The appliance reports a single entry for the local device group; only the
    /// first one in document order is looked at.
    pub fn status(&self) -> Option<&str> {
        self.entries
            .first()
            .map(|entry| entry.nested_stats.entries.status.description.as_str())
    }

    pub fn is_in_sync(&self) -> bool {
        self.status() == Some(IN_SYNC)
    }
}
