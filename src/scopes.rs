//! Scope string handling and default-scope resolution.
//!
//! Scopes travel on the wire as a single space-separated string
//! (RFC 6749 section 3.3) and internally as sorted sets.

use crate::config::Settings;
use crate::models::ClientData;
use crate::realms::strip_leading_slash;
use std::collections::BTreeSet;

pub const SPACE: &str = " ";

/// Split a space-separated scope string into a sorted, deduplicated set.
/// Empty or whitespace-only input yields the empty set.
pub fn split(scope: &str) -> BTreeSet<String> {
    scope
        .split_whitespace()
        .map(str::to_string)
        .collect::<BTreeSet<String>>()
}

pub fn split_opt(scope: Option<&str>) -> BTreeSet<String> {
    scope.map(split).unwrap_or_default()
}

/// Join a scope set back into its canonical wire form: lexicographically
/// sorted, space-separated.
pub fn join(scopes: &BTreeSet<String>) -> String {
    scopes
        .iter()
        .map(String::as_str)
        .collect::<Vec<&str>>()
        .join(SPACE)
}

/// Canonical form of an arbitrary scope string (sorted, deduplicated).
pub fn normalize(scope: &str) -> String {
    join(&split(scope))
}

/// Realm-wide default scopes from configuration.
///
/// The lookup is case-insensitive and tolerates both `/myrealm` and
/// `myrealm` keys, so defaults can be supplied through flat environment
/// variables like `OAUTH_SCOPE_DEFAULTS_MYREALM="uid"`.
pub fn realm_default_scopes(settings: &Settings, realm: &str) -> BTreeSet<String> {
    let wanted = strip_leading_slash(realm).to_lowercase();
    settings
        .scope
        .defaults
        .iter()
        .find(|(key, _)| strip_leading_slash(key).to_lowercase() == wanted)
        .map(|(_, value)| split(value))
        .unwrap_or_default()
}

/// Default scopes for a specific client: client-specific configured defaults
/// win when non-empty, otherwise fall back to the realm-wide defaults.
pub fn client_default_scopes(
    settings: &Settings,
    realm: &str,
    client: &ClientData,
) -> BTreeSet<String> {
    if client.default_scopes.is_empty() {
        realm_default_scopes(settings, realm)
    } else {
        client.default_scopes.clone()
    }
}

/// Requested scopes, when present, override defaults entirely (no union).
pub fn resolve_final_scopes(
    requested: &BTreeSet<String>,
    defaults: &BTreeSet<String>,
) -> BTreeSet<String> {
    if requested.is_empty() {
        defaults.clone()
    } else {
        requested.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::models::ClientData;

    #[test]
    fn split_sorts_and_dedups() {
        let scopes = split("write read  read uid");
        assert_eq!(join(&scopes), "read uid write");
    }

    #[test]
    fn split_empty_yields_empty_set() {
        assert!(split("").is_empty());
        assert!(split("   ").is_empty());
        assert!(split_opt(None).is_empty());
    }

    #[test]
    fn join_split_is_idempotent() {
        for s in ["b a c", "uid", "", "z z z", "a  b\tc"] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once);
        }
    }

    fn settings_with_defaults(realm_key: &str, value: &str) -> Settings {
        let mut settings = Settings::default();
        settings
            .scope
            .defaults
            .insert(realm_key.to_string(), value.to_string());
        settings
    }

    #[test]
    fn realm_defaults_ignore_case_and_leading_slash() {
        let settings = settings_with_defaults("MyRealm", "uid team");
        assert_eq!(join(&realm_default_scopes(&settings, "/myrealm")), "team uid");
        assert_eq!(join(&realm_default_scopes(&settings, "myrealm")), "team uid");

        let settings = settings_with_defaults("/other", "uid");
        assert_eq!(join(&realm_default_scopes(&settings, "/Other")), "uid");
    }

    #[test]
    fn unknown_realm_has_no_defaults() {
        let settings = settings_with_defaults("services", "uid");
        assert!(realm_default_scopes(&settings, "/employees").is_empty());
    }

    #[test]
    fn client_defaults_take_precedence_over_realm_defaults() {
        let settings = settings_with_defaults("services", "uid");
        let mut client = ClientData::default();
        assert_eq!(
            join(&client_default_scopes(&settings, "/services", &client)),
            "uid"
        );

        client.default_scopes = split("team.read");
        assert_eq!(
            join(&client_default_scopes(&settings, "/services", &client)),
            "team.read"
        );
    }

    #[test]
    fn requested_scopes_override_defaults_entirely() {
        let defaults = split("uid team");
        assert_eq!(join(&resolve_final_scopes(&split(""), &defaults)), "team uid");
        assert_eq!(join(&resolve_final_scopes(&split("read"), &defaults)), "read");
    }
}
