//! Derivation of the display profile from access token claims
//!
//! The profile is never authoritative: it is recomputed from the current
//! access token every time a token is stored or refreshed, and cleared when
//! no identity can be derived.

use serde::{Deserialize, Serialize};

use crate::auth::claims::{decode_claims, Claims};
use crate::auth::token_store::TokenStore;

/// Who the console shows as signed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Display name.
    pub name: String,

    /// E-mail address, when the issuer provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserProfile {
    /// Creates a profile with a name and no e-mail.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
        }
    }
}

/// Caller-supplied identity used when the token yields none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFallback {
    /// Fallback display name.
    pub name: Option<String>,
    /// Fallback e-mail address.
    pub email: Option<String>,
}

impl ProfileFallback {
    /// Creates a fallback carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: None,
        }
    }

    fn profile(&self) -> Option<UserProfile> {
        non_blank(self.name.as_deref()).map(|name| UserProfile {
            name: name.to_string(),
            email: self.email.clone(),
        })
    }
}

/// Recomputes the profile from `token` and writes it into `store`.
///
/// Name resolution order: `name`, `preferred_username`, `username`,
/// `sub` (shown as `User <sub>`), then the fallback's name.  A missing token
/// or an undecodable payload falls back to `fallback`; with no usable
/// fallback the profile is cleared.  Never fails.
///
/// Returns the profile that was written.
///
/// # Examples
///
/// ```
/// use erp_auth::auth::profile::{sync_from_token, ProfileFallback};
/// use erp_auth::auth::token_store::TokenStore;
///
/// let store = TokenStore::in_memory();
///
/// sync_from_token(&store, Some("a.eyJuYW1lIjoiS2ltIn0.b"), None);
/// assert_eq!(store.profile().unwrap().name, "Kim");
///
/// sync_from_token(&store, Some("opaque"), Some(&ProfileFallback::named("Guest")));
/// assert_eq!(store.profile().unwrap().name, "Guest");
///
/// sync_from_token(&store, None, None);
/// assert!(store.profile().is_none());
/// ```
pub fn sync_from_token(
    store: &TokenStore,
    token: Option<&str>,
    fallback: Option<&ProfileFallback>,
) -> Option<UserProfile> {
    let from_fallback = || fallback.and_then(ProfileFallback::profile);

    let profile = match token {
        None => from_fallback(),
        Some(token) => match decode_claims(token) {
            Ok(claims) => profile_from_claims(&claims, fallback),
            Err(e) => {
                tracing::debug!("Access token claims unavailable: {}", e);
                from_fallback()
            }
        },
    };

    store.set_profile(profile.clone());
    profile
}

fn profile_from_claims(claims: &Claims, fallback: Option<&ProfileFallback>) -> Option<UserProfile> {
    let name = non_blank(claims.name.as_deref())
        .or_else(|| non_blank(claims.preferred_username.as_deref()))
        .or_else(|| non_blank(claims.username.as_deref()))
        .map(str::to_string)
        .or_else(|| non_blank(claims.sub.as_deref()).map(|sub| format!("User {sub}")))
        .or_else(|| fallback.and_then(|f| non_blank(f.name.as_deref()).map(str::to_string)))?;

    let email = non_blank(claims.email.as_deref())
        .map(str::to_string)
        .or_else(|| fallback.and_then(|f| f.email.clone()));

    Some(UserProfile { name, email })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    fn token_with(payload: &str) -> String {
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload);
        format!("header.{encoded}.signature")
    }

    #[test]
    fn test_name_claim_wins() {
        let store = TokenStore::in_memory();
        let token = token_with(r#"{"name":"Kim","preferred_username":"kim1","sub":"9"}"#);
        let profile = sync_from_token(&store, Some(&token), None).unwrap();
        assert_eq!(profile.name, "Kim");
    }

    #[test]
    fn test_numeric_subject_keeps_name() {
        let store = TokenStore::in_memory();
        store.set_profile(Some(UserProfile::new("Old")));
        let token = token_with(r#"{"name":"Kim","sub":12345,"exp":1700000000.5}"#);
        assert_eq!(sync_from_token(&store, Some(&token), None), Some(UserProfile::new("Kim")));
        assert_eq!(store.profile(), Some(UserProfile::new("Kim")));
    }

    #[test]
    fn test_numeric_subject_only() {
        let store = TokenStore::in_memory();
        let token = token_with(r#"{"sub":12345}"#);
        assert_eq!(sync_from_token(&store, Some(&token), None).unwrap().name, "User 12345");
    }

    #[test]
    fn test_mistyped_name_uses_fallback() {
        let store = TokenStore::in_memory();
        let token = token_with(r#"{"name":42}"#);
        assert!(sync_from_token(&store, Some(&token), None).is_none());
        let profile =
            sync_from_token(&store, Some(&token), Some(&ProfileFallback::named("Guest"))).unwrap();
        assert_eq!(profile.name, "Guest");
    }

    #[test]
    fn test_blank_name_falls_through_to_preferred_username() {
        let store = TokenStore::in_memory();
        let token = token_with(r#"{"name":"  ","preferred_username":"kim1"}"#);
        assert_eq!(sync_from_token(&store, Some(&token), None).unwrap().name, "kim1");
    }

    #[test]
    fn test_username_then_sub() {
        let store = TokenStore::in_memory();
        let token = token_with(r#"{"username":"kimu","sub":"9"}"#);
        assert_eq!(sync_from_token(&store, Some(&token), None).unwrap().name, "kimu");

        let token = token_with(r#"{"sub":"9"}"#);
        assert_eq!(sync_from_token(&store, Some(&token), None).unwrap().name, "User 9");
    }

    #[test]
    fn test_claims_without_identity_use_fallback_name() {
        let store = TokenStore::in_memory();
        let token = token_with(r#"{"email":"kim@example.com"}"#);
        let profile =
            sync_from_token(&store, Some(&token), Some(&ProfileFallback::named("Kim"))).unwrap();
        assert_eq!(profile.name, "Kim");
        assert_eq!(profile.email.as_deref(), Some("kim@example.com"));
    }

    #[test]
    fn test_claims_without_identity_and_no_fallback_clear_profile() {
        let store = TokenStore::in_memory();
        store.set_profile(Some(UserProfile::new("Old")));
        let token = token_with(r#"{"scope":"openid"}"#);
        assert!(sync_from_token(&store, Some(&token), None).is_none());
        assert!(store.profile().is_none());
    }

    #[test]
    fn test_absent_token_with_named_fallback() {
        let store = TokenStore::in_memory();
        let fallback = ProfileFallback {
            name: Some("Guest".to_string()),
            email: Some("guest@example.com".to_string()),
        };
        let profile = sync_from_token(&store, None, Some(&fallback)).unwrap();
        assert_eq!(profile.email.as_deref(), Some("guest@example.com"));
        assert_eq!(store.profile(), Some(profile));
    }

    #[test]
    fn test_absent_token_with_nameless_fallback_clears() {
        let store = TokenStore::in_memory();
        store.set_profile(Some(UserProfile::new("Old")));
        let fallback = ProfileFallback {
            name: None,
            email: Some("x@example.com".to_string()),
        };
        assert!(sync_from_token(&store, None, Some(&fallback)).is_none());
        assert!(store.profile().is_none());
    }

    #[test]
    fn test_malformed_token_never_panics() {
        let store = TokenStore::in_memory();
        for token in ["", "single", "a.%%%.b", "a.bm90IGpzb24.b"] {
            assert!(sync_from_token(&store, Some(token), None).is_none());
        }
        let profile =
            sync_from_token(&store, Some("single"), Some(&ProfileFallback::named("Fb"))).unwrap();
        assert_eq!(profile.name, "Fb");
    }
}
