//! Peer display-name resolution.
//!
//! A layered, fail-soft chain with a deterministic final default: each lookup
//! stage may be absent or may fail, and a failure is logged and skipped,
//! never allowed to abort the chain. The fallback format is quarantined by
//! the validity rules so a fallback value can never poison an upstream cache.

use std::sync::Arc;

use crate::error::ServiceError;

const FALLBACK_PREFIX: &str = "Peer ";
const UNKNOWN_PEER: &str = "Unknown Peer";
const FALLBACK_HASH_CHARS: usize = 8;

/// Lookup stages behind the resolver. Implementations wrap the contact
/// store, the announce table, and the conversation list; each is
/// independently fallible.
pub trait NameLookup: Send + Sync {
    fn contact_alias(&self, peer_hash: &str) -> Result<Option<String>, ServiceError>;
    fn announce_name(&self, peer_hash: &str) -> Result<Option<String>, ServiceError>;
    fn conversation_name(&self, peer_hash: &str) -> Result<Option<String>, ServiceError>;
}

pub struct PeerNameResolver {
    lookup: Arc<dyn NameLookup>,
}

impl PeerNameResolver {
    pub fn new(lookup: Arc<dyn NameLookup>) -> Self {
        Self { lookup }
    }

    /// Resolve a display name for `peer_hash`, consulting `cached` first.
    ///
    /// TODO: the contact alias is meant to outrank the cached value, but the
    /// conversation list cache relies on the current order; reorder these two
    /// stages together with the cache invalidation rework.
    pub fn resolve(&self, peer_hash: &str, cached: Option<&str>) -> String {
        if let Some(name) = cached.filter(|name| is_valid_name(name)) {
            return name.to_string();
        }

        for (stage, result) in [
            ("contact_alias", self.lookup.contact_alias(peer_hash)),
            ("announce_name", self.lookup.announce_name(peer_hash)),
            ("conversation_name", self.lookup.conversation_name(peer_hash)),
        ] {
            match result {
                Ok(Some(name)) if is_valid_name(&name) => return name,
                Ok(_) => {}
                Err(err) => {
                    log::warn!("resolver: {stage} lookup failed for {peer_hash}: {err}");
                }
            }
        }

        fallback_name(peer_hash)
    }
}

/// A name is usable iff it is non-blank, not the placeholder, and not shaped
/// like the hash fallback.
pub fn is_valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed != UNKNOWN_PEER && !is_fallback_shaped(trimmed)
}

fn is_fallback_shaped(name: &str) -> bool {
    let Some(rest) = name.strip_prefix(FALLBACK_PREFIX) else {
        return false;
    };
    rest.len() == FALLBACK_HASH_CHARS
        && rest
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
}

/// Deterministic final default: the first 8 hex characters of the hash,
/// uppercased and prefixed, or the placeholder when the hash is too short.
pub fn fallback_name(peer_hash: &str) -> String {
    let trimmed = peer_hash.trim();
    if trimmed.len() < FALLBACK_HASH_CHARS {
        return UNKNOWN_PEER.to_string();
    }
    let prefix: String = trimmed
        .chars()
        .take(FALLBACK_HASH_CHARS)
        .collect::<String>()
        .to_ascii_uppercase();
    format!("{FALLBACK_PREFIX}{prefix}")
}

// ── Announce app-data parsing ─────────────────────────────────────────────────

/// Normalize a candidate display name from the wire: trimmed, control-free,
/// capped at 64 characters.
pub fn normalize_display_name(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_control) {
        return None;
    }
    let normalized: String = trimmed.chars().take(64).collect();
    (!normalized.is_empty()).then_some(normalized)
}

/// Extract a display name from announce app data.
///
/// Delivery announces carry a msgpack array whose first element is the name
/// (binary or string, nil when unset); legacy announces carry bare UTF-8.
pub fn display_name_from_app_data(app_data: &[u8]) -> Option<String> {
    if app_data.is_empty() {
        return None;
    }

    if is_msgpack_array_prefix(app_data[0]) {
        let decoded: rmpv::Value = rmp_serde::from_slice(app_data).ok()?;
        let rmpv::Value::Array(entries) = decoded else {
            return None;
        };
        let candidate = match entries.first()? {
            rmpv::Value::Nil => None,
            rmpv::Value::Binary(bytes) => String::from_utf8(bytes.clone()).ok(),
            rmpv::Value::String(text) => text.as_str().map(str::to_string),
            _ => None,
        }?;
        return normalize_display_name(&candidate);
    }

    let text = std::str::from_utf8(app_data).ok()?;
    normalize_display_name(text)
}

fn is_msgpack_array_prefix(byte: u8) -> bool {
    (0x90..=0x9f).contains(&byte) || byte == 0xdc || byte == 0xdd
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type LookupResult = Result<Option<String>, ServiceError>;

    #[derive(Default)]
    struct ScriptedLookup {
        contact: Mutex<Option<LookupResult>>,
        announce: Mutex<Option<LookupResult>>,
        conversation: Mutex<Option<LookupResult>>,
    }

    impl ScriptedLookup {
        fn with_announce(name: &str) -> Self {
            let lookup = Self::default();
            *lookup.announce.lock().expect("announce") = Some(Ok(Some(name.to_string())));
            lookup
        }
    }

    fn take(slot: &Mutex<Option<LookupResult>>) -> LookupResult {
        slot.lock()
            .expect("scripted lookup")
            .take()
            .unwrap_or(Ok(None))
    }

    impl NameLookup for ScriptedLookup {
        fn contact_alias(&self, _peer_hash: &str) -> LookupResult {
            take(&self.contact)
        }

        fn announce_name(&self, _peer_hash: &str) -> LookupResult {
            take(&self.announce)
        }

        fn conversation_name(&self, _peer_hash: &str) -> LookupResult {
            take(&self.conversation)
        }
    }

    fn resolver(lookup: ScriptedLookup) -> PeerNameResolver {
        PeerNameResolver::new(Arc::new(lookup))
    }

    #[test]
    fn cached_value_wins_when_valid() {
        let resolver = resolver(ScriptedLookup::default());
        assert_eq!(
            resolver.resolve("deadbeef1234", Some("Cached Alice")),
            "Cached Alice"
        );
    }

    #[test]
    fn cached_value_currently_outranks_contact_alias() {
        // Pins the legacy priority the TODO in `resolve` refers to.
        let lookup = ScriptedLookup::default();
        *lookup.contact.lock().expect("contact") = Some(Ok(Some("Contact Alice".into())));
        let resolver = resolver(lookup);
        assert_eq!(
            resolver.resolve("deadbeef1234", Some("Cached Alice")),
            "Cached Alice"
        );
    }

    #[test]
    fn announce_name_used_when_cache_and_contact_miss() {
        let resolver = resolver(ScriptedLookup::with_announce("Bob's Radio"));
        assert_eq!(resolver.resolve("deadbeef1234", None), "Bob's Radio");
    }

    #[test]
    fn lookup_failure_falls_through_to_next_stage() {
        let lookup = ScriptedLookup::with_announce("Bob's Radio");
        *lookup.contact.lock().expect("contact") =
            Some(Err(ServiceError::EngineUnavailable));
        let resolver = resolver(lookup);
        assert_eq!(resolver.resolve("deadbeef1234", None), "Bob's Radio");
    }

    #[test]
    fn all_stages_missing_yields_formatted_hash() {
        let resolver = resolver(ScriptedLookup::default());
        assert_eq!(resolver.resolve("deadbeef1234", None), "Peer DEADBEEF");
    }

    #[test]
    fn short_hash_yields_placeholder() {
        let resolver = resolver(ScriptedLookup::default());
        assert_eq!(resolver.resolve("deadbee", None), "Unknown Peer");
    }

    #[test]
    fn fallback_shaped_and_placeholder_names_are_invalid() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("   "));
        assert!(!is_valid_name("Unknown Peer"));
        assert!(!is_valid_name("Peer DEADBEEF"));
        // Similar but not fallback-shaped strings stay valid.
        assert!(is_valid_name("Peer Reviewer"));
        assert!(is_valid_name("Peer DEADBEEF42"));
        assert!(is_valid_name("Alice"));
    }

    #[test]
    fn fallback_shaped_cache_value_is_skipped() {
        let resolver = resolver(ScriptedLookup::with_announce("Bob's Radio"));
        assert_eq!(
            resolver.resolve("deadbeef1234", Some("Peer DEADBEEF")),
            "Bob's Radio"
        );
    }

    #[test]
    fn app_data_array_and_utf8_forms_parse() {
        let array = rmpv::Value::Array(vec![
            rmpv::Value::Binary(b"Relay Node".to_vec()),
            rmpv::Value::Nil,
        ]);
        let packed = rmp_serde::to_vec(&array).expect("pack app data");
        assert_eq!(
            display_name_from_app_data(&packed).as_deref(),
            Some("Relay Node")
        );

        assert_eq!(
            display_name_from_app_data(b"  Plain Name  ").as_deref(),
            Some("Plain Name")
        );

        let nil_first = rmpv::Value::Array(vec![rmpv::Value::Nil]);
        let packed = rmp_serde::to_vec(&nil_first).expect("pack nil app data");
        assert_eq!(display_name_from_app_data(&packed), None);
        assert_eq!(display_name_from_app_data(&[]), None);
        assert_eq!(display_name_from_app_data(b"with\x07control"), None);
    }
}
