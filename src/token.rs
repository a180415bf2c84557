//! Live-rotatable bearer credential for the chat service.

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Single-register holder for the bearer token.
///
/// Reads are lock-free and never observe a torn value; rotation swaps the
/// whole register atomically. The token itself never appears in logs or in
/// `Debug` output.
pub struct TokenHolder {
    token: ArcSwap<String>,
}

impl TokenHolder {
    pub fn new(initial: impl Into<String>) -> Self {
        Self { token: ArcSwap::from_pointee(initial.into()) }
    }

    /// Current token. Cheap enough to call once per request build.
    pub fn get(&self) -> Arc<String> {
        self.token.load_full()
    }

    /// Replace the token. An empty replacement is dropped: the register
    /// keeps its current value and a warning is emitted, so a bad rotation
    /// can never strip credentials from in-flight traffic.
    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        if token.is_empty() {
            tracing::warn!("ignoring bearer token rotation to an empty value");
            return;
        }
        self.token.store(Arc::new(token));
    }
}

impl std::fmt::Debug for TokenHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHolder").field("token", &"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_is_visible_to_subsequent_reads() {
        let holder = TokenHolder::new("t1");
        assert_eq!(holder.get().as_str(), "t1");

        holder.set("t2");
        assert_eq!(holder.get().as_str(), "t2");
    }

    #[test]
    fn empty_rotation_is_ignored() {
        let holder = TokenHolder::new("t1");
        holder.set("");
        assert_eq!(holder.get().as_str(), "t1");
    }

    #[test]
    fn debug_never_prints_the_token() {
        let holder = TokenHolder::new("super-secret");
        let rendered = format!("{holder:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn concurrent_readers_see_old_or_new_value_never_garbage() {
        let holder = Arc::new(TokenHolder::new("t1"));

        let writer = {
            let holder = Arc::clone(&holder);
            std::thread::spawn(move || {
                for i in 0..1000 {
                    holder.set(format!("t{i}"));
                }
            })
        };

        let reader = {
            let holder = Arc::clone(&holder);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    let token = holder.get();
                    assert!(token.starts_with('t'), "torn read: {token:?}");
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
    }
}
