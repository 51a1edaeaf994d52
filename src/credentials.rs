//! API keys for the HTTP backends
//!
//! A key comes from `<NAME>_API_KEY` in the environment, or from a
//! `<NAME>_API_KEY.txt` file in the key directory.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

pub const OPENAI: &str = "OPENAI";
pub const DEEPGRAM: &str = "DEEPGRAM";

const PROVIDERS: [&str; 2] = [OPENAI, DEEPGRAM];

#[derive(Clone, Default)]
pub struct ApiKeys {
    keys: HashMap<String, String>,
}

impl ApiKeys {
    /// Load keys from the process environment and `dir`
    pub fn load(dir: &Path) -> Self {
        Self::load_with(dir, |name| std::env::var(name).ok())
    }

    pub fn load_with(dir: &Path, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut keys = HashMap::new();

        for provider in PROVIDERS {
            let var = format!("{}_API_KEY", provider);
            let from_env = env(&var).filter(|key| !key.trim().is_empty());
            let key = from_env.or_else(|| {
                let path = dir.join(format!("{}.txt", var));
                std::fs::read_to_string(&path)
                    .ok()
                    .map(|contents| contents.trim().to_string())
                    .filter(|key| !key.is_empty())
            });

            match key {
                Some(key) => {
                    tracing::debug!("Found {} key", provider);
                    keys.insert(provider.to_string(), key.trim().to_string());
                }
                None => tracing::debug!("No {} key configured", provider),
            }
        }

        Self { keys }
    }

    pub fn with_key(mut self, provider: &str, key: &str) -> Self {
        self.keys.insert(provider.to_string(), key.to_string());
        self
    }

    pub fn get(&self, provider: &str) -> Option<&str> {
        self.keys.get(provider).map(String::as_str)
    }
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        providers.sort_unstable();
        f.debug_struct("ApiKeys")
            .field("providers", &providers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("OPENAI_API_KEY.txt"), "from-file\n").unwrap();
        std::fs::write(dir.path().join("DEEPGRAM_API_KEY.txt"), "  dg-file  ").unwrap();

        let keys = ApiKeys::load_with(dir.path(), |name| {
            (name == "OPENAI_API_KEY").then(|| "from-env".to_string())
        });

        assert_eq!(keys.get(OPENAI), Some("from-env"));
        assert_eq!(keys.get(DEEPGRAM), Some("dg-file"));
    }

    #[test]
    fn test_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("OPENAI_API_KEY.txt"), "\n").unwrap();
        let keys = ApiKeys::load_with(dir.path(), |_| None);
        assert_eq!(keys.get(OPENAI), None);
        assert_eq!(keys.get(DEEPGRAM), None);
    }

    #[test]
    fn test_debug_hides_keys() {
        let keys = ApiKeys::default().with_key(OPENAI, "sk-secret");
        let debug = format!("{:?}", keys);
        assert!(debug.contains("OPENAI"));
        assert!(!debug.contains("sk-secret"));
    }
}
