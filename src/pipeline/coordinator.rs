//! Process-wide run settings that can change while the service is up.

use std::sync::RwLock;

/// Settings a run reads once at start and keeps for its whole duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Prompt-group set requested from the prompt builder.
    pub gg_id: i64,
    /// Answer LLM prompts from the response cache when possible.
    pub use_llm_cache: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            gg_id: 1,
            use_llm_cache: false,
        }
    }
}

/// Holds the mutable run settings behind a read-write lock.
#[derive(Debug, Default)]
pub struct Coordinator {
    settings: RwLock<RunSettings>,
}

impl Coordinator {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> RunSettings {
        *self.settings.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn gg_id(&self) -> i64 {
        self.snapshot().gg_id
    }

    pub fn set_gg_id(&self, gg_id: i64) {
        self.settings.write().unwrap_or_else(|e| e.into_inner()).gg_id = gg_id;
        tracing::info!(gg_id, "ggID updated");
    }

    pub fn use_llm_cache(&self) -> bool {
        self.snapshot().use_llm_cache
    }

    pub fn set_use_llm_cache(&self, enabled: bool) {
        self.settings.write().unwrap_or_else(|e| e.into_inner()).use_llm_cache = enabled;
        tracing::info!(enabled, "LLM cache usage updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_detached() {
        let coordinator = Coordinator::new(RunSettings::default());
        let before = coordinator.snapshot();

        coordinator.set_gg_id(7);
        coordinator.set_use_llm_cache(true);

        assert_eq!(before.gg_id, 1);
        assert!(!before.use_llm_cache);
        assert_eq!(
            coordinator.snapshot(),
            RunSettings {
                gg_id: 7,
                use_llm_cache: true
            }
        );
    }
}
