//! Centralized engine configuration, loaded once per `DiffEngine` and
//! kept behind one struct rather than scattered env lookups.

use std::env;

const ENV_SEARCH_RADIUS: &str = "ZIYA_DIFF_SEARCH_RADIUS";
const ENV_CONTEXT_SIZE: &str = "ZIYA_DIFF_CONTEXT_SIZE";
const ENV_CONFIDENCE_THRESHOLD: &str = "ZIYA_DIFF_CONFIDENCE_THRESHOLD";
const ENV_ADAPTIVE_CONTEXT: &str = "ZIYA_DIFF_ADAPTIVE_CONTEXT";
const ENV_MAX_OFFSET: &str = "ZIYA_DIFF_MAX_OFFSET";
const ENV_FORCE_DIFFLIB: &str = "ZIYA_FORCE_DIFFLIB";
const ENV_USER_CODEBASE_DIR: &str = "ZIYA_USER_CODEBASE_DIR";
const ENV_USE_ENHANCED_MATCHING: &str = "ZIYA_USE_ENHANCED_MATCHING";

/// Named confidence levels with their defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceLevels {
    pub exact: f32,
    pub high: f32,
    pub medium: f32,
    pub low: f32,
    pub minimum: f32,
    pub very_low: f32,
}

impl Default for ConfidenceLevels {
    fn default() -> Self {
        ConfidenceLevels {
            exact: 1.0,
            high: 0.75,
            medium: 0.52,
            low: 0.40,
            minimum: 0.30,
            very_low: 0.20,
        }
    }
}

/// Context-size categories.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextSizes {
    pub small: usize,
    pub medium: usize,
    pub large: usize,
    pub full: usize,
}

impl Default for ContextSizes {
    fn default() -> Self {
        ContextSizes {
            small: 20,
            medium: 50,
            large: 100,
            full: 200,
        }
    }
}

/// All tunables for one engine run, loadable from the environment
/// or constructed with pure defaults for tests.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub search_radius: usize,
    pub context_size_override: Option<usize>,
    pub context_sizes: ContextSizes,
    pub confidence_threshold_override: Option<f32>,
    pub confidence_levels: ConfidenceLevels,
    pub adaptive_context: bool,
    pub max_offset: usize,
    pub force_difflib: bool,
    pub user_codebase_dir: Option<std::path::PathBuf>,
    pub use_enhanced_matching: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            search_radius: 50,
            context_size_override: None,
            context_sizes: ContextSizes::default(),
            confidence_threshold_override: None,
            confidence_levels: ConfidenceLevels::default(),
            adaptive_context: true,
            max_offset: 500,
            force_difflib: false,
            user_codebase_dir: None,
            use_enhanced_matching: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration, applying `ZIYA_*` environment overrides on top of
    /// the built-in defaults. Invalid values fall back to the default silently.
    pub fn from_env() -> Self {
        let mut cfg = EngineConfig::default();

        if let Some(v) = parse_env::<usize>(ENV_SEARCH_RADIUS) {
            cfg.search_radius = v;
        }
        if let Some(v) = parse_env::<usize>(ENV_CONTEXT_SIZE) {
            cfg.context_size_override = Some(v);
        }
        if let Some(v) = parse_env::<f32>(ENV_CONFIDENCE_THRESHOLD) {
            cfg.confidence_threshold_override = Some(v);
        }
        if let Some(v) = parse_bool_env(ENV_ADAPTIVE_CONTEXT) {
            cfg.adaptive_context = v;
        }
        if let Some(v) = parse_env::<usize>(ENV_MAX_OFFSET) {
            cfg.max_offset = v;
        }
        if let Some(v) = parse_bool_env(ENV_FORCE_DIFFLIB) {
            cfg.force_difflib = v;
        }
        if let Ok(dir) = env::var(ENV_USER_CODEBASE_DIR) {
            if !dir.is_empty() {
                cfg.user_codebase_dir = Some(std::path::PathBuf::from(dir));
            }
        }
        if let Some(v) = parse_bool_env(ENV_USE_ENHANCED_MATCHING) {
            cfg.use_enhanced_matching = v;
        }

        cfg
    }

    /// Context size for a named category, respecting the env override.
    pub fn context_size(&self, category: &str) -> usize {
        if let Some(v) = self.context_size_override {
            return v;
        }
        match category {
            "small" => self.context_sizes.small,
            "large" => self.context_sizes.large,
            "full" => self.context_sizes.full,
            _ => self.context_sizes.medium,
        }
    }

    /// Confidence threshold for a named level, respecting the env override
    /// (the override only applies to the `medium` level, matching the
    /// source's semantics where the override exists to tune the default
    /// fuzzy-match cutoff).
    pub fn confidence_threshold(&self, level: &str) -> f32 {
        if level == "medium" {
            if let Some(v) = self.confidence_threshold_override {
                return v;
            }
        }
        let l = &self.confidence_levels;
        match level {
            "exact" => l.exact,
            "high" => l.high,
            "low" => l.low,
            "minimum" => l.minimum,
            "very_low" => l.very_low,
            _ => l.medium,
        }
    }

    /// Adaptive context size as a ratio of hunk size, bounded to
    /// `[3, 10]` lines (spec/source `calculate_adaptive_context_size`).
    pub fn adaptive_context_size(&self, hunk_size: usize) -> usize {
        if !self.adaptive_context {
            return self.context_size("medium");
        }
        let raw = (hunk_size as f64 * 0.2) as usize;
        raw.clamp(3, 10)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

fn parse_bool_env(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "yes" | "1" | "y"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.search_radius, 50);
        assert_eq!(cfg.max_offset, 500);
        assert_eq!(cfg.confidence_threshold("medium"), 0.52);
        assert_eq!(cfg.confidence_threshold("high"), 0.75);
        assert_eq!(cfg.confidence_threshold("low"), 0.40);
        assert_eq!(cfg.confidence_threshold("minimum"), 0.30);
        assert_eq!(cfg.confidence_threshold("very_low"), 0.20);
    }

    #[test]
    fn adaptive_context_size_is_bounded() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.adaptive_context_size(1), 3);
        assert_eq!(cfg.adaptive_context_size(1000), 10);
        assert_eq!(cfg.adaptive_context_size(25), 5);
    }
}
