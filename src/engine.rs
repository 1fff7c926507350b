use crate::cache::{Cache, CacheStats};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::emitter::{self, EmitOptions, Stylesheet};
use crate::error::{Cancelled, ConfigError, EngineError, ScanWarning};
use crate::matcher::{self, MatchedUtility};
use crate::scanner::{self, Candidate, ScanOptions, ScanOutput};
use crate::theme::{self, ThemeTable};
use crate::variants::VariantContext;
use rayon::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub scan: ScanOptions,
    pub cache: bool,
    pub minify: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            cache: true,
            minify: false,
        }
    }
}

/// Result of one full scan-and-generate pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub stylesheet: Stylesheet,
    pub warnings: Vec<ScanWarning>,
    pub files_scanned: usize,
    pub candidate_count: usize,
}

/// Owns one validated configuration, its resolved theme, and the resolution
/// cache. Nothing is process-global: two engines never share state.
#[derive(Debug)]
pub struct Engine {
    config: Config,
    theme: ThemeTable,
    context: VariantContext,
    cache: Cache,
    options: EngineOptions,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        Self::with_options(config, EngineOptions::default())
    }

    pub fn with_options(config: Config, options: EngineOptions) -> Result<Self, ConfigError> {
        config.validate()?;
        let theme = theme::resolve(&theme::default_theme(), &config.theme)?;
        let context = VariantContext::new(&config, &theme);
        let cache = if options.cache {
            Cache::new()
        } else {
            Cache::disabled()
        };
        Ok(Self {
            config,
            theme,
            context,
            cache,
            options,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn theme(&self) -> &ThemeTable {
        &self.theme
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Match and expand a single literal, going through the cache.
    pub fn resolve(&self, literal: &str) -> Option<Arc<MatchedUtility>> {
        self.cache.lookup_or_compute(literal, || {
            matcher::match_candidate(literal, &self.theme, &self.context)
        })
    }

    pub fn scan(&self, cancel: &CancelToken) -> Result<ScanOutput, Cancelled> {
        scanner::scan(&self.config.content, &self.options.scan, cancel)
    }

    /// Resolves `literals` in parallel and returns the matches in input order.
    pub fn resolve_all<S>(
        &self,
        literals: &[S],
        cancel: &CancelToken,
    ) -> Result<Vec<Arc<MatchedUtility>>, Cancelled>
    where
        S: AsRef<str> + Sync,
    {
        let resolved = literals
            .par_iter()
            .map(|literal| {
                cancel.check()?;
                Ok(self.resolve(literal.as_ref()))
            })
            .collect::<Result<Vec<_>, Cancelled>>()?;
        Ok(resolved.into_iter().flatten().collect())
    }

    pub fn generate<S>(&self, literals: &[S]) -> Stylesheet
    where
        S: AsRef<str> + Sync,
    {
        let matched = literals
            .par_iter()
            .filter_map(|literal| self.resolve(literal.as_ref()))
            .collect::<Vec<_>>();
        emitter::emit(&matched, &self.emit_options())
    }

    pub fn generate_cancellable<S>(
        &self,
        literals: &[S],
        cancel: &CancelToken,
    ) -> Result<Stylesheet, Cancelled>
    where
        S: AsRef<str> + Sync,
    {
        let matched = self.resolve_all(literals, cancel)?;
        cancel.check()?;
        Ok(emitter::emit(&matched, &self.emit_options()))
    }

    /// Scans the configured content and renders the stylesheet.
    ///
    /// Scan warnings are logged and returned alongside the stylesheet; only
    /// cancellation aborts the pass.
    pub fn build(&self, cancel: &CancelToken) -> Result<BuildOutput, EngineError> {
        let scan = self.scan(cancel)?;
        for warning in &scan.warnings {
            log::warn!("{}", warning);
        }

        let literals = scan
            .candidates
            .iter()
            .map(|candidate: &Candidate| candidate.text.as_str())
            .collect::<Vec<_>>();
        let stylesheet = self.generate_cancellable(&literals, cancel)?;

        let stats = self.cache.stats();
        log::debug!(
            "scanned {} files, {} candidates, {} rules (cache: {} hits, {} misses, {} entries)",
            scan.files_scanned,
            literals.len(),
            stylesheet.len(),
            stats.hits,
            stats.misses,
            stats.entries
        );

        Ok(BuildOutput {
            stylesheet,
            warnings: scan.warnings,
            files_scanned: scan.files_scanned,
            candidate_count: literals.len(),
        })
    }

    /// Swaps in a new configuration.
    ///
    /// Returns whether cached resolutions were dropped: the cache survives a
    /// change that only touches `content`.
    pub fn reconfigure(&mut self, config: Config) -> Result<bool, ConfigError> {
        config.validate()?;
        let theme = theme::resolve(&theme::default_theme(), &config.theme)?;
        let context = VariantContext::new(&config, &theme);

        let invalidate = theme != self.theme || context != self.context;
        if invalidate {
            log::debug!("configuration changed, clearing {} cached entries", self.cache.len());
            self.cache.clear();
        }

        self.config = config;
        self.theme = theme;
        self.context = context;
        Ok(invalidate)
    }

    pub fn close(self) -> CacheStats {
        let stats = self.cache.stats();
        log::debug!(
            "engine closed after {} hits and {} misses",
            stats.hits,
            stats.misses
        );
        stats
    }

    fn emit_options(&self) -> EmitOptions {
        EmitOptions {
            minify: self.options.minify,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Engine, EngineOptions};
    use crate::cancel::CancelToken;
    use crate::config::{Config, DarkMode};
    use crate::error::ConfigError;
    use crate::theme::Category;

    fn scale_config() -> Config {
        Config::new(["src/**/*.rs"])
            .extend_theme(Category::Scale, "400", "4")
            .extend_theme(Category::Scale, "500", "5")
    }

    #[test]
    fn rejects_invalid_configuration() {
        let config = Config::new(Vec::<String>::new());
        assert!(matches!(Engine::new(config), Err(ConfigError::EmptyContent)));
    }

    #[test]
    fn generate_skips_unknown_literals() {
        let engine = Engine::new(scale_config()).expect("engine");
        let sheet = engine.generate(&["scale-400", "scale-999", "hello", "scale-400"]);
        assert_eq!(sheet.len(), 1);
        assert!(sheet.to_css().contains("--tw-scale-x: 4;"));
    }

    #[test]
    fn resolve_uses_the_cache() {
        let engine = Engine::new(scale_config()).expect("engine");
        let first = engine.resolve("scale-500").expect("scale-500 resolves");
        let second = engine.resolve("scale-500").expect("scale-500 resolves");
        assert!(std::sync::Arc::ptr_eq(&first, &second));
        let stats = engine.cache_stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn disabled_cache_produces_identical_output() {
        let literals = ["scale-400", "md:scale-500", "opacity-50", "junk"];
        let cached = Engine::new(scale_config()).expect("engine");
        let uncached = Engine::with_options(
            scale_config(),
            EngineOptions {
                cache: false,
                ..EngineOptions::default()
            },
        )
        .expect("engine");
        assert_eq!(
            cached.generate(&literals).to_css(),
            uncached.generate(&literals).to_css()
        );
        assert_eq!(uncached.cache_stats().entries, 0);
    }

    #[test]
    fn reconfigure_clears_cache_only_on_theme_or_variant_change() {
        let mut engine = Engine::new(scale_config()).expect("engine");
        engine.resolve("scale-400");
        assert_eq!(engine.cache_stats().entries, 1);

        let mut moved = scale_config();
        moved.content = vec!["app/**/*.html".to_string()];
        assert!(!engine.reconfigure(moved).expect("valid config"));
        assert_eq!(engine.cache_stats().entries, 1);
        assert_eq!(engine.config().content, vec!["app/**/*.html".to_string()]);

        let dark = scale_config().with_dark_mode(DarkMode::Media);
        assert!(engine.reconfigure(dark).expect("valid config"));
        assert_eq!(engine.cache_stats().entries, 0);
        assert!(engine.resolve("dark:scale-400").is_some());
    }

    #[test]
    fn failed_reconfigure_keeps_previous_state() {
        let mut engine = Engine::new(scale_config()).expect("engine");
        let bad = scale_config().extend_theme(Category::Scale, "600", "big");
        assert!(engine.reconfigure(bad).is_err());
        assert!(engine.resolve("scale-400").is_some());
        assert!(engine.theme().get(Category::Scale, "600").is_none());
    }

    #[test]
    fn cancelled_generation_returns_cancelled() {
        let engine = Engine::new(scale_config()).expect("engine");
        let token = CancelToken::new();
        token.cancel();
        assert!(engine.generate_cancellable(&["scale-400"], &token).is_err());
        assert_eq!(engine.cache_stats().entries, 0);
    }

    #[test]
    fn close_reports_final_stats() {
        let engine = Engine::new(scale_config()).expect("engine");
        engine.generate(&["scale-400", "scale-400"]);
        let stats = engine.close();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits + stats.misses, 2);
    }
}
