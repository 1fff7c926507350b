use crate::error::ConfigError;
use crate::theme::{self, Category};
use crate::variants;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "jitwind.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Jit,
    Aot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DarkMode {
    #[default]
    Disabled,
    Media,
    Class,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThemeConfig {
    pub overrides: BTreeMap<Category, BTreeMap<String, String>>,
    pub extend: BTreeMap<Category, BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariantsConfig {
    pub enabled: BTreeMap<Category, BTreeSet<String>>,
    pub extend: BTreeMap<Category, BTreeSet<String>>,
}

/// Validated engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub mode: Mode,
    pub content: Vec<String>,
    pub dark_mode: DarkMode,
    pub theme: ThemeConfig,
    pub variants: VariantsConfig,
}

impl Config {
    pub fn new<I, S>(content: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: Mode::default(),
            content: content.into_iter().map(Into::into).collect(),
            dark_mode: DarkMode::default(),
            theme: ThemeConfig::default(),
            variants: VariantsConfig::default(),
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_dark_mode(mut self, dark_mode: DarkMode) -> Self {
        self.dark_mode = dark_mode;
        self
    }

    pub fn extend_theme(mut self, category: Category, token: &str, value: &str) -> Self {
        self.theme
            .extend
            .entry(category)
            .or_default()
            .insert(token.to_string(), value.to_string());
        self
    }

    pub fn override_theme(mut self, category: Category, token: &str, value: &str) -> Self {
        self.theme
            .overrides
            .entry(category)
            .or_default()
            .insert(token.to_string(), value.to_string());
        self
    }

    pub fn enable_variants(mut self, category: Category, names: &[&str]) -> Self {
        self.variants
            .enabled
            .entry(category)
            .or_default()
            .extend(names.iter().map(|name| name.to_string()));
        self
    }

    pub fn extend_variants(mut self, category: Category, names: &[&str]) -> Self {
        self.variants
            .extend
            .entry(category)
            .or_default()
            .extend(names.iter().map(|name| name.to_string()));
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        parse(text, &[])
    }

    /// Checks everything that can be checked without touching the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.content.iter().all(|pattern| pattern.trim().is_empty()) {
            return Err(ConfigError::EmptyContent);
        }

        for layer in [&self.theme.overrides, &self.theme.extend] {
            for (category, tokens) in layer {
                for (token, value) in tokens {
                    theme::validate_token(*category, token, value)?;
                }
            }
        }

        for layer in [&self.variants.enabled, &self.variants.extend] {
            for (category, names) in layer {
                if !category.is_utility() {
                    return Err(ConfigError::UnknownCategory {
                        section: "variants",
                        name: category.key().to_string(),
                    });
                }
                let unrecognized = |name: &&String| {
                    !variants::is_known_variant(name)
                        || (name.as_str() == variants::DARK && self.dark_mode == DarkMode::Disabled)
                };
                if let Some(name) = names.iter().find(unrecognized) {
                    return Err(ConfigError::UnknownVariant {
                        category: category.key(),
                        name: name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    load_with_content(path, &[])
}

/// Loads `path`, replacing its `content` globs with `content` when that is
/// non-empty.
pub fn load_with_content(path: &Path, content: &[String]) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text, content).map_err(|err| match err {
        ConfigError::Parse(message) => {
            ConfigError::Parse(format!("{}: {}", path.display(), message))
        }
        other => other,
    })
}

fn parse(text: &str, content: &[String]) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
    let mut config = raw.into_config()?;
    if !content.is_empty() {
        config.content = content.to_vec();
    }
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default, alias = "purge")]
    content: Option<RawContent>,
    #[serde(default, alias = "dark_mode")]
    dark_mode: Option<RawDarkMode>,
    #[serde(default)]
    theme: RawTheme,
    #[serde(default)]
    variants: RawVariants,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Globs(Vec<String>),
    Table { content: Vec<String> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDarkMode {
    Flag(bool),
    Strategy(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawToken {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl RawToken {
    fn into_value(self) -> String {
        match self {
            RawToken::Text(text) => text,
            RawToken::Integer(value) => value.to_string(),
            RawToken::Float(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawTheme {
    #[serde(default)]
    extend: BTreeMap<String, BTreeMap<String, RawToken>>,
    #[serde(flatten)]
    categories: BTreeMap<String, BTreeMap<String, RawToken>>,
}

#[derive(Debug, Deserialize, Default)]
struct RawVariants {
    #[serde(default)]
    extend: BTreeMap<String, Vec<String>>,
    #[serde(flatten)]
    categories: BTreeMap<String, Vec<String>>,
}

impl RawConfig {
    fn into_config(self) -> Result<Config, ConfigError> {
        let mode = match self.mode.as_deref() {
            None | Some("jit") => Mode::Jit,
            Some("aot") => Mode::Aot,
            Some(other) => return Err(ConfigError::InvalidMode(other.to_string())),
        };

        let content = match self.content {
            Some(RawContent::Globs(globs)) => globs,
            Some(RawContent::Table { content }) => content,
            None => Vec::new(),
        };

        let dark_mode = match self.dark_mode {
            None | Some(RawDarkMode::Flag(false)) => DarkMode::Disabled,
            Some(RawDarkMode::Flag(true)) => {
                return Err(ConfigError::InvalidDarkMode("true".to_string()));
            }
            Some(RawDarkMode::Strategy(strategy)) => match strategy.as_str() {
                "media" => DarkMode::Media,
                "class" => DarkMode::Class,
                _ => return Err(ConfigError::InvalidDarkMode(strategy)),
            },
        };

        let theme = ThemeConfig {
            overrides: convert_theme_layer(self.theme.categories)?,
            extend: convert_theme_layer(self.theme.extend)?,
        };
        let variants = VariantsConfig {
            enabled: convert_variant_layer(self.variants.categories)?,
            extend: convert_variant_layer(self.variants.extend)?,
        };

        Ok(Config {
            mode,
            content,
            dark_mode,
            theme,
            variants,
        })
    }
}

fn convert_theme_layer(
    layer: BTreeMap<String, BTreeMap<String, RawToken>>,
) -> Result<BTreeMap<Category, BTreeMap<String, String>>, ConfigError> {
    let mut out = BTreeMap::new();
    for (name, tokens) in layer {
        let category = Category::from_key(&name).ok_or(ConfigError::UnknownCategory {
            section: "theme",
            name,
        })?;
        let converted = tokens
            .into_iter()
            .map(|(token, value)| (token, value.into_value()))
            .collect();
        out.insert(category, converted);
    }
    Ok(out)
}

fn convert_variant_layer(
    layer: BTreeMap<String, Vec<String>>,
) -> Result<BTreeMap<Category, BTreeSet<String>>, ConfigError> {
    let mut out = BTreeMap::new();
    for (name, names) in layer {
        let category = Category::from_key(&name).ok_or(ConfigError::UnknownCategory {
            section: "variants",
            name,
        })?;
        out.insert(category, names.into_iter().collect());
    }
    Ok(out)
}
