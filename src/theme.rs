//! Design-token categories, the built-in default scales and the resolver that
//! folds configured tokens on top of them.

use crate::config::ThemeConfig;
use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::fmt;

/// A theme category. Declaration order is the global utility order used by the
/// emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    ZIndex,
    Flex,
    Scale,
    Opacity,
    TransitionProperty,
    TransitionDelay,
    TransitionDuration,
    /// Breakpoints for responsive modifiers; not a utility category.
    Screens,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::ZIndex,
        Category::Flex,
        Category::Scale,
        Category::Opacity,
        Category::TransitionProperty,
        Category::TransitionDelay,
        Category::TransitionDuration,
        Category::Screens,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::ZIndex => "zIndex",
            Category::Flex => "flex",
            Category::Scale => "scale",
            Category::Opacity => "opacity",
            Category::TransitionProperty => "transitionProperty",
            Category::TransitionDelay => "transitionDelay",
            Category::TransitionDuration => "transitionDuration",
            Category::Screens => "screens",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.key() == key)
    }

    pub fn is_utility(self) -> bool {
        self != Category::Screens
    }

    /// Categories whose `DEFAULT` token is not addressable through the bare
    /// utility prefix.
    pub fn filters_default(self) -> bool {
        matches!(
            self,
            Category::TransitionDuration | Category::TransitionDelay
        )
    }

    pub fn allows_negative(self) -> bool {
        matches!(self, Category::Scale | Category::ZIndex)
    }

    fn value_kind(self) -> ValueKind {
        match self {
            Category::ZIndex => ValueKind::ZIndex,
            Category::Flex => ValueKind::Flex,
            Category::Scale | Category::Opacity => ValueKind::Number,
            Category::TransitionProperty => ValueKind::PropertyList,
            Category::TransitionDelay | Category::TransitionDuration => ValueKind::Time,
            Category::Screens => ValueKind::Length,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Number,
    ZIndex,
    Flex,
    Time,
    Length,
    PropertyList,
}

impl ValueKind {
    fn describe(self) -> &'static str {
        match self {
            ValueKind::Number => "number",
            ValueKind::ZIndex => "integer or 'auto'",
            ValueKind::Flex => "flex shorthand",
            ValueKind::Time => "time (ms or s)",
            ValueKind::Length => "length",
            ValueKind::PropertyList => "comma-separated property list",
        }
    }

    fn accepts(self, value: &str) -> bool {
        let value = value.trim();
        match self {
            ValueKind::Number => is_number(value),
            ValueKind::ZIndex => value == "auto" || is_integer(value),
            ValueKind::Flex => is_flex_shorthand(value),
            ValueKind::Time => value == "0" || has_unit(value, &["ms", "s"]),
            ValueKind::Length => value == "0" || has_unit(value, LENGTH_UNITS),
            ValueKind::PropertyList => is_property_list(value),
        }
    }
}

const LENGTH_UNITS: &[&str] = &[
    "px", "rem", "em", "vh", "vw", "vmin", "vmax", "ch", "ex", "pt", "pc", "cm", "mm", "in",
];

pub type TokenMap = BTreeMap<String, String>;

/// Resolved (category, token) → CSS value lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThemeTable {
    tokens: BTreeMap<Category, TokenMap>,
}

impl ThemeTable {
    pub fn get(&self, category: Category, token: &str) -> Option<&str> {
        self.tokens
            .get(&category)
            .and_then(|tokens| tokens.get(token))
            .map(String::as_str)
    }

    pub fn tokens(&self, category: Category) -> Option<&TokenMap> {
        self.tokens.get(&category)
    }

    /// Breakpoints ordered from the narrowest to the widest.
    pub fn screens(&self) -> Vec<(String, String)> {
        let mut screens = self
            .tokens
            .get(&Category::Screens)
            .map(|tokens| {
                tokens
                    .iter()
                    .map(|(name, width)| (name.clone(), width.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        sort_breakpoints_by_length(&mut screens);
        screens
    }
}

/// Built-in scales, before any configuration is applied.
pub fn default_theme() -> BTreeMap<Category, TokenMap> {
    let mut theme = BTreeMap::new();
    theme.insert(
        Category::Scale,
        token_map(&[
            ("0", "0"),
            ("50", ".5"),
            ("75", ".75"),
            ("90", ".9"),
            ("95", ".95"),
            ("100", "1"),
            ("105", "1.05"),
            ("110", "1.1"),
            ("125", "1.25"),
            ("150", "1.5"),
        ]),
    );
    theme.insert(
        Category::Flex,
        token_map(&[
            ("1", "1 1 0%"),
            ("auto", "1 1 auto"),
            ("initial", "0 1 auto"),
            ("none", "none"),
        ]),
    );
    theme.insert(
        Category::TransitionDuration,
        token_map(&[
            ("DEFAULT", "150ms"),
            ("75", "75ms"),
            ("100", "100ms"),
            ("150", "150ms"),
            ("200", "200ms"),
            ("300", "300ms"),
            ("500", "500ms"),
            ("700", "700ms"),
            ("1000", "1000ms"),
        ]),
    );
    theme.insert(
        Category::TransitionProperty,
        token_map(&[
            (
                "DEFAULT",
                "background-color, border-color, color, fill, stroke, opacity, box-shadow, transform",
            ),
            ("none", "none"),
            ("all", "all"),
            ("colors", "background-color, border-color, color, fill, stroke"),
            ("opacity", "opacity"),
            ("shadow", "box-shadow"),
            ("transform", "transform"),
        ]),
    );
    theme.insert(
        Category::TransitionDelay,
        token_map(&[
            ("75", "75ms"),
            ("100", "100ms"),
            ("150", "150ms"),
            ("200", "200ms"),
            ("300", "300ms"),
            ("500", "500ms"),
            ("700", "700ms"),
            ("1000", "1000ms"),
        ]),
    );
    theme.insert(
        Category::Opacity,
        token_map(&[
            ("0", "0"),
            ("5", "0.05"),
            ("10", "0.1"),
            ("20", "0.2"),
            ("25", "0.25"),
            ("30", "0.3"),
            ("40", "0.4"),
            ("50", "0.5"),
            ("60", "0.6"),
            ("70", "0.7"),
            ("75", "0.75"),
            ("80", "0.8"),
            ("90", "0.9"),
            ("95", "0.95"),
            ("100", "1"),
        ]),
    );
    theme.insert(
        Category::ZIndex,
        token_map(&[
            ("auto", "auto"),
            ("0", "0"),
            ("10", "10"),
            ("20", "20"),
            ("30", "30"),
            ("40", "40"),
            ("50", "50"),
        ]),
    );
    theme.insert(
        Category::Screens,
        token_map(&[
            ("sm", "640px"),
            ("md", "768px"),
            ("lg", "1024px"),
            ("xl", "1280px"),
            ("2xl", "1536px"),
        ]),
    );
    theme
}

/// Folds `configured` onto `defaults` token by token.
///
/// `theme.<category>` entries are applied first and `theme.extend.<category>`
/// entries after them; neither ever removes a token it does not name.
pub fn resolve(
    defaults: &BTreeMap<Category, TokenMap>,
    configured: &ThemeConfig,
) -> Result<ThemeTable, ConfigError> {
    let mut tokens = defaults.clone();

    for layer in [&configured.overrides, &configured.extend] {
        for (category, entries) in layer {
            let target = tokens.entry(*category).or_default();
            for (token, value) in entries {
                validate_token(*category, token, value)?;
                target.insert(token.clone(), value.trim().to_string());
            }
        }
    }

    Ok(ThemeTable { tokens })
}

pub fn validate_token(category: Category, token: &str, value: &str) -> Result<(), ConfigError> {
    let kind = category.value_kind();
    if kind.accepts(value) {
        return Ok(());
    }
    Err(ConfigError::InvalidToken {
        category: category.key(),
        token: token.to_string(),
        value: value.to_string(),
        expected: kind.describe(),
    })
}

fn token_map(entries: &[(&str, &str)]) -> TokenMap {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

pub(crate) fn is_number(value: &str) -> bool {
    let digits = value
        .strip_prefix('-')
        .or_else(|| value.strip_prefix('+'))
        .unwrap_or(value);
    if digits.is_empty() {
        return false;
    }
    let mut seen_dot = false;
    let mut seen_digit = false;
    for ch in digits.chars() {
        match ch {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

fn is_integer(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit())
}

fn has_unit(value: &str, units: &[&str]) -> bool {
    units.iter().any(|unit| {
        value
            .strip_suffix(unit)
            .is_some_and(|number| is_number(number) && !number.starts_with('+'))
    })
}

fn is_flex_shorthand(value: &str) -> bool {
    if matches!(value, "none" | "auto" | "initial" | "inherit") {
        return true;
    }
    let parts = value.split_whitespace().collect::<Vec<_>>();
    if parts.is_empty() || parts.len() > 3 {
        return false;
    }
    parts.iter().all(|part| {
        is_number(part)
            || *part == "auto"
            || *part == "content"
            || has_unit(part, &["%"])
            || has_unit(part, LENGTH_UNITS)
    })
}

fn is_property_list(value: &str) -> bool {
    value.split(',').all(|name| {
        let name = name.trim();
        !name.is_empty()
            && name
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
    })
}

fn sort_breakpoints_by_length(breakpoints: &mut [(String, String)]) {
    breakpoints.sort_by(|a, b| {
        if let (Some((a_num, a_unit)), Some((b_num, b_unit))) =
            (parse_length_value(&a.1), parse_length_value(&b.1))
        {
            if a_unit == b_unit {
                return a_num
                    .partial_cmp(&b_num)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0));
            }
        }
        a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0))
    });
}

fn parse_length_value(raw: &str) -> Option<(f64, String)> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    let split_idx = value
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit() && *ch != '.')
        .map(|(idx, _)| idx)?;
    let number = value[..split_idx].parse::<f64>().ok()?;
    let unit = value[split_idx..].trim().to_string();
    if unit.is_empty() {
        return None;
    }
    Some((number, unit))
}
