//! Modifier prefixes (`dark:`, `md:`, `hover:` …) and how they turn a base
//! utility into its final selector and conditional wrappers.

use crate::config::{Config, DarkMode, Mode};
use crate::theme::{Category, ThemeTable};
use std::collections::{BTreeMap, BTreeSet};

const PSEUDO_CLASS_VARIANTS: &[(&str, &str)] = &[
    ("hover", ":hover"),
    ("focus", ":focus"),
    ("focus-within", ":focus-within"),
    ("focus-visible", ":focus-visible"),
    ("active", ":active"),
    ("visited", ":visited"),
    ("disabled", ":disabled"),
    ("checked", ":checked"),
    ("first", ":first-child"),
    ("last", ":last-child"),
    ("odd", ":nth-child(odd)"),
    ("even", ":nth-child(even)"),
];

const GROUP_VARIANTS: &[(&str, &str)] = &[
    ("group-hover", ".group:hover"),
    ("group-focus", ".group:focus"),
];

const MEDIA_VARIANTS: &[(&str, &str)] = &[
    ("motion-safe", "(prefers-reduced-motion: no-preference)"),
    ("motion-reduce", "(prefers-reduced-motion: reduce)"),
];

const DARK_MEDIA_QUERY: &str = "(prefers-color-scheme: dark)";
const DARK_CLASS_SELECTOR: &str = ".dark";

/// Name that enables every responsive breakpoint in a `variants` entry.
pub const RESPONSIVE: &str = "responsive";
pub const DARK: &str = "dark";

/// Whether `name` may appear in a `variants.<category>` list.
pub fn is_known_variant(name: &str) -> bool {
    name == RESPONSIVE
        || name == DARK
        || lookup(PSEUDO_CLASS_VARIANTS, name).is_some()
        || lookup(GROUP_VARIANTS, name).is_some()
        || lookup(MEDIA_VARIANTS, name).is_some()
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleWrapper {
    Media(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Modifier {
    Dark,
    Screen(String),
    Media(&'static str, &'static str),
    PseudoClass(&'static str, &'static str),
    Ancestor(&'static str, &'static str),
}

impl Modifier {
    fn config_name(&self) -> &str {
        match self {
            Modifier::Dark => DARK,
            Modifier::Screen(_) => RESPONSIVE,
            Modifier::Media(name, _)
            | Modifier::PseudoClass(name, _)
            | Modifier::Ancestor(name, _) => *name,
        }
    }
}

/// Everything variant expansion depends on, derived once per configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantContext {
    mode: Mode,
    dark_mode: DarkMode,
    screens: Vec<(String, String)>,
    enabled: BTreeMap<Category, BTreeSet<String>>,
}

impl VariantContext {
    pub fn new(config: &Config, theme: &ThemeTable) -> Self {
        let mut enabled = BTreeMap::new();
        for category in Category::ALL.into_iter().filter(|c| c.is_utility()) {
            let mut names = match config.variants.enabled.get(&category) {
                Some(names) => names.clone(),
                None => default_enabled(category),
            };
            if let Some(extra) = config.variants.extend.get(&category) {
                names.extend(extra.iter().cloned());
            }
            enabled.insert(category, names);
        }

        Self {
            mode: config.mode,
            dark_mode: config.dark_mode,
            screens: theme.screens(),
            enabled,
        }
    }

    fn recognize(&self, name: &str) -> Option<Modifier> {
        if name == DARK {
            return match self.dark_mode {
                DarkMode::Disabled => None,
                DarkMode::Media | DarkMode::Class => Some(Modifier::Dark),
            };
        }
        if let Some((_, width)) = self.screens.iter().find(|(screen, _)| screen == name) {
            return Some(Modifier::Screen(width.clone()));
        }
        if let Some((name, query)) = find(MEDIA_VARIANTS, name) {
            return Some(Modifier::Media(name, query));
        }
        if let Some((name, pseudo)) = find(PSEUDO_CLASS_VARIANTS, name) {
            return Some(Modifier::PseudoClass(name, pseudo));
        }
        if let Some((name, ancestor)) = find(GROUP_VARIANTS, name) {
            return Some(Modifier::Ancestor(name, ancestor));
        }
        None
    }

    fn is_enabled(&self, category: Category, modifier: &Modifier) -> bool {
        if self.mode == Mode::Jit {
            return true;
        }
        self.enabled
            .get(&category)
            .is_some_and(|names| names.contains(modifier.config_name()))
    }
}

fn default_enabled(category: Category) -> BTreeSet<String> {
    let names: &[&str] = match category {
        Category::ZIndex => &[RESPONSIVE, "focus-within", "focus"],
        Category::Scale => &[RESPONSIVE, "hover", "focus"],
        Category::Opacity => &[RESPONSIVE, "group-hover", "focus-within", "hover", "focus"],
        Category::Flex
        | Category::TransitionProperty
        | Category::TransitionDelay
        | Category::TransitionDuration
        | Category::Screens => &[RESPONSIVE],
    };
    names.iter().map(|name| name.to_string()).collect()
}

/// Final selector plus wrappers, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub selector: String,
    pub wrappers: Vec<RuleWrapper>,
}

/// Applies `chain` left to right to the rule for `literal`.
///
/// Returns `None` when any modifier is unrecognized or not enabled for
/// `category`; the candidate is then dropped.
pub fn expand(
    literal: &str,
    category: Category,
    chain: &[&str],
    context: &VariantContext,
) -> Option<Expansion> {
    let mut selector = format!(".{}", escape_selector(literal));
    let mut ancestors = Vec::new();
    let mut wrappers = Vec::new();

    for name in chain {
        let modifier = context.recognize(name)?;
        if !context.is_enabled(category, &modifier) {
            return None;
        }
        match modifier {
            Modifier::Dark => match context.dark_mode {
                DarkMode::Class => ancestors.push(DARK_CLASS_SELECTOR),
                DarkMode::Media => wrappers.push(RuleWrapper::Media(DARK_MEDIA_QUERY.to_string())),
                DarkMode::Disabled => return None,
            },
            Modifier::Screen(width) => {
                wrappers.push(RuleWrapper::Media(format!("(min-width: {})", width)));
            }
            Modifier::Media(_, query) => wrappers.push(RuleWrapper::Media(query.to_string())),
            Modifier::PseudoClass(_, pseudo) => selector.push_str(pseudo),
            Modifier::Ancestor(_, ancestor) => ancestors.push(ancestor),
        }
    }

    if !ancestors.is_empty() {
        selector = format!("{} {}", ancestors.join(" "), selector);
    }

    Some(Expansion {
        selector,
        wrappers,
    })
}

/// Splits `dark:hover:scale-50` into `(["dark", "hover"], "scale-50")`,
/// ignoring colons inside arbitrary values.
pub fn parse_variants(class: &str) -> (Vec<&str>, &str) {
    let mut paren_depth = 0usize;
    let mut bracket_depth = 0usize;
    let mut split_indices = Vec::new();

    for (idx, ch) in class.char_indices() {
        match ch {
            '(' => paren_depth += 1,
            ')' => paren_depth = paren_depth.saturating_sub(1),
            '[' => bracket_depth += 1,
            ']' => bracket_depth = bracket_depth.saturating_sub(1),
            ':' if paren_depth == 0 && bracket_depth == 0 => split_indices.push(idx),
            _ => {}
        }
    }

    if split_indices.is_empty() {
        return (Vec::new(), class);
    }
    let mut variants = Vec::new();
    let mut start = 0usize;
    for idx in split_indices {
        variants.push(&class[start..idx]);
        start = idx + 1;
    }
    (variants, &class[start..])
}

pub fn escape_selector(class: &str) -> String {
    let mut escaped = String::with_capacity(class.len() * 2);

    for (idx, ch) in class.chars().enumerate() {
        if idx == 0 && ch.is_ascii_digit() {
            escaped.push_str(&format!("\\{:x} ", ch as u32));
            continue;
        }
        match ch {
            '\\' => escaped.push_str("\\\\"),
            ':' => escaped.push_str("\\:"),
            '/' => escaped.push_str("\\/"),
            '[' => escaped.push_str("\\["),
            ']' => escaped.push_str("\\]"),
            '(' => escaped.push_str("\\("),
            ')' => escaped.push_str("\\)"),
            '%' => escaped.push_str("\\%"),
            '!' => escaped.push_str("\\!"),
            '#' => escaped.push_str("\\#"),
            ',' => escaped.push_str("\\,"),
            '+' => escaped.push_str("\\+"),
            '*' => escaped.push_str("\\*"),
            '.' => escaped.push_str("\\."),
            _ => escaped.push(ch),
        }
    }

    escaped
}

fn lookup(table: &[(&'static str, &'static str)], name: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, value)| *value)
}

fn find(
    table: &[(&'static str, &'static str)],
    name: &str,
) -> Option<(&'static str, &'static str)> {
    table.iter().copied().find(|(candidate, _)| *candidate == name)
}

#[cfg(test)]
mod tests {
    use super::{Expansion, RuleWrapper, VariantContext, escape_selector, expand, parse_variants};
    use crate::config::{Config, DarkMode, Mode};
    use crate::theme::{Category, default_theme, resolve};

    fn context(config: &Config) -> VariantContext {
        let theme = resolve(&default_theme(), &config.theme).expect("theme should resolve");
        VariantContext::new(config, &theme)
    }

    fn dark(strategy: DarkMode) -> VariantContext {
        context(&Config::new(["src/**/*.rs"]).with_dark_mode(strategy))
    }

    #[test]
    fn splits_modifier_chain() {
        assert_eq!(
            parse_variants("dark:hover:scale-400"),
            (vec!["dark", "hover"], "scale-400")
        );
        assert_eq!(
            parse_variants("md:duration-[var(--a:b)]"),
            (vec!["md"], "duration-[var(--a:b)]")
        );
        assert_eq!(parse_variants("flex-1"), (vec![], "flex-1"));
    }

    #[test]
    fn dark_media_strategy_wraps_in_color_scheme_query() {
        let expansion = expand("dark:scale-400", Category::Scale, &["dark"], &dark(DarkMode::Media))
            .expect("dark should expand");
        assert_eq!(
            expansion,
            Expansion {
                selector: ".dark\\:scale-400".to_string(),
                wrappers: vec![RuleWrapper::Media("(prefers-color-scheme: dark)".to_string())],
            }
        );
    }

    #[test]
    fn dark_class_strategy_adds_ancestor_selector() {
        let expansion = expand("dark:scale-400", Category::Scale, &["dark"], &dark(DarkMode::Class))
            .expect("dark should expand");
        assert_eq!(expansion.selector, ".dark .dark\\:scale-400");
        assert!(expansion.wrappers.is_empty());
    }

    #[test]
    fn dark_is_unrecognized_when_disabled() {
        assert!(
            expand("dark:scale-400", Category::Scale, &["dark"], &dark(DarkMode::Disabled))
                .is_none()
        );
    }

    #[test]
    fn pseudo_classes_nest_inside_media_wrappers() {
        let expansion = expand(
            "hover:md:dark:scale-50",
            Category::Scale,
            &["hover", "md", "dark"],
            &dark(DarkMode::Media),
        )
        .expect("chain should expand");
        assert_eq!(expansion.selector, ".hover\\:md\\:dark\\:scale-50:hover");
        assert_eq!(
            expansion.wrappers,
            vec![
                RuleWrapper::Media("(min-width: 768px)".to_string()),
                RuleWrapper::Media("(prefers-color-scheme: dark)".to_string()),
            ]
        );
    }

    #[test]
    fn group_modifiers_prepend_ancestors_in_chain_order() {
        let expansion = expand(
            "dark:group-hover:opacity-50",
            Category::Opacity,
            &["dark", "group-hover"],
            &dark(DarkMode::Class),
        )
        .expect("chain should expand");
        assert_eq!(
            expansion.selector,
            ".dark .group:hover .dark\\:group-hover\\:opacity-50"
        );
    }

    #[test]
    fn unknown_modifier_drops_candidate() {
        assert!(expand("wiggle:scale-50", Category::Scale, &["wiggle"], &dark(DarkMode::Media)).is_none());
    }

    #[test]
    fn aot_mode_honours_per_category_variants() {
        let config = Config::new(["a"])
            .with_mode(Mode::Aot)
            .extend_variants(Category::Flex, &["hover"]);
        let ctx = context(&config);
        assert!(expand("hover:flex-1", Category::Flex, &["hover"], &ctx).is_some());
        assert!(expand("md:flex-1", Category::Flex, &["md"], &ctx).is_some());
        assert!(expand("focus:flex-1", Category::Flex, &["focus"], &ctx).is_none());
        assert!(expand("focus:scale-50", Category::Scale, &["focus"], &ctx).is_some());

        let replaced = Config::new(["a"])
            .with_mode(Mode::Aot)
            .enable_variants(Category::Scale, &["active"]);
        let ctx = context(&replaced);
        assert!(expand("active:scale-50", Category::Scale, &["active"], &ctx).is_some());
        assert!(expand("hover:scale-50", Category::Scale, &["hover"], &ctx).is_none());
        assert!(expand("md:scale-50", Category::Scale, &["md"], &ctx).is_none());
    }

    #[test]
    fn escapes_leading_digits_and_punctuation() {
        assert_eq!(escape_selector("2xl:scale-50"), "\\32 xl\\:scale-50");
        assert_eq!(escape_selector("!scale-[1.5]"), "\\!scale-\\[1\\.5\\]");
        assert_eq!(escape_selector("flex-[2_2_0%]"), "flex-\\[2_2_0\\%\\]");
    }
}
