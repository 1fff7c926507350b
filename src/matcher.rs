//! Candidate literal → utility rule.

use crate::theme::{self, Category, ThemeTable};
use crate::variants::{self, RuleWrapper, VariantContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UtilityKind {
    Scale,
    ScaleX,
    ScaleY,
    Flex,
    Transition,
    Duration,
    Delay,
    Opacity,
    ZIndex,
}

struct Utility {
    prefix: &'static str,
    category: Category,
    kind: UtilityKind,
}

// Longest prefix first so `scale-x-50` is never read as `scale-` + `x-50`.
const UTILITIES: &[Utility] = &[
    Utility {
        prefix: "scale-x",
        category: Category::Scale,
        kind: UtilityKind::ScaleX,
    },
    Utility {
        prefix: "scale-y",
        category: Category::Scale,
        kind: UtilityKind::ScaleY,
    },
    Utility {
        prefix: "scale",
        category: Category::Scale,
        kind: UtilityKind::Scale,
    },
    Utility {
        prefix: "flex",
        category: Category::Flex,
        kind: UtilityKind::Flex,
    },
    Utility {
        prefix: "transition",
        category: Category::TransitionProperty,
        kind: UtilityKind::Transition,
    },
    Utility {
        prefix: "duration",
        category: Category::TransitionDuration,
        kind: UtilityKind::Duration,
    },
    Utility {
        prefix: "delay",
        category: Category::TransitionDelay,
        kind: UtilityKind::Delay,
    },
    Utility {
        prefix: "opacity",
        category: Category::Opacity,
        kind: UtilityKind::Opacity,
    },
    Utility {
        prefix: "z",
        category: Category::ZIndex,
        kind: UtilityKind::ZIndex,
    },
];

const SCALE_COMPOSITION: &str = "var(--tw-scale-x, 1) var(--tw-scale-y, 1)";
const DEFAULT_TOKEN: &str = "DEFAULT";
const TRANSITION_TIMING: &str = "cubic-bezier(0.4, 0, 0.2, 1)";
const FALLBACK_DURATION: &str = "150ms";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenRef {
    Theme(String),
    Arbitrary(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

impl Declaration {
    fn new(property: &str, value: impl Into<String>) -> Self {
        Self {
            property: property.to_string(),
            value: value.into(),
        }
    }
}

/// A utility with its value resolved, before any modifier is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUtility {
    pub category: Category,
    pub token: TokenRef,
    pub important: bool,
    pub negative: bool,
    pub declarations: Vec<Declaration>,
}

/// A candidate that produced a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedUtility {
    pub literal: String,
    pub category: Category,
    pub token: TokenRef,
    pub modifiers: Vec<String>,
    pub important: bool,
    pub negative: bool,
    pub selector: String,
    pub wrappers: Vec<RuleWrapper>,
    pub declarations: Vec<Declaration>,
}

/// Resolves a full candidate literal, modifiers included.
///
/// `None` is the common case: most scanned text is not a utility class.
pub fn match_candidate(
    literal: &str,
    theme: &ThemeTable,
    context: &VariantContext,
) -> Option<MatchedUtility> {
    let (chain, base) = variants::parse_variants(literal);
    if chain.iter().any(|modifier| modifier.is_empty()) {
        return None;
    }
    let utility = match_utility(base, theme)?;
    let expansion = variants::expand(literal, utility.category, &chain, context)?;

    Some(MatchedUtility {
        literal: literal.to_string(),
        category: utility.category,
        token: utility.token,
        modifiers: chain.into_iter().map(str::to_string).collect(),
        important: utility.important,
        negative: utility.negative,
        selector: expansion.selector,
        wrappers: expansion.wrappers,
        declarations: utility.declarations,
    })
}

/// Resolves a base class (no modifier chain) against the theme.
pub fn match_utility(class: &str, theme: &ThemeTable) -> Option<BaseUtility> {
    let (class, important) = match class.strip_prefix('!') {
        Some(rest) => (rest, true),
        None => (class, false),
    };
    let (class, negative) = match class.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (class, false),
    };

    let utility = UTILITIES.iter().find(|utility| {
        class == utility.prefix
            || class
                .strip_prefix(utility.prefix)
                .is_some_and(|rest| rest.starts_with('-'))
    })?;
    if negative && !utility.category.allows_negative() {
        return None;
    }

    let (token, value) = match class
        .strip_prefix(utility.prefix)
        .and_then(|rest| rest.strip_prefix('-'))
    {
        None => {
            if utility.category.filters_default() {
                return None;
            }
            let value = theme.get(utility.category, DEFAULT_TOKEN)?;
            (TokenRef::Theme(DEFAULT_TOKEN.to_string()), value.to_string())
        }
        Some(suffix) => resolve_suffix(suffix, utility.category, theme)?,
    };

    let value = if negative {
        negate_value(&value)?
    } else {
        value
    };
    let mut declarations = declarations_for(utility.kind, value, theme);
    if important {
        for declaration in &mut declarations {
            declaration.value.push_str(" !important");
        }
    }

    Some(BaseUtility {
        category: utility.category,
        token,
        important,
        negative,
        declarations,
    })
}

fn resolve_suffix(
    suffix: &str,
    category: Category,
    theme: &ThemeTable,
) -> Option<(TokenRef, String)> {
    if let Some(raw) = suffix.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        // A value that could close the declaration block is never emitted.
        if raw.contains([';', '{', '}']) {
            return None;
        }
        let value = normalize_arbitrary_value(raw);
        if value.trim().is_empty() {
            return None;
        }
        return Some((TokenRef::Arbitrary(value.clone()), value));
    }
    if suffix.is_empty() || suffix == DEFAULT_TOKEN {
        return None;
    }
    let value = theme.get(category, suffix)?;
    Some((TokenRef::Theme(suffix.to_string()), value.to_string()))
}

fn declarations_for(kind: UtilityKind, value: String, theme: &ThemeTable) -> Vec<Declaration> {
    match kind {
        UtilityKind::Scale => vec![
            Declaration::new("--tw-scale-x", value.clone()),
            Declaration::new("--tw-scale-y", value),
            Declaration::new("scale", SCALE_COMPOSITION),
        ],
        UtilityKind::ScaleX => vec![
            Declaration::new("--tw-scale-x", value),
            Declaration::new("scale", SCALE_COMPOSITION),
        ],
        UtilityKind::ScaleY => vec![
            Declaration::new("--tw-scale-y", value),
            Declaration::new("scale", SCALE_COMPOSITION),
        ],
        UtilityKind::Flex => vec![Declaration::new("flex", value)],
        UtilityKind::Transition if value == "none" => {
            vec![Declaration::new("transition-property", value)]
        }
        UtilityKind::Transition => {
            let duration = theme
                .get(Category::TransitionDuration, DEFAULT_TOKEN)
                .unwrap_or(FALLBACK_DURATION);
            vec![
                Declaration::new("transition-property", value),
                Declaration::new("transition-timing-function", TRANSITION_TIMING),
                Declaration::new("transition-duration", duration),
            ]
        }
        UtilityKind::Duration => vec![Declaration::new("transition-duration", value)],
        UtilityKind::Delay => vec![Declaration::new("transition-delay", value)],
        UtilityKind::Opacity => vec![Declaration::new("opacity", value)],
        UtilityKind::ZIndex => vec![Declaration::new("z-index", value)],
    }
}

/// Keywords such as `auto` have no negative form.
fn negate_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if theme::is_number(trimmed) {
        if trimmed.chars().all(|ch| ch == '0' || ch == '.') {
            return Some(trimmed.to_string());
        }
        if let Some(positive) = trimmed.strip_prefix('-') {
            return Some(positive.to_string());
        }
        return Some(format!("-{}", trimmed.trim_start_matches('+')));
    }
    if trimmed.chars().all(|ch| ch.is_ascii_alphabetic() || ch == '-') {
        return None;
    }
    Some(format!("calc({} * -1)", trimmed))
}

/// Underscores stand for spaces inside brackets; `\_` keeps a literal one.
fn normalize_arbitrary_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'_') => {
                out.push('_');
                chars.next();
            }
            '_' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}
