use crate::matcher::{Declaration, MatchedUtility};
use crate::theme::Category;
use crate::variants::RuleWrapper;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmitOptions {
    pub minify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedRule {
    pub category: Category,
    pub selector: String,
    pub wrappers: Vec<RuleWrapper>,
    pub css: String,
}

/// Ordered, deduplicated output of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stylesheet {
    rules: Vec<EmittedRule>,
    minify: bool,
}

impl Stylesheet {
    pub fn rules(&self) -> &[EmittedRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn to_css(&self) -> String {
        if self.minify {
            return self
                .rules
                .iter()
                .map(|rule| rule.css.as_str())
                .collect::<Vec<_>>()
                .join("");
        }
        let mut css = self
            .rules
            .iter()
            .map(|rule| rule.css.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if !css.is_empty() {
            css.push('\n');
        }
        css
    }
}

impl fmt::Display for Stylesheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RuleSortKey {
    category: Category,
    first_seen: usize,
}

/// Renders `matched` (in first-seen order) into a stylesheet.
///
/// Rules are grouped by category in the global category order, then kept in
/// first-seen order within a category. A selector already emitted under the
/// same wrappers is skipped.
pub fn emit(matched: &[Arc<MatchedUtility>], options: &EmitOptions) -> Stylesheet {
    let mut seen = HashSet::new();
    let mut keyed = Vec::with_capacity(matched.len());

    for (first_seen, utility) in matched.iter().enumerate() {
        if !seen.insert((utility.wrappers.clone(), utility.selector.clone())) {
            continue;
        }
        let key = RuleSortKey {
            category: utility.category,
            first_seen,
        };
        keyed.push((key, utility));
    }

    keyed.sort_by(|(left, _), (right, _)| left.cmp(right));

    let rules = keyed
        .into_iter()
        .map(|(_, utility)| EmittedRule {
            category: utility.category,
            selector: utility.selector.clone(),
            wrappers: utility.wrappers.clone(),
            css: render_rule(utility, options.minify),
        })
        .collect();

    Stylesheet {
        rules,
        minify: options.minify,
    }
}

fn render_rule(utility: &MatchedUtility, minify: bool) -> String {
    let mut css = rule(&utility.selector, &utility.declarations, minify);
    for wrapper in utility.wrappers.iter().rev() {
        css = wrap_rule(wrapper, &css, minify);
    }
    css
}

fn rule(selector: &str, declarations: &[Declaration], minify: bool) -> String {
    if minify {
        let body = declarations
            .iter()
            .map(|decl| format!("{}:{}", decl.property, decl.value))
            .collect::<Vec<_>>()
            .join(";");
        return format!("{}{{{}}}", selector, body);
    }
    let lines = declarations
        .iter()
        .map(|decl| format!("  {}: {};", decl.property, decl.value))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{} {{\n{}\n}}", selector, lines)
}

fn wrap_rule(wrapper: &RuleWrapper, rule: &str, minify: bool) -> String {
    match wrapper {
        RuleWrapper::Media(query) => {
            if minify {
                format!("@media {}{{{}}}", query, rule)
            } else {
                format!("@media {} {{\n{}\n}}", query, indent_css_block(rule, 2))
            }
        }
    }
}

fn indent_css_block(css: &str, spaces: usize) -> String {
    let padding = " ".repeat(spaces);
    css.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", padding, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
