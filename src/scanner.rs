use crate::cancel::CancelToken;
use crate::error::{Cancelled, ScanWarning};
use globset::{Glob, GlobMatcher, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// A string lifted from source that might be a class name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub path: PathBuf,
    /// 1-based; diagnostics only.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanOutput {
    pub candidates: Vec<Candidate>,
    pub warnings: Vec<ScanWarning>,
    pub files_scanned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub base_path: PathBuf,
    pub ignore: Vec<String>,
    pub respect_gitignore: bool,
    pub include_node_modules: bool,
    pub include_binary_files: bool,
    pub include_css_files: bool,
    pub include_lock_files: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            ignore: Vec::new(),
            respect_gitignore: true,
            include_node_modules: false,
            include_binary_files: false,
            include_css_files: false,
            include_lock_files: false,
        }
    }
}

/// Paths matched by the content globs, plus what went wrong expanding them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpandedGlobs {
    pub paths: Vec<PathBuf>,
    pub warnings: Vec<ScanWarning>,
}

/// Scans every file matched by `patterns` and returns the candidate list in
/// first-seen order.
///
/// Files are read in parallel; nothing is merged until every read of the pass
/// has finished, so cancellation never leaves a partial result behind.
pub fn scan(
    patterns: &[String],
    options: &ScanOptions,
    cancel: &CancelToken,
) -> Result<ScanOutput, Cancelled> {
    cancel.check()?;
    let ExpandedGlobs { paths, mut warnings } = expand_globs(patterns, options);
    cancel.check()?;

    let reads = paths
        .par_iter()
        .map(|path| {
            cancel.check()?;
            Ok(read_candidates(path))
        })
        .collect::<Result<Vec<_>, Cancelled>>()?;
    cancel.check()?;

    let mut candidates = Vec::new();
    let mut seen = HashSet::new();
    let mut files_scanned = 0;

    for (path, read) in paths.iter().zip(reads) {
        match read {
            Ok(found) => {
                files_scanned += 1;
                for (text, line) in found {
                    if seen.contains(&text) {
                        continue;
                    }
                    seen.insert(text.clone());
                    candidates.push(Candidate {
                        text,
                        path: path.clone(),
                        line,
                    });
                }
            }
            Err(warning) => warnings.push(warning),
        }
    }

    Ok(ScanOutput {
        candidates,
        warnings,
        files_scanned,
    })
}

/// Expands each glob to an ordered path list. A path claimed by an earlier
/// glob is not repeated for a later one.
pub fn expand_globs(patterns: &[String], options: &ScanOptions) -> ExpandedGlobs {
    let mut warnings = Vec::new();
    let matchers = patterns
        .iter()
        .filter_map(|pattern| match Glob::new(pattern) {
            Ok(glob) => Some((pattern, glob.compile_matcher())),
            Err(err) => {
                warnings.push(ScanWarning::InvalidGlob {
                    pattern: pattern.clone(),
                    reason: err.to_string(),
                });
                None
            }
        })
        .collect::<Vec<_>>();
    let ignore_set = match build_globset(&options.ignore) {
        Ok(set) => set,
        Err(warning) => {
            warnings.push(warning);
            GlobSet::empty()
        }
    };

    let files = walk_files(options, &ignore_set, &mut warnings);
    let mut paths = Vec::new();
    let mut seen = HashSet::new();

    for (pattern, matcher) in &matchers {
        let mut matched_any = false;
        for path in &files {
            if !glob_matches(matcher, path, &options.base_path) {
                continue;
            }
            matched_any = true;
            if seen.insert(path.clone()) {
                paths.push(path.clone());
            }
        }
        if !matched_any {
            warnings.push(ScanWarning::EmptyGlob((*pattern).clone()));
        }
    }

    ExpandedGlobs { paths, warnings }
}

fn walk_files(
    options: &ScanOptions,
    ignore_set: &GlobSet,
    warnings: &mut Vec<ScanWarning>,
) -> Vec<PathBuf> {
    let mut builder = WalkBuilder::new(&options.base_path);
    builder
        .hidden(false)
        .git_ignore(options.respect_gitignore)
        .git_global(options.respect_gitignore)
        .git_exclude(options.respect_gitignore)
        .require_git(false)
        .sort_by_file_name(|left, right| left.cmp(right));

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = walk_error_path(&err).unwrap_or(&options.base_path);
                warnings.push(ScanWarning::Unreadable {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let relative_path = path.strip_prefix(&options.base_path).unwrap_or(path);
        if ignore_set.is_match(relative_path) || ignore_set.is_match(path) {
            continue;
        }
        if should_skip_file(path, options) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files
}

fn walk_error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::Loop { child, .. } => Some(child.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            walk_error_path(err)
        }
        _ => None,
    }
}

fn glob_matches(matcher: &GlobMatcher, path: &Path, base_path: &Path) -> bool {
    let relative_path = path.strip_prefix(base_path).unwrap_or(path);
    matcher.is_match(relative_path) || matcher.is_match(path)
}

fn read_candidates(path: &Path) -> Result<Vec<(String, usize)>, ScanWarning> {
    let text = fs::read_to_string(path).map_err(|err| ScanWarning::Unreadable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok(extract_candidates(&text))
}

fn should_skip_file(path: &Path, options: &ScanOptions) -> bool {
    if !options.include_node_modules
        && path
            .components()
            .any(|component| component.as_os_str() == "node_modules")
    {
        return true;
    }

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("");
    if !options.include_lock_files && is_common_lock_file(file_name) {
        return true;
    }

    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase());
    if let Some(ext) = ext.as_deref() {
        if !options.include_css_files && is_css_extension(ext) {
            return true;
        }
        if !options.include_binary_files && is_binary_extension(ext) {
            return true;
        }
    }

    false
}

fn is_css_extension(ext: &str) -> bool {
    matches!(ext, "css" | "scss" | "sass" | "less" | "styl" | "pcss")
}

fn is_binary_extension(ext: &str) -> bool {
    matches!(
        ext,
        "png"
            | "jpg"
            | "jpeg"
            | "gif"
            | "webp"
            | "ico"
            | "bmp"
            | "avif"
            | "mp4"
            | "mov"
            | "webm"
            | "mp3"
            | "wav"
            | "ogg"
            | "zip"
            | "gz"
            | "tgz"
            | "7z"
            | "pdf"
            | "woff"
            | "woff2"
            | "ttf"
            | "otf"
            | "wasm"
    )
}

fn is_common_lock_file(file_name: &str) -> bool {
    matches!(
        file_name,
        "package-lock.json"
            | "pnpm-lock.yaml"
            | "yarn.lock"
            | "bun.lockb"
            | "bun.lock"
            | "npm-shrinkwrap.json"
            | "Cargo.lock"
            | "composer.lock"
            | "Gemfile.lock"
            | "poetry.lock"
    )
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ScanWarning> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| ScanWarning::InvalidGlob {
            pattern: pattern.clone(),
            reason: err.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|err| ScanWarning::InvalidGlob {
        pattern: patterns.join(", "),
        reason: err.to_string(),
    })
}

/// Lexical candidate extraction: every maximal run of class-name characters,
/// with `[...]` groups taken whole. Knows nothing about the host language, so
/// it over-produces; the matcher discards what is not a utility.
///
/// Returns `(text, line)` pairs in source order, duplicates included.
pub fn extract_candidates(text: &str) -> Vec<(String, usize)> {
    let mut out = Vec::new();
    let mut line = 1usize;
    let mut idx = 0usize;

    while idx < text.len() {
        let Some((ch, size)) = next_char(text, idx) else {
            break;
        };
        if is_class_char(ch) || ch == '[' {
            let end = scan_run(text, idx);
            if end > idx {
                push_run(&text[idx..end], line, &mut out);
                idx = end;
                continue;
            }
        }
        if ch == '\n' {
            line += 1;
        }
        idx += size;
    }

    out
}

fn scan_run(text: &str, start: usize) -> usize {
    let mut idx = start;
    while idx < text.len() {
        let Some((ch, size)) = next_char(text, idx) else {
            break;
        };
        if ch == '[' {
            match bracket_end(text, idx) {
                Some(end) => {
                    idx = end;
                    continue;
                }
                None => break,
            }
        }
        if !is_class_char(ch) {
            break;
        }
        idx += size;
    }
    idx
}

/// Index just past the `]` closing the bracket opened at `open`.
fn bracket_end(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut idx = open;
    while idx < text.len() {
        let (ch, size) = next_char(text, idx)?;
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx + size);
                }
            }
            '"' | '\'' | '`' | '{' | '}' | '<' | '>' => return None,
            _ if ch.is_whitespace() => return None,
            _ => {}
        }
        idx += size;
    }
    None
}

fn push_run(run: &str, line: usize, out: &mut Vec<(String, usize)>) {
    if !run.chars().any(|ch| ch.is_ascii_alphabetic()) {
        return;
    }
    out.push((run.to_string(), line));

    let trimmed = run
        .trim_start_matches(['.', ':', '/'])
        .trim_end_matches(['.', ':', '/']);
    if trimmed != run && trimmed.chars().any(|ch| ch.is_ascii_alphabetic()) {
        out.push((trimmed.to_string(), line));
    }
}

fn is_class_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ':' | '/' | '.' | '!')
}

fn next_char(text: &str, idx: usize) -> Option<(char, usize)> {
    text[idx..].chars().next().map(|ch| (ch, ch.len_utf8()))
}
