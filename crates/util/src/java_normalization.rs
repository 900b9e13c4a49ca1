//! Normalization of Java snippets so that code blocks can be matched against
//! commit diffs regardless of formatting, comments, or imports.

use once_cell::sync::Lazy;
use regex::Regex;

static IMPORT_STATEMENT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*import").expect("import pattern is valid"));
static PACKAGE_DECLARATION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*package").expect("package pattern is valid"));
static ELLIPSIS_LINE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\.+\s*$").expect("ellipsis pattern is valid"));
static LINE_COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.*?)//.*$").expect("line comment pattern is valid"));
static BLOCK_COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\*.*?\*/").expect("block comment pattern is valid"));
static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

const STRIPPED_CHARACTERS: &[char] = &['{', '}', ';', '(', ')'];

/// Normalize a string with Java source code.
///
/// Lines are lower-cased; import statements, package declarations and lines
/// consisting only of dots are dropped; line comments, braces, semicolons,
/// parentheses and whitespace are removed. Block comments are removed from the
/// joined result, which contains no whitespace at all.
///
/// # Example
/// ```rust
/// use retriever_util::normalize_java;
///
/// let source = "import java.util.List;\n\npublic void run() { // entry\n  go( );\n}";
/// assert_eq!(normalize_java(source), "publicvoidrungo");
/// ```
pub fn normalize_java(source_code: &str) -> String {
    let mut normalized_lines: Vec<String> = Vec::new();

    for line in source_code.split('\n') {
        let lowered = line.to_lowercase();

        if IMPORT_STATEMENT_REGEX.is_match(&lowered)
            || PACKAGE_DECLARATION_REGEX.is_match(&lowered)
            || ELLIPSIS_LINE_REGEX.is_match(&lowered)
        {
            continue;
        }

        let without_comment = match LINE_COMMENT_REGEX.captures(&lowered) {
            Some(captures) => captures.get(1).map(|code| code.as_str()).unwrap_or_default().to_string(),
            None => lowered,
        };
        let without_symbols = without_comment.replace(STRIPPED_CHARACTERS, "");
        let compact = WHITESPACE_REGEX.replace_all(&without_symbols, "");

        if !compact.is_empty() {
            normalized_lines.push(compact.into_owned());
        }
    }

    let joined = normalized_lines.join(" ");
    let without_block_comments = BLOCK_COMMENT_REGEX.replace_all(&joined, "");
    WHITESPACE_REGEX.replace_all(&without_block_comments, "").into_owned()
}

/// Lines added by a unified diff (lines starting with `+`), prefix removed,
/// joined with newlines.
pub fn added_lines(patch: &str) -> String {
    patch
        .split('\n')
        .filter_map(|line| line.strip_prefix('+'))
        .collect::<Vec<_>>()
        .join("\n")
}
