// Diagnostic reporting for the Smalls language core.
// Rust-quality messages with spans, colors, and "did you mean?" suggestions.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod span_map;
pub use span_map::SpanMap;

/// A source position expressed as one-based (line, column) pairs.
///
/// This is what a diagnostic sink actually receives -- no file name, since
/// the sink call is already scoped to one script. `Span` (below) pairs a
/// `SourceRange` with a file name for pretty-printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SourceRange {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    pub fn point(line: u32, column: u32) -> Self {
        Self::new(line, column, line, column)
    }

    pub fn unknown() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Span length in columns, for single-line ranges. Multi-line ranges
    /// are underlined starting at column 1 of `^` characters.
    pub fn length(&self) -> usize {
        if self.end_line == self.start_line {
            (self.end_column.saturating_sub(self.start_column) as usize).max(1)
        } else {
            1
        }
    }
}

/// Source code location (file, line, column, underline length).
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub length: usize,
}

impl Span {
    pub fn new(file: String, line: usize, column: usize, length: usize) -> Self {
        Self {
            file,
            line,
            column,
            length,
        }
    }

    pub fn from_range(file: &str, range: SourceRange) -> Self {
        Self {
            file: file.to_string(),
            line: range.start_line as usize,
            column: range.start_column as usize,
            length: range.length(),
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
            length: 0,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Error,
    Warning,
    Info,
    Note,
    Help,
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorLevel::Error => write!(f, "{}", "error".red().bold()),
            ErrorLevel::Warning => write!(f, "{}", "warning".yellow().bold()),
            ErrorLevel::Info => write!(f, "{}", "info".blue().bold()),
            ErrorLevel::Note => write!(f, "{}", "note".cyan().bold()),
            ErrorLevel::Help => write!(f, "{}", "help".green().bold()),
        }
    }
}

/// Structured diagnostic message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: ErrorLevel,
    pub code: String,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
    pub suggestion: Option<Suggestion>,
}

/// Code suggestion with replacement.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub message: String,
    pub replacement: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(level: ErrorLevel, code: &str, message: String, span: Span) -> Self {
        Self {
            level,
            code: code.to_string(),
            message,
            span,
            notes: Vec::new(),
            help: None,
            suggestion: None,
        }
    }

    pub fn error(code: &str, message: String, span: Span) -> Self {
        Self::new(ErrorLevel::Error, code, message, span)
    }

    pub fn warning(code: &str, message: String, span: Span) -> Self {
        Self::new(ErrorLevel::Warning, code, message, span)
    }

    pub fn info(code: &str, message: String, span: Span) -> Self {
        Self::new(ErrorLevel::Info, code, message, span)
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    pub fn with_suggestion(mut self, message: String, replacement: String, span: Span) -> Self {
        self.suggestion = Some(Suggestion {
            message,
            replacement,
            span,
        });
        self
    }

    /// Format diagnostic in Rust-style, with a source snippet.
    pub fn format(&self, source_code: &str) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "{}[{}]: {}\n",
            self.level,
            self.code,
            self.message.bold()
        ));

        output.push_str(&format!(
            " {} {}:{}:{}\n",
            "-->".cyan().bold(),
            self.span.file,
            self.span.line,
            self.span.column
        ));

        if let Some(snippet) = self.get_source_snippet(source_code) {
            output.push_str(&snippet);
        }

        for note in &self.notes {
            output.push_str(&format!(" {} {}\n", "=".cyan().bold(), note.cyan()));
        }

        if let Some(help) = &self.help {
            output.push_str(&format!(" {} {}\n", "help:".green().bold(), help));
        }

        if let Some(suggestion) = &self.suggestion {
            output.push_str(&format!(
                " {} {}\n",
                "help:".green().bold(),
                suggestion.message
            ));
        }

        output
    }

    fn format_simple(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "{}[{}]: {}\n",
            self.level,
            self.code,
            self.message.bold()
        ));

        output.push_str(&format!(
            " {} {}:{}:{}\n",
            "-->".cyan().bold(),
            self.span.file,
            self.span.line,
            self.span.column
        ));

        for note in &self.notes {
            output.push_str(&format!(" {} {}\n", "=".cyan().bold(), note.cyan()));
        }

        if let Some(help) = &self.help {
            output.push_str(&format!(" {} {}\n", "help:".green().bold(), help));
        }

        output
    }

    fn get_source_snippet(&self, source_code: &str) -> Option<String> {
        let lines: Vec<&str> = source_code.lines().collect();

        if self.span.line == 0 || self.span.line > lines.len() {
            return None;
        }

        let line_idx = self.span.line - 1;
        let line = lines[line_idx];

        let mut snippet = String::new();
        let line_num_width = self.span.line.to_string().len().max(2);

        snippet.push_str(&format!(" {}\n", " ".repeat(line_num_width + 1).cyan()));
        snippet.push_str(&format!(
            " {} {} {}\n",
            format!("{:>width$}", self.span.line, width = line_num_width)
                .cyan()
                .bold(),
            "|".cyan().bold(),
            line
        ));

        let padding = " ".repeat(line_num_width + 3 + self.span.column.saturating_sub(1));
        let underline = "^".repeat(self.span.length.max(1));
        snippet.push_str(&format!(
            " {} {}{}\n",
            " ".repeat(line_num_width + 1).cyan(),
            padding,
            underline.red().bold()
        ));

        Some(snippet)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

/// Receives diagnostics as they are produced. The resolver never formats or
/// prints anything itself -- it reports to whatever sink the embedder
/// configured on the `Context` and keeps going.
///
/// Mirrors the three entry points a compilation pipeline needs: lexical and
/// parse diagnostics pass through from the external lexer/parser untouched,
/// semantic diagnostics originate in this core.
pub trait DiagnosticSink {
    fn lexical_diagnostic(&mut self, script: &str, message: &str, is_warning: bool, range: SourceRange);
    fn parse_diagnostic(&mut self, script: &str, message: &str, is_warning: bool, range: SourceRange);
    fn semantic_diagnostic(&mut self, script: &str, message: &str, is_warning: bool, range: SourceRange);
}

/// How much AST/source information a compiled module retains after
/// compilation finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugLevel {
    /// Discard the AST once analysis completes.
    None,
    /// Keep spans but discard the full tree.
    SourceMap,
    /// Retain the full AST for tooling.
    #[default]
    Full,
}

/// Zero means unlimited, matching the embedder's ability to opt out of a
/// given guard rail entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_ast_nodes: usize,
    pub max_parse_depth: usize,
    pub max_type_instantiations: usize,
    pub max_generic_function_instantiations: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_ast_nodes: 0,
            max_parse_depth: 0,
            max_type_instantiations: 0,
            max_generic_function_instantiations: 0,
        }
    }
}

/// In-memory diagnostic collection and reporting engine, also usable
/// directly as a `DiagnosticSink`.
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
    info_count: usize,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            ErrorLevel::Error => self.error_count += 1,
            ErrorLevel::Warning => self.warning_count += 1,
            ErrorLevel::Info => self.info_count += 1,
            _ => {}
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn emit_error(&mut self, code: &str, message: String, span: Span) {
        self.emit(Diagnostic::error(code, message, span));
    }

    pub fn emit_warning(&mut self, code: &str, message: String, span: Span) {
        self.emit(Diagnostic::warning(code, message, span));
    }

    pub fn emit_info(&mut self, code: &str, message: String, span: Span) {
        self.emit(Diagnostic::info(code, message, span));
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn info_count(&self) -> usize {
        self.info_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn print_all(&self, source_code: &str) {
        for diag in &self.diagnostics {
            eprintln!("{}", diag.format(source_code));
        }
    }

    pub fn print_summary(&self) {
        if self.error_count > 0 {
            eprintln!(
                "\n{}: {} error{} emitted",
                "error".red().bold(),
                self.error_count,
                if self.error_count == 1 { "" } else { "s" }
            );
        }

        if self.warning_count > 0 {
            eprintln!(
                "{}: {} warning{} emitted",
                "warning".yellow().bold(),
                self.warning_count,
                if self.warning_count == 1 { "" } else { "s" }
            );
        }
    }

    /// Export diagnostics as JSON for IDEs/LSP.
    pub fn to_json(&self) -> String {
        let mut json = String::from("{\"diagnostics\":[");

        for (i, diag) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                json.push(',');
            }

            let level_str = match diag.level {
                ErrorLevel::Error => "error",
                ErrorLevel::Warning => "warning",
                ErrorLevel::Info => "info",
                ErrorLevel::Note => "note",
                ErrorLevel::Help => "help",
            };

            json.push_str(&format!(
                "{{\"level\":\"{}\",\"code\":\"{}\",\"message\":\"{}\",\"file\":\"{}\",\"line\":{},\"column\":{},\"length\":{}",
                level_str,
                diag.code,
                diag.message.replace('"', "\\\""),
                diag.span.file,
                diag.span.line,
                diag.span.column,
                diag.span.length
            ));

            if !diag.notes.is_empty() {
                json.push_str(",\"notes\":[");
                for (j, note) in diag.notes.iter().enumerate() {
                    if j > 0 {
                        json.push(',');
                    }
                    json.push_str(&format!("\"{}\"", note.replace('"', "\\\"")));
                }
                json.push(']');
            }

            if let Some(help) = &diag.help {
                json.push_str(&format!(",\"help\":\"{}\"", help.replace('"', "\\\"")));
            }

            json.push('}');
        }

        json.push_str("]}");
        json
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
        self.error_count = 0;
        self.warning_count = 0;
        self.info_count = 0;
    }
}

/// Helper constructors for the semantic diagnostics the resolver pipeline
/// actually raises.
impl DiagnosticEngine {
    pub fn type_mismatch(&mut self, expected: &str, found: &str, span: Span) {
        self.emit(
            Diagnostic::error(
                error_codes::TYPE_MISMATCH,
                "mismatched types".to_string(),
                span.clone(),
            )
            .with_note(format!("expected `{}`, found `{}`", expected, found)),
        );
    }

    pub fn undefined_name(&mut self, name: &str, span: Span, suggestions: Vec<String>) {
        let mut diag = Diagnostic::error(
            error_codes::UNDEFINED_NAME,
            format!("cannot find `{}` in this scope", name),
            span,
        );

        if !suggestions.is_empty() {
            diag = diag.with_help(format!("did you mean `{}`?", suggestions.join("`, `")));
        }

        self.emit(diag);
    }

    pub fn argument_count_mismatch(
        &mut self,
        fn_name: &str,
        expected: usize,
        found: usize,
        span: Span,
    ) {
        self.emit(
            Diagnostic::error(
                error_codes::ARGUMENT_COUNT,
                format!(
                    "this function takes {} argument{} but {} {} supplied",
                    expected,
                    if expected == 1 { "" } else { "s" },
                    found,
                    if found == 1 { "was" } else { "were" }
                ),
                span,
            )
            .with_note(format!("function `{}` defined here", fn_name)),
        );
    }

    pub fn non_exhaustive_switch(&mut self, missing: &[String], span: Span) {
        self.emit(
            Diagnostic::error(
                error_codes::NON_EXHAUSTIVE_SWITCH,
                "switch does not cover every variant".to_string(),
                span,
            )
            .with_note(format!("missing variants: `{}`", missing.join("`, `"))),
        );
    }

    pub fn duplicate_case_label(&mut self, span: Span) {
        self.emit(Diagnostic::error(
            error_codes::DUPLICATE_CASE_LABEL,
            "duplicate case label".to_string(),
            span,
        ));
    }

    /// Shared by the three `DiagnosticSink` entry points: resolver-style
    /// messages carry their error code as a `[E0101]` prefix, which is
    /// split back out here so it lands in `Diagnostic::code` rather than
    /// the message text.
    fn push_diagnostic(&mut self, script: &str, message: &str, is_warning: bool, range: SourceRange) {
        let (code, text) = split_code_prefix(message);
        let span = Span::from_range(script, range);
        self.emit(if is_warning {
            Diagnostic::warning(code, text.to_string(), span)
        } else {
            Diagnostic::error(code, text.to_string(), span)
        });
    }
}

fn split_code_prefix(message: &str) -> (&str, &str) {
    if let Some(rest) = message.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return (&rest[..end], rest[end + 1..].trim_start());
        }
    }
    ("", message)
}

impl DiagnosticSink for DiagnosticEngine {
    fn lexical_diagnostic(&mut self, script: &str, message: &str, is_warning: bool, range: SourceRange) {
        self.push_diagnostic(script, message, is_warning, range);
    }

    fn parse_diagnostic(&mut self, script: &str, message: &str, is_warning: bool, range: SourceRange) {
        self.push_diagnostic(script, message, is_warning, range);
    }

    fn semantic_diagnostic(&mut self, script: &str, message: &str, is_warning: bool, range: SourceRange) {
        self.push_diagnostic(script, message, is_warning, range);
    }
}

/// Error codes, grouped the way the checks that raise them are grouped:
/// name resolution, type resolution, control-flow/pattern validation, and
/// resource exhaustion.
pub mod error_codes {
    // Name resolution (E01xx)
    pub const UNDEFINED_NAME: &str = "E0101";
    pub const DUPLICATE_DEFINITION: &str = "E0102";
    pub const AMBIGUOUS_IMPORT: &str = "E0103";
    pub const MODULE_NOT_FOUND: &str = "E0104";

    // Type resolution (E02xx)
    pub const TYPE_MISMATCH: &str = "E0201";
    pub const UNDEFINED_TYPE: &str = "E0202";
    pub const ARGUMENT_COUNT: &str = "E0203";
    pub const GENERIC_INFERENCE_FAILED: &str = "E0204";
    pub const INVALID_CAST: &str = "E0205";
    pub const RECURSIVE_TYPE_ALIAS: &str = "E0206";

    // Control flow / pattern validation (E03xx)
    pub const NON_EXHAUSTIVE_SWITCH: &str = "E0301";
    pub const DUPLICATE_CASE_LABEL: &str = "E0302";
    pub const OPERATOR_CONSISTENCY: &str = "E0303";
    pub const INVALID_MAP_KEY_TYPE: &str = "E0304";
    pub const BREAK_OUTSIDE_LOOP: &str = "E0305";
    pub const RETURN_OUTSIDE_FUNCTION: &str = "E0306";
    pub const MISSING_RETURN: &str = "E0307";

    // Resource limits (E09xx) -- abort the parse/compile, not recoverable
    pub const AST_NODE_LIMIT_EXCEEDED: &str = "E0901";
    pub const PARSE_DEPTH_EXCEEDED: &str = "E0902";
    pub const TYPE_INSTANTIATION_LIMIT_EXCEEDED: &str = "E0903";
    pub const HEAP_EXHAUSTED: &str = "E0904";

    // Warnings (W0xxx)
    pub const UNUSED_VARIABLE: &str = "W0001";
    pub const UNUSED_IMPORT: &str = "W0002";
    pub const UNREACHABLE_CODE: &str = "W0003";
}

/// Levenshtein/Jaro-Winkler based "did you mean?" suggestions.
pub mod fuzzy {
    use strsim::{jaro_winkler, levenshtein};

    /// Names within `threshold` Jaro-Winkler similarity of `target`,
    /// closest first.
    pub fn find_similar_names(
        target: &str,
        candidates: &[String],
        threshold: f64,
        max_suggestions: usize,
    ) -> Vec<String> {
        let mut scored: Vec<(String, f64)> = candidates
            .iter()
            .map(|candidate| (candidate.clone(), jaro_winkler(target, candidate)))
            .filter(|(_, score)| *score > threshold)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(max_suggestions)
            .map(|(name, _)| name)
            .collect()
    }

    /// Nearest identifiers by edit distance, for unknown-name diagnostics.
    /// Candidates more than `max_distance` edits away are dropped.
    pub fn nearest_by_edit_distance(
        target: &str,
        candidates: &[String],
        max_distance: usize,
        max_suggestions: usize,
    ) -> Vec<String> {
        let mut scored: Vec<(String, usize)> = candidates
            .iter()
            .map(|candidate| (candidate.clone(), levenshtein(target, candidate)))
            .filter(|(_, dist)| *dist <= max_distance)
            .collect();

        scored.sort_by_key(|(_, dist)| *dist);

        scored
            .into_iter()
            .take(max_suggestions)
            .map(|(name, _)| name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_format() {
        let source = "fn f(x: int): int {\n    return \"hello\";\n}";

        let span = Span::new("test.sm".to_string(), 2, 12, 7);
        let diag = Diagnostic::error(
            error_codes::TYPE_MISMATCH,
            "mismatched types".to_string(),
            span.clone(),
        )
        .with_note("expected `int`, found `string`".to_string());

        let formatted = diag.format(source);
        assert!(formatted.contains("error[E0201]"));
        assert!(formatted.contains("mismatched types"));
        assert!(formatted.contains("test.sm:2:12"));
    }

    #[test]
    fn source_range_length_is_single_line_only() {
        let single = SourceRange::new(4, 5, 4, 9);
        assert_eq!(single.length(), 4);

        let multi = SourceRange::new(4, 5, 6, 2);
        assert_eq!(multi.length(), 1);
    }

    #[test]
    fn nearest_by_edit_distance_orders_closest_first() {
        let candidates = vec!["length".to_string(), "len".to_string(), "lenght".to_string()];
        let suggestions = fuzzy::nearest_by_edit_distance("lenght", &candidates, 2, 2);
        assert_eq!(suggestions[0], "lenght");
    }

    #[test]
    fn diagnostic_engine_as_sink_splits_code_prefix() {
        let mut engine = DiagnosticEngine::new();
        engine.semantic_diagnostic("m", "[E0101] cannot find `x`", false, SourceRange::new(1, 2, 1, 3));
        let diags = engine.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "E0101");
        assert_eq!(diags[0].message, "cannot find `x`");
        assert_eq!(diags[0].level, ErrorLevel::Error);
    }

    #[test]
    fn diagnostic_engine_as_sink_marks_warnings() {
        let mut engine = DiagnosticEngine::new();
        engine.semantic_diagnostic("m", "[W0001] unused variable `y`", true, SourceRange::unknown());
        assert_eq!(engine.diagnostics()[0].level, ErrorLevel::Warning);
    }
}
