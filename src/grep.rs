//! Pattern search over sandbox files, built on the sandbox shell so it works
//! identically on both backends.
//!
//! Builds a `grep` invocation from [`GrepOptions`], runs it through the
//! execution engine, and parses the output into a read-only result tree.
//! Filenames are always forced onto output lines (`-H`), and line numbers
//! are forced whenever context is requested so match and context lines stay
//! distinguishable.

use crate::exec::CommandResult;
use crate::sandbox::remote::shell_quote;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct GrepOptions {
    /// File or directory to search. The workspace root when absent.
    pub path: Option<String>,
    /// Glob of file names to include, e.g. `*.rs`.
    pub include: Option<String>,
    /// Glob of file names to exclude.
    pub exclude: Option<String>,
    pub ignore_case: bool,
    pub show_line_numbers: bool,
    /// Cap on the number of match lines returned across all files.
    pub max_results: Option<usize>,
    /// Lines of context around each match.
    pub context: Option<u32>,
    pub whole_word: bool,
    pub recursive: bool,
}

impl Default for GrepOptions {
    fn default() -> Self {
        Self {
            path: None,
            include: None,
            exclude: None,
            ignore_case: false,
            show_line_numbers: true,
            max_results: None,
            context: None,
            whole_word: false,
            recursive: true,
        }
    }
}

/// One matched or context line.
#[derive(Debug, Clone, Serialize)]
pub struct GrepLineMatch {
    pub line_number: Option<u64>,
    pub text: String,
    pub is_context: bool,
}

/// All hits within one file.
#[derive(Debug, Clone, Serialize)]
pub struct GrepFileResult {
    pub path: String,
    pub matches: Vec<GrepLineMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrepResult {
    pub files: Vec<GrepFileResult>,
    /// Match lines only; context lines are not counted.
    pub total_matches: usize,
    /// True when `max_results` cut the listing short.
    pub truncated: bool,
}

impl GrepResult {
    pub fn empty() -> Self {
        Self {
            files: Vec::new(),
            total_matches: 0,
            truncated: false,
        }
    }
}

/// Build the shell command for one search.
pub fn build_command(pattern: &str, options: &GrepOptions, default_path: &str) -> String {
    let mut parts = vec!["grep".to_string(), "-H".to_string()];

    if options.recursive {
        parts.push("-r".to_string());
    }
    if options.ignore_case {
        parts.push("-i".to_string());
    }
    if options.whole_word {
        parts.push("-w".to_string());
    }
    if options.show_line_numbers || options.context.is_some() {
        parts.push("-n".to_string());
    }
    if let Some(context) = options.context {
        parts.push(format!("-C{context}"));
    }
    if let Some(include) = &options.include {
        parts.push(format!("--include={}", shell_quote(include)));
    }
    if let Some(exclude) = &options.exclude {
        parts.push(format!("--exclude={}", shell_quote(exclude)));
    }

    parts.push("-e".to_string());
    parts.push(shell_quote(pattern));
    parts.push(shell_quote(
        options.path.as_deref().unwrap_or(default_path),
    ));

    parts.join(" ")
}

/// Interpret the engine result for one search. Exit code 1 is grep's
/// "no matches" and maps to an empty result, not an error.
pub fn parse_result(
    result: &CommandResult,
    options: &GrepOptions,
) -> Result<GrepResult, crate::error::SandboxError> {
    if let Some(error) = &result.error {
        return Err(crate::error::SandboxError::Backend(format!(
            "grep failed: {error}"
        )));
    }
    match result.exit_code {
        0 => Ok(parse_output(&result.stdout, options)),
        1 => Ok(GrepResult::empty()),
        code => Err(crate::error::SandboxError::Backend(format!(
            "grep exited with code {code}: {}",
            result.stderr
        ))),
    }
}

fn parse_output(stdout: &str, options: &GrepOptions) -> GrepResult {
    let numbered = options.show_line_numbers || options.context.is_some();
    let mut files: Vec<GrepFileResult> = Vec::new();
    let mut total_matches = 0usize;
    let mut truncated = false;

    for line in stdout.lines() {
        if line == "--" {
            // Context-group separator.
            continue;
        }

        let Some(parsed) = parse_line(line, numbered) else {
            continue;
        };

        if !parsed.is_context {
            if let Some(max) = options.max_results {
                if total_matches >= max {
                    truncated = true;
                    continue;
                }
            }
            total_matches += 1;
        }

        if let Some(file) = files.last_mut() {
            if file.path == parsed.path {
                file.matches.push(parsed.line);
                continue;
            }
        }
        files.push(GrepFileResult {
            path: parsed.path,
            matches: vec![parsed.line],
        });
    }

    GrepResult {
        files,
        total_matches,
        truncated,
    }
}

struct ParsedLine {
    path: String,
    line: GrepLineMatch,
    is_context: bool,
}

/// Split one output line. Match lines are `path:line:text` (or `path:text`
/// without `-n`); context lines from `-C` are `path-line-text`.
fn parse_line(line: &str, numbered: bool) -> Option<ParsedLine> {
    if !numbered {
        let (path, text) = line.split_once(':')?;
        return Some(ParsedLine {
            path: path.to_string(),
            line: GrepLineMatch {
                line_number: None,
                text: text.to_string(),
                is_context: false,
            },
            is_context: false,
        });
    }

    let colon = split_numbered(line, ':');
    let dash = split_numbered(line, '-');

    // A context line can still contain ':' later in the text; prefer the
    // separator that appears first in the line.
    let (path, number, text, is_context) = match (colon, dash) {
        (Some(c), Some(d)) => {
            if c.0.len() <= d.0.len() {
                (c.0, c.1, c.2, false)
            } else {
                (d.0, d.1, d.2, true)
            }
        }
        (Some(c), None) => (c.0, c.1, c.2, false),
        (None, Some(d)) => (d.0, d.1, d.2, true),
        (None, None) => return None,
    };

    Some(ParsedLine {
        path,
        line: GrepLineMatch {
            line_number: Some(number),
            text,
            is_context,
        },
        is_context,
    })
}

/// Find the first `path<sep>number<sep>rest` split in a line.
fn split_numbered(line: &str, sep: char) -> Option<(String, u64, String)> {
    let mut search_from = 0;
    while let Some(offset) = line[search_from..].find(sep) {
        let at = search_from + offset;
        let rest = &line[at + 1..];
        if let Some((digits, text)) = rest.split_once(sep) {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(number) = digits.parse() {
                    return Some((line[..at].to_string(), number, text.to_string()));
                }
            }
        }
        search_from = at + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_carries_the_selected_flags() {
        let options = GrepOptions {
            ignore_case: true,
            whole_word: true,
            include: Some("*.rs".to_string()),
            context: Some(2),
            ..GrepOptions::default()
        };
        let command = build_command("fn main", &options, "/ws");
        assert!(command.starts_with("grep -H -r -i -w -n -C2"));
        assert!(command.contains("--include='*.rs'"));
        assert!(command.contains("-e 'fn main'"));
        assert!(command.ends_with("'/ws'"));
    }

    #[test]
    fn non_recursive_search_omits_r() {
        let options = GrepOptions {
            recursive: false,
            ..GrepOptions::default()
        };
        let command = build_command("x", &options, "/ws");
        assert!(!command.contains(" -r "));
    }

    #[test]
    fn numbered_output_groups_by_file() {
        let stdout = "src/a.rs:3:fn alpha() {}\nsrc/a.rs:9:fn beta() {}\nsrc/b.rs:1:fn gamma() {}";
        let result = parse_output(stdout, &GrepOptions::default());
        assert_eq!(result.files.len(), 2);
        assert_eq!(result.files[0].path, "src/a.rs");
        assert_eq!(result.files[0].matches.len(), 2);
        assert_eq!(result.files[0].matches[0].line_number, Some(3));
        assert_eq!(result.files[1].matches[0].text, "fn gamma() {}");
        assert_eq!(result.total_matches, 3);
        assert!(!result.truncated);
    }

    #[test]
    fn context_lines_are_flagged_not_counted() {
        let options = GrepOptions {
            context: Some(1),
            ..GrepOptions::default()
        };
        let stdout = "src/a.rs-2-before\nsrc/a.rs:3:the match\nsrc/a.rs-4-after\n--";
        let result = parse_output(stdout, &options);
        assert_eq!(result.total_matches, 1);
        let matches = &result.files[0].matches;
        assert_eq!(matches.len(), 3);
        assert!(matches[0].is_context);
        assert!(!matches[1].is_context);
        assert!(matches[2].is_context);
    }

    #[test]
    fn max_results_truncates_and_flags() {
        let options = GrepOptions {
            max_results: Some(2),
            ..GrepOptions::default()
        };
        let stdout = "a.rs:1:x\na.rs:2:x\na.rs:3:x";
        let result = parse_output(stdout, &options);
        assert_eq!(result.total_matches, 2);
        assert!(result.truncated);
    }

    #[test]
    fn colons_in_match_text_survive() {
        let result = parse_output("a.rs:7:let url = \"http://x\";", &GrepOptions::default());
        assert_eq!(result.files[0].matches[0].text, "let url = \"http://x\";");
        assert_eq!(result.files[0].matches[0].line_number, Some(7));
    }

    #[test]
    fn exit_code_one_is_an_empty_result() {
        let result = CommandResult {
            exit_code: 1,
            ..CommandResult::default()
        };
        let parsed = parse_result(&result, &GrepOptions::default()).unwrap();
        assert!(parsed.files.is_empty());
        assert_eq!(parsed.total_matches, 0);
    }

    #[test]
    fn exit_code_two_is_an_error() {
        let result = CommandResult {
            exit_code: 2,
            stderr: "grep: bad pattern".to_string(),
            ..CommandResult::default()
        };
        assert!(parse_result(&result, &GrepOptions::default()).is_err());
    }
}
