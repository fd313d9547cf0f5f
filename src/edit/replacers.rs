//! Cascading match strategies for the edit engine.
//!
//! Strategies are tried in order; the first one that locates the target at
//! all wins, and its match count decides between a single replacement, a
//! replace-all, or an ambiguity failure. Later strategies never get a say
//! once an earlier one has matched.
//!
//! The set, most to least strict:
//!
//! 1. exact — plain substring search;
//! 2. line-trimmed — line-by-line comparison ignoring leading/trailing
//!    whitespace per line, tolerating indentation drift;
//! 3. whitespace-normalized — any run of whitespace in the target matches
//!    any run of whitespace in the file.

use regex::Regex;

/// Byte span of one located occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
}

pub trait Replacer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Non-overlapping occurrences of `target` in `content`, in order.
    fn find(&self, content: &str, target: &str) -> Vec<MatchSpan>;
}

/// Plain substring search.
pub struct ExactReplacer;

impl Replacer for ExactReplacer {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn find(&self, content: &str, target: &str) -> Vec<MatchSpan> {
        if target.is_empty() {
            return Vec::new();
        }
        content
            .match_indices(target)
            .map(|(start, matched)| MatchSpan {
                start,
                end: start + matched.len(),
            })
            .collect()
    }
}

/// Whole-line comparison with each line trimmed, tolerating indentation
/// drift. A match spans the full original lines, so the replacement text
/// supplies its own indentation.
pub struct LineTrimmedReplacer;

impl Replacer for LineTrimmedReplacer {
    fn name(&self) -> &'static str {
        "line-trimmed"
    }

    fn find(&self, content: &str, target: &str) -> Vec<MatchSpan> {
        let target_lines: Vec<&str> = target.lines().map(str::trim).collect();
        if target_lines.is_empty() || target_lines.iter().all(|l| l.is_empty()) {
            return Vec::new();
        }

        // (start offset, end offset excluding the newline) per content line.
        let mut line_spans = Vec::new();
        let mut offset = 0;
        for line in content.split_inclusive('\n') {
            let end = offset + line.len();
            let visible = line.strip_suffix('\n').unwrap_or(line);
            line_spans.push((offset, offset + visible.len(), visible.trim()));
            offset = end;
        }

        let mut spans = Vec::new();
        let mut i = 0;
        while i + target_lines.len() <= line_spans.len() {
            let window = &line_spans[i..i + target_lines.len()];
            if window
                .iter()
                .zip(&target_lines)
                .all(|((_, _, line), target)| line == target)
            {
                spans.push(MatchSpan {
                    start: window[0].0,
                    end: window[window.len() - 1].1,
                });
                i += target_lines.len();
            } else {
                i += 1;
            }
        }
        spans
    }
}

/// Any whitespace run in the target matches any whitespace run in the file.
pub struct WhitespaceNormalizedReplacer;

impl Replacer for WhitespaceNormalizedReplacer {
    fn name(&self) -> &'static str {
        "whitespace-normalized"
    }

    fn find(&self, content: &str, target: &str) -> Vec<MatchSpan> {
        let pieces: Vec<&str> = target.split_whitespace().collect();
        if pieces.is_empty() {
            return Vec::new();
        }
        let pattern = pieces
            .iter()
            .map(|piece| regex::escape(piece))
            .collect::<Vec<_>>()
            .join(r"\s+");

        let Ok(regex) = Regex::new(&pattern) else {
            return Vec::new();
        };

        regex
            .find_iter(content)
            .map(|m| MatchSpan {
                start: m.start(),
                end: m.end(),
            })
            .collect()
    }
}

/// Strategies in cascade order.
pub fn strategies() -> [&'static dyn Replacer; 3] {
    [
        &ExactReplacer,
        &LineTrimmedReplacer,
        &WhitespaceNormalizedReplacer,
    ]
}

/// Outcome of running the cascade: the winning strategy and its spans.
pub struct Located {
    pub strategy: &'static str,
    pub spans: Vec<MatchSpan>,
}

/// Run the cascade. `None` means no strategy matched at all.
pub fn locate(content: &str, target: &str) -> Option<Located> {
    for replacer in strategies() {
        let spans = replacer.find(content, target);
        if !spans.is_empty() {
            return Some(Located {
                strategy: replacer.name(),
                spans,
            });
        }
    }
    None
}

/// Replace every span with `replacement`. Spans must be ordered and
/// non-overlapping, which the replacers guarantee.
pub fn apply(content: &str, spans: &[MatchSpan], replacement: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut cursor = 0;
    for span in spans {
        result.push_str(&content[cursor..span.start]);
        result.push_str(replacement);
        cursor = span.end;
    }
    result.push_str(&content[cursor..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_finds_all_occurrences() {
        let spans = ExactReplacer.find("foo bar foo", "foo");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0], MatchSpan { start: 0, end: 3 });
        assert_eq!(spans[1], MatchSpan { start: 8, end: 11 });
    }

    #[test]
    fn line_trimmed_tolerates_indentation() {
        let content = "fn main() {\n        println!(\"hi\");\n}\n";
        let target = "fn main() {\nprintln!(\"hi\");\n}";
        let spans = LineTrimmedReplacer.find(content, target);
        assert_eq!(spans.len(), 1);
        assert_eq!(&content[spans[0].start..spans[0].end], "fn main() {\n        println!(\"hi\");\n}");
    }

    #[test]
    fn line_trimmed_rejects_partial_windows() {
        let content = "alpha\nbeta\n";
        assert!(LineTrimmedReplacer.find(content, "beta\ngamma").is_empty());
    }

    #[test]
    fn whitespace_normalized_collapses_runs() {
        let content = "let  x =\n    1;";
        let spans = WhitespaceNormalizedReplacer.find(content, "let x = 1;");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[0].end, content.len());
    }

    #[test]
    fn whitespace_normalized_escapes_regex_metacharacters() {
        let content = "call(a + b)";
        let spans = WhitespaceNormalizedReplacer.find(content, "call(a + b)");
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn cascade_prefers_exact_over_fuzzier() {
        let located = locate("foo  bar", "foo  bar").unwrap();
        assert_eq!(located.strategy, "exact");

        let located = locate("foo  bar", "foo bar").unwrap();
        assert_eq!(located.strategy, "whitespace-normalized");
    }

    #[test]
    fn cascade_stops_at_first_matching_strategy() {
        // Exact matches twice; the fuzzier strategies never run even though
        // they would also match.
        let located = locate("x x", "x").unwrap();
        assert_eq!(located.strategy, "exact");
        assert_eq!(located.spans.len(), 2);
    }

    #[test]
    fn apply_replaces_all_spans() {
        let content = "foo bar foo";
        let spans = ExactReplacer.find(content, "foo");
        assert_eq!(apply(content, &spans, "qux"), "qux bar qux");
    }
}
