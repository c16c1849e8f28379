// src/query.rs - raw query string -> base filter + ordered stage specs
use indexmap::IndexMap;

/// One pipe-delimited stage: lowercased command name, positional arguments
/// and `key=value` parameters, in the order they appeared.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub command: String,
    pub args: Vec<String>,
    pub params: IndexMap<String, String>,
}

/// Result of splitting a raw query. Created per incoming query and
/// discarded after the pipeline runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub filter: String,
    pub stages: Vec<StageSpec>,
}

const COMPARISON_OPERATORS: [&str; 7] = ["==", "!=", ">=", "<=", ">", "<", "="];

fn is_comparison_operator(token: &str) -> bool {
    COMPARISON_OPERATORS.contains(&token)
}

/// Split a raw query on top-level pipes. A pipe inside a double-quoted span
/// is literal; quote state toggles on each unescaped `"`.
pub fn split_pipes(raw: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'"') => {
                current.push(ch);
                current.push(chars.next().unwrap());
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '|' if !in_quotes => {
                segments.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    segments.push(current);
    segments
}

/// Whitespace-tokenize one stage segment. A quoted token loses its
/// surrounding quotes; `\"` yields a literal quote. An unterminated quote
/// swallows the rest of the segment into one token.
pub fn tokenize(segment: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = segment.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'"') => {
                current.push(chars.next().unwrap());
            }
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if quoted || !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                    quoted = false;
                }
            }
            c => current.push(c),
        }
    }
    if quoted || !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Best-effort split of a raw query into `(base filter, stages)`. Never
/// fails: malformed pipe or quote syntax degrades into some deterministic
/// parse. Empty input yields the match-everything filter `*`.
pub fn parse(raw: &str) -> ParsedQuery {
    let segments = split_pipes(raw);

    let filter = segments
        .first()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("*")
        .to_string();

    let mut stages = Vec::new();
    for segment in segments.iter().skip(1) {
        if segment.trim().is_empty() {
            continue;
        }
        let tokens = tokenize(segment);
        let Some(first) = tokens.first() else {
            continue;
        };

        let command = first.to_lowercase();
        let mut args = Vec::new();
        let mut params = IndexMap::new();
        for token in &tokens[1..] {
            if token.contains('=') && !is_comparison_operator(token) {
                if let Some((key, value)) = token.split_once('=') {
                    params.insert(key.to_lowercase(), value.to_string());
                }
            } else {
                args.push(token.clone());
            }
        }
        stages.push(StageSpec {
            command,
            args,
            params,
        });
    }

    ParsedQuery { filter, stages }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_matches_everything() {
        let parsed = parse("");
        assert_eq!(parsed.filter, "*");
        assert!(parsed.stages.is_empty());

        let parsed = parse("   ");
        assert_eq!(parsed.filter, "*");
        assert!(parsed.stages.is_empty());
    }

    #[test]
    fn splits_filter_and_stages() {
        let parsed = parse("level:ERROR | stats count by user | filter count > 1");
        assert_eq!(parsed.filter, "level:ERROR");
        assert_eq!(parsed.stages.len(), 2);
        assert_eq!(parsed.stages[0].command, "stats");
        assert_eq!(parsed.stages[0].args, vec!["count", "by", "user"]);
        assert_eq!(parsed.stages[1].command, "filter");
        assert_eq!(parsed.stages[1].args, vec!["count", ">", "1"]);
    }

    #[test]
    fn quoted_pipe_is_literal() {
        let parsed = parse(r#"msg:"a|b" | filter level = ERROR"#);
        assert_eq!(parsed.filter, r#"msg:"a|b""#);
        assert_eq!(parsed.stages.len(), 1);
    }

    #[test]
    fn quoted_token_loses_quotes() {
        let parsed = parse(r#"* | filter msg contains "disk full""#);
        assert_eq!(parsed.stages[0].args, vec!["msg", "contains", "disk full"]);
    }

    #[test]
    fn escaped_quote_inside_token() {
        let parsed = parse(r#"* | filter msg contains "say \"hi\"""#);
        assert_eq!(parsed.stages[0].args[2], r#"say "hi""#);
    }

    #[test]
    fn key_value_params_are_classified() {
        let parsed = parse("* | timechart span=5m count by host");
        let stage = &parsed.stages[0];
        assert_eq!(stage.params.get("span").map(String::as_str), Some("5m"));
        assert_eq!(stage.args, vec!["count", "by", "host"]);
    }

    #[test]
    fn comparison_operators_stay_positional() {
        let parsed = parse("* | filter dur >= 100");
        assert_eq!(parsed.stages[0].args, vec!["dur", ">=", "100"]);
        assert!(parsed.stages[0].params.is_empty());

        let parsed = parse("* | filter level = ERROR");
        assert_eq!(parsed.stages[0].args, vec!["level", "=", "ERROR"]);
    }

    #[test]
    fn command_name_is_case_insensitive() {
        let parsed = parse("* | STATS count");
        assert_eq!(parsed.stages[0].command, "stats");
    }

    #[test]
    fn empty_segments_are_dropped() {
        let parsed = parse("* | | stats count |  ");
        assert_eq!(parsed.stages.len(), 1);
        assert_eq!(parsed.stages[0].command, "stats");
    }

    #[test]
    fn unterminated_quote_becomes_one_token() {
        let parsed = parse(r#"* | filter msg contains "disk full and then some"#);
        assert_eq!(
            parsed.stages[0].args,
            vec!["msg", "contains", "disk full and then some"]
        );
    }

    #[test]
    fn parse_never_panics_on_garbage() {
        for raw in ["|", "|||", "\"", "a|\"|b", "\\", "| = | \"\" |"] {
            let _ = parse(raw);
        }
    }
}
