//! `${VAR}` environment substitution with iterative cycle detection.
//!
//! A single-pass tokenizer walks the string once, splitting it into literal
//! runs and `${...}` references, rather than running several regex passes.

use rustc_hash::FxHashMap;

use crate::error::{Result, ZimError};
use crate::util::constants::MAX_ENVSUB_DEPTH;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Literal(&'a str),
    VarRef(&'a str),
}

fn tokenize(template: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = template.as_bytes();
    let mut literal_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(close) = template[i + 2..].find('}') {
                if literal_start < i {
                    tokens.push(Token::Literal(&template[literal_start..i]));
                }
                let name = &template[i + 2..i + 2 + close];
                tokens.push(Token::VarRef(name));
                i += 2 + close + 1;
                literal_start = i;
                continue;
            }
        }
        i += 1;
    }
    if literal_start < template.len() {
        tokens.push(Token::Literal(&template[literal_start..]));
    }
    tokens
}

/// Substitute every `${VAR}` reference in `template` against `env` exactly
/// once (no recursive re-scan of the substituted text within this call).
fn substitute_once(template: &str, env: &FxHashMap<String, String>) -> (String, bool) {
    let mut out = String::with_capacity(template.len());
    let mut any_unresolved = false;
    for token in tokenize(template) {
        match token {
            Token::Literal(s) => out.push_str(s),
            Token::VarRef(name) => match env.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    any_unresolved = true;
                    out.push_str("${");
                    out.push_str(name);
                    out.push('}');
                }
            },
        }
    }
    (out, any_unresolved)
}

/// Expand `${VAR}` references in `template` against `env`, iterating until
/// the output stops changing (so `a -> "${b}"`, `b -> "literal"` resolves
/// in two passes) or `MAX_ENVSUB_DEPTH` is exceeded, which signals a cycle
/// such as `a -> "${b}"`, `b -> "${a}"`.
///
/// Values in `env` are themselves substituted before being substituted in —
/// this is what makes `a -> ${c}, c -> "${b} ${a}"` a detectable cycle
/// rather than a single flat lookup.
pub fn expand(template: &str, env: &FxHashMap<String, String>) -> Result<String> {
    let mut current = template.to_string();
    for _ in 0..MAX_ENVSUB_DEPTH {
        let (next, unresolved) = substitute_once(&current, env);
        if next == current {
            if unresolved {
                // No progress and still unresolved refs: either an
                // undefined variable (not a cycle) or a stable fixed point
                // containing literal `${...}` text the author intended.
                return Ok(next);
            }
            return Ok(next);
        }
        current = next;
    }
    let var = tokenize(template)
        .into_iter()
        .find_map(|t| match t {
            Token::VarRef(name) => Some(name.to_string()),
            Token::Literal(_) => None,
        })
        .unwrap_or_default();
    Err(ZimError::RecursiveExpansion { var, max_depth: MAX_ENVSUB_DEPTH })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> FxHashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn expands_simple_reference() {
        let e = env(&[("OUTPUT", "svc")]);
        assert_eq!(expand("touch ${OUTPUT}", &e).unwrap(), "touch svc");
    }

    #[test]
    fn expands_nested_reference_iteratively() {
        let e = env(&[("a", "${b}"), ("b", "literal")]);
        assert_eq!(expand("${a}", &e).unwrap(), "literal");
    }

    #[test]
    fn leaves_undefined_variable_as_is() {
        let e = env(&[]);
        assert_eq!(expand("${UNKNOWN}", &e).unwrap(), "${UNKNOWN}");
    }

    #[test]
    fn detects_recursive_expansion_cycle() {
        // a -> ${c}, c -> "${b} ${a}"
        let e = env(&[("a", "${c}"), ("c", "${b} ${a}"), ("b", "${c}")]);
        let err = expand("${a}", &e).unwrap_err();
        assert!(matches!(err, ZimError::RecursiveExpansion { .. }));
    }

    #[test]
    fn multiple_references_in_one_template() {
        let e = env(&[("COMPONENT", "svc"), ("RULE", "build")]);
        assert_eq!(expand("${COMPONENT}.${RULE}", &e).unwrap(), "svc.build");
    }
}
