//! `{$Name}` token substitution

/// Replace every `{$Name}` in `template` using `lookup`.
///
/// Tokens whose name `lookup` cannot resolve are left verbatim.
pub fn substitute<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{$") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = &after[..end];
        let replacement = if is_token_name(key) { lookup(key) } else { None };
        match replacement {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn is_token_name(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;

    fn run(template: &str) -> String {
        let vars = hashmap! {
            "name" => "Ada".to_string(),
            "score" => "42".to_string(),
        };
        substitute(template, |key| vars.get(key).cloned())
    }

    #[test]
    fn test_replaces_known_tokens() {
        assert_eq!(run("Hi {$name}, you have {$score}"), "Hi Ada, you have 42");
    }

    #[test]
    fn test_unresolved_tokens_left_verbatim() {
        assert_eq!(run("{$missing} and {$name}"), "{$missing} and Ada");
        assert_eq!(run("{$}"), "{$}");
        assert_eq!(run("{$bad name}"), "{$bad name}");
    }

    #[test]
    fn test_unterminated_token() {
        assert_eq!(run("open {$name"), "open {$name");
        assert_eq!(run("no tokens"), "no tokens");
    }
}
