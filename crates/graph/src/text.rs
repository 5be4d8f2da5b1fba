/// Split identifiers and paths into lowercase words.
///
/// Breaks on any non-alphanumeric character and on case changes, keeping acronyms
/// together: `parseHTTPResponse_v2` -> `parse`, `http`, `response`, `v2`.
pub fn split_words(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (idx, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[idx - 1];
            let next_is_lower = chars.get(idx + 1).is_some_and(|next| next.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Generic words that say nothing about what a cluster of code does
pub fn is_stop_term(word: &str) -> bool {
    word.len() < 2
        || word.chars().all(|c| c.is_ascii_digit())
        || matches!(
            word,
            "the" | "and" | "or" | "of" | "to" | "in" | "on" | "for" | "is" | "by" | "with"
                | "get" | "set" | "new" | "init" | "impl" | "self" | "this" | "fn" | "func"
                | "function" | "class" | "type" | "var" | "let" | "const" | "mod" | "lib"
                | "src" | "index" | "main" | "util" | "utils" | "helper" | "helpers"
                | "common" | "default" | "value" | "data" | "item" | "test" | "tests" | "spec"
                | "rs" | "py" | "ts" | "tsx" | "js" | "jsx" | "go" | "rb" | "java" | "kt"
                | "cs" | "cpp" | "hpp" | "swift"
        )
}

/// `auth_service` -> `Auth Service`
pub fn title_case(text: &str) -> String {
    split_words(text)
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_case_and_separators() {
        assert_eq!(
            split_words("parseHTTPResponse_v2"),
            vec!["parse", "http", "response", "v2"]
        );
        assert_eq!(split_words("src/auth-service.ts"), vec!["src", "auth", "service", "ts"]);
        assert!(split_words("__").is_empty());
    }

    #[test]
    fn stop_terms_cover_noise() {
        assert!(is_stop_term("get"));
        assert!(is_stop_term("42"));
        assert!(is_stop_term("x"));
        assert!(!is_stop_term("payment"));
    }

    #[test]
    fn title_cases_directory_names() {
        assert_eq!(title_case("auth_service"), "Auth Service");
        assert_eq!(title_case("payments"), "Payments");
    }
}
