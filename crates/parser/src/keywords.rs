/// Tokens that look like calls (`if (`, `print(`) but never name a repository symbol.
pub(crate) fn is_not_a_call(name: &str) -> bool {
    matches!(
        name,
        // control flow and declaration keywords
        "if" | "for" | "while" | "switch" | "match" | "return" | "catch" | "function"
            | "func" | "fn" | "def" | "class" | "new" | "typeof" | "sizeof" | "await"
            | "yield" | "assert" | "elif" | "else" | "do" | "try" | "when" | "using"
            | "lock" | "foreach" | "defer" | "go" | "select" | "synchronized" | "super"
            | "this" | "self" | "import" | "require" | "delete" | "throw" | "in" | "not"
            | "and" | "or" | "lambda" | "with" | "unless" | "until" | "case"
            // ubiquitous builtins
            | "print" | "println" | "printf" | "len" | "range" | "str" | "int" | "float"
            | "bool" | "list" | "dict" | "set" | "tuple" | "isinstance" | "getattr"
            | "setattr" | "hasattr" | "enumerate" | "zip" | "map" | "filter" | "sorted"
            | "open" | "Some" | "Ok" | "Err" | "Box" | "Vec" | "String" | "Array"
            | "Object" | "Number" | "Boolean" | "Promise" | "parseInt" | "parseFloat"
            | "setTimeout" | "setInterval" | "make" | "append" | "panic"
    )
}

#[cfg(test)]
mod tests {
    use super::is_not_a_call;

    #[test]
    fn keywords_and_builtins_are_filtered() {
        assert!(is_not_a_call("if"));
        assert!(is_not_a_call("print"));
        assert!(!is_not_a_call("render"));
        assert!(!is_not_a_call("parse_source"));
    }
}
