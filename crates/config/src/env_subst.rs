/// Expand `${NAME}` placeholders from the process environment.
///
/// Unknown variables and unterminated placeholders are kept verbatim, so a
/// token that happens to contain `${` survives.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &after[..end];
        match lookup(name).filter(|_| !name.is_empty()) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn lookup(name: &str) -> Option<String> {
        match name {
            "FONTBOT_TOKEN" => Some("123:abc".to_string()),
            "HOME" => Some("/home/bot".to_string()),
            _ => None,
        }
    }

    #[rstest]
    #[case("token = \"${FONTBOT_TOKEN}\"", "token = \"123:abc\"")]
    #[case("${HOME}/fonts and ${HOME}/db", "/home/bot/fonts and /home/bot/db")]
    #[case("${FONTBOT_UNSET}", "${FONTBOT_UNSET}")]
    #[case("${}", "${}")]
    #[case("price: $5 ${HOME", "price: $5 ${HOME")]
    #[case("plain text", "plain text")]
    fn expands_known_variables_only(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(substitute_env_with(input, lookup), expected);
    }
}
