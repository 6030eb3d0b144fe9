use std::collections::BTreeMap;

/// Keys whose values never reach a log line.
pub const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "hashed_password",
    "secret",
    "token",
    "access_token",
    "refresh_token",
    "ssn",
];

pub const MASK: &str = "***";

/// Copy `fields` into a sorted map, replacing sensitive values with [`MASK`].
///
/// Keys are compared case-insensitively.
pub fn mask_sensitive<'a, I>(fields: I) -> BTreeMap<&'a str, &'a str>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    fields
        .into_iter()
        .map(|(key, value)| {
            let masked = SENSITIVE_KEYS
                .iter()
                .any(|sensitive| sensitive.eq_ignore_ascii_case(key));
            (key, if masked { MASK } else { value })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_only_sensitive_keys() {
        let masked = mask_sensitive([
            ("username", "alice"),
            ("hashed_password", "$argon2id$..."),
            ("Access_Token", "abc"),
        ]);
        assert_eq!(masked["username"], "alice");
        assert_eq!(masked["hashed_password"], MASK);
        assert_eq!(masked["Access_Token"], MASK);
    }

    #[test]
    fn output_is_key_sorted() {
        let masked = mask_sensitive([("b", "1"), ("a", "2")]);
        let keys: Vec<_> = masked.keys().copied().collect();
        assert_eq!(keys, ["a", "b"]);
    }
}
