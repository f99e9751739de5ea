//! Key-set comparison used by every contract that checks returned JSON keys.
//!
//! Comparison is verbatim: order-independent, but case- and whitespace-sensitive.

use serde::Serialize;

/// Returns true when both sides hold exactly the same keys (as sorted multisets).
pub fn same_key_set<'a, R, E>(returned: R, expected: E) -> bool
where
    R: IntoIterator<Item = &'a str>,
    E: IntoIterator<Item = &'a str>,
{
    sorted(returned) == sorted(expected)
}

/// Keys present on one side only. Used for log detail, not for the verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeySetDiff {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
}

impl KeySetDiff {
    pub fn between<'a, R, E>(returned: R, expected: E) -> Self
    where
        R: IntoIterator<Item = &'a str>,
        E: IntoIterator<Item = &'a str>,
    {
        let returned = sorted(returned);
        let expected = sorted(expected);
        Self {
            missing: expected
                .iter()
                .filter(|k| !returned.contains(k))
                .map(|k| k.to_string())
                .collect(),
            unexpected: returned
                .iter()
                .filter(|k| !expected.contains(k))
                .map(|k| k.to_string())
                .collect(),
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "missing: {:?}; unexpected: {:?}",
            self.missing, self.unexpected
        )
    }
}

fn sorted<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut keys: Vec<&str> = keys.into_iter().collect();
    keys.sort_unstable();
    keys
}
