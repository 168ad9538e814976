use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Run<'a> {
    /// Digits with leading zeros stripped
    Num(&'a str),
    Alpha(&'a str),
}

impl Ord for Run<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Run::Num(a), Run::Num(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Run::Alpha(a), Run::Alpha(b)) => a.cmp(b),
            (Run::Num(_), Run::Alpha(_)) => Ordering::Greater,
            (Run::Alpha(_), Run::Num(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Run<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Parsed sort key of one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionKey<'a> {
    runs: Option<Vec<Run<'a>>>,
}

impl<'a> VersionKey<'a> {
    pub fn parse(identifier: &'a str) -> Self {
        let body = identifier
            .strip_prefix(['v', 'V'])
            .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
            .unwrap_or(identifier);

        if !body.starts_with(|c: char| c.is_ascii_digit()) {
            return Self { runs: None };
        }

        let mut runs = Vec::new();
        for segment in body.split(['.', '-', '_', '+']) {
            let mut rest = segment;
            while !rest.is_empty() {
                let numeric = rest.starts_with(|c: char| c.is_ascii_digit());
                let end = rest
                    .find(|c: char| c.is_ascii_digit() != numeric)
                    .unwrap_or(rest.len());
                let (run, tail) = rest.split_at(end);
                runs.push(if numeric {
                    let trimmed = run.trim_start_matches('0');
                    Run::Num(if trimmed.is_empty() { "0" } else { trimmed })
                } else {
                    Run::Alpha(run)
                });
                rest = tail;
            }
        }

        Self { runs: Some(runs) }
    }

    /// Whether the identifier looked like a version at all
    pub fn is_version(&self) -> bool {
        self.runs.is_some()
    }
}

impl Ord for VersionKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.runs, &other.runs) {
            (None, None) => Ordering::Equal,
            // non-versions rank lowest
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => {
                for pair in a.iter().zip(b.iter()) {
                    match pair.0.cmp(pair.1) {
                        Ordering::Equal => continue,
                        unequal => return unequal,
                    }
                }
                let tail = |longer: &[Run<'_>]| match longer.first() {
                    Some(Run::Num(_)) => Ordering::Greater,
                    Some(Run::Alpha(_)) => Ordering::Less,
                    None => Ordering::Equal,
                };
                match a.len().cmp(&b.len()) {
                    Ordering::Equal => Ordering::Equal,
                    Ordering::Greater => tail(&a[b.len()..]),
                    Ordering::Less => tail(&b[a.len()..]).reverse(),
                }
            }
        }
    }
}

impl PartialOrd for VersionKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two identifiers by version precedence (ascending)
///
/// `10.0 > 2.0`, `1.0.1 > 1.0` and `1.0rc1 < 1.0`; identifiers that do not
/// look like versions sort below all that do.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    VersionKey::parse(a).cmp(&VersionKey::parse(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("10.0", "2.0", Ordering::Greater)]
    #[case("1.0.1", "1.0", Ordering::Greater)]
    #[case("1.0rc1", "1.0", Ordering::Less)]
    #[case("1.0rc2", "1.0rc1", Ordering::Greater)]
    #[case("1.0b1", "1.0rc1", Ordering::Less)]
    #[case("v2.0", "1.5", Ordering::Greater)]
    #[case("1.01", "1.1", Ordering::Equal)]
    #[case("2.0", "2.0", Ordering::Equal)]
    #[case("1.0", "dev", Ordering::Greater)]
    #[case("latest", "dev", Ordering::Equal)]
    #[case("123456789012345678901234567890", "99", Ordering::Greater)]
    fn orders_identifiers(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(compare_versions(a, b), expected);
        assert_eq!(compare_versions(b, a), expected.reverse());
    }

    #[rstest]
    #[case("1.0", true)]
    #[case("v3", true)]
    #[case("version", false)]
    #[case("v", false)]
    #[case("main", false)]
    fn recognises_versions(#[case] identifier: &str, #[case] expected: bool) {
        assert_eq!(VersionKey::parse(identifier).is_version(), expected);
    }
}
