//! Canonicalized package identity (spec §3 `PackageIdentity`).

use std::fmt;

/// A canonicalized name that uniquely identifies a package across reference
/// kinds (path, source-control, registry). Two `PackageReference`s that
/// ultimately name "the same package" must canonicalize to the same
/// `PackageIdentity`, even if their `location` strings differ in case,
/// scheme, or trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PackageIdentity(String);

impl PackageIdentity {
    /// Builds an identity from a raw name or location string, applying the
    /// canonicalization rule: case-fold, strip a leading URL scheme and
    /// `.git` suffix, and drop a trailing path separator.
    pub fn canonicalize(raw: &str) -> Self {
        let trimmed = raw.trim();

        // SCP-style syntax (`git@host:org/repo.git`) has no scheme for `Url`
        // to parse. Normalize the `:` path separator to `/` and hand it a
        // scheme so the same `Url` parse below handles both forms.
        let normalized = match trimmed.split_once('@') {
            Some((user, rest))
                if !user.is_empty()
                    && user.chars().all(|c| c.is_ascii_alphanumeric())
                    && !rest.contains("://") =>
            {
                match rest.split_once(':') {
                    Some((host, path)) => format!("ssh://{user}@{host}/{path}"),
                    None => trimmed.to_string(),
                }
            }
            _ => trimmed.to_string(),
        };

        if let Ok(parsed) = url::Url::parse(&normalized) {
            if let Some(host) = parsed.host_str() {
                let path = parsed.path().trim_matches('/');
                let path = path.strip_suffix(".git").unwrap_or(path);
                return PackageIdentity(format!("{host}/{path}").to_ascii_lowercase());
            }
        }

        let s = normalized.trim_end_matches('/');
        let s = s.strip_suffix(".git").unwrap_or(s);
        PackageIdentity(s.to_ascii_lowercase())
    }

    /// Builds an identity directly from an already-canonical string, for
    /// cases (e.g. registry package names) where no further folding is
    /// warranted beyond case normalization.
    pub fn from_name(name: &str) -> Self {
        PackageIdentity(name.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageIdentity {
    fn from(raw: &str) -> Self {
        PackageIdentity::canonicalize(raw)
    }
}
