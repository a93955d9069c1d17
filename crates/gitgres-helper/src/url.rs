//! Helper URL parsing.

use crate::HelperError;

/// Split `<conninfo>/<reponame>` on the last `/`.
///
/// The connection string may itself contain slashes (URLs, socket
/// paths), so only the final segment names the repository. Both sides
/// must be non-empty.
pub fn split_url(url: &str) -> Result<(String, String), HelperError> {
    match url.rsplit_once('/') {
        Some((conninfo, reponame)) if !conninfo.is_empty() && !reponame.is_empty() => {
            Ok((conninfo.to_string(), reponame.to_string()))
        }
        _ => Err(HelperError::InvalidUrl(url.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_last_slash() {
        let (conninfo, repo) = split_url("dbname=mydb/myrepo").unwrap();
        assert_eq!(conninfo, "dbname=mydb");
        assert_eq!(repo, "myrepo");
    }

    #[test]
    fn conninfo_may_contain_slashes() {
        let (conninfo, repo) =
            split_url("postgresql://user@localhost:5432/gitdb/project").unwrap();
        assert_eq!(conninfo, "postgresql://user@localhost:5432/gitdb");
        assert_eq!(repo, "project");
    }

    #[test]
    fn rejects_missing_slash() {
        assert!(matches!(
            split_url("dbname=mydb"),
            Err(HelperError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rejects_empty_sides() {
        assert!(split_url("/repo").is_err());
        assert!(split_url("dbname=mydb/").is_err());
        assert!(split_url("/").is_err());
        assert!(split_url("").is_err());
    }
}
