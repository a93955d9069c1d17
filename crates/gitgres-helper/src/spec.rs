//! Push refspec parsing.

/// One `push [+]<src>:<dst>` line, split into its parts.
///
/// An empty source means "delete the destination". The leading `+`
/// requests a forced update; the backing store upserts unconditionally
/// either way, so the flag only distinguishes the two in the trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSpec {
    pub src: String,
    pub dst: String,
    pub force: bool,
}

impl PushSpec {
    /// Parse the refspec following the `push ` keyword.
    pub fn parse(raw: &str) -> Self {
        let (force, rest) = match raw.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        match rest.split_once(':') {
            Some((src, dst)) => Self {
                src: src.to_string(),
                dst: dst.to_string(),
                force,
            },
            // No colon: the whole spec is the destination.
            None => Self {
                src: String::new(),
                dst: rest.to_string(),
                force,
            },
        }
    }

    /// Does this spec delete its destination?
    pub fn is_delete(&self) -> bool {
        self.src.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_spec() {
        let spec = PushSpec::parse("refs/heads/main:refs/heads/main");
        assert_eq!(spec.src, "refs/heads/main");
        assert_eq!(spec.dst, "refs/heads/main");
        assert!(!spec.force);
        assert!(!spec.is_delete());
    }

    #[test]
    fn forced_spec() {
        let spec = PushSpec::parse("+refs/heads/dev:refs/heads/dev");
        assert!(spec.force);
        assert_eq!(spec.src, "refs/heads/dev");
    }

    #[test]
    fn delete_spec() {
        let spec = PushSpec::parse(":refs/heads/gone");
        assert!(spec.is_delete());
        assert_eq!(spec.dst, "refs/heads/gone");
    }

    #[test]
    fn colonless_spec_is_destination_only() {
        let spec = PushSpec::parse("refs/heads/main");
        assert!(spec.is_delete());
        assert_eq!(spec.dst, "refs/heads/main");
    }

    #[test]
    fn mismatched_names() {
        let spec = PushSpec::parse("refs/heads/local:refs/heads/remote");
        assert_eq!(spec.src, "refs/heads/local");
        assert_eq!(spec.dst, "refs/heads/remote");
    }
}
