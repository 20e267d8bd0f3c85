// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Unified diffs for read-only syncs.

use similar::TextDiff;

/// Produce unified diff from local copy to upstream content.
///
/// Returns `None` if both are identical. A file that does not exist locally
/// is diffed against `/dev/null`, which always yields a diff, even for empty
/// upstream files.
pub fn unified(upstream: &str, local: Option<&str>, rel_path: &str) -> Option<String> {
    let (old, old_header) = match local {
        Some(local) if local == upstream => return None,
        Some(local) => (local, format!("a/{rel_path}")),
        None => ("", String::from("/dev/null")),
    };
    let new_header = format!("b/{rel_path}");

    let diff = TextDiff::from_lines(old, upstream);
    let body = diff
        .unified_diff()
        .context_radius(3)
        .header(&old_header, &new_header)
        .to_string();

    // INVARIANT: Empty new files still report their headers.
    if body.is_empty() {
        return Some(format!("--- {old_header}\n+++ {new_header}\n"));
    }

    Some(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn identical_content_has_no_diff() {
        assert_eq!(unified("same\n", Some("same\n"), "a.txt"), None);
    }

    #[test]
    fn changed_content_yields_unified_diff() {
        let result = unified("a\nb2\nc\n", Some("a\nb\nc\n"), "dir/f.txt");

        let expect = indoc! {r#"
            --- a/dir/f.txt
            +++ b/dir/f.txt
            @@ -1,3 +1,3 @@
             a
            -b
            +b2
             c
        "#};
        assert_eq!(result.as_deref(), Some(expect));
    }

    #[test]
    fn new_file_diffs_against_dev_null() {
        let result = unified("hello\n", None, "new.txt");

        let expect = indoc! {r#"
            --- /dev/null
            +++ b/new.txt
            @@ -0,0 +1 @@
            +hello
        "#};
        assert_eq!(result.as_deref(), Some(expect));
    }

    #[test]
    fn empty_new_file_still_has_diff() {
        let result = unified("", None, "empty.txt");

        assert_eq!(result.as_deref(), Some("--- /dev/null\n+++ b/empty.txt\n"));
    }
}
