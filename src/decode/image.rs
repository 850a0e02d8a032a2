//! Extraction of the produced image identifier from build progress output.

use std::sync::LazyLock;

use regex::Regex;

use super::records::ImageId;

#[expect(clippy::expect_used, reason = "pattern is a compile-time constant")]
static EXPORT_STARTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"exporting to (?:image|docker image format|oci image format)\b")
        .expect("constant regex pattern is valid")
});

#[expect(clippy::expect_used, reason = "pattern is a compile-time constant")]
static MANIFEST_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"exporting manifest list (?P<digest>sha256:[0-9a-f]{64})\b.*\bdone\b")
        .expect("constant regex pattern is valid")
});

/// Find the manifest list digest written once image export has begun.
///
/// Returns `None` when the build never exported an image.
pub(super) fn extract_image_id<'a>(lines: impl IntoIterator<Item = &'a str>) -> Option<ImageId> {
    lines
        .into_iter()
        .skip_while(|line| !EXPORT_STARTED.is_match(line))
        .find_map(|line| {
            MANIFEST_LIST
                .captures(line)
                .and_then(|captures| captures.name("digest"))
                .and_then(|digest| ImageId::new(digest.as_str()).ok())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DIGEST: &str = "sha256:4f3c2b1a09876543210fedcba9876543210fedcba9876543210fedcba9876543";

    fn progress(export: &str) -> String {
        format!(
            "#1 [internal] load build definition from Dockerfile\n\
             #1 DONE 0.0s\n\
             {export}\
             #9 naming to docker.io/library/app:latest done\n"
        )
    }

    #[rstest]
    #[case("#8 exporting to image\n#8 exporting layers done\n")]
    #[case("#8 exporting to docker image format\n#8 sending tarball 0.3s done\n")]
    fn finds_manifest_list_after_export(#[case] export: &str) {
        let text = progress(&format!(
            "{export}#8 exporting manifest list {DIGEST} 0.0s done\n"
        ));
        let found = extract_image_id(text.lines());
        assert_eq!(found.as_ref().map(ImageId::as_str), Some(DIGEST));
    }

    #[rstest]
    fn ignores_manifest_lists_before_export() {
        let text = format!("#5 exporting manifest list {DIGEST} 0.0s done\n#6 DONE\n");
        assert_eq!(extract_image_id(text.lines()), None);
    }

    #[rstest]
    fn returns_none_when_export_never_ran() {
        assert_eq!(extract_image_id(progress("").lines()), None);
    }

    #[rstest]
    fn ignores_unfinished_manifest_export() {
        let text = progress(&format!(
            "#8 exporting to image\n#8 exporting manifest list {DIGEST}\n"
        ));
        assert_eq!(extract_image_id(text.lines()), None);
    }
}
