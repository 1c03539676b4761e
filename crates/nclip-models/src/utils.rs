//! Small string helpers shared across crates.

/// Maximum number of title characters kept in output filenames.
pub const MAX_TITLE_CHARS: usize = 30;

/// Reduce a report title to a filesystem-safe fragment.
///
/// Looks at the first 30 characters only and keeps alphanumerics
/// (including Danish letters), spaces, hyphens and underscores.
pub fn sanitize_output_title(title: &str) -> String {
    title
        .chars()
        .take(MAX_TITLE_CHARS)
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Name of the final video for a given run index and report title.
pub fn final_video_name(index: usize, title: &str) -> String {
    format!("tiktok_subarticle_{}_{}.mp4", index, sanitize_output_title(title))
}
