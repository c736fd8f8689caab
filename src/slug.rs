use regex::Regex;
use std::sync::LazyLock;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9]+").expect("static pattern"));

/// Lower-case, collapse every run of non `[a-z0-9]` characters into one
/// hyphen and trim hyphens at both ends.
///
/// Characters outside ASCII are treated as separators after lower-casing, so
/// `"Café"` becomes `"caf"`. Thumbnail paths depend on this staying stable.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    NON_ALNUM
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Object name without directory and without its final extension.
pub fn base_name(object_name: &str) -> &str {
    let file = object_name.rsplit('/').next().unwrap_or(object_name);
    match file.rfind('.') {
        Some(idx) if idx > 0 => &file[..idx],
        _ => file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_deterministic() {
        let a = slugify("Song Name (Live) [2024]");
        let b = slugify("Song Name (Live) [2024]");
        assert_eq!(a, "song-name-live-2024");
        assert_eq!(a, b);
    }

    #[test]
    fn empty_input_gives_empty_slug() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("  ---  "), "");
    }

    #[test]
    fn special_runs_collapse_and_edges_trim() {
        assert_eq!(slugify("--Hello!!!  World??--"), "hello-world");
        assert_eq!(slugify("a&&&b"), "a-b");
    }

    #[test]
    fn non_ascii_is_a_separator() {
        assert_eq!(slugify("Café del Mar"), "caf-del-mar");
        assert_eq!(slugify("日本"), "");
    }

    #[test]
    fn base_name_strips_directory_and_extension() {
        assert_eq!(base_name("music/Artist - Song.mp3"), "Artist - Song");
        assert_eq!(base_name("track.final.mp3"), "track.final");
        assert_eq!(base_name("noext"), "noext");
        assert_eq!(base_name(".hidden"), ".hidden");
    }
}
