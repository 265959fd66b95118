use uuid::Uuid;

/// Characters allowed in an SPDX identifier without substitution.
fn is_valid_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '-'
}

/// Build an SPDX identifier fragment from a list of seeds.
///
/// Seeds are joined with `-`. Colons become dashes, any other character
/// outside `[A-Za-z0-9.-]` is substituted by `C` followed by its decimal
/// code point. When no non-empty seed is supplied, a fresh UUIDv4 (36
/// characters, canonical form) is returned instead.
pub fn build_id<I, S>(seeds: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts = seeds
        .into_iter()
        .map(|seed| sanitize(seed.as_ref()))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();

    if parts.is_empty() {
        return Uuid::new_v4().to_string();
    }

    parts.join("-")
}

fn sanitize(seed: &str) -> String {
    let mut out = String::with_capacity(seed.len());
    for c in seed.chars() {
        if c == ':' {
            out.push('-');
        } else if is_valid_id_char(c) {
            out.push(c);
        } else {
            out.push('C');
            out.push_str(&(c as u32).to_string());
        }
    }
    out
}
