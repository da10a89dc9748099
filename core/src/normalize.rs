use unicode_normalization::UnicodeNormalization;

/// CJK unified ideographs in the basic block.
fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

fn is_legal(c: char) -> bool {
    is_cjk(c) || c.is_ascii_digit() || c.is_ascii_alphabetic()
}

/// Canonical comparable form of a query: NFKC, then only CJK ideographs,
/// ASCII digits and lower-cased ASCII letters survive. Whitespace runs
/// collapse to a single space; leading and trailing space is dropped.
pub fn normalize_query(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut pending_space = false;
    for c in query.nfkc() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else if is_legal(c) {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}
