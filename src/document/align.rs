/*!
 * Deterministic re-splitting of a source string along suggested boundaries.
 *
 * Generative services often return segments or tokens that are right in
 * content but wrong in whitespace: a dropped leading space, a collapsed
 * newline, a trimmed trailing blank. Alignment ignores whitespace in the
 * hints, matches their remaining characters against the source in order and
 * cuts the source itself, so the pieces always concatenate back exactly.
 */

/// Where whitespace between two hinted pieces ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitespacePlacement {
    /// Leading whitespace joins the following piece (segments)
    Attach,
    /// Whitespace runs at piece edges become pieces of their own (tokens)
    Separate,
}

/// Cut `source` into pieces following `hints`.
///
/// Returns `None` when the hints' non-whitespace characters are not exactly
/// the source's non-whitespace characters, in order.
pub fn align_pieces(source: &str, hints: &[String], placement: WhitespacePlacement) -> Option<Vec<String>> {
    let counts: Vec<usize> = hints
        .iter()
        .map(|h| h.chars().filter(|c| !c.is_whitespace()).count())
        .filter(|&n| n > 0)
        .collect();

    let hinted: Vec<char> = hints
        .iter()
        .flat_map(|h| h.chars())
        .filter(|c| !c.is_whitespace())
        .collect();

    // Byte offset of every non-whitespace character of the source
    let anchors: Vec<(usize, char)> = source
        .char_indices()
        .filter(|(_, c)| !c.is_whitespace())
        .collect();

    if anchors.len() != hinted.len() || anchors.iter().map(|(_, c)| *c).ne(hinted.iter().copied()) {
        return None;
    }

    if counts.is_empty() {
        return if source.is_empty() {
            Some(Vec::new())
        } else {
            Some(vec![source.to_string()])
        };
    }

    let mut cuts = Vec::with_capacity(counts.len() + 1);
    cuts.push(0);
    let mut consumed = 0;
    for count in &counts[..counts.len() - 1] {
        consumed += count;
        // Cut right after the piece's last visible character
        let (offset, ch) = anchors[consumed - 1];
        cuts.push(offset + ch.len_utf8());
    }
    cuts.push(source.len());

    let pieces = cuts.windows(2).map(|w| &source[w[0]..w[1]]);

    Some(match placement {
        WhitespacePlacement::Attach => pieces.map(str::to_string).collect(),
        WhitespacePlacement::Separate => pieces.flat_map(split_edges).collect(),
    })
}

/// Split leading and trailing whitespace runs off a piece.
fn split_edges(piece: &str) -> Vec<String> {
    let start = piece.len() - piece.trim_start().len();
    let end = piece.trim_end().len();
    let mut out = Vec::with_capacity(3);
    if start > 0 {
        out.push(piece[..start].to_string());
    }
    if end > start {
        out.push(piece[start..end].to_string());
    }
    if end < piece.len() && end >= start {
        out.push(piece[end..].to_string());
    }
    out
}
