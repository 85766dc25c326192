//! Decides which signatures of a freshly fetched page have not been reported
//! yet, given the cursor left behind by the previous cycle.

use watchline_domain::SignatureInfo;

/// How the stored cursor related to the fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMatch {
    /// No cursor yet; first poll of this address.
    Initial,
    /// The cursor was found in the page.
    Found,
    /// The cursor is not in the page. Either more than a page of activity
    /// happened since the last cycle or the feed history was rewritten; the
    /// whole page is reported in both cases.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Unreported signatures, oldest first.
    pub fresh: Vec<SignatureInfo>,
    /// Newest signature of the page; the next cursor. `None` for an empty page.
    pub newest: Option<String>,
    pub cursor: CursorMatch,
}

/// `page` is newest first, as returned by the feed.
pub fn select_new_signatures(page: &[SignatureInfo], last_seen: Option<&str>) -> Selection {
    let newest = page.first().map(|info| info.signature.clone());

    let (unseen, cursor) = match last_seen {
        None => (page, CursorMatch::Initial),
        Some(cursor) => match page.iter().position(|info| info.signature == cursor) {
            Some(idx) => (&page[..idx], CursorMatch::Found),
            None => (page, CursorMatch::Missing),
        },
    };

    Selection {
        fresh: unseen.iter().rev().cloned().collect(),
        newest,
        cursor,
    }
}
