//! Lenient paging parameters for listings.

/// Largest page size a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Optional limit/offset. Unset values mean "no bound".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

impl Page {
    /// No limit, no offset.
    pub const ALL: Page = Page {
        limit: None,
        offset: None,
    };

    /// Build a page from raw query values.
    ///
    /// Values that do not parse, or fall outside `1..=MAX_PAGE_LIMIT` for the
    /// limit and `>= 0` for the offset, are ignored rather than rejected.
    pub fn from_query(limit: Option<&str>, offset: Option<&str>) -> Self {
        let limit = limit
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|n| *n > 0 && *n <= i64::from(MAX_PAGE_LIMIT))
            .map(|n| n as u32);
        let offset = offset
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|n| *n >= 0)
            .map(|n| n as u64);
        Self { limit, offset }
    }
}
