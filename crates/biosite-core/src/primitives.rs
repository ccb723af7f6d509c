//! # Content Limits
//!
//! Hardcoded limits for the biosite content model.
//!
//! The column widths mirror the relational schema the site was designed
//! around; every text field is bounded so a single request cannot grow the
//! database without limit.

// =============================================================================
// COLUMN WIDTHS
// =============================================================================

/// Maximum length (in characters) for emails, names, titles, categories and subjects.
pub const MAX_SHORT_TEXT_LENGTH: usize = 255;

/// Maximum length for gallery captions.
pub const MAX_CAPTION_LENGTH: usize = 500;

/// Maximum length for image and media URLs.
pub const MAX_URL_LENGTH: usize = 2048;

/// Maximum length for unbounded text columns (descriptions, message bodies).
///
/// Values longer than this (64KB) are rejected at validation time.
pub const MAX_LONG_TEXT_LENGTH: usize = 65536;

// =============================================================================
// VALUE RANGES
// =============================================================================

/// Earliest year accepted on achievements and gallery items.
pub const MIN_YEAR: i32 = 1000;

/// Latest year accepted on achievements and gallery items.
pub const MAX_YEAR: i32 = 9999;

/// Minimum password length for account registration.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length for account registration.
pub const MAX_PASSWORD_LENGTH: usize = 128;

// =============================================================================
// LISTING AND SEARCH
// =============================================================================

/// Page size used when a list request does not specify `limit`.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Hard ceiling on `limit` for list and search requests.
pub const MAX_PAGE_SIZE: usize = 200;

/// Maximum number of terms considered in a full-text query.
///
/// Extra terms are ignored so a pasted paragraph cannot fan out into
/// hundreds of index scans.
pub const MAX_SEARCH_TERMS: usize = 16;

/// Minimum length of an indexed or queried term.
pub const MIN_TERM_LENGTH: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_range_is_four_digits() {
        assert_eq!(MIN_YEAR.to_string().len(), 4);
        assert_eq!(MAX_YEAR.to_string().len(), 4);
    }

    #[test]
    fn default_page_fits_under_ceiling() {
        assert!(DEFAULT_PAGE_SIZE <= MAX_PAGE_SIZE);
    }
}
