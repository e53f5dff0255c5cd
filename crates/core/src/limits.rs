//! Size limits applied to raw events before bundling.
//!
//! The `#[validate]` derive macro requires literal values in attributes,
//! so the field limits are duplicated on `RawEvent`. Keep both in sync.

/// Visitor id max length.
pub const MAX_ID_LEN: usize = 128;

/// Page URL max length. Matches the HTTP Referer header limit.
pub const MAX_URL_LEN: usize = 2048;

/// Raw log lines longer than this are counted as parse failures without
/// being handed to the JSON parser.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Default sampling weight when a raw event carries none.
pub const DEFAULT_WEIGHT: u32 = 1;
